/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

#[derive(Default)]
pub(crate) struct OptionalDelay {
    inner: Option<Pin<Box<Sleep>>>,
}

impl OptionalDelay {
    pub(crate) fn arm(&mut self, delay: Duration) {
        self.inner = Some(Box::pin(tokio::time::sleep(delay)));
    }

    pub(crate) fn disarm(&mut self) {
        self.inner = None;
    }

    pub(crate) async fn elapsed(&mut self) {
        match &mut self.inner {
            Some(sleep) => sleep.as_mut().await,
            None => std::future::pending().await,
        }
    }
}
