/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::sync::Arc;

/// Tracks concurrent usage of a shared object.
///
/// [`register`](Self::register) announces intent to use the object's
/// facilities and [`done`](Self::done) releases it again, with semantics
/// similar to a wait group's add/done pair: every `register` must eventually
/// be matched by exactly one `done`. [`shutdown`](Self::shutdown) stops any
/// associated background task so the object can be dropped; after shutdown
/// all three methods become non-blocking no-ops.
pub trait Registrar {
    fn register(&self);
    fn done(&self);
    fn shutdown(&self);
}

pub type ArcRegistrar = Arc<dyn Registrar + Send + Sync>;
