/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

use metered_histogram::{ArcHistogram, ArcRegistrar};

pub(crate) struct MeteredReaderState {
    histogram: ArcHistogram,
    registrar: Option<ArcRegistrar>,
    started: Option<Instant>,
    closed: bool,
}

impl MeteredReaderState {
    pub(crate) fn new(histogram: ArcHistogram, registrar: Option<ArcRegistrar>) -> Self {
        MeteredReaderState {
            histogram,
            registrar,
            started: None,
            closed: false,
        }
    }

    fn begin_transfer(&mut self) {
        if self.started.is_none() {
            if let Some(r) = &self.registrar {
                r.register();
            }
            self.started = Some(Instant::now());
        }
    }

    fn end_transfer(&mut self, nr: usize) {
        if let Some(started) = self.started.take() {
            if nr > 0 {
                self.histogram.update(started.elapsed().as_nanos() as u64);
            }
            if let Some(r) = &self.registrar {
                r.done();
            }
        }
    }

    fn poll_read<R>(
        &mut self,
        reader: Pin<&mut R>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>>
    where
        R: AsyncRead,
    {
        if self.closed {
            // report EOF without touching the underlying reader
            return Poll::Ready(Ok(()));
        }
        self.begin_transfer();
        let old_filled_len = buf.filled().len();
        match reader.poll_read(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                let nr = buf.filled().len() - old_filled_len;
                self.end_transfer(nr);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                self.end_transfer(0);
                Poll::Ready(Err(e))
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // settle a transfer left open by a read that never completed
        self.end_transfer(0);
    }
}

impl Drop for MeteredReaderState {
    fn drop(&mut self) {
        // a reader dropped mid transfer still owes the registrar a done()
        self.end_transfer(0);
    }
}

pin_project! {
    /// Wraps an [`AsyncRead`], sampling the wall-clock latency of every
    /// read call that moves at least one byte into the bound histogram,
    /// in nanoseconds.
    ///
    /// Errors of the underlying reader pass through unchanged.
    pub struct MeteredReader<R> {
        #[pin]
        inner: R,
        state: MeteredReaderState,
    }
}

impl<R: AsyncRead> MeteredReader<R> {
    pub fn new(inner: R, histogram: ArcHistogram) -> Self {
        MeteredReader {
            inner,
            state: MeteredReaderState::new(histogram, None),
        }
    }

    /// Additionally bracket every read with the registrar's register/done
    /// pair, so a self-cleaning histogram sees this reader's activity.
    pub fn with_registrar(inner: R, histogram: ArcHistogram, registrar: ArcRegistrar) -> Self {
        MeteredReader {
            inner,
            state: MeteredReaderState::new(histogram, Some(registrar)),
        }
    }

    /// Stop metering and release the registrar. Only the first call has an
    /// effect; afterwards reads report EOF. `AsyncRead` has no shutdown, so
    /// this is the reader's close operation.
    pub fn close(&mut self) {
        self.state.close();
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead> AsyncRead for MeteredReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.state.poll_read(this.inner, cx, buf)
    }
}
