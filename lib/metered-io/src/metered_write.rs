/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::io;
use std::io::IoSlice;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio::time::Instant;

use metered_histogram::{ArcHistogram, ArcRegistrar};

pub(crate) struct MeteredWriterState {
    histogram: ArcHistogram,
    registrar: Option<ArcRegistrar>,
    started: Option<Instant>,
    closed: bool,
}

impl MeteredWriterState {
    pub(crate) fn new(histogram: ArcHistogram, registrar: Option<ArcRegistrar>) -> Self {
        MeteredWriterState {
            histogram,
            registrar,
            started: None,
            closed: false,
        }
    }

    /// A transfer spans from the first poll of a write attempt to its
    /// `Ready` completion; the registrar sees it as one unit of work.
    fn begin_transfer(&mut self) {
        if self.started.is_none() {
            if let Some(r) = &self.registrar {
                r.register();
            }
            self.started = Some(Instant::now());
        }
    }

    fn end_transfer(&mut self, nw: usize) {
        if let Some(started) = self.started.take() {
            if nw > 0 {
                self.histogram.update(started.elapsed().as_nanos() as u64);
            }
            if let Some(r) = &self.registrar {
                r.done();
            }
        }
    }

    fn poll_write<W>(
        &mut self,
        writer: Pin<&mut W>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>>
    where
        W: AsyncWrite,
    {
        self.begin_transfer();
        match writer.poll_write(cx, buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(nw)) => {
                self.end_transfer(nw);
                Poll::Ready(Ok(nw))
            }
            Poll::Ready(Err(e)) => {
                self.end_transfer(0);
                Poll::Ready(Err(e))
            }
        }
    }

    fn poll_write_vectored<W>(
        &mut self,
        writer: Pin<&mut W>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>>
    where
        W: AsyncWrite,
    {
        self.begin_transfer();
        match writer.poll_write_vectored(cx, bufs) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(nw)) => {
                self.end_transfer(nw);
                Poll::Ready(Ok(nw))
            }
            Poll::Ready(Err(e)) => {
                self.end_transfer(0);
                Poll::Ready(Err(e))
            }
        }
    }

    fn poll_shutdown<W>(
        &mut self,
        writer: Pin<&mut W>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<()>>
    where
        W: AsyncWrite,
    {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        ready!(writer.poll_shutdown(cx))?;
        self.closed = true;
        // settle a transfer left open by a write that never completed
        self.end_transfer(0);
        Poll::Ready(Ok(()))
    }
}

impl Drop for MeteredWriterState {
    fn drop(&mut self) {
        // a writer dropped mid transfer still owes the registrar a done()
        self.end_transfer(0);
    }
}

pin_project! {
    /// Wraps an [`AsyncWrite`], sampling the wall-clock latency of every
    /// write call that moves at least one byte into the bound histogram,
    /// in nanoseconds.
    ///
    /// Errors of the underlying writer pass through unchanged. Shutting the
    /// writer down more than once is a no-op after the first success.
    pub struct MeteredWriter<W> {
        #[pin]
        inner: W,
        state: MeteredWriterState,
    }
}

impl<W: AsyncWrite> MeteredWriter<W> {
    pub fn new(inner: W, histogram: ArcHistogram) -> Self {
        MeteredWriter {
            inner,
            state: MeteredWriterState::new(histogram, None),
        }
    }

    /// Additionally bracket every write with the registrar's
    /// register/done pair, so a self-cleaning histogram sees this writer's
    /// activity.
    pub fn with_registrar(inner: W, histogram: ArcHistogram, registrar: ArcRegistrar) -> Self {
        MeteredWriter {
            inner,
            state: MeteredWriterState::new(histogram, Some(registrar)),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite> AsyncWrite for MeteredWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        this.state.poll_write(this.inner, cx, buf)
    }

    #[inline]
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        this.state.poll_shutdown(this.inner, cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        this.state.poll_write_vectored(this.inner, cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use metered_histogram::{Histogram, LockedHistogram, Registrar, SelfCleaningHistogram};

    #[tokio::test]
    async fn samples_every_write() {
        let histogram = Arc::new(LockedHistogram::new());
        let mut w = MeteredWriter::new(tokio::io::sink(), histogram.clone());
        w.write_all(&[0u8; 4096]).await.unwrap();
        w.write_all(b"tail").await.unwrap();
        w.shutdown().await.unwrap();
        assert!(histogram.count() > 0);
    }

    #[tokio::test]
    async fn vectored_writes_are_sampled() {
        let histogram = Arc::new(LockedHistogram::new());
        let mut w = MeteredWriter::new(tokio::io::sink(), histogram.clone());
        let n = w
            .write_vectored(&[IoSlice::new(b"first"), IoSlice::new(b"second")])
            .await
            .unwrap();
        assert!(n > 0);
        assert!(histogram.count() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn double_shutdown_releases_registrar_once() {
        let histogram = Arc::new(SelfCleaningHistogram::new(
            LockedHistogram::new(),
            Duration::from_millis(150),
        ));
        let mut w =
            MeteredWriter::with_registrar(tokio::io::sink(), histogram.clone(), histogram.clone());
        w.write_all(b"data").await.unwrap();
        w.shutdown().await.unwrap();
        w.shutdown().await.unwrap();
        assert_eq!(histogram.count(), 1);
        histogram.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn releases_idle_histogram() {
        let histogram = Arc::new(SelfCleaningHistogram::new(
            LockedHistogram::new(),
            Duration::from_millis(150),
        ));
        let mut w =
            MeteredWriter::with_registrar(tokio::io::sink(), histogram.clone(), histogram.clone());
        w.write_all(&[0u8; 1024]).await.unwrap();
        w.shutdown().await.unwrap();
        assert!(histogram.count() > 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(histogram.count(), 0);
        histogram.shutdown();
    }

    #[tokio::test]
    async fn write_errors_pass_through() {
        let histogram = Arc::new(LockedHistogram::new());
        let stream = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        let mut w = MeteredWriter::new(stream, histogram.clone());
        let err = w.write_all(b"data").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(histogram.count(), 0);
    }
}
