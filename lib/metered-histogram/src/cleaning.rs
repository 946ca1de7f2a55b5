/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::delay::OptionalDelay;
use crate::{Histogram, Registrar};

enum DecayCommand {
    Register,
    Done,
    Quit,
}

/// Wraps a [`Histogram`], clearing its sample pool after a period of
/// inactivity.
///
/// `SelfCleaningHistogram` implements [`Registrar`]: call
/// [`register`](Registrar::register) to announce following sample updates and
/// [`done`](Registrar::done) once they were added. When no outstanding users
/// remain, a decay timer is armed for the configured delay; unless a new
/// `register` arrives first, the timer clears the histogram's samples. This
/// makes it cheap to share one histogram across many short-lived recorders
/// without retaining sample buffers long after traffic stops.
///
/// A dedicated decay task owns the user counter and the timer; `register`,
/// `done` and `shutdown` only enqueue signals, so they never block and are
/// safe to call from any thread. One race is accepted by design: a decay
/// timer that has already elapsed may still clear the histogram concurrently
/// with a fresh `register`, transiently resetting just-started statistics.
///
/// All [`Histogram`] methods delegate to the wrapped histogram and rely on
/// its own thread safety.
pub struct SelfCleaningHistogram<H> {
    inner: Arc<H>,
    sender: mpsc::UnboundedSender<DecayCommand>,
}

impl<H> Clone for SelfCleaningHistogram<H> {
    fn clone(&self) -> Self {
        SelfCleaningHistogram {
            inner: Arc::clone(&self.inner),
            sender: self.sender.clone(),
        }
    }
}

impl<H> SelfCleaningHistogram<H>
where
    H: Histogram + Send + Sync + 'static,
{
    /// Wrap `histogram` with a decay delay of `delay`, spawning the decay
    /// task onto the current runtime.
    pub fn new(histogram: H, delay: Duration) -> Self {
        SelfCleaningHistogram::with_handle(histogram, delay, None)
    }

    pub fn with_handle(histogram: H, delay: Duration, handle: Option<Handle>) -> Self {
        let handle = handle.unwrap_or_else(Handle::current);
        let inner = Arc::new(histogram);
        let (sender, receiver) = mpsc::unbounded_channel();
        handle.spawn(decay(Arc::clone(&inner), delay, receiver));
        SelfCleaningHistogram { inner, sender }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

/// Tracks usage of the wrapped histogram, arming and disarming the decay
/// timer as the outstanding user count crosses zero. All counter mutation
/// happens here, so no locking is needed anywhere else.
async fn decay<H>(
    histogram: Arc<H>,
    delay: Duration,
    mut receiver: mpsc::UnboundedReceiver<DecayCommand>,
) where
    H: Histogram,
{
    let mut count = 0i64;
    let mut idle = OptionalDelay::default();

    loop {
        tokio::select! {
            biased;

            r = receiver.recv() => {
                match r {
                    Some(DecayCommand::Register) => count += 1,
                    Some(DecayCommand::Done) => count -= 1,
                    Some(DecayCommand::Quit) | None => {
                        debug!("histogram decay task stopped");
                        return;
                    }
                }
                if count == 0 {
                    idle.arm(delay);
                } else {
                    // also handles a count driven negative by unbalanced
                    // done() calls: the timer stays disarmed until enough
                    // register() calls restore balance
                    idle.disarm();
                }
            }
            _ = idle.elapsed() => {
                trace!("clearing histogram after {delay:?} of inactivity");
                histogram.clear();
                idle.disarm();
            }
        }
    }
}

impl<H> Registrar for SelfCleaningHistogram<H>
where
    H: Histogram + Send + Sync + 'static,
{
    /// Announce one unit of work about to use the histogram, blocking the
    /// decay timer until a matching [`done`](Registrar::done).
    fn register(&self) {
        // send only fails after shutdown, which makes this a no-op
        let _ = self.sender.send(DecayCommand::Register);
    }

    fn done(&self) {
        let _ = self.sender.send(DecayCommand::Done);
    }

    /// Stop the decay task and cancel any pending clear. Idempotent; after
    /// the first call takes effect, `register` and `done` become no-ops.
    fn shutdown(&self) {
        let _ = self.sender.send(DecayCommand::Quit);
    }
}

impl<H> Histogram for SelfCleaningHistogram<H>
where
    H: Histogram + Send + Sync + 'static,
{
    fn clear(&self) {
        self.inner.clear()
    }

    fn count(&self) -> u64 {
        self.inner.count()
    }

    fn max(&self) -> u64 {
        self.inner.max()
    }

    fn min(&self) -> u64 {
        self.inner.min()
    }

    fn mean(&self) -> f64 {
        self.inner.mean()
    }

    fn percentile(&self, q: f64) -> f64 {
        self.inner.percentile(q)
    }

    fn percentiles(&self, qs: &[f64]) -> Vec<f64> {
        self.inner.percentiles(qs)
    }

    fn stddev(&self) -> f64 {
        self.inner.stddev()
    }

    fn update(&self, value: u64) {
        self.inner.update(value)
    }

    fn variance(&self) -> f64 {
        self.inner.variance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockedHistogram;

    fn new_histogram(delay_millis: u64) -> SelfCleaningHistogram<LockedHistogram> {
        SelfCleaningHistogram::new(
            LockedHistogram::new(),
            Duration::from_millis(delay_millis),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn clears_when_idle() {
        let sh = new_histogram(150);
        sh.register();
        sh.register();
        sh.update(150);
        sh.update(100);
        sh.update(50);
        sh.done();
        sh.done();
        assert_eq!(sh.count(), 3);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sh.count(), 0);

        sh.register();
        sh.update(50);
        tokio::time::sleep(Duration::from_millis(300)).await;
        sh.update(150);
        assert_eq!(sh.count(), 2);

        sh.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn register_cancels_pending_clear() {
        let sh = new_histogram(150);
        sh.register();
        sh.update(7);
        sh.done();

        // re-register before the decay delay elapses
        tokio::time::sleep(Duration::from_millis(100)).await;
        sh.register();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sh.count(), 1);

        // going idle again arms a fresh timer
        sh.done();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sh.count(), 0);

        sh.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_decay() {
        let sh = new_histogram(100);
        sh.register();
        sh.register();
        sh.update(150);
        sh.update(100);
        sh.update(50);
        sh.done();
        sh.done();
        assert_eq!(sh.count(), 3);

        sh.shutdown();
        sh.shutdown();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sh.count(), 3);

        // no-ops once the decay task is gone
        sh.register();
        sh.done();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sh.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unbalanced_done_keeps_timer_disarmed() {
        let sh = new_histogram(100);
        sh.update(42);
        sh.done();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sh.count(), 1);

        // restoring balance re-arms the timer
        sh.register();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sh.count(), 0);

        sh.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_update_done() {
        const WORKERS: usize = 10_000;

        // delay long enough that no clear happens while workers run
        let sh = new_histogram(60_000);
        let mut handles = Vec::with_capacity(WORKERS);
        for _ in 0..WORKERS {
            let sh = sh.clone();
            handles.push(tokio::spawn(async move {
                sh.register();
                sh.update(100);
                sh.done();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(sh.count(), WORKERS as u64);
        sh.shutdown();
    }
}
