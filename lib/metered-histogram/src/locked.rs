/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::sync::Mutex;

use hdrhistogram::CreationError;

use crate::Histogram;

/// A mutex-guarded [hdrhistogram](hdrhistogram::Histogram) implementing
/// [`Histogram`], so the statistical algorithms stay in the external crate.
pub struct LockedHistogram {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl LockedHistogram {
    pub fn new() -> Self {
        LockedHistogram::with_sigfig(3).unwrap()
    }

    pub fn with_sigfig(sigfig: u8) -> Result<Self, CreationError> {
        let inner = hdrhistogram::Histogram::new(sigfig)?;
        Ok(LockedHistogram {
            inner: Mutex::new(inner),
        })
    }

    pub fn new_with_bounds(low: u64, high: u64, sigfig: u8) -> Result<Self, CreationError> {
        let inner = hdrhistogram::Histogram::new_with_bounds(low, high, sigfig)?;
        Ok(LockedHistogram {
            inner: Mutex::new(inner),
        })
    }
}

impl Default for LockedHistogram {
    fn default() -> Self {
        LockedHistogram::new()
    }
}

impl Histogram for LockedHistogram {
    fn clear(&self) {
        self.inner.lock().unwrap().reset();
    }

    fn count(&self) -> u64 {
        self.inner.lock().unwrap().len()
    }

    fn max(&self) -> u64 {
        self.inner.lock().unwrap().max()
    }

    fn min(&self) -> u64 {
        self.inner.lock().unwrap().min()
    }

    fn mean(&self) -> f64 {
        self.inner.lock().unwrap().mean()
    }

    fn percentile(&self, q: f64) -> f64 {
        self.inner.lock().unwrap().value_at_quantile(q) as f64
    }

    fn percentiles(&self, qs: &[f64]) -> Vec<f64> {
        let inner = self.inner.lock().unwrap();
        qs.iter().map(|q| inner.value_at_quantile(*q) as f64).collect()
    }

    fn stddev(&self) -> f64 {
        self.inner.lock().unwrap().stdev()
    }

    fn update(&self, value: u64) {
        let _ = self.inner.lock().unwrap().record(value);
    }

    fn variance(&self) -> f64 {
        let stdev = self.inner.lock().unwrap().stdev();
        stdev * stdev
    }
}
