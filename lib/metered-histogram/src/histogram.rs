/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

use std::sync::Arc;

/// The statistical surface required of a backing histogram.
///
/// All methods take `&self` so one histogram can be shared across many
/// concurrent recorders; implementations provide their own interior
/// mutability.
pub trait Histogram {
    /// Reset the sample pool and all derived statistics.
    fn clear(&self);
    /// Number of observations recorded since the last [`clear`](Self::clear).
    fn count(&self) -> u64;
    fn max(&self) -> u64;
    fn min(&self) -> u64;
    fn mean(&self) -> f64;
    /// Value at quantile `q`, with `q` in `[0.0, 1.0]`.
    fn percentile(&self, q: f64) -> f64;
    fn percentiles(&self, qs: &[f64]) -> Vec<f64> {
        qs.iter().map(|q| self.percentile(*q)).collect()
    }
    fn stddev(&self) -> f64;
    /// Add one observation.
    fn update(&self, value: u64);
    fn variance(&self) -> f64;
}

pub type ArcHistogram = Arc<dyn Histogram + Send + Sync>;
