/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

mod histogram;
pub use histogram::{ArcHistogram, Histogram};

mod registrar;
pub use registrar::{ArcRegistrar, Registrar};

mod cleaning;
pub use cleaning::SelfCleaningHistogram;

mod locked;
pub use locked::LockedHistogram;

mod delay;
