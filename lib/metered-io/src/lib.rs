/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 the metered-io project authors
 */

//! Stream decorators that sample the latency of every non-empty transfer
//! call into a shared [`Histogram`](metered_histogram::Histogram), and
//! bracket each call with register/done signals when the histogram also
//! tracks usage through a [`Registrar`](metered_histogram::Registrar).

mod metered_read;
pub use metered_read::MeteredReader;

mod metered_write;
pub use metered_write::MeteredWriter;
