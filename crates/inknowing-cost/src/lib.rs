// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cost accounting for the InKnowing dialogue runtime.
//!
//! Per-call cost records in SQLite, per-descriptor pricing math, and a
//! daily accumulator with ceiling alerting.

pub mod ledger;
pub mod meter;
pub mod pricing;

pub use ledger::{CostEntry, CostLedger};
pub use meter::CostMeter;
pub use pricing::{calculate_cost, PricingRow};
