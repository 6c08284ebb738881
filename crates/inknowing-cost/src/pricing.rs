// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-descriptor pricing and cost calculation.
//!
//! Prices are configured on each model descriptor in USD per 1k tokens;
//! there is no built-in price table because the pool spans providers with
//! wildly different rates.

use inknowing_core::TokenUsage;
use serde::{Deserialize, Serialize};

/// Pricing row of one model descriptor, USD per 1k tokens.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PricingRow {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// Cost in USD for one completed call.
///
/// `cost = in_tokens/1000 * in_price + out_tokens/1000 * out_price`.
pub fn calculate_cost(usage: &TokenUsage, pricing: &PricingRow) -> f64 {
    let input = f64::from(usage.input_tokens) / 1000.0 * pricing.input_per_1k;
    let output = f64::from(usage.output_tokens) / 1000.0 * pricing.output_per_1k;
    input + output
}
