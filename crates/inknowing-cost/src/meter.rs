// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily cost accumulator with a configurable ceiling alert.
//!
//! The meter keeps an in-memory running total per UTC day and fires a
//! single alert when the configured ceiling is crossed. On restart,
//! `from_ledger()` re-hydrates the total from the persistent cost ledger
//! so the ceiling survives process restarts.

use std::sync::Mutex;

use chrono::{Datelike, Utc};
use inknowing_config::model::CostConfig;
use inknowing_core::{InknowingError, TokenUsage};
use tracing::warn;

use crate::ledger::{CostEntry, CostLedger};
use crate::pricing::{calculate_cost, PricingRow};

struct MeterState {
    daily_total_usd: f64,
    current_day: u32,
    alerted: bool,
}

/// Process-wide cost meter: computes per-call cost, persists the entry,
/// and tracks the daily accumulator against the ceiling.
pub struct CostMeter {
    ledger: CostLedger,
    ceiling_usd: Option<f64>,
    state: Mutex<MeterState>,
}

impl CostMeter {
    pub fn new(ledger: CostLedger, config: &CostConfig) -> Self {
        Self {
            ledger,
            ceiling_usd: config.daily_ceiling_usd,
            state: Mutex::new(MeterState {
                daily_total_usd: 0.0,
                current_day: Utc::now().ordinal(),
                alerted: false,
            }),
        }
    }

    /// Build a meter with today's total re-hydrated from the ledger.
    pub async fn from_ledger(
        ledger: CostLedger,
        config: &CostConfig,
    ) -> Result<Self, InknowingError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let total = ledger.daily_total(&today).await?;
        let meter = Self::new(ledger, config);
        {
            let mut state = meter.state.lock().expect("meter state poisoned");
            state.daily_total_usd = total;
        }
        Ok(meter)
    }

    /// Record one completed call: compute cost, persist the ledger entry,
    /// advance the daily accumulator, and alert on ceiling crossing.
    ///
    /// Returns the computed cost in USD.
    pub async fn record(
        &self,
        session_id: &str,
        model_id: &str,
        usage: &TokenUsage,
        pricing: &PricingRow,
    ) -> Result<f64, InknowingError> {
        let cost = calculate_cost(usage, pricing);
        let entry = CostEntry::new(session_id.to_string(), model_id.to_string(), usage, cost);
        self.ledger.record(&entry).await?;

        let (total, crossed) = {
            let mut state = self.state.lock().expect("meter state poisoned");
            let today = Utc::now().ordinal();
            if today != state.current_day {
                state.daily_total_usd = 0.0;
                state.current_day = today;
                state.alerted = false;
            }
            state.daily_total_usd += cost;
            let crossed = match self.ceiling_usd {
                Some(ceiling) if state.daily_total_usd >= ceiling && !state.alerted => {
                    state.alerted = true;
                    true
                }
                _ => false,
            };
            (state.daily_total_usd, crossed)
        };

        metrics::gauge!("cost_daily_usd").set(total);
        if crossed {
            warn!(
                daily_total_usd = total,
                ceiling_usd = self.ceiling_usd,
                "daily cost ceiling exceeded"
            );
            metrics::counter!("cost_ceiling_alerts_total").increment(1);
        }

        Ok(cost)
    }

    /// Current daily spend (reporting/tests).
    pub fn daily_total(&self) -> f64 {
        self.state.lock().expect("meter state poisoned").daily_total_usd
    }
}
