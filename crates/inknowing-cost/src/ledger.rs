// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent cost ledger backed by the journal database.
//!
//! Each provider call is recorded with its token breakdown and computed
//! cost in USD. Daily and per-session totals back ceiling enforcement,
//! reporting, and the `cost = sum(cost_entries)` invariant.

use inknowing_core::{InknowingError, TokenUsage};
use inknowing_storage::database::{map_tr_err, Database};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A single cost record representing one LLM API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: String,
    pub session_id: String,
    /// Descriptor id, not the remote model name, so pricing stays auditable.
    pub model_id: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub created_at: String,
}

impl CostEntry {
    pub fn new(session_id: String, model_id: String, usage: &TokenUsage, cost_usd: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            model_id,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            created_at: chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                .to_string(),
        }
    }
}

/// Persistent cost ledger over the `cost_ledger` table.
#[derive(Clone)]
pub struct CostLedger {
    db: Database,
}

impl CostLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a cost entry.
    pub async fn record(&self, entry: &CostEntry) -> Result<(), InknowingError> {
        let e = entry.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO cost_ledger (id, session_id, model_id, input_tokens, \
                     output_tokens, cost_usd, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        e.id,
                        e.session_id,
                        e.model_id,
                        e.input_tokens,
                        e.output_tokens,
                        e.cost_usd,
                        e.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err::<rusqlite::Error>)?;

        info!(
            session_id = %entry.session_id,
            model_id = %entry.model_id,
            input_tokens = entry.input_tokens,
            output_tokens = entry.output_tokens,
            cost_usd = entry.cost_usd,
            "cost recorded"
        );
        Ok(())
    }

    /// Sum of costs for a given UTC date (ISO prefix, e.g. "2026-03-01").
    pub async fn daily_total(&self, date: &str) -> Result<f64, InknowingError> {
        let date = date.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day')",
                    rusqlite::params![date],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err::<rusqlite::Error>)
    }

    /// Sum of costs for one session.
    pub async fn session_total(&self, session_id: &str) -> Result<f64, InknowingError> {
        let session_id = session_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM cost_ledger \
                     WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err::<rusqlite::Error>)
    }
}
