// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter operations for turns whose journal write failed.

use inknowing_core::InknowingError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::DeadLetter;

/// Append a dead letter. Best effort at the call site; the caller has
/// already lost the primary write when this runs.
pub async fn write_dead_letter(db: &Database, letter: &DeadLetter) -> Result<(), InknowingError> {
    let l = letter.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO dead_letters (id, session_id, payload, reason, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![l.id, l.session_id, l.payload, l.reason, l.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Enumerate dead letters, oldest first, for operator reconciliation.
pub async fn list_dead_letters(db: &Database, limit: i64) -> Result<Vec<DeadLetter>, InknowingError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, payload, reason, created_at FROM dead_letters \
                 ORDER BY created_at ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(DeadLetter {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    payload: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            let mut letters = Vec::new();
            for row in rows {
                letters.push(row?);
            }
            Ok(letters)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}
