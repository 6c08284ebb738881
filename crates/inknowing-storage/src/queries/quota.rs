// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota record primitives.
//!
//! The compare-and-swap lives in SQL: `try_reserve` only increments
//! `consumed` when room remains, so the ledger's invariant holds even if a
//! guard is ever bypassed.

use inknowing_core::InknowingError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::QuotaRecord;

fn row_to_record(row: &rusqlite::Row) -> Result<QuotaRecord, rusqlite::Error> {
    Ok(QuotaRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        period_kind: row.get(2)?,
        period_start: row.get(3)?,
        granted: row.get(4)?,
        consumed: row.get(5)?,
        reset_at: row.get(6)?,
    })
}

/// Fetch the record for (user, period kind, period start), creating it with
/// the given grant if absent. Rollover is just this call with a new
/// `period_start`; prior rows stay untouched.
pub async fn get_or_create_record(
    db: &Database,
    user_id: &str,
    period_kind: &str,
    period_start: &str,
    granted: i64,
    reset_at: &str,
) -> Result<QuotaRecord, InknowingError> {
    let user_id = user_id.to_string();
    let period_kind = period_kind.to_string();
    let period_start = period_start.to_string();
    let reset_at = reset_at.to_string();
    let id = uuid::Uuid::new_v4().to_string();

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO quota_records (id, user_id, period_kind, period_start, granted, consumed, reset_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6) \
                 ON CONFLICT(user_id, period_kind, period_start) DO NOTHING",
                params![id, user_id, period_kind, period_start, granted, reset_at],
            )?;
            conn.query_row(
                "SELECT id, user_id, period_kind, period_start, granted, consumed, reset_at \
                 FROM quota_records WHERE user_id = ?1 AND period_kind = ?2 AND period_start = ?3",
                params![user_id, period_kind, period_start],
                row_to_record,
            )
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Atomically consume one unit if room remains. Returns true on success.
pub async fn try_reserve(db: &Database, record_id: &str) -> Result<bool, InknowingError> {
    let record_id = record_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE quota_records SET consumed = consumed + 1 \
                 WHERE id = ?1 AND consumed < granted",
                params![record_id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Return one previously reserved unit. Floors at zero.
pub async fn release_one(db: &Database, record_id: &str) -> Result<(), InknowingError> {
    let record_id = record_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE quota_records SET consumed = consumed - 1 \
                 WHERE id = ?1 AND consumed > 0",
                params![record_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Fetch a record by id.
pub async fn get_record(db: &Database, record_id: &str) -> Result<Option<QuotaRecord>, InknowingError> {
    let record_id = record_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, period_kind, period_start, granted, consumed, reset_at \
                 FROM quota_records WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(params![record_id], row_to_record)?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_fetch_is_stable() {
        let db = Database::open_in_memory().await.unwrap();
        let first = get_or_create_record(&db, "u1", "daily", "2026-03-01", 20, "2026-03-02T00:00:00Z")
            .await
            .unwrap();
        let second = get_or_create_record(&db, "u1", "daily", "2026-03-01", 20, "2026-03-02T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.granted, 20);
        assert_eq!(second.consumed, 0);
    }

    #[tokio::test]
    async fn rollover_creates_new_row() {
        let db = Database::open_in_memory().await.unwrap();
        let old = get_or_create_record(&db, "u1", "daily", "2026-03-01", 20, "2026-03-02T00:00:00Z")
            .await
            .unwrap();
        try_reserve(&db, &old.id).await.unwrap();

        let new = get_or_create_record(&db, "u1", "daily", "2026-03-02", 20, "2026-03-03T00:00:00Z")
            .await
            .unwrap();
        assert_ne!(old.id, new.id);
        assert_eq!(new.consumed, 0);
        // Old row is left immutable by the rollover.
        let old_again = get_record(&db, &old.id).await.unwrap().unwrap();
        assert_eq!(old_again.consumed, 1);
    }

    #[tokio::test]
    async fn reserve_stops_at_grant() {
        let db = Database::open_in_memory().await.unwrap();
        let record = get_or_create_record(&db, "u1", "daily", "2026-03-01", 2, "2026-03-02T00:00:00Z")
            .await
            .unwrap();

        assert!(try_reserve(&db, &record.id).await.unwrap());
        assert!(try_reserve(&db, &record.id).await.unwrap());
        assert!(!try_reserve(&db, &record.id).await.unwrap());

        let after = get_record(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(after.consumed, 2);
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let db = Database::open_in_memory().await.unwrap();
        let record = get_or_create_record(&db, "u1", "daily", "2026-03-01", 5, "2026-03-02T00:00:00Z")
            .await
            .unwrap();

        try_reserve(&db, &record.id).await.unwrap();
        release_one(&db, &record.id).await.unwrap();
        release_one(&db, &record.id).await.unwrap();

        let after = get_record(&db, &record.id).await.unwrap().unwrap();
        assert_eq!(after.consumed, 0);
    }
}
