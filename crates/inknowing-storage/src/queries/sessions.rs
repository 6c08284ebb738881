// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations.

use std::str::FromStr;

use inknowing_core::types::{SessionKind, SessionStatus};
use inknowing_core::InknowingError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Session;

const SESSION_COLUMNS: &str = "id, user_id, book_id, character_id, kind, status, model_used, \
     total_tokens, total_cost_usd, created_at, last_activity_at, ended_at";

pub(crate) fn row_to_session(row: &rusqlite::Row) -> Result<Session, rusqlite::Error> {
    let kind_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    Ok(Session {
        id: row.get(0)?,
        user_id: row.get(1)?,
        book_id: row.get(2)?,
        character_id: row.get(3)?,
        kind: SessionKind::from_str(&kind_str).unwrap_or(SessionKind::Book),
        status: SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::Active),
        model_used: row.get(6)?,
        total_tokens: row.get(7)?,
        total_cost_usd: row.get(8)?,
        created_at: row.get(9)?,
        last_activity_at: row.get(10)?,
        ended_at: row.get(11)?,
    })
}

/// Insert a new session row.
pub async fn create_session(db: &Database, session: &Session) -> Result<(), InknowingError> {
    let s = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, book_id, character_id, kind, status, \
                 model_used, total_tokens, total_cost_usd, created_at, last_activity_at, ended_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    s.id,
                    s.user_id,
                    s.book_id,
                    s.character_id,
                    s.kind.to_string(),
                    s.status.to_string(),
                    s.model_used,
                    s.total_tokens,
                    s.total_cost_usd,
                    s.created_at,
                    s.last_activity_at,
                    s.ended_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Fetch one session by id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, InknowingError> {
    let id = id.to_string();
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query_map(params![id], row_to_session)?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// List a user's sessions, most recently active first, with cursor pagination.
///
/// `cursor` is the `last_activity_at` of the last row the caller has seen.
pub async fn list_by_user(
    db: &Database,
    user_id: &str,
    cursor: Option<String>,
    limit: i64,
) -> Result<Vec<Session>, InknowingError> {
    let user_id = user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut sessions = Vec::new();
            match cursor {
                Some(before) => {
                    let sql = format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions \
                         WHERE user_id = ?1 AND last_activity_at < ?2 \
                         ORDER BY last_activity_at DESC LIMIT ?3"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![user_id, before, limit], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
                None => {
                    let sql = format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions \
                         WHERE user_id = ?1 ORDER BY last_activity_at DESC LIMIT ?2"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params![user_id, limit], row_to_session)?;
                    for row in rows {
                        sessions.push(row?);
                    }
                }
            }
            Ok(sessions)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Mark a session ended or expired. No-op if the session is already closed,
/// so repeated closes stay idempotent.
pub async fn close_session(
    db: &Database,
    id: &str,
    status: SessionStatus,
    ended_at: &str,
) -> Result<(), InknowingError> {
    let id = id.to_string();
    let status = status.to_string();
    let ended_at = ended_at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, ended_at = ?2 \
                 WHERE id = ?3 AND status = 'active'",
                params![status, ended_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Batched metric update: add tokens and cost, optionally stamping model
/// and activity. Background accounting passes None to leave the idle
/// clock untouched.
pub async fn update_session_metrics(
    db: &Database,
    id: &str,
    tokens: i64,
    cost_usd: f64,
    model_used: Option<String>,
    last_activity_at: Option<String>,
) -> Result<(), InknowingError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions SET total_tokens = total_tokens + ?1, \
                 total_cost_usd = total_cost_usd + ?2, \
                 model_used = COALESCE(?3, model_used), \
                 last_activity_at = COALESCE(?4, last_activity_at) WHERE id = ?5",
                params![tokens, cost_usd, model_used, last_activity_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Upsert the cached summary row for a session.
pub async fn upsert_summary(
    db: &Database,
    session_id: &str,
    summary: &str,
    summarized_up_to: i64,
) -> Result<(), InknowingError> {
    let session_id = session_id.to_string();
    let summary = summary.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO session_summaries (session_id, summary, summarized_up_to, updated_at) \
                 VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')) \
                 ON CONFLICT(session_id) DO UPDATE SET summary = excluded.summary, \
                 summarized_up_to = excluded.summarized_up_to, updated_at = excluded.updated_at",
                params![session_id, summary, summarized_up_to],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Fetch the cached summary for a session, if any.
pub async fn get_summary(
    db: &Database,
    session_id: &str,
) -> Result<Option<crate::models::SessionSummary>, InknowingError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, summary, summarized_up_to, updated_at \
                 FROM session_summaries WHERE session_id = ?1",
            )?;
            let mut rows = stmt.query_map(params![session_id], |row| {
                Ok(crate::models::SessionSummary {
                    session_id: row.get(0)?,
                    summary: row.get(1)?,
                    summarized_up_to: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            rows.next().transpose()
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    pub(crate) fn make_session(id: &str, user_id: &str) -> Session {
        Session {
            id: id.to_string(),
            user_id: user_id.to_string(),
            book_id: "book-1".to_string(),
            character_id: None,
            kind: SessionKind::Book,
            status: SessionStatus::Active,
            model_used: None,
            total_tokens: 0,
            total_cost_usd: 0.0,
            created_at: "2026-03-01T10:00:00.000Z".to_string(),
            last_activity_at: "2026-03-01T10:00:00.000Z".to_string(),
            ended_at: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let db = Database::open_in_memory().await.unwrap();
        let session = make_session("s1", "u1");
        create_session(&db, &session).await.unwrap();

        let fetched = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.kind, SessionKind::Book);
        assert_eq!(fetched.status, SessionStatus::Active);
        assert!(fetched.character_id.is_none());
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_session(&db, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_user_orders_and_paginates() {
        let db = Database::open_in_memory().await.unwrap();
        for i in 0..5 {
            let mut s = make_session(&format!("s{i}"), "u1");
            s.last_activity_at = format!("2026-03-01T10:00:0{i}.000Z");
            create_session(&db, &s).await.unwrap();
        }
        create_session(&db, &make_session("other", "u2")).await.unwrap();

        let page1 = list_by_user(&db, "u1", None, 3).await.unwrap();
        assert_eq!(page1.len(), 3);
        assert_eq!(page1[0].id, "s4");

        let cursor = page1.last().unwrap().last_activity_at.clone();
        let page2 = list_by_user(&db, "u1", Some(cursor), 3).await.unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].id, "s1");
    }

    #[tokio::test]
    async fn close_session_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        create_session(&db, &make_session("s1", "u1")).await.unwrap();

        close_session(&db, "s1", SessionStatus::Ended, "2026-03-01T11:00:00.000Z")
            .await
            .unwrap();
        // Second close with a different status must not overwrite.
        close_session(&db, "s1", SessionStatus::Expired, "2026-03-01T12:00:00.000Z")
            .await
            .unwrap();

        let fetched = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Ended);
        assert_eq!(fetched.ended_at.as_deref(), Some("2026-03-01T11:00:00.000Z"));
    }

    #[tokio::test]
    async fn metrics_accumulate() {
        let db = Database::open_in_memory().await.unwrap();
        create_session(&db, &make_session("s1", "u1")).await.unwrap();

        update_session_metrics(
            &db,
            "s1",
            100,
            0.01,
            Some("m1".into()),
            Some("2026-03-01T10:01:00.000Z".into()),
        )
        .await
        .unwrap();
        // Background accounting: no activity stamp.
        update_session_metrics(&db, "s1", 50, 0.005, None, None)
            .await
            .unwrap();

        let s = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(s.total_tokens, 150);
        assert!((s.total_cost_usd - 0.015).abs() < 1e-10);
        assert_eq!(s.model_used.as_deref(), Some("m1"));
        assert_eq!(s.last_activity_at, "2026-03-01T10:01:00.000Z");
    }

    #[tokio::test]
    async fn summary_upsert_replaces() {
        let db = Database::open_in_memory().await.unwrap();
        create_session(&db, &make_session("s1", "u1")).await.unwrap();

        upsert_summary(&db, "s1", "first version", 10).await.unwrap();
        upsert_summary(&db, "s1", "second version", 24).await.unwrap();

        let summary = get_summary(&db, "s1").await.unwrap().unwrap();
        assert_eq!(summary.summary, "second version");
        assert_eq!(summary.summarized_up_to, 24);
    }
}
