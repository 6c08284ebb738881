// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message and reference operations, including the atomic turn append.

use std::str::FromStr;

use inknowing_core::types::MessageRole;
use inknowing_core::InknowingError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{Message, Reference};

const MESSAGE_COLUMNS: &str = "id, session_id, seq, role, content, token_count, model_used, \
     latency_ms, partial, error_kind, created_at";

fn row_to_message(row: &rusqlite::Row) -> Result<Message, rusqlite::Error> {
    let role_str: String = row.get(3)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        seq: row.get(2)?,
        role: MessageRole::from_str(&role_str).unwrap_or(MessageRole::User),
        content: row.get(4)?,
        token_count: row.get(5)?,
        model_used: row.get(6)?,
        latency_ms: row.get(7)?,
        partial: row.get::<_, i64>(8)? != 0,
        error_kind: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn insert_message_tx(tx: &rusqlite::Transaction, msg: &Message) -> Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO messages (id, session_id, seq, role, content, token_count, \
         model_used, latency_ms, partial, error_kind, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            msg.id,
            msg.session_id,
            msg.seq,
            msg.role.to_string(),
            msg.content,
            msg.token_count,
            msg.model_used,
            msg.latency_ms,
            msg.partial as i64,
            msg.error_kind,
            msg.created_at,
        ],
    )?;
    Ok(())
}

/// Append one completed turn as a single atomic unit.
///
/// Inside one transaction: the user message, the assistant message, its
/// references, and the session's denormalized counters. Sequence numbers
/// are assigned here from the current maximum, so the user turn always
/// immediately precedes its assistant turn.
///
/// Returns the (user, assistant) sequence numbers assigned.
pub async fn append_turn(
    db: &Database,
    user_msg: &Message,
    assistant_msg: &Message,
    references: &[Reference],
    cost_usd: f64,
) -> Result<(i64, i64), InknowingError> {
    let mut user_msg = user_msg.clone();
    let mut assistant_msg = assistant_msg.clone();
    let references = references.to_vec();

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let base: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq) + 1, 0) FROM messages WHERE session_id = ?1",
                params![user_msg.session_id],
                |row| row.get(0),
            )?;
            user_msg.seq = base;
            assistant_msg.seq = base + 1;

            insert_message_tx(&tx, &user_msg)?;
            insert_message_tx(&tx, &assistant_msg)?;

            for r in &references {
                tx.execute(
                    "INSERT INTO message_references (message_id, source, chapter_index, \
                     page, paragraph_index, memory_key, excerpt, similarity) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        assistant_msg.id,
                        r.source.to_string(),
                        r.chapter_index,
                        r.page,
                        r.paragraph_index,
                        r.memory_key,
                        r.excerpt,
                        r.similarity,
                    ],
                )?;
            }

            tx.execute(
                "UPDATE sessions SET total_tokens = total_tokens + ?1, \
                 total_cost_usd = total_cost_usd + ?2, \
                 model_used = COALESCE(?3, model_used), \
                 last_activity_at = ?4 WHERE id = ?5",
                params![
                    user_msg.token_count + assistant_msg.token_count,
                    cost_usd,
                    assistant_msg.model_used,
                    assistant_msg.created_at,
                    user_msg.session_id,
                ],
            )?;

            tx.commit()?;
            Ok((base, base + 1))
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Get messages for a session in sequence order, starting after `cursor`.
pub async fn get_messages(
    db: &Database,
    session_id: &str,
    cursor: Option<i64>,
    limit: i64,
) -> Result<Vec<Message>, InknowingError> {
    let session_id = session_id.to_string();
    let after = cursor.unwrap_or(-1);
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages \
         WHERE session_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id, after, limit], row_to_message)?;
            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// Number of messages persisted for a session.
pub async fn count_messages(db: &Database, session_id: &str) -> Result<i64, InknowingError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

/// References attached to one assistant message, similarity descending.
pub async fn get_references(
    db: &Database,
    message_id: &str,
) -> Result<Vec<Reference>, InknowingError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, source, chapter_index, page, paragraph_index, \
                 memory_key, excerpt, similarity FROM message_references \
                 WHERE message_id = ?1 ORDER BY similarity DESC",
            )?;
            let rows = stmt.query_map(params![message_id], |row| {
                let source_str: String = row.get(1)?;
                Ok(Reference {
                    message_id: row.get(0)?,
                    source: inknowing_core::types::ReferenceSource::from_str(&source_str)
                        .unwrap_or(inknowing_core::types::ReferenceSource::Chapter),
                    chapter_index: row.get(2)?,
                    page: row.get(3)?,
                    paragraph_index: row.get(4)?,
                    memory_key: row.get(5)?,
                    excerpt: row.get(6)?,
                    similarity: row.get(7)?,
                })
            })?;
            let mut refs = Vec::new();
            for row in rows {
                refs.push(row?);
            }
            Ok(refs)
        })
        .await
        .map_err(map_tr_err::<rusqlite::Error>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions::create_session;
    use inknowing_core::types::{
        ReferenceSource, Session, SessionKind, SessionStatus,
    };

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let session = Session {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            book_id: "b1".to_string(),
            character_id: None,
            kind: SessionKind::Book,
            status: SessionStatus::Active,
            model_used: None,
            total_tokens: 0,
            total_cost_usd: 0.0,
            created_at: "2026-03-01T10:00:00.000Z".to_string(),
            last_activity_at: "2026-03-01T10:00:00.000Z".to_string(),
            ended_at: None,
        };
        create_session(&db, &session).await.unwrap();
        db
    }

    fn make_msg(id: &str, role: MessageRole, content: &str) -> Message {
        Message {
            id: id.to_string(),
            session_id: "s1".to_string(),
            seq: 0,
            role,
            content: content.to_string(),
            token_count: 10,
            model_used: (role == MessageRole::Assistant).then(|| "model-a".to_string()),
            latency_ms: None,
            partial: false,
            error_kind: None,
            created_at: "2026-03-01T10:00:01.000Z".to_string(),
        }
    }

    fn make_ref(excerpt: &str, similarity: f64) -> Reference {
        Reference {
            message_id: String::new(),
            source: ReferenceSource::Paragraph,
            chapter_index: Some(1),
            page: Some(12),
            paragraph_index: Some(3),
            memory_key: None,
            excerpt: excerpt.to_string(),
            similarity,
        }
    }

    #[tokio::test]
    async fn append_turn_assigns_alternating_seqs() {
        let db = setup().await;

        let (u0, a0) = append_turn(
            &db,
            &make_msg("m1", MessageRole::User, "hello"),
            &make_msg("m2", MessageRole::Assistant, "hi"),
            &[],
            0.001,
        )
        .await
        .unwrap();
        assert_eq!((u0, a0), (0, 1));

        let (u1, a1) = append_turn(
            &db,
            &make_msg("m3", MessageRole::User, "again"),
            &make_msg("m4", MessageRole::Assistant, "sure"),
            &[],
            0.001,
        )
        .await
        .unwrap();
        assert_eq!((u1, a1), (2, 3));

        let messages = get_messages(&db, "s1", None, 100).await.unwrap();
        assert_eq!(messages.len(), 4);
        for pair in messages.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[tokio::test]
    async fn append_turn_writes_references_with_parent() {
        let db = setup().await;

        append_turn(
            &db,
            &make_msg("m1", MessageRole::User, "where does chapter 2 start?"),
            &make_msg("m2", MessageRole::Assistant, "at the harbor"),
            &[make_ref("low", 0.4), make_ref("high", 0.9)],
            0.0,
        )
        .await
        .unwrap();

        let refs = get_references(&db, "m2").await.unwrap();
        assert_eq!(refs.len(), 2);
        // Ordered by similarity descending.
        assert_eq!(refs[0].excerpt, "high");
        assert_eq!(refs[0].message_id, "m2");
        assert_eq!(refs[1].excerpt, "low");
    }

    #[tokio::test]
    async fn append_turn_updates_session_counters() {
        let db = setup().await;

        append_turn(
            &db,
            &make_msg("m1", MessageRole::User, "q"),
            &make_msg("m2", MessageRole::Assistant, "a"),
            &[],
            0.02,
        )
        .await
        .unwrap();

        let session = crate::queries::sessions::get_session(&db, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.total_tokens, 20);
        assert!((session.total_cost_usd - 0.02).abs() < 1e-10);
        assert_eq!(session.model_used.as_deref(), Some("model-a"));
    }

    #[tokio::test]
    async fn get_messages_cursor_pagination() {
        let db = setup().await;
        for i in 0..3 {
            append_turn(
                &db,
                &make_msg(&format!("u{i}"), MessageRole::User, "q"),
                &make_msg(&format!("a{i}"), MessageRole::Assistant, "a"),
                &[],
                0.0,
            )
            .await
            .unwrap();
        }

        let first = get_messages(&db, "s1", None, 4).await.unwrap();
        assert_eq!(first.len(), 4);
        let rest = get_messages(&db, "s1", Some(first.last().unwrap().seq), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].seq, 4);
        assert_eq!(count_messages(&db, "s1").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn partial_flag_round_trips() {
        let db = setup().await;
        let mut assistant = make_msg("m2", MessageRole::Assistant, "partial tex");
        assistant.partial = true;
        append_turn(&db, &make_msg("m1", MessageRole::User, "q"), &assistant, &[], 0.0)
            .await
            .unwrap();

        let messages = get_messages(&db, "s1", None, 10).await.unwrap();
        assert!(!messages[0].partial);
        assert!(messages[1].partial);
    }
}
