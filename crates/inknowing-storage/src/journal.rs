// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistence journal: the durable home of sessions, messages,
//! references, quota rows, summaries, and dead letters.
//!
//! All writes for one session are serialized by its worker; the journal
//! itself serializes everything through the single SQLite write thread.

use inknowing_core::types::SessionStatus;
use inknowing_core::InknowingError;

use crate::database::Database;
use crate::models::{
    Book, ChunkRow, DeadLetter, Message, Persona, QuotaRecord, Reference, Session,
    SessionSummary,
};
use crate::queries;

/// Facade over the query modules with the journal's write/read contracts.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Journal {
    db: Database,
}

impl Journal {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database handle (quota ledger and cost ledger attach
    /// their own query sets to it).
    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Write contracts ---

    pub async fn create_session(&self, session: &Session) -> Result<(), InknowingError> {
        queries::sessions::create_session(&self.db, session).await
    }

    /// Single atomic unit: user message + assistant message + references +
    /// session counters. Returns assigned (user, assistant) sequence numbers.
    pub async fn append_turn(
        &self,
        user_msg: &Message,
        assistant_msg: &Message,
        references: &[Reference],
        cost_usd: f64,
    ) -> Result<(i64, i64), InknowingError> {
        queries::messages::append_turn(&self.db, user_msg, assistant_msg, references, cost_usd)
            .await
    }

    pub async fn update_session_metrics(
        &self,
        session_id: &str,
        tokens: i64,
        cost_usd: f64,
        model_used: Option<String>,
        last_activity_at: Option<String>,
    ) -> Result<(), InknowingError> {
        queries::sessions::update_session_metrics(
            &self.db,
            session_id,
            tokens,
            cost_usd,
            model_used,
            last_activity_at,
        )
        .await
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: &str,
    ) -> Result<(), InknowingError> {
        queries::sessions::close_session(&self.db, session_id, status, ended_at).await
    }

    pub async fn upsert_summary(
        &self,
        session_id: &str,
        summary: &str,
        summarized_up_to: i64,
    ) -> Result<(), InknowingError> {
        queries::sessions::upsert_summary(&self.db, session_id, summary, summarized_up_to).await
    }

    pub async fn write_dead_letter(&self, letter: &DeadLetter) -> Result<(), InknowingError> {
        queries::dead_letter::write_dead_letter(&self.db, letter).await
    }

    // --- Read contracts ---

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, InknowingError> {
        queries::sessions::get_session(&self.db, session_id).await
    }

    pub async fn list_by_user(
        &self,
        user_id: &str,
        cursor: Option<String>,
        limit: i64,
    ) -> Result<Vec<Session>, InknowingError> {
        queries::sessions::list_by_user(&self.db, user_id, cursor, limit).await
    }

    pub async fn get_messages(
        &self,
        session_id: &str,
        cursor: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, InknowingError> {
        queries::messages::get_messages(&self.db, session_id, cursor, limit).await
    }

    pub async fn count_messages(&self, session_id: &str) -> Result<i64, InknowingError> {
        queries::messages::count_messages(&self.db, session_id).await
    }

    pub async fn get_references(&self, message_id: &str) -> Result<Vec<Reference>, InknowingError> {
        queries::messages::get_references(&self.db, message_id).await
    }

    pub async fn get_summary(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSummary>, InknowingError> {
        queries::sessions::get_summary(&self.db, session_id).await
    }

    pub async fn get_book(&self, book_id: &str) -> Result<Option<Book>, InknowingError> {
        queries::catalog::get_book(&self.db, book_id).await
    }

    pub async fn get_persona(&self, character_id: &str) -> Result<Option<Persona>, InknowingError> {
        queries::catalog::get_persona(&self.db, character_id).await
    }

    pub async fn get_chunks(
        &self,
        book_id: &str,
        chapter_range: Option<(i64, i64)>,
    ) -> Result<Vec<ChunkRow>, InknowingError> {
        queries::catalog::get_chunks(&self.db, book_id, chapter_range).await
    }

    // --- Quota primitives (the ledger owns the concurrency discipline) ---

    pub async fn get_or_create_quota_record(
        &self,
        user_id: &str,
        period_kind: &str,
        period_start: &str,
        granted: i64,
        reset_at: &str,
    ) -> Result<QuotaRecord, InknowingError> {
        queries::quota::get_or_create_record(
            &self.db,
            user_id,
            period_kind,
            period_start,
            granted,
            reset_at,
        )
        .await
    }

    pub async fn quota_try_reserve(&self, record_id: &str) -> Result<bool, InknowingError> {
        queries::quota::try_reserve(&self.db, record_id).await
    }

    pub async fn quota_release_one(&self, record_id: &str) -> Result<(), InknowingError> {
        queries::quota::release_one(&self.db, record_id).await
    }

    pub async fn get_quota_record(
        &self,
        record_id: &str,
    ) -> Result<Option<QuotaRecord>, InknowingError> {
        queries::quota::get_record(&self.db, record_id).await
    }
}
