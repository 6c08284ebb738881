// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session manager: maps session ids to live workers and routes turns.
//!
//! Workers come and go; session identity and history outlive them. One
//! worker owns each active session and serializes its state changes; the
//! manager only creates, locates, and tears down workers.

use std::sync::Arc;

use dashmap::DashMap;
use inknowing_config::model::SessionConfig;
use inknowing_context::{discussed_topics, ContextAssembler, Summarizer};
use inknowing_core::types::{Principal, Session};
use inknowing_core::{InknowingError, SessionKind, SessionStatus};
use inknowing_quota::QuotaLedger;
use inknowing_router::ModelRouter;
use inknowing_storage::Journal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::turn::{TurnEvent, TurnRequest};
use crate::worker::{now_iso, spawn_worker};

/// Capacity of each turn's outgoing event channel. Bounded so client
/// backpressure reaches the worker and, through it, the provider stream.
const TURN_EVENT_CAPACITY: usize = 32;

/// A live worker's mailbox.
pub(crate) struct WorkerHandle {
    pub inbox: mpsc::Sender<TurnRequest>,
}

/// Shared dependencies handed to every worker.
pub(crate) struct RuntimeDeps {
    pub journal: Journal,
    pub quota: Arc<QuotaLedger>,
    pub router: Arc<ModelRouter>,
    pub assembler: Arc<ContextAssembler>,
    pub summarizer: Arc<Summarizer>,
    pub config: SessionConfig,
    pub workers: DashMap<String, WorkerHandle>,
}

/// What the context endpoint reports about a session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextView {
    pub summary: Option<String>,
    pub discussed_topics: Vec<String>,
    pub current_chapter: Option<i64>,
    pub current_character: Option<String>,
}

/// Owns the worker table and the public session lifecycle contract.
pub struct SessionManager {
    deps: Arc<RuntimeDeps>,
}

impl SessionManager {
    pub fn new(
        journal: Journal,
        quota: Arc<QuotaLedger>,
        router: Arc<ModelRouter>,
        assembler: Arc<ContextAssembler>,
        summarizer: Arc<Summarizer>,
        config: SessionConfig,
    ) -> Self {
        Self {
            deps: Arc::new(RuntimeDeps {
                journal,
                quota,
                router,
                assembler,
                summarizer,
                config,
                workers: DashMap::new(),
            }),
        }
    }

    /// Create a fresh session and spawn its worker.
    ///
    /// When the caller intends to submit an initial utterance, quota is
    /// pre-checked so an exhausted user gets `QuotaExhausted` before any
    /// session row exists; the turn itself still reserves atomically.
    pub async fn start(
        &self,
        principal: &Principal,
        book_id: &str,
        kind: SessionKind,
        character_id: Option<String>,
        has_initial_utterance: bool,
    ) -> Result<Session, InknowingError> {
        let book = self
            .deps
            .journal
            .get_book(book_id)
            .await?
            .ok_or_else(|| InknowingError::NotFound {
                resource: "book",
                id: book_id.to_string(),
            })?;
        if !book.published {
            return Err(InknowingError::Forbidden(format!(
                "book {book_id} is not published"
            )));
        }

        let character_id = match kind {
            SessionKind::Book => None,
            SessionKind::Character => {
                let character_id = character_id.ok_or_else(|| InknowingError::NotFound {
                    resource: "character",
                    id: "<missing>".to_string(),
                })?;
                let persona = self
                    .deps
                    .journal
                    .get_persona(&character_id)
                    .await?
                    .ok_or_else(|| InknowingError::NotFound {
                        resource: "character",
                        id: character_id.clone(),
                    })?;
                if persona.book_id != book_id {
                    return Err(InknowingError::NotFound {
                        resource: "character",
                        id: character_id,
                    });
                }
                Some(character_id)
            }
        };

        if has_initial_utterance {
            let status = self
                .deps
                .quota
                .status(&principal.user_id, principal.tier)
                .await?;
            if status.consumed >= status.granted {
                return Err(InknowingError::QuotaExhausted {
                    reset_at: status.reset_at,
                });
            }
        }

        let now = now_iso();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: principal.user_id.clone(),
            book_id: book_id.to_string(),
            character_id,
            kind,
            status: SessionStatus::Active,
            model_used: None,
            total_tokens: 0,
            total_cost_usd: 0.0,
            created_at: now.clone(),
            last_activity_at: now,
            ended_at: None,
        };
        self.deps.journal.create_session(&session).await?;
        self.ensure_worker(&session);

        info!(
            session_id = session.id.as_str(),
            user_id = principal.user_id.as_str(),
            book_id,
            kind = %kind,
            "session started"
        );
        Ok(session)
    }

    /// Enqueue a user turn on the owning worker and return its event stream.
    pub async fn submit_turn(
        &self,
        principal: &Principal,
        session_id: &str,
        utterance: String,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<TurnEvent>, InknowingError> {
        let session = self.load_owned_active(principal, session_id).await?;

        let inbox = self.resume_session(&session)?;
        let (events_tx, events_rx) = mpsc::channel(TURN_EVENT_CAPACITY);
        let request = TurnRequest {
            utterance,
            tier: principal.tier,
            events: events_tx,
            cancel,
        };
        inbox
            .send(request)
            .await
            .map_err(|_| InknowingError::SessionExpired {
                session_id: session_id.to_string(),
            })?;
        Ok(events_rx)
    }

    /// Mark the session ended and release its worker. Idempotent.
    pub async fn close(
        &self,
        principal: &Principal,
        session_id: &str,
        reason: &str,
    ) -> Result<(), InknowingError> {
        let session = self.load_owned(principal, session_id).await?;
        self.deps
            .journal
            .close_session(&session.id, SessionStatus::Ended, &now_iso())
            .await?;
        // Dropping the handle closes the inbox; the worker drains and exits.
        self.deps.workers.remove(&session.id);
        info!(session_id, reason, "session closed");
        Ok(())
    }

    /// Rehydrate a worker for a previously idle-but-not-ended session.
    pub async fn resume(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<(), InknowingError> {
        let session = self.load_owned_active(principal, session_id).await?;
        self.resume_session(&session)?;
        Ok(())
    }

    fn resume_session(
        &self,
        session: &Session,
    ) -> Result<mpsc::Sender<TurnRequest>, InknowingError> {
        if session.status != SessionStatus::Active {
            return Err(InknowingError::SessionExpired {
                session_id: session.id.clone(),
            });
        }
        Ok(self.ensure_worker(session))
    }

    /// Ownership-checked session read for the gateway.
    pub async fn load_owned(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<Session, InknowingError> {
        let session = self
            .deps
            .journal
            .get_session(session_id)
            .await?
            .ok_or_else(|| InknowingError::NotFound {
                resource: "session",
                id: session_id.to_string(),
            })?;
        if session.user_id != principal.user_id {
            return Err(InknowingError::Forbidden(
                "session belongs to another user".to_string(),
            ));
        }
        Ok(session)
    }

    /// Like [`load_owned`], but also enforces liveness: an ended session is
    /// gone, and a session past the idle window is expired on the spot.
    async fn load_owned_active(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<Session, InknowingError> {
        let session = self.load_owned(principal, session_id).await?;
        match session.status {
            SessionStatus::Active => {}
            SessionStatus::Expired => {
                return Err(InknowingError::SessionExpired {
                    session_id: session_id.to_string(),
                });
            }
            SessionStatus::Ended => {
                return Err(InknowingError::NotFound {
                    resource: "session",
                    id: session_id.to_string(),
                });
            }
        }

        // A stale-active session (e.g. after a restart, before any worker
        // timer fired) expires on first touch past the idle window.
        if let Ok(last) = chrono::DateTime::parse_from_rfc3339(&session.last_activity_at) {
            let idle = chrono::Duration::seconds(self.deps.config.idle_seconds as i64);
            if chrono::Utc::now().signed_duration_since(last) > idle {
                self.deps
                    .journal
                    .close_session(&session.id, SessionStatus::Expired, &now_iso())
                    .await?;
                self.deps.workers.remove(&session.id);
                return Err(InknowingError::SessionExpired {
                    session_id: session_id.to_string(),
                });
            }
        }
        Ok(session)
    }

    /// Context snapshot for the context endpoint.
    pub async fn context_of(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<ContextView, InknowingError> {
        let session = self.load_owned(principal, session_id).await?;

        let summary = self
            .deps
            .journal
            .get_summary(session_id)
            .await?
            .map(|row| row.summary);
        let recent = self.deps.journal.get_messages(session_id, None, 200).await?;
        let topics = discussed_topics(&recent, 8);

        // Current chapter: the strongest citation of the latest assistant
        // message that has any.
        let mut current_chapter = None;
        for message in recent.iter().rev() {
            let references = self.deps.journal.get_references(&message.id).await?;
            if let Some(top) = references.first() {
                current_chapter = top.chapter_index;
                break;
            }
        }

        let current_character = match session.character_id {
            Some(ref character_id) => self
                .deps
                .journal
                .get_persona(character_id)
                .await?
                .map(|p| p.name),
            None => None,
        };

        Ok(ContextView {
            summary,
            discussed_topics: topics,
            current_chapter,
            current_character,
        })
    }

    /// The journal handle (read endpoints on the gateway go through this).
    pub fn journal(&self) -> &Journal {
        &self.deps.journal
    }

    /// The quota ledger (status endpoint and tests).
    pub fn quota(&self) -> &Arc<QuotaLedger> {
        &self.deps.quota
    }

    /// Number of live workers (observability).
    pub fn active_workers(&self) -> usize {
        self.deps.workers.len()
    }

    fn ensure_worker(&self, session: &Session) -> mpsc::Sender<TurnRequest> {
        // The entry guard makes worker creation atomic: exactly one worker
        // ever owns a session.
        match self.deps.workers.entry(session.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().inbox.clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (inbox_tx, inbox_rx) = mpsc::channel(self.deps.config.inbox_capacity);
                entry.insert(WorkerHandle {
                    inbox: inbox_tx.clone(),
                });
                spawn_worker(self.deps.clone(), session.clone(), inbox_rx);
                debug!(session_id = session.id.as_str(), "worker spawned");
                inbox_tx
            }
        }
    }
}
