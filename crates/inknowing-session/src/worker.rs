// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-session worker: single owner of a session's state.
//!
//! Each worker serializes its session's turns through one inbox and walks
//! every turn through Reserving -> Assembling -> Generating -> Persisting.
//! On thirty minutes without a turn it refreshes the summary row, marks
//! the session expired, and exits. Session identity and history outlive
//! the worker; the manager rehydrates a new one on demand.

use std::sync::Arc;
use std::time::{Duration, Instant};

use inknowing_core::tokens::count_tokens;
use inknowing_core::types::{Message, Persona, Reference, Session, TokenUsage};
use inknowing_core::{InknowingError, MembershipTier, MessageRole, SessionStatus};
use inknowing_router::Scenario;
use inknowing_storage::models::DeadLetter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::manager::RuntimeDeps;
use crate::turn::{TurnEvent, TurnRequest};

/// How many recent messages the worker loads for context assembly.
const RECENT_HISTORY_LIMIT: i64 = 120;

pub(crate) fn now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub(crate) fn spawn_worker(
    deps: Arc<RuntimeDeps>,
    session: Session,
    inbox: mpsc::Receiver<TurnRequest>,
) {
    tokio::spawn(run_worker(deps, session, inbox));
}

async fn run_worker(
    deps: Arc<RuntimeDeps>,
    mut session: Session,
    mut inbox: mpsc::Receiver<TurnRequest>,
) {
    let book_title = deps
        .journal
        .get_book(&session.book_id)
        .await
        .ok()
        .flatten()
        .map(|b| b.title)
        .unwrap_or_default();
    let persona = match session.character_id {
        Some(ref character_id) => deps.journal.get_persona(character_id).await.ok().flatten(),
        None => None,
    };
    let idle = Duration::from_secs(deps.config.idle_seconds);

    debug!(session_id = session.id.as_str(), "session worker started");

    loop {
        match tokio::time::timeout(idle, inbox.recv()).await {
            Ok(Some(turn)) => {
                process_turn(&deps, &mut session, &book_title, persona.as_ref(), turn).await;
            }
            // Manager dropped the inbox: session was closed.
            Ok(None) => break,
            // Idle timeout: summarize, expire, exit.
            Err(_) => {
                if let Err(e) = deps
                    .summarizer
                    .refresh(&session.id, MembershipTier::Free)
                    .await
                {
                    warn!(error = %e, session_id = session.id.as_str(), "expiry summary failed");
                }
                if let Err(e) = deps
                    .journal
                    .close_session(&session.id, SessionStatus::Expired, &now_iso())
                    .await
                {
                    warn!(error = %e, session_id = session.id.as_str(), "failed to expire session");
                }
                info!(session_id = session.id.as_str(), "session expired after idle timeout");
                break;
            }
        }
    }

    deps.workers.remove(&session.id);
    debug!(session_id = session.id.as_str(), "session worker exited");
}

/// Load the trailing history window for assembly.
async fn recent_history(
    deps: &RuntimeDeps,
    session_id: &str,
) -> Result<Vec<Message>, InknowingError> {
    let total = deps.journal.count_messages(session_id).await?;
    let cursor = (total - RECENT_HISTORY_LIMIT - 1).max(-1);
    deps.journal
        .get_messages(session_id, Some(cursor), RECENT_HISTORY_LIMIT)
        .await
}

async fn process_turn(
    deps: &Arc<RuntimeDeps>,
    session: &mut Session,
    book_title: &str,
    persona: Option<&Persona>,
    turn: TurnRequest,
) {
    let TurnRequest {
        utterance,
        tier,
        events,
        cancel,
    } = turn;
    let turn_start = Instant::now();

    // --- Reserving ---
    let reservation = match deps.quota.reserve(&session.user_id, tier).await {
        Ok(handle) => handle,
        Err(e) => {
            // Rejected: nothing recorded, no quota consumed.
            let _ = events.send(TurnEvent::from_error(&e)).await;
            return;
        }
    };
    let _ = events.send(TurnEvent::Typing(true)).await;

    // --- Assembling ---
    let history = match recent_history(deps, &session.id).await {
        Ok(history) => history,
        Err(e) => {
            release_and_report(deps, &reservation, &events, &e).await;
            return;
        }
    };
    let summary_row = deps.journal.get_summary(&session.id).await.ok().flatten();
    let assembled = {
        // The context limit comes from the best currently-selectable
        // descriptor; selection proper happens below.
        let context_limit = deps
            .router
            .select_for(Scenario::Dialogue, tier)
            .ok()
            .and_then(|c| c.first().map(|d| d.context_limit))
            .unwrap_or(8192);
        match deps
            .assembler
            .assemble(
                session,
                book_title,
                persona,
                summary_row.as_ref().map(|row| row.summary.as_str()),
                &history,
                &utterance,
                context_limit,
            )
            .await
        {
            Ok(assembled) => assembled,
            Err(e) => {
                release_and_report(deps, &reservation, &events, &e).await;
                return;
            }
        }
    };

    // References stream before tokens; the assistant message id is
    // assigned up front so citations can point at it.
    let assistant_id = uuid::Uuid::new_v4().to_string();
    let references: Vec<Reference> = assembled
        .retrieved
        .iter()
        .map(|chunk| chunk.to_reference(&assistant_id))
        .collect();
    for reference in &references {
        let _ = events.send(TurnEvent::Reference(reference.clone())).await;
    }

    // --- Generating (at most one alternate on pre-emission failure) ---
    let candidates = match deps.router.select_for(Scenario::Dialogue, tier) {
        Ok(candidates) => candidates,
        Err(e) => {
            release_and_report(deps, &reservation, &events, &e).await;
            return;
        }
    };

    let mut text = String::new();
    let mut outcome: Result<inknowing_router::Invocation, InknowingError> =
        Err(InknowingError::ProviderPoolExhausted);
    let mut used_descriptor = candidates[0].id.clone();
    let mut cancelled = false;
    let mut client_gone = false;

    for (attempt, descriptor) in candidates.iter().take(2).enumerate() {
        text.clear();
        used_descriptor = descriptor.id.clone();

        let (token_tx, mut token_rx) = mpsc::channel::<String>(32);
        let router = deps.router.clone();
        let descriptor_task = descriptor.clone();
        let session_id = session.id.clone();
        let system_prompt = assembled.system_prompt.clone();
        let messages = assembled.messages.clone();
        let task = tokio::spawn(async move {
            router
                .invoke(
                    &descriptor_task,
                    &session_id,
                    Some(system_prompt),
                    messages,
                    token_tx,
                )
                .await
        });

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    // Cooperative cancel: stop forwarding, abort the
                    // provider stream, keep what was generated.
                    cancelled = true;
                    token_rx.close();
                    break;
                }
                token = token_rx.recv() => match token {
                    Some(token) => {
                        text.push_str(&token);
                        if !client_gone
                            && events.send(TurnEvent::Token(token)).await.is_err()
                        {
                            // Disconnection is not cancellation: keep
                            // generating so a reconnect can replay the
                            // final message.
                            client_gone = true;
                        }
                    }
                    None => break,
                }
            }
        }

        outcome = match task.await {
            Ok(result) => result,
            Err(e) => Err(InknowingError::Internal(format!(
                "invocation task failed: {e}"
            ))),
        };

        if cancelled {
            break;
        }
        match &outcome {
            Ok(_) => break,
            Err(e) => {
                let failover_eligible = text.is_empty()
                    && matches!(
                        e,
                        InknowingError::Provider { .. } | InknowingError::ProviderTimeout { .. }
                    );
                if failover_eligible && attempt == 0 && candidates.len() > 1 {
                    warn!(
                        session_id = session.id.as_str(),
                        failed = descriptor.id.as_str(),
                        next = candidates[1].id.as_str(),
                        "provider failed before emission, failing over"
                    );
                    continue;
                }
                break;
            }
        }
    }

    // --- Classify the generation outcome ---
    let now = now_iso();
    let latency_ms = turn_start.elapsed().as_millis() as i64;

    let (persist, usage, cost_usd, partial, error_kind, terminal_error) =
        match (&outcome, cancelled) {
            (Ok(invocation), false) => (
                true,
                invocation.usage,
                invocation.cost_usd,
                false,
                None,
                None,
            ),
            (Ok(invocation), true) => {
                // Cancelled: the adapter was aborted; usage may be absent,
                // so fall back to counting what we kept.
                let usage = merge_usage(invocation.usage, assembled.prompt_tokens, &text);
                (true, usage, invocation.cost_usd, true, None, None)
            }
            (Err(e @ InknowingError::ProviderPartial { .. }), _) => {
                let usage = merge_usage(TokenUsage::default(), assembled.prompt_tokens, &text);
                (
                    true,
                    usage,
                    0.0,
                    true,
                    Some("provider_partial".to_string()),
                    Some(TurnEvent::from_error(e)),
                )
            }
            (Err(e), true) => {
                // Cancel raced a failure; treat as a cancelled partial.
                debug!(error = %e, "cancellation raced provider failure");
                let usage = merge_usage(TokenUsage::default(), assembled.prompt_tokens, &text);
                (true, usage, 0.0, true, None, None)
            }
            (Err(e), false) => {
                release_and_report(deps, &reservation, &events, e).await;
                return;
            }
        };

    debug_assert!(persist);

    // --- Persisting: one atomic unit ---
    let utterance_tokens = count_tokens(&utterance) as i64;
    let user_msg = Message {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        seq: 0,
        role: MessageRole::User,
        content: utterance,
        token_count: utterance_tokens,
        model_used: None,
        latency_ms: None,
        partial: false,
        error_kind: None,
        created_at: now.clone(),
    };
    let assistant_msg = Message {
        id: assistant_id.clone(),
        session_id: session.id.clone(),
        seq: 0,
        role: MessageRole::Assistant,
        content: text.clone(),
        token_count: i64::from(usage.output_tokens),
        model_used: Some(used_descriptor.clone()),
        latency_ms: Some(latency_ms),
        partial,
        error_kind,
        created_at: now.clone(),
    };

    match deps
        .journal
        .append_turn(&user_msg, &assistant_msg, &references, cost_usd)
        .await
    {
        Ok(_) => {
            if let Err(e) = deps.quota.commit(&reservation).await {
                warn!(error = %e, "quota commit failed");
            }
            session.last_activity_at = now;
            session.model_used = Some(used_descriptor);

            metrics::histogram!("turn_latency_ms").record(latency_ms as f64);
            metrics::counter!("turns_completed_total").increment(1);

            match terminal_error {
                Some(event) => {
                    let _ = events.send(event).await;
                }
                None => {
                    let _ = events
                        .send(TurnEvent::Done {
                            message_id: assistant_id,
                            usage,
                            partial,
                        })
                        .await;
                }
            }
            deps.summarizer.spawn_refresh(session.id.clone(), tier);
        }
        Err(e) => {
            // Fatal for the turn: dead-letter the generated text, return
            // the quota unit, surface Persistence.
            warn!(error = %e, session_id = session.id.as_str(), "journal write failed after generation");
            let payload = serde_json::json!({
                "user": user_msg,
                "assistant": assistant_msg,
                "references": references,
            })
            .to_string();
            if let Err(dead_err) = deps
                .journal
                .write_dead_letter(&DeadLetter {
                    id: uuid::Uuid::new_v4().to_string(),
                    session_id: session.id.clone(),
                    payload,
                    reason: e.to_string(),
                    created_at: now,
                })
                .await
            {
                warn!(error = %dead_err, "dead-letter write failed");
            }
            release_and_report(deps, &reservation, &events, &e).await;
        }
    }
}

/// Prefer provider-reported usage; fill gaps by counting locally.
fn merge_usage(reported: TokenUsage, prompt_tokens: usize, text: &str) -> TokenUsage {
    TokenUsage {
        input_tokens: reported.input_tokens.max(prompt_tokens as u32),
        output_tokens: reported.output_tokens.max(count_tokens(text) as u32),
    }
}

async fn release_and_report(
    deps: &Arc<RuntimeDeps>,
    reservation: &inknowing_quota::ReservationHandle,
    events: &mpsc::Sender<TurnEvent>,
    error: &InknowingError,
) {
    if let Err(e) = deps.quota.release(reservation).await {
        warn!(error = %e, "quota release failed");
    }
    let _ = events.send(TurnEvent::from_error(error)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_usage_prefers_reported_values() {
        let reported = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        let merged = merge_usage(reported, 10, "short");
        assert_eq!(merged.input_tokens, 100);
        assert_eq!(merged.output_tokens, 50);
    }

    #[test]
    fn merge_usage_fills_missing_from_counts() {
        let merged = merge_usage(TokenUsage::default(), 42, "some cancelled partial text");
        assert_eq!(merged.input_tokens, 42);
        assert!(merged.output_tokens > 0);
    }

    #[test]
    fn now_iso_is_utc_with_millis() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(ts.contains('.'));
    }
}
