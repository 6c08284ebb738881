// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running conversation summaries.
//!
//! Once enough messages have accumulated past the summarized-up-to
//! watermark, the summarizer asks the router for a minimum-tier summary
//! model, folds the previous summary and the newly trimmed turns into a
//! fresh summary, and advances the watermark. Runs off the turn's critical
//! path.

use std::sync::Arc;

use inknowing_config::model::ContextConfig;
use inknowing_core::types::ProviderMessage;
use inknowing_core::{InknowingError, MembershipTier};
use inknowing_router::{ModelRouter, Scenario};
use inknowing_storage::Journal;
use tracing::{debug, warn};

const SUMMARY_SYSTEM_PROMPT: &str = "You maintain a running summary of a dialogue between \
a reader and a book. Merge the previous summary with the new turns into one concise \
summary under 200 words. Keep names, topics, and the reader's interests.";

/// Maintains per-session summary rows behind a message-count watermark.
pub struct Summarizer {
    router: Arc<ModelRouter>,
    journal: Journal,
    threshold: usize,
}

impl Summarizer {
    pub fn new(router: Arc<ModelRouter>, journal: Journal, config: &ContextConfig) -> Self {
        Self {
            router,
            journal,
            threshold: config.summary_trim_threshold,
        }
    }

    /// Refresh the summary if more than the threshold of messages has
    /// accumulated past the watermark. Returns whether a refresh ran.
    ///
    /// The most recent `threshold` messages stay raw; everything older is
    /// folded into the summary.
    pub async fn refresh(
        &self,
        session_id: &str,
        tier: MembershipTier,
    ) -> Result<bool, InknowingError> {
        let count = self.journal.count_messages(session_id).await?;
        let watermark = self
            .journal
            .get_summary(session_id)
            .await?
            .map(|row| row.summarized_up_to)
            .unwrap_or(0);

        let new_watermark = count - self.threshold as i64;
        if new_watermark <= watermark {
            return Ok(false);
        }

        let previous = self
            .journal
            .get_summary(session_id)
            .await?
            .map(|row| row.summary);
        let to_fold = self
            .journal
            .get_messages(
                session_id,
                Some(watermark - 1),
                new_watermark - watermark,
            )
            .await?;
        if to_fold.is_empty() {
            return Ok(false);
        }

        let transcript = to_fold
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let request = match previous {
            Some(previous) => format!(
                "Previous summary:\n{previous}\n\nNew turns:\n{transcript}"
            ),
            None => format!("New turns:\n{transcript}"),
        };

        let candidates = self.router.select_for(Scenario::Summary, tier)?;
        let descriptor = &candidates[0];
        let (response, cost_usd) = self
            .router
            .invoke_complete(
                descriptor,
                session_id,
                Some(SUMMARY_SYSTEM_PROMPT.to_string()),
                vec![ProviderMessage {
                    role: "user".to_string(),
                    content: request,
                }],
            )
            .await?;

        self.journal
            .upsert_summary(session_id, &response.content, new_watermark)
            .await?;
        // Summary calls cost money against the session but produce no
        // message, so only the cost counter moves; the idle clock does not.
        self.journal
            .update_session_metrics(session_id, 0, cost_usd, None, None)
            .await?;
        debug!(
            session_id,
            new_watermark,
            model = descriptor.id.as_str(),
            "session summary refreshed"
        );
        Ok(true)
    }

    /// Fire-and-forget refresh off the turn's critical path.
    pub fn spawn_refresh(self: &Arc<Self>, session_id: String, tier: MembershipTier) {
        let summarizer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = summarizer.refresh(&session_id, tier).await {
                warn!(error = %e, session_id = session_id.as_str(), "summary refresh failed");
            }
        });
    }
}
