// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model selection and metered invocation.
//!
//! `select_for` orders candidates: scenario-bound, then tier-bound, then
//! primary, then backups, skipping descriptors marked down. `invoke`
//! streams token deltas into a bounded channel under the per-descriptor
//! concurrency cap and the provider wall-clock deadline, updates health
//! from the outcome, and records cost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use inknowing_config::model::ProviderConfig;
use inknowing_core::types::{
    ProviderMessage, ProviderRequest, ProviderResponse, StreamEventType, TokenUsage,
};
use inknowing_core::{InknowingError, MembershipTier, ProviderAdapter};
use inknowing_cost::CostMeter;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use crate::descriptor::{ModelDescriptor, PoolRole, Scenario};
use crate::health::{HealthState, HealthTracker};

/// Outcome of one completed (or client-abandoned) streaming invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub descriptor_id: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: i64,
    /// Number of token deltas delivered into the sink.
    pub emitted: u64,
    /// True when the sink was dropped mid-stream (cooperative cancel);
    /// the provider stream was aborted and partial usage may be absent.
    pub consumer_gone: bool,
    pub stop_reason: Option<String>,
}

/// The model router: pool, health, rate limits, and the cost meter.
pub struct ModelRouter {
    descriptors: Vec<Arc<ModelDescriptor>>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    limiters: HashMap<String, Arc<Semaphore>>,
    health: HealthTracker,
    meter: Arc<CostMeter>,
    timeout: Duration,
}

impl ModelRouter {
    /// Build a router over descriptors and their constructed adapters.
    ///
    /// `adapters` is keyed by descriptor id; a descriptor without an
    /// adapter is never selected.
    pub fn new(
        descriptors: Vec<ModelDescriptor>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        meter: Arc<CostMeter>,
        config: &ProviderConfig,
    ) -> Self {
        let limiters = descriptors
            .iter()
            .map(|d| {
                (
                    d.id.clone(),
                    Arc::new(Semaphore::new(d.max_concurrency)),
                )
            })
            .collect();
        Self {
            descriptors: descriptors.into_iter().map(Arc::new).collect(),
            adapters,
            limiters,
            health: HealthTracker::new(),
            meter,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// The health tracker (shared observability surface).
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Descriptor lookup by id.
    pub fn descriptor(&self, id: &str) -> Option<Arc<ModelDescriptor>> {
        self.descriptors.iter().find(|d| d.id == id).cloned()
    }

    /// Candidates for a request, in failover order, with down descriptors
    /// skipped. The first entry is the selection; the rest are alternates.
    pub fn select_for(
        &self,
        scenario: Scenario,
        tier: MembershipTier,
    ) -> Result<Vec<Arc<ModelDescriptor>>, InknowingError> {
        let available = |d: &&Arc<ModelDescriptor>| {
            self.adapters.contains_key(&d.id)
                && self.health.state_of(&d.id) != HealthState::Down
        };

        let mut candidates: Vec<Arc<ModelDescriptor>> = Vec::new();

        // Scenario-bound overrides come first.
        candidates.extend(
            self.descriptors
                .iter()
                .filter(|d| d.role == PoolRole::Scenario && d.scenario == Some(scenario))
                .filter(available)
                .cloned(),
        );

        // Embeddings only ever run on embedding-bound descriptors.
        if scenario != Scenario::Embedding {
            candidates.extend(
                self.descriptors
                    .iter()
                    .filter(|d| d.role == PoolRole::Tier && d.tier == Some(tier))
                    .filter(available)
                    .cloned(),
            );
            candidates.extend(
                self.descriptors
                    .iter()
                    .filter(|d| d.role == PoolRole::Primary)
                    .filter(available)
                    .cloned(),
            );
            candidates.extend(
                self.descriptors
                    .iter()
                    .filter(|d| d.role == PoolRole::Backup)
                    .filter(available)
                    .cloned(),
            );
        }

        candidates.dedup_by(|a, b| a.id == b.id);
        if candidates.is_empty() {
            return Err(InknowingError::ProviderPoolExhausted);
        }
        Ok(candidates)
    }

    /// Stream one call into `sink`, enforcing the per-descriptor
    /// concurrency cap and the provider deadline.
    ///
    /// Health and cost are updated from the outcome. A dropped sink is
    /// cooperative cancellation: the provider stream is dropped (aborting
    /// the HTTP body) and the call still counts as a success for health.
    pub async fn invoke(
        &self,
        descriptor: &ModelDescriptor,
        session_id: &str,
        system_prompt: Option<String>,
        messages: Vec<ProviderMessage>,
        sink: mpsc::Sender<String>,
    ) -> Result<Invocation, InknowingError> {
        let adapter = self.adapters.get(&descriptor.id).ok_or_else(|| {
            InknowingError::Internal(format!("no adapter for descriptor '{}'", descriptor.id))
        })?;
        let limiter = self.limiters.get(&descriptor.id).ok_or_else(|| {
            InknowingError::Internal(format!("no limiter for descriptor '{}'", descriptor.id))
        })?;
        let _permit = limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InknowingError::Internal("rate limiter closed".into()))?;

        let request = ProviderRequest {
            model: descriptor.model.clone(),
            system_prompt,
            messages,
            max_tokens: descriptor.max_tokens,
            temperature: descriptor.temperature,
            top_p: descriptor.top_p,
            stream: true,
        };

        let start = Instant::now();
        let deadline = start + self.timeout;

        let mut stream = match adapter.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.health.mark_failure(&descriptor.id);
                return Err(e);
            }
        };

        let mut usage = TokenUsage::default();
        let mut stop_reason = None;
        let mut emitted: u64 = 0;
        let mut consumer_gone = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.health.mark_failure(&descriptor.id);
                return Err(self.timeout_error(emitted));
            }

            let next = match tokio::time::timeout(remaining, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.health.mark_failure(&descriptor.id);
                    return Err(self.timeout_error(emitted));
                }
            };

            match next {
                None => break,
                Some(Ok(chunk)) => {
                    if let Some(u) = chunk.usage {
                        usage.input_tokens = usage.input_tokens.max(u.input_tokens);
                        usage.output_tokens = usage.output_tokens.max(u.output_tokens);
                    }
                    if let Some(reason) = chunk.stop_reason {
                        stop_reason = Some(reason);
                    }
                    match chunk.event_type {
                        StreamEventType::ContentBlockDelta => {
                            let Some(text) = chunk.text else { continue };
                            if sink.send(text).await.is_err() {
                                // Consumer cancelled; drop the stream to
                                // abort the provider call.
                                consumer_gone = true;
                                break;
                            }
                            emitted += 1;
                        }
                        StreamEventType::MessageStop => break,
                        StreamEventType::Error => {
                            self.health.mark_failure(&descriptor.id);
                            let message =
                                chunk.error.unwrap_or_else(|| "provider stream error".into());
                            return Err(self.stream_error(message, emitted));
                        }
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    self.health.mark_failure(&descriptor.id);
                    return Err(match e {
                        e if emitted == 0 => e,
                        _ => InknowingError::ProviderPartial { emitted },
                    });
                }
            }
        }

        drop(stream);
        let latency_ms = start.elapsed().as_millis() as i64;
        self.health.mark_success(&descriptor.id, latency_ms as u64);

        let cost_usd = self
            .meter
            .record(session_id, &descriptor.id, &usage, &descriptor.pricing)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "cost record failed");
                0.0
            });

        debug!(
            descriptor = descriptor.id.as_str(),
            emitted,
            latency_ms,
            consumer_gone,
            "invocation finished"
        );

        Ok(Invocation {
            descriptor_id: descriptor.id.clone(),
            usage,
            cost_usd,
            latency_ms,
            emitted,
            consumer_gone,
            stop_reason,
        })
    }

    /// One-shot (non-streaming) call, used for summaries.
    pub async fn invoke_complete(
        &self,
        descriptor: &ModelDescriptor,
        session_id: &str,
        system_prompt: Option<String>,
        messages: Vec<ProviderMessage>,
    ) -> Result<(ProviderResponse, f64), InknowingError> {
        let adapter = self.adapters.get(&descriptor.id).ok_or_else(|| {
            InknowingError::Internal(format!("no adapter for descriptor '{}'", descriptor.id))
        })?;
        let limiter = self.limiters.get(&descriptor.id).ok_or_else(|| {
            InknowingError::Internal(format!("no limiter for descriptor '{}'", descriptor.id))
        })?;
        let _permit = limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InknowingError::Internal("rate limiter closed".into()))?;

        let request = ProviderRequest {
            model: descriptor.model.clone(),
            system_prompt,
            messages,
            max_tokens: descriptor.max_tokens,
            temperature: descriptor.temperature,
            top_p: descriptor.top_p,
            stream: false,
        };

        let start = Instant::now();
        let response = match tokio::time::timeout(self.timeout, adapter.complete(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.health.mark_failure(&descriptor.id);
                return Err(e);
            }
            Err(_) => {
                self.health.mark_failure(&descriptor.id);
                return Err(self.timeout_error(0));
            }
        };

        self.health
            .mark_success(&descriptor.id, start.elapsed().as_millis() as u64);
        let cost_usd = self
            .meter
            .record(session_id, &descriptor.id, &response.usage, &descriptor.pricing)
            .await
            .unwrap_or(0.0);

        Ok((response, cost_usd))
    }

    fn timeout_error(&self, emitted: u64) -> InknowingError {
        if emitted > 0 {
            InknowingError::ProviderPartial { emitted }
        } else {
            InknowingError::ProviderTimeout {
                seconds: self.timeout.as_secs(),
            }
        }
    }

    fn stream_error(&self, message: String, emitted: u64) -> InknowingError {
        if emitted > 0 {
            InknowingError::ProviderPartial { emitted }
        } else {
            InknowingError::Provider {
                message,
                source: None,
            }
        }
    }
}
