// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-descriptor health tracking: latency EWMA, rolling success rate,
//! consecutive-failure transitions.
//!
//! State machine: 3 consecutive failures => degraded, 5 => down. A success
//! resets the consecutive count and restores healthy once the rolling
//! success rate over the last minute is at least 95%. A down descriptor
//! whose sample window has fully aged out is reported as degraded again so
//! a probe call can reach it.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// EWMA smoothing factor for latency.
const EWMA_ALPHA: f64 = 0.3;

/// Rolling window for the success rate.
const WINDOW: Duration = Duration::from_secs(60);

/// Success rate needed to restore a degraded descriptor to healthy.
const RECOVERY_RATE: f64 = 0.95;

/// Health status of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Down,
}

#[derive(Debug)]
struct ModelHealth {
    state: HealthState,
    consecutive_failures: u32,
    latency_ewma_ms: f64,
    last_check: Instant,
    window: VecDeque<(Instant, bool)>,
}

impl ModelHealth {
    fn new() -> Self {
        Self {
            state: HealthState::Healthy,
            consecutive_failures: 0,
            latency_ewma_ms: 0.0,
            last_check: Instant::now(),
            window: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(t, _)) = self.window.front() {
            if now.duration_since(t) > WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn success_rate(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let ok = self.window.iter().filter(|(_, success)| *success).count();
        Some(ok as f64 / self.window.len() as f64)
    }
}

/// Process-wide, read-mostly health table keyed by descriptor id.
pub struct HealthTracker {
    inner: RwLock<HashMap<String, ModelHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Current state of a descriptor. Unknown descriptors are healthy.
    pub fn state_of(&self, id: &str) -> HealthState {
        let table = self.inner.read().expect("health table poisoned");
        match table.get(id) {
            Some(health) => {
                // A down descriptor with a fully aged-out window gets one
                // probe's worth of traffic again.
                if health.state == HealthState::Down
                    && health.last_check.elapsed() > WINDOW
                {
                    HealthState::Degraded
                } else {
                    health.state
                }
            }
            None => HealthState::Healthy,
        }
    }

    /// Rolling-average latency of a descriptor, if it has been called.
    pub fn latency_ewma_ms(&self, id: &str) -> Option<f64> {
        let table = self.inner.read().expect("health table poisoned");
        table.get(id).map(|h| h.latency_ewma_ms)
    }

    /// Record a successful call with its wall-clock latency.
    pub fn mark_success(&self, id: &str, latency_ms: u64) {
        let mut table = self.inner.write().expect("health table poisoned");
        let health = table.entry(id.to_string()).or_insert_with(ModelHealth::new);
        let now = Instant::now();

        health.consecutive_failures = 0;
        health.last_check = now;
        health.window.push_back((now, true));
        health.prune(now);
        health.latency_ewma_ms = if health.latency_ewma_ms == 0.0 {
            latency_ms as f64
        } else {
            EWMA_ALPHA * latency_ms as f64 + (1.0 - EWMA_ALPHA) * health.latency_ewma_ms
        };

        if health.state != HealthState::Healthy
            && health.success_rate().unwrap_or(0.0) >= RECOVERY_RATE
        {
            info!(descriptor = id, "model restored to healthy");
            health.state = HealthState::Healthy;
        }
        metrics::histogram!("router_call_latency_ms", "descriptor" => id.to_string())
            .record(latency_ms as f64);
    }

    /// Record a failed call.
    pub fn mark_failure(&self, id: &str) {
        let mut table = self.inner.write().expect("health table poisoned");
        let health = table.entry(id.to_string()).or_insert_with(ModelHealth::new);
        let now = Instant::now();

        health.consecutive_failures += 1;
        health.last_check = now;
        health.window.push_back((now, false));
        health.prune(now);

        let next = if health.consecutive_failures >= 5 {
            HealthState::Down
        } else if health.consecutive_failures >= 3 {
            HealthState::Degraded
        } else {
            health.state
        };
        if next != health.state {
            warn!(
                descriptor = id,
                consecutive = health.consecutive_failures,
                state = ?next,
                "model health transition"
            );
            health.state = next;
        }
        metrics::counter!("router_call_failures_total", "descriptor" => id.to_string())
            .increment(1);
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
