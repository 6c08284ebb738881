// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the dialogue runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Defaults match the documented runtime defaults.

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values; `models` is the one section a deployment must provide.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Gateway bind address and transport tunables.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bearer credential verification settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Context assembly settings.
    #[serde(default)]
    pub context: ContextConfig,

    /// Retrieval index settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Quota ledger settings.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Cost metering settings.
    #[serde(default)]
    pub cost: CostConfig,

    /// Provider invocation settings shared across descriptors.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model descriptor pool.
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    /// Which descriptor id serves query embeddings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Gateway bind address and per-connection transport tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Ceiling on an undrained client send queue before disconnect.
    #[serde(default = "default_backpressure_timeout")]
    pub backpressure_timeout_seconds: u64,

    /// Interval between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,

    /// Deadline for a pong before the connection is closed.
    #[serde(default = "default_pong_deadline")]
    pub pong_deadline_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backpressure_timeout_seconds: default_backpressure_timeout(),
            ping_interval_seconds: default_ping_interval(),
            pong_deadline_seconds: default_pong_deadline(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8240
}

fn default_backpressure_timeout() -> u64 {
    30
}

fn default_ping_interval() -> u64 {
    20
}

fn default_pong_deadline() -> u64 {
    60
}

/// Bearer credential verification settings.
///
/// With no signing key configured the gateway rejects every request
/// (fail-closed).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Hex-encoded HMAC-SHA256 signing key for bearer tokens.
    #[serde(default)]
    pub signing_key: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("inknowing").join("inknowing.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "inknowing.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds without a turn before a session expires.
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,

    /// Capacity of each worker's turn inbox.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_seconds: default_idle_seconds(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

fn default_idle_seconds() -> u64 {
    1800
}

fn default_inbox_capacity() -> usize {
    8
}

/// Context assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    /// Token budget for trailing history in the prompt.
    #[serde(default = "default_history_budget")]
    pub history_budget_tokens: usize,

    /// Tokens reserved for the reply below the model's context limit.
    #[serde(default = "default_context_reserve")]
    pub context_reserve_tokens: usize,

    /// Messages trimmed past the watermark before a summary refresh fires.
    #[serde(default = "default_summary_trim_threshold")]
    pub summary_trim_threshold: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_budget_tokens: default_history_budget(),
            context_reserve_tokens: default_context_reserve(),
            summary_trim_threshold: default_summary_trim_threshold(),
        }
    }
}

fn default_history_budget() -> usize {
    2000
}

fn default_context_reserve() -> usize {
    512
}

fn default_summary_trim_threshold() -> usize {
    20
}

/// Retrieval index configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Number of vector neighbors requested per turn.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Similarity floor below which neighbors are dropped.
    #[serde(default = "default_floor")]
    pub floor: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            floor: default_floor(),
        }
    }
}

fn default_top_k() -> usize {
    6
}

fn default_floor() -> f64 {
    0.35
}

/// Quota ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Seconds a reservation may stay outstanding before reclaim.
    #[serde(default = "default_reservation_seconds")]
    pub reservation_seconds: u64,

    /// Interval of the reservation reclaim sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reservation_seconds: default_reservation_seconds(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_reservation_seconds() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    30
}

/// Cost metering configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CostConfig {
    /// Daily cost ceiling in USD; crossing it fires an alert (None = no ceiling).
    #[serde(default)]
    pub daily_ceiling_usd: Option<f64>,
}

/// Provider invocation settings shared across descriptors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wall-clock deadline for one provider call.
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_provider_timeout(),
        }
    }
}

fn default_provider_timeout() -> u64 {
    60
}

/// One model descriptor in the pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Stable descriptor id referenced by routing and cost rows.
    pub id: String,

    /// Provider tag: one of "openai", "anthropic", "qwen", "baidu", "zhipu".
    pub provider: String,

    /// Remote model name sent on the wire.
    pub model: String,

    /// Endpoint override; None uses the provider's public endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key; None falls back to the provider's environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Pool role: "primary", "backup", "scenario", or "tier".
    #[serde(default = "default_role")]
    pub role: String,

    /// Scenario name when role = "scenario" (e.g. "summary", "embedding").
    #[serde(default)]
    pub scenario: Option<String>,

    /// Membership tier when role = "tier".
    #[serde(default)]
    pub tier: Option<String>,

    /// Price per 1k input tokens, USD.
    #[serde(default)]
    pub input_per_1k: f64,

    /// Price per 1k output tokens, USD.
    #[serde(default)]
    pub output_per_1k: f64,

    /// Model context window in tokens.
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// Cap on concurrent outbound calls to this descriptor.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    #[serde(default)]
    pub top_p: Option<f32>,
}

fn default_role() -> String {
    "backup".to_string()
}

fn default_context_limit() -> usize {
    128_000
}

fn default_max_concurrency() -> usize {
    8
}

fn default_max_tokens() -> u32 {
    2048
}

/// Which descriptor serves query embeddings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Descriptor id of the embedding model (must appear in `models`).
    #[serde(default)]
    pub model_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.context.history_budget_tokens, 2000);
        assert_eq!(config.context.context_reserve_tokens, 512);
        assert_eq!(config.retrieval.top_k, 6);
        assert!((config.retrieval.floor - 0.35).abs() < f64::EPSILON);
        assert_eq!(config.session.idle_seconds, 1800);
        assert_eq!(config.provider.timeout_seconds, 60);
        assert_eq!(config.gateway.backpressure_timeout_seconds, 30);
        assert_eq!(config.quota.reservation_seconds, 120);
        assert!(config.cost.daily_ceiling_usd.is_none());
    }

    #[test]
    fn model_config_minimal_toml() {
        let toml = r#"
            id = "sonnet-primary"
            provider = "anthropic"
            model = "claude-sonnet-4-20250514"
        "#;
        let m: ModelConfig = toml::from_str(toml).unwrap();
        assert_eq!(m.role, "backup");
        assert_eq!(m.context_limit, 128_000);
        assert_eq!(m.max_tokens, 2048);
        assert!(m.endpoint.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let toml = r#"
            [gateway]
            host = "0.0.0.0"
            bogus_key = 1
        "#;
        let result: Result<RuntimeConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
