// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./inknowing.toml` > `~/.config/inknowing/inknowing.toml`
//! > `/etc/inknowing/inknowing.toml` with environment variable overrides via
//! the `INKNOWING_` prefix plus the documented bare runtime variables
//! (`HISTORY_BUDGET_TOKENS`, `RETRIEVAL_TOP_K`, ...).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RuntimeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/inknowing/inknowing.toml` (system-wide)
/// 3. `~/.config/inknowing/inknowing.toml` (user XDG config)
/// 4. `./inknowing.toml` (local directory)
/// 5. `INKNOWING_*` environment variables
/// 6. Documented bare runtime variables (`HISTORY_BUDGET_TOKENS`, ...)
pub fn load_config() -> Result<RuntimeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RuntimeConfig::default()))
        .merge(Toml::file("/etc/inknowing/inknowing.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("inknowing/inknowing.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("inknowing.toml"))
        .merge(env_provider())
        .merge(runtime_env_provider())
        .extract()
}

/// Load configuration from a TOML string only (testing and tooling).
pub fn load_config_from_str(toml_content: &str) -> Result<RuntimeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RuntimeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RuntimeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RuntimeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(runtime_env_provider())
        .extract()
}

/// Create the `INKNOWING_`-prefixed environment provider.
///
/// Uses explicit `map()` rather than `Env::split("_")` so underscore-bearing
/// key names stay unambiguous: `INKNOWING_CONTEXT_HISTORY_BUDGET_TOKENS`
/// must map to `context.history_budget_tokens`, not `context.history.budget.tokens`.
fn env_provider() -> Env {
    Env::prefixed("INKNOWING_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("gateway_", "gateway.", 1)
            .replacen("auth_", "auth.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("session_", "session.", 1)
            .replacen("context_", "context.", 1)
            .replacen("retrieval_", "retrieval.", 1)
            .replacen("quota_", "quota.", 1)
            .replacen("cost_", "cost.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("embedding_", "embedding.", 1);
        mapped.into()
    })
}

/// The documented bare environment variables, mapped to their config keys.
fn runtime_env_provider() -> Env {
    Env::raw()
        .only(&[
            "HISTORY_BUDGET_TOKENS",
            "RETRIEVAL_TOP_K",
            "RETRIEVAL_FLOOR",
            "CONTEXT_RESERVE_TOKENS",
            "IDLE_SESSION_SECONDS",
            "PROVIDER_TIMEOUT_SECONDS",
            "BACKPRESSURE_TIMEOUT_SECONDS",
            "QUOTA_RESERVATION_SECONDS",
            "DAILY_COST_CEILING",
        ])
        .map(|key| {
            let mapped = match key.as_str() {
                "history_budget_tokens" => "context.history_budget_tokens",
                "retrieval_top_k" => "retrieval.top_k",
                "retrieval_floor" => "retrieval.floor",
                "context_reserve_tokens" => "context.context_reserve_tokens",
                "idle_session_seconds" => "session.idle_seconds",
                "provider_timeout_seconds" => "provider.timeout_seconds",
                "backpressure_timeout_seconds" => "gateway.backpressure_timeout_seconds",
                "quota_reservation_seconds" => "quota.reservation_seconds",
                "daily_cost_ceiling" => "cost.daily_ceiling_usd",
                other => return other.to_string().into(),
            };
            mapped.into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_from_empty_string() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.retrieval.top_k, 6);
        assert!(config.models.is_empty());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [context]
            history_budget_tokens = 4000

            [[models]]
            id = "primary"
            provider = "anthropic"
            model = "claude-sonnet-4-20250514"
            role = "primary"
            input_per_1k = 0.003
            output_per_1k = 0.015
            "#,
        )
        .unwrap();
        assert_eq!(config.context.history_budget_tokens, 4000);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].role, "primary");
    }
}
