// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for layered configuration loading.

use inknowing_config::{load_config_from_path, load_config_from_str};
use serial_test::serial;

#[test]
fn full_deployment_config_parses() {
    let config = load_config_from_str(
        r#"
        [gateway]
        host = "0.0.0.0"
        port = 9000

        [auth]
        signing_key = "deadbeef"

        [storage]
        database_path = "/var/lib/inknowing/inknowing.db"

        [cost]
        daily_ceiling_usd = 25.0

        [[models]]
        id = "sonnet-primary"
        provider = "anthropic"
        model = "claude-sonnet-4-20250514"
        role = "primary"
        input_per_1k = 0.003
        output_per_1k = 0.015
        context_limit = 200000

        [[models]]
        id = "qwen-backup"
        provider = "qwen"
        model = "qwen-max"
        endpoint = "https://dashscope.aliyuncs.com/compatible-mode/v1"
        role = "backup"
        input_per_1k = 0.0024
        output_per_1k = 0.0096

        [[models]]
        id = "embed"
        provider = "openai"
        model = "text-embedding-3-small"
        role = "scenario"
        scenario = "embedding"

        [embedding]
        model_id = "embed"
        "#,
    )
    .unwrap();

    assert_eq!(config.gateway.port, 9000);
    assert_eq!(config.models.len(), 3);
    assert_eq!(config.models[1].provider, "qwen");
    assert_eq!(config.embedding.model_id.as_deref(), Some("embed"));
    assert_eq!(config.cost.daily_ceiling_usd, Some(25.0));
}

#[test]
#[serial]
fn documented_env_vars_override_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inknowing.toml");
    std::fs::write(
        &path,
        r#"
        [retrieval]
        top_k = 4
        "#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("RETRIEVAL_TOP_K", "9");
        std::env::set_var("IDLE_SESSION_SECONDS", "600");
    }

    let config = load_config_from_path(&path).unwrap();

    unsafe {
        std::env::remove_var("RETRIEVAL_TOP_K");
        std::env::remove_var("IDLE_SESSION_SECONDS");
    }

    assert_eq!(config.retrieval.top_k, 9);
    assert_eq!(config.session.idle_seconds, 600);
}

#[test]
#[serial]
fn prefixed_env_vars_map_to_sections() {
    unsafe {
        std::env::set_var("INKNOWING_GATEWAY_PORT", "9999");
        std::env::set_var("INKNOWING_CONTEXT_HISTORY_BUDGET_TOKENS", "3000");
    }

    let config = load_config_from_path(std::path::Path::new("/nonexistent.toml")).unwrap();

    unsafe {
        std::env::remove_var("INKNOWING_GATEWAY_PORT");
        std::env::remove_var("INKNOWING_CONTEXT_HISTORY_BUDGET_TOKENS");
    }

    assert_eq!(config.gateway.port, 9999);
    assert_eq!(config.context.history_budget_tokens, 3000);
}
