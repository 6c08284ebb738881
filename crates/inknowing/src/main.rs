// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! InKnowing dialogue runtime service binary.
//!
//! Wires configuration, the journal, the model pool, quota, retrieval,
//! context assembly, the session manager, and the gateway, then serves
//! until SIGINT.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use inknowing_config::model::RuntimeConfig;
use inknowing_context::{ContextAssembler, Summarizer};
use inknowing_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use inknowing_core::{
    EmbeddingAdapter, InknowingError, MembershipTier, PluginAdapter, ProviderAdapter,
};
use inknowing_cost::{CostLedger, CostMeter};
use inknowing_gateway::{AuthConfig, GatewayState, HealthState};
use inknowing_quota::QuotaLedger;
use inknowing_retrieval::SqliteRetrievalIndex;
use inknowing_router::{ModelDescriptor, ModelRouter, ProviderKind};
use inknowing_session::SessionManager;
use inknowing_storage::{Database, Journal};

#[derive(Parser)]
#[command(name = "inknowing", about = "InKnowing dialogue runtime", version)]
struct Cli {
    /// Path to an explicit config file (otherwise the XDG hierarchy).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dialogue runtime (default).
    Serve,
    /// Mint a signed bearer token for a user (operator tooling).
    Token {
        user_id: String,
        /// Membership tier claim: free, basic, premium, super.
        #[arg(long, default_value = "free")]
        tier: MembershipTier,
        /// Token lifetime in seconds.
        #[arg(long, default_value_t = 86_400)]
        ttl: i64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match cli.config {
        Some(ref path) => inknowing_config::load_config_from_path(path)?,
        None => inknowing_config::load_config()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(serve(config))?,
        Command::Token { user_id, tier, ttl } => {
            let auth = AuthConfig::from_hex_key(config.auth.signing_key.as_deref());
            let expiry = chrono::Utc::now().timestamp() + ttl;
            match auth.issue(&user_id, tier, expiry) {
                Some(token) => println!("{token}"),
                None => {
                    eprintln!("no auth.signing_key configured");
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

async fn serve(config: RuntimeConfig) -> Result<(), InknowingError> {
    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| InknowingError::Config(format!("failed to install metrics recorder: {e}")))?;

    let db = Database::open_with_options(&config.storage.database_path, config.storage.wal_mode)
        .await?;
    let journal = Journal::new(db.clone());

    // Model pool: descriptors plus one wire adapter per descriptor.
    let mut descriptors = Vec::new();
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    for model_config in &config.models {
        let descriptor = ModelDescriptor::from_config(model_config)?;
        let adapter = build_adapter(&descriptor)?;
        adapters.insert(descriptor.id.clone(), adapter);
        descriptors.push(descriptor);
    }
    if descriptors.is_empty() {
        return Err(InknowingError::Config(
            "no models configured; add at least one [[models]] entry".into(),
        ));
    }

    let cost_ledger = CostLedger::new(db.clone());
    let meter = Arc::new(CostMeter::from_ledger(cost_ledger, &config.cost).await?);
    let router = Arc::new(ModelRouter::new(
        descriptors.clone(),
        adapters,
        meter,
        &config.provider,
    ));

    let embedder = build_embedder(&config, &descriptors)?;
    let retrieval = Arc::new(SqliteRetrievalIndex::new(journal.clone(), embedder));
    let assembler = Arc::new(ContextAssembler::new(
        retrieval,
        config.context.clone(),
        config.retrieval.clone(),
    ));
    let summarizer = Arc::new(Summarizer::new(
        router.clone(),
        journal.clone(),
        &config.context,
    ));

    let quota = Arc::new(QuotaLedger::new(journal.clone(), &config.quota));
    let shutdown = CancellationToken::new();
    let sweeper = quota.clone().spawn_sweeper(
        std::time::Duration::from_secs(config.quota.sweep_interval_seconds),
        shutdown.clone(),
    );

    let manager = Arc::new(SessionManager::new(
        journal,
        quota,
        router,
        assembler,
        summarizer,
        config.session.clone(),
    ));

    if config.auth.signing_key.is_none() {
        warn!("no auth.signing_key configured; every request will be rejected");
    }
    let state = GatewayState {
        manager,
        auth: AuthConfig::from_hex_key(config.auth.signing_key.as_deref()),
        config: config.gateway.clone(),
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render: Some(Arc::new(move || prometheus.render())),
        },
    };

    // SIGINT drives graceful shutdown.
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    inknowing_gateway::start_server(state, shutdown).await?;
    sweeper.abort();
    info!("runtime stopped");
    Ok(())
}

/// Construct the wire adapter for one descriptor.
fn build_adapter(descriptor: &ModelDescriptor) -> Result<Arc<dyn ProviderAdapter>, InknowingError> {
    let credential = descriptor.resolve_credential()?;
    let endpoint = descriptor.endpoint.as_deref();
    let adapter: Arc<dyn ProviderAdapter> = match descriptor.provider {
        ProviderKind::Anthropic => Arc::new(inknowing_anthropic::AnthropicProvider::new(
            credential.expose_secret(),
            endpoint,
        )?),
        ProviderKind::Openai | ProviderKind::Qwen | ProviderKind::Baidu | ProviderKind::Zhipu => {
            Arc::new(inknowing_openai::OpenAiProvider::new(
                &descriptor.provider.to_string(),
                credential.expose_secret(),
                endpoint,
            )?)
        }
    };
    Ok(adapter)
}

/// Construct the query embedder from the configured embedding descriptor.
fn build_embedder(
    config: &RuntimeConfig,
    descriptors: &[ModelDescriptor],
) -> Result<Arc<dyn EmbeddingAdapter>, InknowingError> {
    let Some(ref model_id) = config.embedding.model_id else {
        warn!("no embedding.model_id configured; retrieval will return no excerpts");
        return Ok(Arc::new(DisabledEmbedder));
    };
    let descriptor = descriptors
        .iter()
        .find(|d| &d.id == model_id)
        .ok_or_else(|| {
            InknowingError::Config(format!(
                "embedding.model_id '{model_id}' does not match any [[models]] entry"
            ))
        })?;
    if descriptor.provider == ProviderKind::Anthropic {
        return Err(InknowingError::Config(
            "the anthropic provider has no embeddings endpoint".into(),
        ));
    }
    let credential = descriptor.resolve_credential()?;
    let adapter = inknowing_openai::OpenAiProvider::new(
        &descriptor.provider.to_string(),
        credential.expose_secret(),
        descriptor.endpoint.as_deref(),
    )?
    .with_embedding_model(&descriptor.model);
    Ok(Arc::new(adapter))
}

/// Placeholder embedder for deployments without an embedding model; the
/// retrieval adapter's soft-failure path turns this into empty results.
struct DisabledEmbedder;

#[async_trait]
impl PluginAdapter for DisabledEmbedder {
    fn name(&self) -> &str {
        "disabled-embedder"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
    async fn health_check(&self) -> Result<HealthStatus, InknowingError> {
        Ok(HealthStatus::Unhealthy("no embedding model configured".into()))
    }
    async fn shutdown(&self) -> Result<(), InknowingError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for DisabledEmbedder {
    async fn embed(&self, _input: EmbeddingInput) -> Result<EmbeddingOutput, InknowingError> {
        Err(InknowingError::Provider {
            message: "no embedding model configured".into(),
            source: None,
        })
    }
}
