// SPDX-FileCopyrightText: 2026 InKnowing Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model descriptors: the logical backends the router selects between.
//!
//! Providers are a closed set of named tags. Every descriptor carries its
//! pricing row, decoding parameters, pool role, and credential handle; the
//! credential is held in a `SecretString` and only exposed inside adapter
//! construction.

use inknowing_config::model::ModelConfig;
use inknowing_core::{InknowingError, MembershipTier};
use inknowing_cost::PricingRow;
use secrecy::SecretString;
use strum::{Display, EnumString};

/// The closed set of supported provider tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Anthropic,
    Qwen,
    Baidu,
    Zhipu,
}

impl ProviderKind {
    /// Environment variable consulted when no key is configured.
    pub fn credential_env_var(self) -> &'static str {
        match self {
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Qwen => "DASHSCOPE_API_KEY",
            ProviderKind::Baidu => "BAIDU_API_KEY",
            ProviderKind::Zhipu => "ZHIPU_API_KEY",
        }
    }
}

/// A descriptor's role within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PoolRole {
    Primary,
    Backup,
    Scenario,
    Tier,
}

/// What kind of work a routing request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Scenario {
    Dialogue,
    Summary,
    Embedding,
}

/// One logical model backend.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: ProviderKind,
    /// Remote model name sent on the wire.
    pub model: String,
    pub endpoint: Option<String>,
    /// Configured credential; None falls back to the provider env var.
    pub credential: Option<SecretString>,
    pub role: PoolRole,
    /// Scenario this descriptor is bound to, when role = Scenario.
    pub scenario: Option<Scenario>,
    /// Membership tier this descriptor is bound to, when role = Tier.
    pub tier: Option<MembershipTier>,
    pub pricing: PricingRow,
    pub context_limit: usize,
    pub max_concurrency: usize,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl ModelDescriptor {
    /// Build a descriptor from its config entry, validating tag strings.
    pub fn from_config(config: &ModelConfig) -> Result<Self, InknowingError> {
        let provider: ProviderKind = config.provider.parse().map_err(|_| {
            InknowingError::Config(format!(
                "model '{}': unknown provider tag '{}'",
                config.id, config.provider
            ))
        })?;
        let role: PoolRole = config.role.parse().map_err(|_| {
            InknowingError::Config(format!(
                "model '{}': unknown role '{}'",
                config.id, config.role
            ))
        })?;
        let scenario = config
            .scenario
            .as_deref()
            .map(|s| {
                s.parse::<Scenario>().map_err(|_| {
                    InknowingError::Config(format!(
                        "model '{}': unknown scenario '{s}'",
                        config.id
                    ))
                })
            })
            .transpose()?;
        let tier = config
            .tier
            .as_deref()
            .map(|t| {
                t.parse::<MembershipTier>().map_err(|_| {
                    InknowingError::Config(format!(
                        "model '{}': unknown tier '{t}'",
                        config.id
                    ))
                })
            })
            .transpose()?;

        if role == PoolRole::Scenario && scenario.is_none() {
            return Err(InknowingError::Config(format!(
                "model '{}': role 'scenario' requires a scenario",
                config.id
            )));
        }
        if role == PoolRole::Tier && tier.is_none() {
            return Err(InknowingError::Config(format!(
                "model '{}': role 'tier' requires a tier",
                config.id
            )));
        }

        Ok(Self {
            id: config.id.clone(),
            provider,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            credential: config.api_key.clone().map(SecretString::from),
            role,
            scenario,
            tier,
            pricing: PricingRow {
                input_per_1k: config.input_per_1k,
                output_per_1k: config.output_per_1k,
            },
            context_limit: config.context_limit,
            max_concurrency: config.max_concurrency.max(1),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }

    /// Resolve the credential: configured key first, provider env var second.
    pub fn resolve_credential(&self) -> Result<SecretString, InknowingError> {
        if let Some(ref key) = self.credential {
            return Ok(key.clone());
        }
        std::env::var(self.provider.credential_env_var())
            .map(SecretString::from)
            .map_err(|_| {
                InknowingError::Config(format!(
                    "model '{}': no API key configured and {} is unset",
                    self.id,
                    self.provider.credential_env_var()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ModelConfig {
        ModelConfig {
            id: "m1".into(),
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            endpoint: None,
            api_key: Some("sk-test".into()),
            role: "primary".into(),
            scenario: None,
            tier: None,
            input_per_1k: 0.003,
            output_per_1k: 0.015,
            context_limit: 200_000,
            max_concurrency: 4,
            max_tokens: 2048,
            temperature: None,
            top_p: None,
        }
    }

    #[test]
    fn from_config_parses_tags() {
        let d = ModelDescriptor::from_config(&base_config()).unwrap();
        assert_eq!(d.provider, ProviderKind::Anthropic);
        assert_eq!(d.role, PoolRole::Primary);
        assert_eq!(d.context_limit, 200_000);
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let mut config = base_config();
        config.provider = "mystery".into();
        let err = ModelDescriptor::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown provider tag"));
    }

    #[test]
    fn scenario_role_requires_scenario() {
        let mut config = base_config();
        config.role = "scenario".into();
        assert!(ModelDescriptor::from_config(&config).is_err());

        config.scenario = Some("summary".into());
        let d = ModelDescriptor::from_config(&config).unwrap();
        assert_eq!(d.scenario, Some(Scenario::Summary));
    }

    #[test]
    fn tier_role_requires_tier() {
        let mut config = base_config();
        config.role = "tier".into();
        assert!(ModelDescriptor::from_config(&config).is_err());

        config.tier = Some("premium".into());
        let d = ModelDescriptor::from_config(&config).unwrap();
        assert_eq!(d.tier, Some(MembershipTier::Premium));
    }

    #[test]
    fn debug_does_not_leak_credential() {
        let d = ModelDescriptor::from_config(&base_config()).unwrap();
        let debug = format!("{d:?}");
        assert!(!debug.contains("sk-test"));
    }
}
