// Copyright 2025 Cowboy AI, LLC.

//! Configuration for orchestrators and the in-memory broker
//!
//! Values come from an optional file layered under `CIM_SAGA__*` environment
//! variables, e.g. `CIM_SAGA__ORCHESTRATOR__CALL_TIMEOUT_SECS=30`.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CIM_SAGA";

/// How recorded service errors affect a model's successful output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any recorded error turns a success into an errored output
    #[default]
    AnyFailureFatal,
    /// The model's output stands even when errors were recorded
    Tolerate,
}

/// What happens to an instance's state once it is terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the terminal state; redelivered events are no-ops
    #[default]
    Archive,
    /// Delete the state; redelivered events are orphan responses
    Remove,
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Accept contracts that declare versions without a registered model
    pub allow_missing_versions: bool,
    /// Deadline for every dispatched call (none = wait forever)
    pub call_timeout_secs: Option<u64>,
    /// Terminal state retention
    pub retention: RetentionPolicy,
    /// Effect of recorded service errors on success outputs
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            allow_missing_versions: false,
            call_timeout_secs: None,
            retention: RetentionPolicy::Archive,
            failure_policy: FailurePolicy::AnyFailureFatal,
        }
    }
}

impl OrchestratorConfig {
    /// Call timeout as a duration
    pub fn call_timeout(&self) -> Option<chrono::Duration> {
        self.call_timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
    }
}

/// In-memory broker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Maximum number of events one `resolve` call may route
    pub max_events: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { max_events: 10_000 }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Orchestrator settings
    pub orchestrator: OrchestratorConfig,
    /// Broker settings
    pub broker: BrokerConfig,
}

impl SagaConfig {
    /// Load from an optional file, then `CIM_SAGA__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SagaConfig::default();
        assert!(!config.orchestrator.allow_missing_versions);
        assert_eq!(config.orchestrator.call_timeout_secs, None);
        assert_eq!(config.orchestrator.retention, RetentionPolicy::Archive);
        assert_eq!(
            config.orchestrator.failure_policy,
            FailurePolicy::AnyFailureFatal
        );
        assert_eq!(config.broker.max_events, 10_000);
    }

    #[test]
    fn test_from_json_overrides_defaults() {
        let config = SagaConfig::from_json(
            r#"{
                "orchestrator": {
                    "allow_missing_versions": true,
                    "call_timeout_secs": 30,
                    "retention": "remove"
                }
            }"#,
        )
        .unwrap();

        assert!(config.orchestrator.allow_missing_versions);
        assert_eq!(
            config.orchestrator.call_timeout(),
            Some(chrono::Duration::seconds(30))
        );
        assert_eq!(config.orchestrator.retention, RetentionPolicy::Remove);
        assert_eq!(
            config.orchestrator.failure_policy,
            FailurePolicy::AnyFailureFatal
        );
        assert_eq!(config.broker, BrokerConfig::default());
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let err = SagaConfig::from_json(r#"{"orchestrator": {"retention": "forever"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
