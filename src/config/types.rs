//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/planwright/) and project (.planwright/) level configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::ai::executor::RetryPolicy;
use crate::ai::provider::{
    ClientOptions, CredentialRole, CredentialStore, ProviderDescriptor, builtin_descriptors,
};
use crate::ai::{EstimatorKind, OrchestratorSettings, TimeoutConfig};
use crate::constants::{
    executor as exec_constants, health as health_constants, network,
    throttle as throttle_constants,
};
use crate::types::{PlanwrightError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Model and request settings
    pub llm: LlmConfig,

    /// Per-provider overrides keyed by provider id
    pub providers: BTreeMap<String, ProviderOverride>,

    /// Retry and throttle settings
    pub execution: ExecutionConfig,

    /// Health tracker settings
    pub health: HealthConfig,

    /// Usage persistence settings
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            providers: BTreeMap::new(),
            execution: ExecutionConfig::default(),
            health: HealthConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PlanwrightError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PlanwrightError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(PlanwrightError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(0) = self.llm.response_tokens {
            return Err(PlanwrightError::Config(
                "LLM response_tokens must be greater than 0".to_string(),
            ));
        }

        if self.execution.max_attempts == 0 {
            return Err(PlanwrightError::Config(
                "execution.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.execution.max_concurrent_requests == 0 {
            return Err(PlanwrightError::Config(
                "execution.max_concurrent_requests must be at least 1".to_string(),
            ));
        }

        if self.execution.max_delay_secs == 0 || self.execution.max_retry_after_secs == 0 {
            return Err(PlanwrightError::Config(
                "execution delay ceilings must be greater than 0".to_string(),
            ));
        }

        if self.health.max_error_types == 0 {
            return Err(PlanwrightError::Config(
                "health.max_error_types must be at least 1".to_string(),
            ));
        }

        let known: Vec<String> = builtin_descriptors().into_iter().map(|d| d.id).collect();
        if let Some(unknown) = self.providers.keys().find(|id| !known.contains(id)) {
            return Err(PlanwrightError::Config(format!(
                "Unknown provider '{}' in [providers] (known: {})",
                unknown,
                known.join(", ")
            )));
        }

        Ok(())
    }

    /// Built-in descriptors with `enabled` and `priority` overrides applied
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        builtin_descriptors()
            .into_iter()
            .filter(|d| self.providers.get(&d.id).is_none_or(|o| o.enabled))
            .map(|mut d| {
                if let Some(priority) = self.providers.get(&d.id).and_then(|o| o.priority) {
                    d.priority = priority;
                }
                d
            })
            .collect()
    }

    /// Credentials from the environment, overlaid with config-file values
    pub fn credentials(&self, descriptors: &[ProviderDescriptor]) -> CredentialStore {
        let mut store = CredentialStore::from_env(descriptors);
        for descriptor in descriptors {
            let Some(overrides) = self.providers.get(&descriptor.id) else {
                continue;
            };
            if let Some(key) = &overrides.api_key
                && let Some(spec) = descriptor.credential(CredentialRole::ApiKey)
            {
                store.insert(&spec.env_var, key.clone());
            }
            if let Some(base) = &overrides.api_base
                && let Some(spec) = descriptor.credential(CredentialRole::Endpoint)
            {
                store.insert(&spec.env_var, base.clone());
            }
        }
        store
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_secs(self.llm.timeout_secs),
            temperature: self.llm.temperature,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let exec = &self.execution;
        OrchestratorSettings {
            retry: RetryPolicy {
                max_attempts: exec.max_attempts,
                base_delay: Duration::from_millis(exec.base_delay_ms),
                max_delay: Duration::from_secs(exec.max_delay_secs),
                max_retry_after: Duration::from_secs(exec.max_retry_after_secs),
                invalid_response_retries: exec_constants::INVALID_RESPONSE_RETRIES,
            },
            timeouts: TimeoutConfig::with_attempt_secs(self.llm.timeout_secs),
            max_concurrent_requests: exec.max_concurrent_requests,
            request_delay: Duration::from_millis(exec.request_delay_ms),
            response_tokens: self.llm.response_tokens,
            estimator: self.llm.token_estimator,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider tried first when a request names none
    pub provider: Option<String>,

    /// Model override applied to every request
    pub model: Option<String>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Reserved response tokens; proportional to the window when unset
    pub response_tokens: Option<u32>,

    /// Token estimator for planning and usage ("char_ratio" or "word")
    pub token_estimator: EstimatorKind,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            temperature: 0.3,
            response_tokens: None,
            token_estimator: EstimatorKind::default(),
        }
    }
}

// =============================================================================
// Provider Overrides
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverride {
    #[serde(serialize_with = "redact", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL or endpoint, depending on the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl Default for ProviderOverride {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            enabled: true,
            priority: None,
        }
    }
}

impl fmt::Debug for ProviderOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOverride")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .finish()
    }
}

fn redact<S: Serializer>(value: &Option<String>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_str("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

// =============================================================================
// Execution Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub max_retry_after_secs: u64,
    pub max_concurrent_requests: usize,
    pub request_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: exec_constants::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: exec_constants::BASE_DELAY_MS,
            max_delay_secs: exec_constants::MAX_DELAY_SECS,
            max_retry_after_secs: exec_constants::MAX_RETRY_AFTER_SECS,
            max_concurrent_requests: throttle_constants::MAX_CONCURRENT_REQUESTS,
            request_delay_ms: throttle_constants::REQUEST_DELAY_MS,
        }
    }
}

// =============================================================================
// Health Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Distinct error types kept per provider
    pub max_error_types: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_error_types: health_constants::MAX_ERROR_TYPES,
        }
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub persist_usage: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(".planwright/usage.db"),
            persist_usage: true,
        }
    }
}
