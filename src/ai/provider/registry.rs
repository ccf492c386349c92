//! Provider Registry
//!
//! Owns one client per configured backend. Clients are created lazily on
//! first use and exactly once: concurrent callers for the same uncreated
//! client await a shared `tokio::sync::OnceCell`, so only the first caller
//! runs the factory. Failed initializations are cached too and stay cached
//! until [`ProviderRegistry::evict`].
//!
//! Selection walks descriptors in priority order, puts an explicitly
//! preferred provider first and skips providers the health tracker
//! classifies as poor, unless every candidate is poor.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::descriptor::{CredentialRole, CredentialStore, ProviderDescriptor};
use super::{
    AzureOpenAiProvider, ClientOptions, GoogleProvider, OllamaProvider, OpenAiProvider,
    SharedProvider,
};
use crate::ai::health::{HealthClassification, HealthTracker};
use crate::constants::usage::DEFAULT_CONTEXT_WINDOW;
use crate::types::{ErrorKind, LlmError, PlanwrightError, Result};

// =============================================================================
// Factory
// =============================================================================

/// Builds a client for a descriptor from resolved credentials
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(
        &self,
        descriptor: &ProviderDescriptor,
        credentials: &CredentialStore,
    ) -> Result<SharedProvider>;
}

/// Factory for the built-in HTTP adapters
#[derive(Debug, Clone, Default)]
pub struct HttpProviderFactory {
    options: ClientOptions,
}

impl HttpProviderFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

fn required_secret(
    credentials: &CredentialStore,
    descriptor: &ProviderDescriptor,
    role: CredentialRole,
) -> Result<SecretString> {
    credentials
        .for_role(descriptor, role)
        .map(copy_secret)
        .ok_or_else(|| {
            PlanwrightError::Config(format!(
                "Provider '{}' is missing its {:?} credential",
                descriptor.id, role
            ))
        })
}

fn optional_plain(
    credentials: &CredentialStore,
    descriptor: &ProviderDescriptor,
    role: CredentialRole,
) -> Option<String> {
    credentials
        .for_role(descriptor, role)
        .map(|s| s.expose_secret().to_string())
}

#[async_trait]
impl ProviderFactory for HttpProviderFactory {
    async fn create(
        &self,
        descriptor: &ProviderDescriptor,
        credentials: &CredentialStore,
    ) -> Result<SharedProvider> {
        let client: SharedProvider = match descriptor.id.as_str() {
            "openai" => Arc::new(OpenAiProvider::new(
                required_secret(credentials, descriptor, CredentialRole::ApiKey)?,
                optional_plain(credentials, descriptor, CredentialRole::Endpoint),
                &self.options,
            )?),
            "google" => Arc::new(GoogleProvider::new(
                required_secret(credentials, descriptor, CredentialRole::ApiKey)?,
                optional_plain(credentials, descriptor, CredentialRole::Endpoint),
                &self.options,
            )?),
            "azure-openai" => {
                let endpoint = optional_plain(credentials, descriptor, CredentialRole::Endpoint)
                    .ok_or_else(|| {
                        PlanwrightError::Config("AZURE_OPENAI_ENDPOINT is not set".to_string())
                    })?;
                Arc::new(AzureOpenAiProvider::new(
                    required_secret(credentials, descriptor, CredentialRole::ApiKey)?,
                    &endpoint,
                    optional_plain(credentials, descriptor, CredentialRole::ApiVersion),
                    &self.options,
                )?)
            }
            "ollama" => Arc::new(OllamaProvider::new(
                optional_plain(credentials, descriptor, CredentialRole::Endpoint),
                &self.options,
            )?),
            other => {
                return Err(PlanwrightError::Config(format!(
                    "No adapter for provider '{}'. Supported: openai, google, azure-openai, ollama",
                    other
                )));
            }
        };
        Ok(client)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Caller preferences for provider selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub preferred: Option<String>,
}

impl SelectionPolicy {
    pub fn prefer(id: impl Into<String>) -> Self {
        Self {
            preferred: Some(id.into()),
        }
    }
}

type InitOutcome = std::result::Result<SharedProvider, LlmError>;

pub struct ProviderRegistry {
    /// Sorted by (priority, id)
    descriptors: Vec<ProviderDescriptor>,
    credentials: CredentialStore,
    factory: Arc<dyn ProviderFactory>,
    clients: DashMap<String, Arc<OnceCell<InitOutcome>>>,
    health: Arc<HealthTracker>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn new(
        mut descriptors: Vec<ProviderDescriptor>,
        credentials: CredentialStore,
        factory: Arc<dyn ProviderFactory>,
        health: Arc<HealthTracker>,
    ) -> Self {
        descriptors.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self {
            descriptors,
            credentials,
            factory,
            clients: DashMap::new(),
            health,
            default_provider: None,
        }
    }

    /// Provider to prefer when a request names none
    pub fn with_default_provider(mut self, id: Option<String>) -> Self {
        self.default_provider = id;
        self
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// Descriptors whose required credentials are all present, in priority order
    pub fn list_available(&self) -> Vec<&ProviderDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| self.credentials.is_configured(d))
            .collect()
    }

    /// Already-initialized client for `id` (or the active provider)
    pub fn get_client(&self, id: Option<&str>) -> Result<SharedProvider> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self.select_active(&SelectionPolicy::default())?,
        };

        match self.clients.get(&id).and_then(|cell| cell.get().cloned()) {
            Some(Ok(client)) => Ok(client),
            _ => Err(PlanwrightError::NotInitialized(id)),
        }
    }

    pub fn is_initialized(&self, id: &str) -> bool {
        self.clients
            .get(id)
            .is_some_and(|cell| matches!(cell.get(), Some(Ok(_))))
    }

    fn init_failed(&self, id: &str) -> bool {
        self.clients
            .get(id)
            .is_some_and(|cell| matches!(cell.get(), Some(Err(_))))
    }

    /// Return the client for `id`, creating it on first use.
    ///
    /// Concurrent callers converge on one factory call; the outcome
    /// (including failure) is shared by all of them.
    pub async fn ensure_initialized(&self, id: &str) -> Result<SharedProvider> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| PlanwrightError::Config(format!("Unknown provider '{}'", id)))?;

        // Clone the cell out so no shard lock is held across the await.
        let cell = Arc::clone(self.clients.entry(id.to_string()).or_default().value());

        let outcome = cell
            .get_or_init(|| async {
                let missing = self.credentials.missing_required(descriptor);
                if !missing.is_empty() {
                    warn!(provider = id, ?missing, "Provider is missing credentials");
                    return Err(LlmError::with_provider(
                        ErrorKind::Configuration,
                        format!("missing credentials: {}", missing.join(", ")),
                        id,
                    ));
                }

                info!(provider = id, "Initializing provider client");
                self.factory
                    .create(descriptor, &self.credentials)
                    .await
                    .map_err(|e| {
                        let mut err = e.into_llm_error(id);
                        err.kind = ErrorKind::Configuration;
                        warn!(provider = id, error = %err, "Provider initialization failed");
                        err
                    })
            })
            .await;

        outcome.clone().map_err(PlanwrightError::Llm)
    }

    /// Drop the cached client (or cached failure) and its health metrics
    pub fn evict(&self, id: &str) {
        if self.clients.remove(id).is_some() {
            debug!(provider = id, "Evicted provider client");
        }
        self.health.reset(id);
    }

    /// Candidate providers for one request, best first.
    ///
    /// Configured providers in priority order, the preferred one moved to
    /// the front, cached initialization failures removed. Providers
    /// classified poor keep their relative order behind every other
    /// candidate.
    pub fn failover_order(&self, policy: &SelectionPolicy) -> Result<Vec<String>> {
        let available = self.list_available();
        if available.is_empty() {
            let hints: Vec<&str> = self
                .descriptors
                .iter()
                .flat_map(|d| d.required_credentials())
                .map(|c| c.env_var.as_str())
                .collect();
            return Err(PlanwrightError::Config(format!(
                "No LLM provider is configured. Set one of: {}",
                hints.join(", ")
            )));
        }

        let mut ordered: Vec<String> = available.iter().map(|d| d.id.clone()).collect();

        let preferred = policy
            .preferred
            .as_deref()
            .or(self.default_provider.as_deref());
        if let Some(preferred) = preferred {
            match ordered.iter().position(|id| id == preferred) {
                Some(pos) => {
                    let id = ordered.remove(pos);
                    ordered.insert(0, id);
                }
                None => warn!(
                    provider = preferred,
                    "Preferred provider is not configured, using priority order"
                ),
            }
        }

        ordered.retain(|id| !self.init_failed(id));
        if ordered.is_empty() {
            return Err(PlanwrightError::Config(
                "Every configured provider failed to initialize".to_string(),
            ));
        }

        let (healthy, poor): (Vec<String>, Vec<String>) = ordered
            .into_iter()
            .partition(|id| self.health.classify(id) != HealthClassification::Poor);

        if healthy.is_empty() {
            warn!(providers = ?poor, "All providers are classified poor");
        } else if !poor.is_empty() {
            debug!(demoted = ?poor, "Providers classified poor moved to the end");
        }
        Ok(healthy.into_iter().chain(poor).collect())
    }

    /// Best provider under `policy`
    pub fn select_active(&self, policy: &SelectionPolicy) -> Result<String> {
        self.failover_order(policy)?
            .into_iter()
            .next()
            .ok_or_else(|| PlanwrightError::Config("No provider available".to_string()))
    }

    /// Model to use on provider `id` and its context window.
    ///
    /// An override is honoured when the provider lists the model, or when
    /// `id` is the explicitly requested provider (window then falls back to
    /// the conservative default). Otherwise the descriptor default is used.
    pub fn resolve_model(
        &self,
        id: &str,
        model_override: Option<&str>,
        explicitly_requested: bool,
    ) -> Option<(String, u32)> {
        let descriptor = self.descriptor(id)?;
        let model = match model_override {
            Some(m) if descriptor.supports_model(m) || explicitly_requested => m.to_string(),
            _ => descriptor.default_model.clone(),
        };
        let window = self.window_for(id, &model);
        Some((model, window))
    }

    /// Context window of `model` on provider `id` (default when unknown)
    pub fn window_for(&self, id: &str, model: &str) -> u32 {
        self.descriptor(id)
            .and_then(|d| d.context_window(model))
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::descriptor::builtin_descriptors;
    use crate::ai::testing::{ScriptedProvider, StaticFactory, descriptor};

    fn registry_with(factory: StaticFactory, ids: &[(&str, u32)]) -> (ProviderRegistry, Arc<StaticFactory>) {
        let factory = Arc::new(factory);
        let registry = ProviderRegistry::new(
            ids.iter().map(|(id, p)| descriptor(id, *p)).collect(),
            CredentialStore::new(),
            factory.clone(),
            Arc::new(HealthTracker::default()),
        );
        (registry, factory)
    }

    fn scripted(id: &str) -> SharedProvider {
        Arc::new(ScriptedProvider::new(id).ok("ok"))
    }

    #[tokio::test]
    async fn test_single_initialization_under_concurrency() {
        let factory = StaticFactory::new()
            .with("a", scripted("a"))
            .with_delay(std::time::Duration::from_millis(20));
        let (registry, factory) = registry_with(factory, &[("a", 1)]);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.ensure_initialized("a").await })
            })
            .collect();

        let mut clients = Vec::new();
        for h in handles {
            clients.push(h.await.unwrap().unwrap());
        }

        assert_eq!(factory.creations(), 1);
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(registry.is_initialized("a"));
    }

    #[tokio::test]
    async fn test_get_client_requires_initialization() {
        let (registry, _) = registry_with(StaticFactory::new().with("a", scripted("a")), &[("a", 1)]);
        assert!(matches!(
            registry.get_client(Some("a")),
            Err(PlanwrightError::NotInitialized(_))
        ));
        registry.ensure_initialized("a").await.unwrap();
        assert_eq!(registry.get_client(None).unwrap().name(), "a");
    }

    #[tokio::test]
    async fn test_failed_initialization_is_cached_until_evicted() {
        // No client registered for "a" -> factory fails
        let (registry, factory) = registry_with(StaticFactory::new(), &[("a", 1), ("b", 2)]);

        let err = registry.ensure_initialized("a").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(registry.ensure_initialized("a").await.is_err());
        assert_eq!(factory.creations(), 1);

        // Cached failure removes the provider from selection
        assert_eq!(
            registry.failover_order(&SelectionPolicy::default()).unwrap(),
            vec!["b"]
        );

        registry.evict("a");
        assert!(registry.ensure_initialized("a").await.is_err());
        assert_eq!(factory.creations(), 2);
    }

    #[test]
    fn test_priority_order_and_preference() {
        let (registry, _) = registry_with(StaticFactory::new(), &[("c", 30), ("a", 10), ("b", 20)]);

        let default = registry.failover_order(&SelectionPolicy::default()).unwrap();
        assert_eq!(default, vec!["a", "b", "c"]);

        let preferred = registry.failover_order(&SelectionPolicy::prefer("c")).unwrap();
        assert_eq!(preferred, vec!["c", "a", "b"]);

        // Unknown preference is ignored
        let unknown = registry
            .failover_order(&SelectionPolicy::prefer("nope"))
            .unwrap();
        assert_eq!(unknown, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_poor_providers_demoted_to_the_end() {
        let (registry, _) = registry_with(StaticFactory::new(), &[("a", 1), ("b", 2)]);
        for _ in 0..4 {
            registry.health().record("a", false, 10, Some("network"));
        }

        // Even when preferred, a poor provider loses to a healthy one
        assert_eq!(registry.select_active(&SelectionPolicy::prefer("a")).unwrap(), "b");
        assert_eq!(
            registry.failover_order(&SelectionPolicy::default()).unwrap(),
            vec!["b", "a"]
        );

        for _ in 0..4 {
            registry.health().record("b", false, 10, Some("network"));
        }
        assert_eq!(
            registry.failover_order(&SelectionPolicy::default()).unwrap(),
            vec!["a", "b"]
        );

        // Eviction resets health
        registry.evict("a");
        assert_eq!(registry.select_active(&SelectionPolicy::default()).unwrap(), "a");
    }

    #[test]
    fn test_no_configured_provider_is_configuration_error() {
        let registry = ProviderRegistry::new(
            builtin_descriptors()
                .into_iter()
                .filter(|d| d.id != "ollama")
                .collect(),
            CredentialStore::new(),
            Arc::new(HttpProviderFactory::default()),
            Arc::new(HealthTracker::default()),
        );
        assert!(registry.list_available().is_empty());
        let err = registry
            .failover_order(&SelectionPolicy::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_resolve_model() {
        let (registry, _) = registry_with(StaticFactory::new(), &[("a", 1)]);
        assert_eq!(
            registry.resolve_model("a", Some("large"), false),
            Some(("large".to_string(), 128_000))
        );
        assert_eq!(
            registry.resolve_model("a", Some("custom"), false),
            Some(("small".to_string(), 16_000))
        );
        assert_eq!(
            registry.resolve_model("a", Some("custom"), true),
            Some(("custom".to_string(), DEFAULT_CONTEXT_WINDOW))
        );
        assert_eq!(registry.resolve_model("zzz", None, false), None);
    }

    #[tokio::test]
    async fn test_http_factory_builds_builtin_adapters() {
        let descriptors = builtin_descriptors();
        let mut credentials = CredentialStore::new();
        credentials.insert("OPENAI_API_KEY", "sk-test");
        credentials.insert("AZURE_OPENAI_API_KEY", "az");
        credentials.insert("AZURE_OPENAI_ENDPOINT", "https://contoso.openai.azure.com");

        let factory = HttpProviderFactory::default();
        for id in ["openai", "azure-openai", "ollama"] {
            let d = descriptors.iter().find(|d| d.id == id).unwrap();
            let client = factory.create(d, &credentials).await.unwrap();
            assert_eq!(client.name(), id);
        }

        let google = descriptors.iter().find(|d| d.id == "google").unwrap();
        assert!(factory.create(google, &credentials).await.is_err());
    }
}
