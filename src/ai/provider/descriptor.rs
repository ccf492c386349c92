//! Provider descriptors: static metadata for every supported backend.
//!
//! A descriptor names the credentials a backend needs, its model window
//! table and its default priority. Descriptors are immutable after startup.

use std::collections::{BTreeMap, HashMap};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Deployment category of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Cloud,
    Local,
    Free,
    Enterprise,
}

/// What a credential is used for by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRole {
    ApiKey,
    Endpoint,
    ApiVersion,
}

/// One credential a backend reads, by environment variable name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSpec {
    pub env_var: String,
    pub role: CredentialRole,
    pub required: bool,
}

impl CredentialSpec {
    fn required(env_var: &str, role: CredentialRole) -> Self {
        Self {
            env_var: env_var.to_string(),
            role,
            required: true,
        }
    }

    fn optional(env_var: &str, role: CredentialRole) -> Self {
        Self {
            env_var: env_var.to_string(),
            role,
            required: false,
        }
    }
}

/// Static description of a provider backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub category: ProviderCategory,
    pub credentials: Vec<CredentialSpec>,
    /// Model name -> context window in tokens
    pub models: BTreeMap<String, u32>,
    pub default_model: String,
    /// Lower is tried first
    pub priority: u32,
}

impl ProviderDescriptor {
    /// Context window for `model`, if listed
    pub fn context_window(&self, model: &str) -> Option<u32> {
        self.models.get(model).copied()
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn required_credentials(&self) -> impl Iterator<Item = &CredentialSpec> {
        self.credentials.iter().filter(|c| c.required)
    }

    pub fn optional_credentials(&self) -> impl Iterator<Item = &CredentialSpec> {
        self.credentials.iter().filter(|c| !c.required)
    }

    pub fn credential(&self, role: CredentialRole) -> Option<&CredentialSpec> {
        self.credentials.iter().find(|c| c.role == role)
    }
}

fn models(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
    entries
        .iter()
        .map(|(name, window)| (name.to_string(), *window))
        .collect()
}

/// The four built-in backends in default priority order
pub fn builtin_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            category: ProviderCategory::Cloud,
            credentials: vec![
                CredentialSpec::required("OPENAI_API_KEY", CredentialRole::ApiKey),
                CredentialSpec::optional("OPENAI_BASE_URL", CredentialRole::Endpoint),
            ],
            models: models(&[
                ("gpt-4o", 128_000),
                ("gpt-4o-mini", 128_000),
                ("gpt-4.1", 1_047_576),
                ("gpt-4.1-mini", 1_047_576),
                ("gpt-4-turbo", 128_000),
                ("gpt-3.5-turbo", 16_385),
            ]),
            default_model: "gpt-4o-mini".to_string(),
            priority: 10,
        },
        ProviderDescriptor {
            id: "google".to_string(),
            display_name: "Google Gemini".to_string(),
            category: ProviderCategory::Free,
            credentials: vec![
                CredentialSpec::required("GOOGLE_AI_API_KEY", CredentialRole::ApiKey),
                CredentialSpec::optional("GOOGLE_AI_BASE_URL", CredentialRole::Endpoint),
            ],
            models: models(&[
                ("gemini-1.5-pro", 2_097_152),
                ("gemini-1.5-flash", 1_048_576),
                ("gemini-2.0-flash", 1_048_576),
                ("gemini-2.5-pro", 1_048_576),
            ]),
            default_model: "gemini-1.5-flash".to_string(),
            priority: 20,
        },
        ProviderDescriptor {
            id: "azure-openai".to_string(),
            display_name: "Azure OpenAI".to_string(),
            category: ProviderCategory::Enterprise,
            credentials: vec![
                CredentialSpec::required("AZURE_OPENAI_API_KEY", CredentialRole::ApiKey),
                CredentialSpec::required("AZURE_OPENAI_ENDPOINT", CredentialRole::Endpoint),
                CredentialSpec::optional("AZURE_OPENAI_API_VERSION", CredentialRole::ApiVersion),
            ],
            models: models(&[
                ("gpt-4", 8_192),
                ("gpt-4-32k", 32_768),
                ("gpt-4o", 128_000),
                ("gpt-35-turbo", 16_385),
            ]),
            default_model: "gpt-4o".to_string(),
            priority: 30,
        },
        ProviderDescriptor {
            id: "ollama".to_string(),
            display_name: "Ollama".to_string(),
            category: ProviderCategory::Local,
            credentials: vec![CredentialSpec::optional(
                "OLLAMA_BASE_URL",
                CredentialRole::Endpoint,
            )],
            models: models(&[
                ("llama3.1", 128_000),
                ("llama3", 8_192),
                ("mistral", 32_768),
                ("qwen2.5", 32_768),
            ]),
            default_model: "llama3.1".to_string(),
            priority: 40,
        },
    ]
}

// =============================================================================
// Credentials
// =============================================================================

/// Resolved credential values keyed by environment variable name.
///
/// Values are wrapped in [`SecretString`] and never printed.
#[derive(Default)]
pub struct CredentialStore {
    values: HashMap<String, SecretString>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("CredentialStore")
            .field("present", &keys)
            .finish()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every credential named by `descriptors` from the process environment
    pub fn from_env(descriptors: &[ProviderDescriptor]) -> Self {
        let mut store = Self::new();
        for spec in descriptors.iter().flat_map(|d| d.credentials.iter()) {
            if let Ok(value) = std::env::var(&spec.env_var)
                && !value.trim().is_empty()
            {
                store.insert(&spec.env_var, value);
            }
        }
        store
    }

    pub fn insert(&mut self, env_var: &str, value: impl Into<String>) {
        self.values
            .insert(env_var.to_string(), SecretString::from(value.into()));
    }

    pub fn get(&self, env_var: &str) -> Option<&SecretString> {
        self.values.get(env_var)
    }

    /// Value for the descriptor's credential playing `role`
    pub fn for_role(
        &self,
        descriptor: &ProviderDescriptor,
        role: CredentialRole,
    ) -> Option<&SecretString> {
        descriptor
            .credential(role)
            .and_then(|spec| self.get(&spec.env_var))
    }

    /// Required credentials of `descriptor` that have no value
    pub fn missing_required<'a>(&self, descriptor: &'a ProviderDescriptor) -> Vec<&'a str> {
        descriptor
            .required_credentials()
            .filter(|spec| !self.values.contains_key(&spec.env_var))
            .map(|spec| spec.env_var.as_str())
            .collect()
    }

    pub fn is_configured(&self, descriptor: &ProviderDescriptor) -> bool {
        self.missing_required(descriptor).is_empty()
    }
}
