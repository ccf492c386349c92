//! LLM Provider Abstraction
//!
//! Every backend is reached through the narrow [`LlmProvider`] trait:
//! send role-tagged messages with a token ceiling, get text plus usage back.
//! Adapters classify their own failures into [`LlmError`]s so the executor
//! never needs to know which SDK shape produced them.
//!
//! ## Modules
//!
//! - `descriptor`: static provider metadata and model window tables
//! - `registry`: lazy, exactly-once client initialization and selection
//! - `openai`, `azure`, `google`, `ollama`: HTTP adapters

mod azure;
pub mod descriptor;
mod google;
mod http;
mod ollama;
mod openai;
pub mod registry;

pub use azure::AzureOpenAiProvider;
pub use descriptor::{
    CredentialRole, CredentialSpec, CredentialStore, ProviderCategory, ProviderDescriptor,
    builtin_descriptors,
};
pub use google::GoogleProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::{HttpProviderFactory, ProviderFactory, ProviderRegistry, SelectionPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::network;
use crate::types::LlmError;

// =============================================================================
// Messages and Completions
// =============================================================================

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Token usage reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful provider reply
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model reported by the backend (may differ from the requested alias)
    pub model: String,
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Uniform capability every backend adapter implements
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send messages to `model`, asking for at most `token_ceiling` output tokens.
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError>;

    /// Provider id for logging and metrics
    fn name(&self) -> &str;
}

/// Shared provider handle owned by the registry
pub type SharedProvider = Arc<dyn LlmProvider>;

/// Settings shared by every HTTP adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientOptions {
    /// Transport-level timeout; the executor applies its own per-attempt deadline
    pub timeout: Duration,
    pub temperature: f32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(network::DEFAULT_TIMEOUT_SECS),
            temperature: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
