//! Azure OpenAI Provider
//!
//! Same wire format as OpenAI Chat Completions, but addressed by deployment
//! under a tenant endpoint and authenticated with an `api-key` header.
//! The requested model name is used as the deployment name.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::http;
use super::openai::{ChatCompletionRequest, WireMessage, parse_chat_completion};
use super::{ChatMessage, ClientOptions, Completion, LlmProvider};
use crate::types::{LlmError, PlanwrightError, Result};

const PROVIDER: &str = "azure-openai";
const DEFAULT_API_VERSION: &str = "2024-06-01";

pub struct AzureOpenAiProvider {
    api_key: SecretString,
    endpoint: String,
    api_version: String,
    temperature: f32,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl AzureOpenAiProvider {
    pub fn new(
        api_key: SecretString,
        endpoint: &str,
        api_version: Option<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let parsed = url::Url::parse(endpoint).map_err(|e| {
            PlanwrightError::Config(format!("Invalid Azure endpoint URL '{}': {}", endpoint, e))
        })?;
        if parsed.scheme() != "https" {
            return Err(PlanwrightError::Config(format!(
                "Azure endpoint must use https, got: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            temperature: options.temperature,
            client: http::build_client(options.timeout)?,
        })
    }

    fn deployment_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            max_tokens: Some(token_ceiling),
        };

        debug!(deployment = model, "Sending request to Azure OpenAI");

        let body = http::send_json(
            self.client
                .post(self.deployment_url(model))
                .header("api-key", self.api_key.expose_secret())
                .json(&request),
            PROVIDER,
        )
        .await?;

        parse_chat_completion(body, PROVIDER, model)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
