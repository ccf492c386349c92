//! Ollama Local LLM Provider
//!
//! Adapter for a locally-running Ollama server using the `/api/chat` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::http;
use super::{ChatMessage, ClientOptions, Completion, LlmProvider, TokenUsage};
use crate::types::{ErrorKind, LlmError, PlanwrightError, Result};

const PROVIDER: &str = "ollama";
const DEFAULT_API_BASE: &str = "http://localhost:11434";

/// Ollama Local LLM Provider
#[derive(Debug)]
pub struct OllamaProvider {
    api_base: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(api_base: Option<String>, options: &ClientOptions) -> Result<Self> {
        let api_base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Self::validate_endpoint(&api_base)?;

        Ok(Self {
            api_base,
            temperature: options.temperature,
            client: http::build_client(options.timeout)?,
        })
    }

    /// Validate endpoint URL (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            PlanwrightError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PlanwrightError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
        {
            warn!(host, "Ollama endpoint is not localhost. Ensure this is intentional.");
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> OllamaChatRequest {
        OllamaChatRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: token_ceiling,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError> {
        let request = self.build_request(model, messages, token_ceiling);
        let url = format!("{}/api/chat", self.api_base);

        debug!(model, "Sending request to Ollama API");

        let body = http::send_json(self.client.post(&url).json(&request), PROVIDER)
            .await
            .map_err(|e| {
                if e.kind == ErrorKind::Network {
                    LlmError::with_provider(
                        ErrorKind::Network,
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? Start with: ollama serve ({})",
                            self.api_base, e.message
                        ),
                        PROVIDER,
                    )
                } else {
                    e
                }
            })?;

        parse_chat_response(body, model)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

fn parse_chat_response(
    body: serde_json::Value,
    requested_model: &str,
) -> std::result::Result<Completion, LlmError> {
    let response: OllamaChatResponse = http::decode(body, PROVIDER)?;

    Ok(Completion {
        text: http::require_text(response.message.map(|m| m.content), PROVIDER)?,
        usage: TokenUsage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        ),
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
    })
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}
