//! OpenAI API Provider
//!
//! Chat Completions adapter. The model is chosen per call so one client
//! serves every model in the descriptor table.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http;
use super::{ChatMessage, ClientOptions, Completion, LlmProvider, TokenUsage};
use crate::types::{LlmError, Result};

const PROVIDER: &str = "openai";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    api_key: SecretString,
    api_base: String,
    temperature: f32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        api_key: SecretString,
        api_base: Option<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        let api_base = api_base
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            api_key,
            api_base,
            temperature: options.temperature,
            client: http::build_client(options.timeout)?,
        })
    }

    fn build_request(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
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
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError> {
        let request = self.build_request(model, messages, token_ceiling);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model, token_ceiling, "Sending request to OpenAI API");

        let body = http::send_json(
            self.client
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
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

fn completion_from(
    response: ChatCompletionResponse,
    requested_model: &str,
) -> std::result::Result<Completion, LlmError> {
    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content);

    Ok(Completion {
        text: http::require_text(text, PROVIDER)?,
        usage,
        model: response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
    })
}

// Request/Response types (shared with the Azure adapter, same wire format)

#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest {
    pub(super) model: String,
    pub(super) messages: Vec<WireMessage>,
    pub(super) temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct WireMessage {
    pub(super) role: &'static str,
    pub(super) content: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Parse a Chat Completions body into a [`Completion`]
pub(super) fn parse_chat_completion(
    body: serde_json::Value,
    provider: &str,
    requested_model: &str,
) -> std::result::Result<Completion, LlmError> {
    let response: ChatCompletionResponse = http::decode(body, provider)?;
    completion_from(response, requested_model).map_err(|e| e.provider(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::Role;
    use crate::types::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_request_uses_per_call_model() {
        let provider = OpenAiProvider::new(
            SecretString::from("sk-test".to_string()),
            Some("https://proxy.example.com/v1/".to_string()),
            &ClientOptions::default(),
        )
        .unwrap();
        assert_eq!(provider.api_base, "https://proxy.example.com/v1");

        let request = provider.build_request(
            "gpt-4o",
            &[ChatMessage::system("sys"), ChatMessage::user("hi")],
            512,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["messages"][0]["role"], Role::System.as_str());
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_parse_completion_with_usage() {
        let body = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "# Charter"}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}
        });
        let completion = parse_chat_completion(body, PROVIDER, "gpt-4o").unwrap();
        assert_eq!(completion.text, "# Charter");
        assert_eq!(completion.usage.total(), 150);
        assert_eq!(completion.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn test_parse_empty_choices_is_invalid_response() {
        let body = json!({"choices": []});
        let err = parse_chat_completion(body, PROVIDER, "gpt-4o").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_debug_redacts_key() {
        let provider = OpenAiProvider::new(
            SecretString::from("sk-very-secret".to_string()),
            None,
            &ClientOptions::default(),
        )
        .unwrap();
        let debug = format!("{:?}", provider);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-very-secret"));
    }
}
