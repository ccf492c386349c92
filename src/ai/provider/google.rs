//! Google Gemini Provider
//!
//! `generateContent` adapter. Gemini has no system role in `contents`, so
//! system messages travel in `systemInstruction`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http;
use super::{ChatMessage, ClientOptions, Completion, LlmProvider, Role, TokenUsage};
use crate::types::{ErrorKind, LlmError, Result};

const PROVIDER: &str = "google";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleProvider {
    api_key: SecretString,
    api_base: String,
    temperature: f32,
    client: reqwest::Client,
}

impl std::fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GoogleProvider {
    pub fn new(
        api_key: SecretString,
        api_base: Option<String>,
        options: &ClientOptions,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            api_base: api_base
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            temperature: options.temperature,
            client: http::build_client(options.timeout)?,
        })
    }

    fn build_request(&self, messages: &[ChatMessage], token_ceiling: u32) -> GenerateRequest {
        let system: Vec<Part> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| Part {
                text: m.content.clone(),
            })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                }),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: system,
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: token_ceiling,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError> {
        let request = self.build_request(messages, token_ceiling);
        let url = format!("{}/models/{}:generateContent", self.api_base, model);

        debug!(model, "Sending request to Gemini API");

        let body = http::send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", self.api_key.expose_secret())
                .json(&request),
            PROVIDER,
        )
        .await?;

        parse_generate_response(body, model)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

fn parse_generate_response(
    body: serde_json::Value,
    requested_model: &str,
) -> std::result::Result<Completion, LlmError> {
    let response: GenerateResponse = http::decode(body, PROVIDER)?;

    if let Some(feedback) = &response.prompt_feedback
        && let Some(reason) = &feedback.block_reason
    {
        return Err(LlmError::with_provider(
            ErrorKind::BadRequest,
            format!("Prompt blocked by Gemini: {}", reason),
            PROVIDER,
        ));
    }

    let text = response.candidates.into_iter().next().and_then(|c| {
        c.content.map(|content| {
            content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
    });

    let usage = response
        .usage_metadata
        .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
        .unwrap_or_default();

    Ok(Completion {
        text: http::require_text(text, PROVIDER)?,
        usage,
        model: response
            .model_version
            .unwrap_or_else(|| requested_model.to_string()),
    })
}

// Request/Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
