//! Shared HTTP plumbing for the REST adapters.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use tracing::warn;

use crate::constants::network;
use crate::types::{ErrorClassifier, LlmError, PlanwrightError, Result};

pub(super) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
        .build()
        .map_err(|e| PlanwrightError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Parse the `retry-after` header (delta-seconds form only)
fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Send a prepared request and return the body of a 2xx response.
///
/// Transport failures and non-success statuses are classified here so the
/// adapters only deal with response parsing.
pub(super) async fn send_json(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> std::result::Result<serde_json::Value, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| ErrorClassifier::classify_transport(&e, provider))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = retry_after_header(&response);
        let body = response.text().await.unwrap_or_default();
        warn!(provider, status = status.as_u16(), "Provider returned error status");
        return Err(ErrorClassifier::classify_http_status(
            status.as_u16(),
            &format!("{} API error ({}): {}", provider, status, truncate(&body, 500)),
            provider,
            retry_after,
        ));
    }

    response.json().await.map_err(|e| {
        LlmError::invalid_response(format!("Failed to parse {} response: {}", provider, e))
            .provider(provider)
    })
}

/// Reject missing or whitespace-only completions
pub(super) fn require_text(
    text: Option<String>,
    provider: &str,
) -> std::result::Result<String, LlmError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(LlmError::invalid_response(format!("Empty response from {}", provider))
            .provider(provider)),
    }
}

/// Decode a typed body out of an already-fetched JSON value
pub(super) fn decode<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    provider: &str,
) -> std::result::Result<T, LlmError> {
    serde_json::from_value(value).map_err(|e| {
        LlmError::invalid_response(format!("Unexpected {} response shape: {}", provider, e))
            .provider(provider)
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn test_require_text_rejects_blank() {
        let err = require_text(Some("  \n".to_string()), "openai").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.provider.as_deref(), Some("openai"));
        assert!(require_text(None, "openai").is_err());
        assert_eq!(require_text(Some("ok".into()), "openai").unwrap(), "ok");
    }

    #[test]
    fn test_decode_wrong_shape_is_invalid_response() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Shape {
            choices: Vec<String>,
        }
        let err = decode::<Shape>(serde_json::json!({"nope": 1}), "google")
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
