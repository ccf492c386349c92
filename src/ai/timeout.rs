//! Timeout Helpers
//!
//! The per-attempt deadline is the only cancellation primitive in the
//! orchestration layer. Two wrappers are provided: one producing a crate
//! [`PlanwrightError::Timeout`] for local operations, one producing a
//! classified [`LlmError`] for provider attempts so the executor can retry it.
//!
//! ## Usage
//!
//! ```ignore
//! let completion = attempt_with_timeout(
//!     timeouts.llm_attempt,
//!     client.send(model, &messages, ceiling),
//!     "openai",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::constants::network as net_constants;
use crate::types::{LlmError, PlanwrightError, Result};

/// Timeouts for the operations the orchestrator waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Deadline for one provider attempt
    pub llm_attempt: Duration,
    /// Deadline for creating a provider client
    pub initialization: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_attempt: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            initialization: Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    pub fn with_attempt_secs(secs: u64) -> Self {
        Self {
            llm_attempt: Duration::from_secs(secs),
            ..Self::default()
        }
    }
}

/// Execute an async operation with a timeout
///
/// Returns [`PlanwrightError::Timeout`] if the operation doesn't complete in time.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(PlanwrightError::timeout(operation_name, timeout)),
    }
}

/// Execute one provider attempt with a deadline; expiry is a retryable
/// `timeout` error attributed to `provider`.
pub async fn attempt_with_timeout<T, F>(
    timeout: Duration,
    future: F,
    provider: &str,
) -> std::result::Result<T, LlmError>
where
    F: Future<Output = std::result::Result<T, LlmError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::timeout(timeout).provider(provider)),
    }
}
