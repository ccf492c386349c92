//! Call Executor
//!
//! Runs one prompt plan against one provider with a per-attempt timeout,
//! bounded retries and classified failures.
//!
//! ## Strategy
//!
//! 1. Attempt the call under a deadline (expiry is a retryable timeout)
//! 2. Report every attempt to the health tracker
//! 3. On failure, let [`RetryMachine`] decide: give up, or wait and retry
//! 4. Rate limits wait for the provider's retry-after hint (capped);
//!    everything else backs off exponentially with jitter
//!
//! The retry decisions live in a pure state machine
//! (`Idle → Attempting → Backoff → Succeeded | Failed`) so they can be
//! tested without I/O or real time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::health::HealthTracker;
use super::planner::PromptPlan;
use super::provider::{LlmProvider, TokenUsage};
use super::timeout::attempt_with_timeout;
use crate::constants::executor as exec_constants;
use crate::types::{ErrorKind, LlmError};

// =============================================================================
// Retry Policy
// =============================================================================

/// Retry bounds for one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound applied to provider retry-after hints
    pub max_retry_after: Duration,
    /// Extra attempts allowed for empty/unparseable responses
    pub invalid_response_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: exec_constants::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(exec_constants::BASE_DELAY_MS),
            max_delay: Duration::from_secs(exec_constants::MAX_DELAY_SECS),
            max_retry_after: Duration::from_secs(exec_constants::MAX_RETRY_AFTER_SECS),
            invalid_response_retries: exec_constants::INVALID_RESPONSE_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay for the `attempt`-th failure (1-based), capped
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }
}

// =============================================================================
// Retry State Machine
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, kind: ErrorKind },
}

/// What the driver should do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStep {
    /// Sleep for `delay`, then call [`RetryMachine::resume`]
    Retry { delay: Duration },
    /// Stop with this error
    GiveUp(LlmError),
}

#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    /// Largest delay handed out so far, hints included; later delays never
    /// go below it
    last_backoff: Duration,
    invalid_retries_used: u32,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Idle,
            last_backoff: Duration::ZERO,
            invalid_retries_used: 0,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// `Idle → Attempting(1)`; returns the attempt number
    pub fn start(&mut self) -> u32 {
        self.state = RetryState::Attempting { attempt: 1 };
        1
    }

    fn current_attempt(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::Backoff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts } | RetryState::Failed { attempts, .. } => attempts,
            RetryState::Idle => 0,
        }
    }

    /// `Attempting → Succeeded`
    pub fn on_success(&mut self) {
        self.state = RetryState::Succeeded {
            attempts: self.current_attempt(),
        };
    }

    /// Decide what follows a failed attempt.
    ///
    /// `jitter` receives the capped exponential delay and returns the
    /// random extra to add; it is not consulted for retry-after hints.
    /// Delays never shrink within one call.
    pub fn on_failure(
        &mut self,
        error: LlmError,
        jitter: impl FnOnce(Duration) -> Duration,
    ) -> RetryStep {
        let attempt = self.current_attempt();

        let exhausted_invalid = error.kind == ErrorKind::InvalidResponse
            && self.invalid_retries_used >= self.policy.invalid_response_retries;

        if !error.is_retryable() || exhausted_invalid || attempt >= self.policy.max_attempts {
            self.state = RetryState::Failed {
                attempts: attempt,
                kind: error.kind,
            };
            return RetryStep::GiveUp(error);
        }

        if error.kind == ErrorKind::InvalidResponse {
            self.invalid_retries_used += 1;
        }

        let delay = match (error.kind, error.retry_after) {
            (ErrorKind::RateLimit, Some(hint)) => hint.min(self.policy.max_retry_after),
            _ => {
                let base = self.policy.backoff_for(attempt);
                base + jitter(base)
            }
        }
        .max(self.last_backoff);
        self.last_backoff = delay;

        self.state = RetryState::Backoff { attempt, delay };
        RetryStep::Retry { delay }
    }

    /// `Backoff → Attempting(n + 1)`; returns the new attempt number
    pub fn resume(&mut self) -> u32 {
        let next = self.current_attempt() + 1;
        self.state = RetryState::Attempting { attempt: next };
        next
    }
}

/// Random jitter in `[0, delay / 4)` using the thread-local RNG
fn random_jitter(delay: Duration) -> Duration {
    let max_jitter_ms = delay.as_millis() as u64 / exec_constants::JITTER_DIVISOR;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

// =============================================================================
// Executor
// =============================================================================

/// Successful execution of a plan on one provider
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSuccess {
    pub content: String,
    pub usage: TokenUsage,
    /// Model reported by the provider
    pub model: String,
    /// Wall time across all attempts, including backoff
    pub latency_ms: u64,
    pub attempts: u32,
}

impl ExecutionSuccess {
    pub fn tokens_used(&self) -> u32 {
        self.usage.total()
    }
}

pub struct CallExecutor {
    policy: RetryPolicy,
    health: Arc<HealthTracker>,
}

impl CallExecutor {
    pub fn new(policy: RetryPolicy, health: Arc<HealthTracker>) -> Self {
        Self { policy, health }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `plan` on `client` with retries; returns the last classified
    /// error when retries are exhausted or the error is not retryable.
    #[instrument(skip(self, client, plan), fields(provider = client.name()))]
    pub async fn execute(
        &self,
        client: &dyn LlmProvider,
        plan: &PromptPlan,
        model: &str,
        timeout: Duration,
    ) -> std::result::Result<ExecutionSuccess, LlmError> {
        let provider = client.name().to_string();
        let messages = plan.messages();
        let ceiling = plan.response_ceiling();

        let mut machine = RetryMachine::new(self.policy.clone());
        let mut attempt = machine.start();
        let started = Instant::now();

        loop {
            debug!(attempt, max_attempts = self.policy.max_attempts, "Provider attempt");

            let attempt_start = Instant::now();
            let result =
                attempt_with_timeout(timeout, client.send(model, &messages, ceiling), &provider)
                    .await;
            let latency_ms = attempt_start.elapsed().as_millis() as u64;

            match result {
                Ok(completion) => {
                    self.health.record(&provider, true, latency_ms, None);
                    machine.on_success();
                    let total_ms = started.elapsed().as_millis() as u64;
                    info!(attempts = attempt, latency_ms = total_ms, "Provider call succeeded");
                    return Ok(ExecutionSuccess {
                        content: completion.text,
                        usage: completion.usage,
                        model: completion.model,
                        latency_ms: total_ms,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    let err = if err.provider.is_some() {
                        err
                    } else {
                        err.provider(provider.as_str())
                    };
                    self.health
                        .record(&provider, false, latency_ms, Some(err.kind.as_str()));
                    warn!(attempt, kind = %err.kind, error = %err.message, "Provider attempt failed");

                    match machine.on_failure(err, random_jitter) {
                        RetryStep::Retry { delay } => {
                            debug!(delay_ms = delay.as_millis() as u64, "Retrying after backoff");
                            tokio::time::sleep(delay).await;
                            attempt = machine.resume();
                        }
                        RetryStep::GiveUp(err) => return Err(err),
                    }
                }
            }
        }
    }
}
