//! Document Generation Orchestrator
//!
//! Entry point of the orchestration layer: *generate document type D from
//! context graph G*. One request walks the registry's failover order; for
//! each candidate provider it plans a prompt against that provider's model
//! window, executes it with retries and records usage. Transient failures
//! move on to the next provider; fatal ones stop the request. When every
//! candidate is exhausted the caller receives one aggregated
//! [`GenerationFailure`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::executor::{CallExecutor, RetryPolicy};
use super::health::ProviderHealth;
use super::planner::{ContextBudgetPlanner, PromptPlan, reserve_for_window};
use super::provider::{ProviderRegistry, SelectionPolicy};
use super::timeout::{TimeoutConfig, with_timeout};
use super::tokenizer::EstimatorKind;
use super::usage::{ContextUsageTracker, UsageRecord, UsageSink, UsageTexts};
use crate::constants::throttle as throttle_constants;
use crate::types::{ContextGraph, ErrorKind, LlmError, PlanwrightError};

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub document_type: String,
    pub context_graph: Arc<ContextGraph>,
    pub preferred_provider: Option<String>,
    pub model_override: Option<String>,
    pub request_id: Option<String>,
}

impl GenerationRequest {
    pub fn new(document_type: impl Into<String>, context_graph: Arc<ContextGraph>) -> Self {
        Self {
            document_type: document_type.into(),
            context_graph,
            preferred_provider: None,
            model_override: None,
            request_id: None,
        }
    }

    pub fn prefer(mut self, provider: Option<String>) -> Self {
        self.preferred_provider = provider;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub request_id: String,
    pub document_type: String,
    pub content: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: u32,
    pub latency_ms: u64,
    /// Fragments that made it into the prompt, in order
    pub fragments: Vec<String>,
    pub usage: UsageRecord,
}

/// Aggregated failure after every candidate provider was tried
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{error_kind}: {message} (attempted: {})", .attempted_providers.join(", "))]
pub struct GenerationFailure {
    pub request_id: String,
    pub document_type: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub attempted_providers: Vec<String>,
}

impl GenerationFailure {
    fn from_error(
        request_id: &str,
        document_type: &str,
        error: &LlmError,
        attempted_providers: Vec<String>,
    ) -> Self {
        Self {
            request_id: request_id.to_string(),
            document_type: document_type.to_string(),
            error_kind: error.kind,
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempted_providers,
        }
    }
}

// =============================================================================
// Throttle
// =============================================================================

/// Backpressure for outbound requests: a cap on simultaneous requests plus
/// a minimum spacing between request starts.
pub struct RequestThrottle {
    permits: Arc<Semaphore>,
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new(
            throttle_constants::MAX_CONCURRENT_REQUESTS,
            Duration::from_millis(throttle_constants::REQUEST_DELAY_MS),
        )
    }
}

impl RequestThrottle {
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    /// Wait for a slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, PlanwrightError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PlanwrightError::Config("request throttle closed".to_string()))?;

        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());

        Ok(permit)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    pub max_concurrent_requests: usize,
    pub request_delay: Duration,
    /// Explicit response reserve; proportional default when `None`
    pub response_tokens: Option<u32>,
    /// Token estimator shared by planning and usage accounting
    pub estimator: EstimatorKind,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            max_concurrent_requests: throttle_constants::MAX_CONCURRENT_REQUESTS,
            request_delay: Duration::from_millis(throttle_constants::REQUEST_DELAY_MS),
            response_tokens: None,
            estimator: EstimatorKind::default(),
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    planner: ContextBudgetPlanner,
    executor: CallExecutor,
    usage: ContextUsageTracker,
    throttle: RequestThrottle,
    timeouts: TimeoutConfig,
    response_tokens: Option<u32>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: OrchestratorSettings,
        sink: Option<Arc<dyn UsageSink>>,
    ) -> Self {
        let estimator = settings.estimator.build();
        let executor = CallExecutor::new(settings.retry, Arc::clone(registry.health()));
        let usage = ContextUsageTracker::new(registry.descriptors(), Arc::clone(&estimator), sink);
        Self {
            planner: ContextBudgetPlanner::new(estimator),
            executor,
            usage,
            throttle: RequestThrottle::new(
                settings.max_concurrent_requests,
                settings.request_delay,
            ),
            timeouts: settings.timeouts,
            response_tokens: settings.response_tokens,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Current health of every provider that has been called
    pub fn health_snapshot(&self) -> Vec<ProviderHealth> {
        self.registry.health().snapshot()
    }

    /// Plan without calling any provider (dry run against `window`)
    pub fn plan(
        &self,
        document_type: &str,
        graph: &ContextGraph,
        window: u32,
    ) -> crate::types::Result<PromptPlan> {
        let reserve = reserve_for_window(window, self.response_tokens);
        self.planner.plan(document_type, graph, window, reserve)
    }

    /// Generate one document, failing over across providers
    #[instrument(skip(self, request), fields(document_type = %request.document_type))]
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutput, GenerationFailure> {
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let document_type = request.document_type.as_str();

        let fail = |error: &LlmError, attempted: Vec<String>| {
            GenerationFailure::from_error(&request_id, document_type, error, attempted)
        };

        let _permit = self
            .throttle
            .acquire()
            .await
            .map_err(|e| fail(&e.into_llm_error("throttle"), Vec::new()))?;

        let policy = SelectionPolicy {
            preferred: request.preferred_provider.clone(),
        };
        let candidates = self.registry.failover_order(&policy).map_err(|e| {
            let mut err = e.into_llm_error("registry");
            err.provider = None;
            fail(&err, Vec::new())
        })?;

        info!(%request_id, candidates = ?candidates, "Starting generation");

        let mut attempted = Vec::new();
        let mut last_error: Option<LlmError> = None;

        for provider_id in candidates {
            attempted.push(provider_id.clone());

            let client = match with_timeout(
                self.timeouts.initialization,
                self.registry.ensure_initialized(&provider_id),
                "provider initialization",
            )
            .await
            {
                Ok(client) => client,
                Err(e) => {
                    let err = e.into_llm_error(&provider_id);
                    warn!(provider = %provider_id, error = %err, "Skipping provider");
                    last_error = Some(err);
                    continue;
                }
            };

            let explicitly_requested =
                request.preferred_provider.as_deref() == Some(provider_id.as_str());
            let Some((model, window)) = self.registry.resolve_model(
                &provider_id,
                request.model_override.as_deref(),
                explicitly_requested,
            ) else {
                continue;
            };

            let reserve = reserve_for_window(window, self.response_tokens);
            let plan = match self
                .planner
                .plan(document_type, &request.context_graph, window, reserve)
            {
                Ok(plan) => plan,
                Err(e) => {
                    let err = e.into_llm_error(&provider_id);
                    warn!(provider = %provider_id, %model, window, error = %err, "Prompt does not fit, failing over");
                    last_error = Some(err);
                    continue;
                }
            };

            let call_started = Instant::now();
            match self
                .executor
                .execute(client.as_ref(), &plan, &model, self.timeouts.llm_attempt)
                .await
            {
                Ok(success) => {
                    let texts = UsageTexts::from_plan(&plan).with_response(&success.content);
                    let usage = self
                        .usage
                        .record(
                            &request_id,
                            document_type,
                            &texts,
                            &provider_id,
                            &model,
                            success.latency_ms,
                            true,
                        )
                        .await;

                    info!(
                        %request_id,
                        provider = %provider_id,
                        %model,
                        attempts = success.attempts,
                        tokens = success.tokens_used(),
                        "Generation succeeded"
                    );

                    return Ok(GenerationOutput {
                        request_id: request_id.clone(),
                        document_type: document_type.to_string(),
                        tokens_used: success.tokens_used(),
                        latency_ms: success.latency_ms,
                        fragments: plan.fragment_names().into_iter().map(String::from).collect(),
                        content: success.content,
                        provider: provider_id,
                        model,
                        usage,
                    });
                }
                Err(err) => {
                    self.usage
                        .record(
                            &request_id,
                            document_type,
                            &UsageTexts::from_plan(&plan),
                            &provider_id,
                            &model,
                            call_started.elapsed().as_millis() as u64,
                            false,
                        )
                        .await;

                    if err.kind.is_fatal() {
                        warn!(provider = %provider_id, error = %err, "Fatal error, stopping request");
                        return Err(fail(&err, attempted));
                    }

                    warn!(provider = %provider_id, error = %err, "Provider exhausted, trying next");
                    last_error = Some(err);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            LlmError::new(ErrorKind::Configuration, "no provider could be attempted")
        });
        warn!(%request_id, attempted = ?attempted, "All providers failed");
        Err(fail(&last, attempted))
    }

    /// Generate several documents concurrently, bounded by the throttle
    pub async fn generate_many(
        &self,
        requests: Vec<GenerationRequest>,
    ) -> Vec<Result<GenerationOutput, GenerationFailure>> {
        join_all(requests.into_iter().map(|r| self.generate(r))).await
    }
}
