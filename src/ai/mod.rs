//! AI Orchestration Layer
//!
//! Provider selection, context budgeting, retrying execution and usage
//! accounting for LLM-backed document generation.

pub mod executor;
pub mod health;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod tokenizer;
pub mod usage;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{CallExecutor, ExecutionSuccess, RetryMachine, RetryPolicy, RetryState, RetryStep};
pub use health::{HealthClassification, HealthTracker, ProviderHealth, ProviderMetrics};
pub use orchestrator::{
    GenerationFailure, GenerationOutput, GenerationRequest, Orchestrator, OrchestratorSettings,
    RequestThrottle,
};
pub use planner::{ContextBudgetPlanner, PlanningTier, PromptPlan, SelectedFragment};
pub use prompt::{DocumentCatalog, PromptBuilder, PromptTemplates};
pub use provider::{
    ChatMessage, ClientOptions, Completion, CredentialStore, LlmProvider, ProviderDescriptor,
    ProviderRegistry, SelectionPolicy, SharedProvider, TokenUsage,
};
pub use timeout::{TimeoutConfig, with_timeout};
pub use tokenizer::{
    CharRatioEstimator, EstimatorKind, SharedEstimator, TokenBudget, TokenEstimator, WordEstimator,
};
pub use usage::{
    ContextUsageTracker, MemoryUsageSink, UsageComponents, UsageRecord, UsageSink, UsageTexts,
};
