//! Planwright - Multi-Provider Document Generation
//!
//! Generates structured project documents (charters, risk registers, user
//! stories, ...) from a caller-supplied context graph, using whichever LLM
//! backend is configured and healthy.
//!
//! ## Core Features
//!
//! - **Provider Registry**: OpenAI, Google Gemini, Azure OpenAI and Ollama
//!   adapters behind one trait, initialized lazily and exactly once
//! - **Context Budgeting**: tiered fragment selection that always fits the
//!   model window
//! - **Resilient Execution**: classified errors, backoff with jitter,
//!   provider failover
//! - **Telemetry**: provider health and per-request context usage
//!
//! ## Quick Start
//!
//! ```ignore
//! use planwright::{ConfigLoader, GenerationRequest};
//! use planwright::cli::CommandContext;
//!
//! let ctx = CommandContext::load()?;
//! let orchestrator = ctx.orchestrator(true)?;
//! let request = GenerationRequest::new("project-charter", Arc::new(graph));
//! let output = orchestrator.generate(request).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, planner, executor, health and usage tracking
//! - [`config`]: layered configuration
//! - [`storage`]: SQLite usage persistence
//! - [`types`]: errors and context graph types

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};

pub use types::error::{ErrorKind, LlmError, PlanwrightError, Result, ResultExt};
pub use types::{ContextFragment, ContextGraph};

pub use storage::{Database, PoolConfig, SharedDatabase, SqliteUsageSink};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    ContextBudgetPlanner, GenerationFailure, GenerationOutput, GenerationRequest, HealthTracker,
    LlmProvider, Orchestrator, OrchestratorSettings, PromptPlan, ProviderDescriptor,
    ProviderRegistry, TimeoutConfig, UsageRecord, UsageSink, with_timeout,
};
