//! Context Usage Tracking
//!
//! Post-call token accounting: how much of the model window each prompt
//! component consumed, plus advisory recommendations. Records are handed to
//! a [`UsageSink`] best-effort; sink failures are logged and never surface
//! to the caller.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::planner::PromptPlan;
use super::provider::ProviderDescriptor;
use super::tokenizer::{SharedEstimator, TokenEstimator};
use crate::constants::usage as usage_constants;
use crate::types::{PlanwrightError, Result};

/// Raw text of each prompt component plus the response
#[derive(Debug, Clone, Default)]
pub struct UsageTexts<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub context: Cow<'a, str>,
    pub template: &'a str,
    pub response: &'a str,
}

impl<'a> UsageTexts<'a> {
    /// Prompt-side texts of a plan; no response yet
    pub fn from_plan(plan: &'a PromptPlan) -> Self {
        Self {
            system: &plan.system_prompt,
            user: &plan.user_prompt,
            context: Cow::Owned(plan.context_text()),
            template: &plan.template,
            response: "",
        }
    }

    pub fn with_response(mut self, response: &'a str) -> Self {
        self.response = response;
        self
    }
}

/// Token counts per prompt component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageComponents {
    pub system: usize,
    pub user: usize,
    pub context: usize,
    pub template: usize,
    pub response: usize,
}

impl UsageComponents {
    pub fn estimate(texts: &UsageTexts<'_>, estimator: &dyn TokenEstimator) -> Self {
        Self {
            system: estimator.estimate(texts.system),
            user: estimator.estimate(texts.user),
            context: estimator.estimate(&texts.context),
            template: estimator.estimate(texts.template),
            response: estimator.estimate(texts.response),
        }
    }

    pub fn total(&self) -> usize {
        self.system + self.user + self.context + self.template + self.response
    }
}

/// Token accounting for one generation attempt chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: String,
    pub document_type: String,
    pub provider: String,
    pub model: String,
    pub components: UsageComponents,
    pub total_tokens: usize,
    pub context_window: u32,
    pub utilization_pct: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub recommendations: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for usage records
pub trait UsageSink: Send + Sync {
    fn persist(&self, record: &UsageRecord) -> Result<()>;
}

/// In-process sink, used by tests and when persistence is disabled
#[derive(Debug, Default)]
pub struct MemoryUsageSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl UsageSink for MemoryUsageSink {
    fn persist(&self, record: &UsageRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| PlanwrightError::Storage("usage sink lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

pub struct ContextUsageTracker {
    /// (provider, model) -> window
    windows: HashMap<(String, String), u32>,
    estimator: SharedEstimator,
    sink: Option<Arc<dyn UsageSink>>,
}

impl ContextUsageTracker {
    pub fn new(
        descriptors: &[ProviderDescriptor],
        estimator: SharedEstimator,
        sink: Option<Arc<dyn UsageSink>>,
    ) -> Self {
        let windows = descriptors
            .iter()
            .flat_map(|d| {
                d.models
                    .iter()
                    .map(move |(model, window)| ((d.id.clone(), model.clone()), *window))
            })
            .collect();
        Self {
            windows,
            estimator,
            sink,
        }
    }

    /// Window for `model` on `provider`; conservative default when unknown
    pub fn window_for(&self, provider: &str, model: &str) -> u32 {
        self.windows
            .get(&(provider.to_string(), model.to_string()))
            .copied()
            .unwrap_or(usage_constants::DEFAULT_CONTEXT_WINDOW)
    }

    /// Estimate every component, persist the record (best-effort) and
    /// return it.
    ///
    /// The sink runs on the blocking pool so storage I/O never holds up
    /// an async worker.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        request_id: &str,
        document_type: &str,
        texts: &UsageTexts<'_>,
        provider: &str,
        model: &str,
        duration_ms: u64,
        success: bool,
    ) -> UsageRecord {
        let components = UsageComponents::estimate(texts, self.estimator.as_ref());
        let context_window = self.window_for(provider, model);
        let total_tokens = components.total();
        let utilization_pct = if context_window == 0 {
            0.0
        } else {
            total_tokens as f64 / context_window as f64 * 100.0
        };

        let record = UsageRecord {
            request_id: request_id.to_string(),
            document_type: document_type.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            components,
            total_tokens,
            context_window,
            utilization_pct,
            duration_ms,
            success,
            recommendations: recommendations(&components, utilization_pct, context_window),
            recorded_at: Utc::now(),
        };

        debug!(
            request_id,
            provider,
            model,
            total_tokens,
            estimator = self.estimator.name(),
            utilization = format!("{:.1}%", utilization_pct),
            "Recorded context usage"
        );

        if let Some(sink) = &self.sink {
            let sink = Arc::clone(sink);
            let pending = record.clone();
            match tokio::task::spawn_blocking(move || sink.persist(&pending)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(request_id, error = %e, "Failed to persist usage record"),
                Err(e) => warn!(request_id, error = %e, "Usage persistence task failed"),
            }
        }

        record
    }
}

fn recommendations(c: &UsageComponents, utilization_pct: f64, window: u32) -> Vec<String> {
    let mut out = Vec::new();

    if utilization_pct > usage_constants::HIGH_UTILIZATION_PCT {
        out.push(format!(
            "Used {:.1}% of the {}-token window: consider a model with a larger context window",
            utilization_pct, window
        ));
    } else if utilization_pct < usage_constants::LOW_UTILIZATION_PCT {
        out.push(format!(
            "Used only {:.1}% of the {}-token window: a smaller, cheaper model would suffice",
            utilization_pct, window
        ));
    }

    if c.context >= usage_constants::CONTEXT_RATIO_MIN_TOKENS
        && c.context > c.template * usage_constants::CONTEXT_TEMPLATE_RATIO
    {
        out.push(format!(
            "Context ({} tokens) is more than {}x the template ({} tokens): filter context to the most relevant fragments",
            c.context,
            usage_constants::CONTEXT_TEMPLATE_RATIO,
            c.template
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::descriptor;
    use crate::ai::tokenizer::{EstimatorKind, default_estimator};

    struct FailingSink;

    impl UsageSink for FailingSink {
        fn persist(&self, _record: &UsageRecord) -> Result<()> {
            Err(PlanwrightError::Storage("disk full".to_string()))
        }
    }

    /// Component texts sized to an exact token count under `ceil(chars / 4)`
    struct Sized {
        system: String,
        user: String,
        context: String,
        template: String,
        response: String,
    }

    impl Sized {
        fn new(context: usize, template: usize, response: usize) -> Self {
            let text = |tokens: usize| "abcd".repeat(tokens);
            Self {
                system: text(100),
                user: text(100),
                context: text(context),
                template: text(template),
                response: text(response),
            }
        }

        fn texts(&self) -> UsageTexts<'_> {
            UsageTexts {
                system: &self.system,
                user: &self.user,
                context: Cow::Borrowed(&self.context),
                template: &self.template,
                response: &self.response,
            }
        }
    }

    fn tracker(sink: Option<Arc<dyn UsageSink>>) -> ContextUsageTracker {
        ContextUsageTracker::new(&[descriptor("a", 1)], default_estimator(), sink)
    }

    #[test]
    fn test_window_lookup_and_default() {
        let tracker = tracker(None);
        assert_eq!(tracker.window_for("a", "large"), 128_000);
        assert_eq!(tracker.window_for("a", "unknown"), 8_192);
        assert_eq!(tracker.window_for("zzz", "large"), 8_192);
    }

    #[tokio::test]
    async fn test_record_computes_utilization() {
        let sink = Arc::new(MemoryUsageSink::new());
        let tracker = tracker(Some(sink.clone()));

        // 100 + 100 + 2000 + 400 + 1000 = 3600 of 16000
        let sized = Sized::new(2_000, 400, 1_000);
        let record = tracker
            .record("req-1", "risk-register", &sized.texts(), "a", "small", 250, true)
            .await;

        assert_eq!(record.total_tokens, 3_600);
        assert_eq!(record.context_window, 16_000);
        assert!((record.utilization_pct - 22.5).abs() < 1e-9);
        assert!(record.recommendations.iter().any(|r| r.contains("filter context")));
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.records()[0].request_id, "req-1");
    }

    #[tokio::test]
    async fn test_response_tokens_estimated_from_text() {
        let tracker = tracker(None);
        let response = "x".repeat(4_000);
        let texts = UsageTexts::default().with_response(&response);

        let record = tracker.record("r", "d", &texts, "a", "small", 1, true).await;
        assert_eq!(record.components.response, 1_000);
        assert_eq!(record.total_tokens, 1_000);
    }

    #[tokio::test]
    async fn test_word_estimator_changes_counts() {
        let tracker = ContextUsageTracker::new(
            &[descriptor("a", 1)],
            EstimatorKind::Word.build(),
            None,
        );
        let texts = UsageTexts::default().with_response("one two three four");
        let record = tracker.record("r", "d", &texts, "a", "small", 1, true).await;
        assert_eq!(record.components.response, 4);
    }

    #[tokio::test]
    async fn test_high_and_low_utilization_advice() {
        let tracker = tracker(None);

        let sized = Sized::new(500, 500, 12_000);
        let high = tracker.record("r", "d", &sized.texts(), "a", "small", 1, true).await;
        assert!(high.utilization_pct > 80.0);
        assert!(high.recommendations[0].contains("larger context window"));

        let sized = Sized::new(500, 500, 100);
        let low = tracker.record("r", "d", &sized.texts(), "a", "large", 1, true).await;
        assert!(low.utilization_pct < 10.0);
        assert!(low.recommendations[0].contains("smaller, cheaper"));
    }

    #[tokio::test]
    async fn test_context_ratio_needs_minimum_context() {
        let tracker = tracker(None);
        // 4x template but under 1000 context tokens: no filter advice
        let sized = Sized::new(800, 200, 2_000);
        let record = tracker.record("r", "d", &sized.texts(), "a", "small", 1, true).await;
        assert!(!record.recommendations.iter().any(|r| r.contains("filter context")));
    }

    /// Remembers which thread persisted each record
    #[derive(Default)]
    struct ThreadSink {
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl UsageSink for ThreadSink {
        fn persist(&self, _record: &UsageRecord) -> Result<()> {
            self.threads
                .lock()
                .unwrap()
                .push(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_runs_off_the_async_thread() {
        let sink = Arc::new(ThreadSink::default());
        let tracker = tracker(Some(sink.clone()));

        tracker
            .record("r", "d", &UsageTexts::default(), "a", "small", 1, true)
            .await;

        let threads = sink.threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let tracker = tracker(Some(Arc::new(FailingSink)));
        let record = tracker
            .record("r", "d", &UsageTexts::default(), "a", "small", 1, false)
            .await;
        assert!(!record.success);
        assert_eq!(record.components.response, 0);
    }
}
