//! Provider Health Tracking
//!
//! Per-provider rolling counters, a coarse health classification and a
//! textual recommendation. Thread-safe for concurrent requests: each
//! provider's counters live in one `DashMap` entry and are updated under
//! that entry's shard lock.
//!
//! ## Usage
//!
//! ```ignore
//! let health = HealthTracker::default();
//! health.record("openai", false, 850, Some("rate_limit"));
//! assert_eq!(health.classify("openai"), HealthClassification::Poor);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::health;
use crate::types::ErrorKind;

// =============================================================================
// Metrics
// =============================================================================

/// Rolling counters for one provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub total_response_time_ms: u64,
    pub rate_limit_hits: u64,
    /// Error type -> count, bounded in cardinality
    pub error_types: BTreeMap<String, u64>,
    pub last_call_at: Option<DateTime<Utc>>,
}

impl ProviderMetrics {
    /// Success rate in percent; 100 when nothing has been recorded
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            100.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64 * 100.0
        }
    }

    pub fn rate_limit_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.rate_limit_hits as f64 / self.total_calls as f64 * 100.0
        }
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.total_calls as f64
        }
    }
}

/// Coarse health bucket derived from the success rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthClassification {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthClassification {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= health::EXCELLENT_PCT {
            Self::Excellent
        } else if rate >= health::GOOD_PCT {
            Self::Good
        } else if rate >= health::FAIR_PCT {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

impl std::fmt::Display for HealthClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time health view of one provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub classification: HealthClassification,
    pub recommendation: String,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub metrics: ProviderMetrics,
}

// =============================================================================
// Tracker
// =============================================================================

pub struct HealthTracker {
    metrics: DashMap<String, ProviderMetrics>,
    max_error_types: usize,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(health::MAX_ERROR_TYPES)
    }
}

impl HealthTracker {
    pub fn new(max_error_types: usize) -> Self {
        Self {
            metrics: DashMap::new(),
            max_error_types,
        }
    }

    /// Record one call attempt.
    ///
    /// Error types beyond the cardinality cap are not added, but existing
    /// keys keep counting.
    pub fn record(&self, provider: &str, success: bool, latency_ms: u64, error_type: Option<&str>) {
        let mut entry = self.metrics.entry(provider.to_string()).or_default();
        let m = entry.value_mut();

        m.total_calls += 1;
        m.total_response_time_ms = m.total_response_time_ms.saturating_add(latency_ms);
        m.last_call_at = Some(Utc::now());

        if success {
            m.successful_calls += 1;
            return;
        }

        m.failed_calls += 1;
        if let Some(kind) = error_type {
            if kind == ErrorKind::RateLimit.as_str() {
                m.rate_limit_hits += 1;
            }
            if let Some(count) = m.error_types.get_mut(kind) {
                *count += 1;
            } else if m.error_types.len() < self.max_error_types {
                m.error_types.insert(kind.to_string(), 1);
            } else {
                debug!(provider, error_type = kind, "Error type cap reached, dropping key");
            }
        }
    }

    /// Metrics for `provider` (zeroed if never recorded)
    pub fn metrics(&self, provider: &str) -> ProviderMetrics {
        self.metrics
            .get(provider)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn classify(&self, provider: &str) -> HealthClassification {
        HealthClassification::from_success_rate(self.metrics(provider).success_rate())
    }

    /// First matching recommendation for `provider`
    pub fn recommend(&self, provider: &str) -> String {
        recommendation_for(&self.metrics(provider))
    }

    pub fn reset(&self, provider: &str) {
        self.metrics.remove(provider);
    }

    pub fn reset_all(&self) {
        self.metrics.clear();
    }

    /// Health of every provider that has recorded calls, sorted by id
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let mut out: Vec<ProviderHealth> = self
            .metrics
            .iter()
            .map(|entry| {
                let metrics = entry.value().clone();
                ProviderHealth {
                    provider: entry.key().clone(),
                    classification: HealthClassification::from_success_rate(
                        metrics.success_rate(),
                    ),
                    recommendation: recommendation_for(&metrics),
                    success_rate: metrics.success_rate(),
                    average_latency_ms: metrics.average_latency_ms(),
                    metrics,
                }
            })
            .collect();
        out.sort_by(|a, b| a.provider.cmp(&b.provider));
        out
    }
}

fn recommendation_for(m: &ProviderMetrics) -> String {
    let success = m.success_rate();
    if success < health::FAIR_PCT {
        return format!(
            "Success rate is {:.1}%: switch to another provider or check this provider's configuration",
            success
        );
    }

    let rate_limited = m.rate_limit_rate();
    if rate_limited > health::RATE_LIMIT_WARN_PCT {
        return format!(
            "Rate limited on {:.1}% of calls: increase backoff or upgrade the API plan",
            rate_limited
        );
    }

    let latency = m.average_latency_ms();
    if latency > health::SLOW_LATENCY_MS {
        return format!(
            "Average latency is {:.0}ms: use a faster model or reduce prompt size",
            latency
        );
    }

    "Provider is performing well".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_calls_is_excellent() {
        let tracker = HealthTracker::default();
        assert_eq!(tracker.classify("openai"), HealthClassification::Excellent);
        assert_eq!(tracker.recommend("openai"), "Provider is performing well");
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(
            HealthClassification::from_success_rate(95.0),
            HealthClassification::Excellent
        );
        assert_eq!(
            HealthClassification::from_success_rate(94.9),
            HealthClassification::Good
        );
        assert_eq!(
            HealthClassification::from_success_rate(90.0),
            HealthClassification::Good
        );
        assert_eq!(
            HealthClassification::from_success_rate(75.0),
            HealthClassification::Fair
        );
        assert_eq!(
            HealthClassification::from_success_rate(74.9),
            HealthClassification::Poor
        );
    }

    #[test]
    fn test_record_counts() {
        let tracker = HealthTracker::default();
        tracker.record("a", true, 100, None);
        tracker.record("a", false, 300, Some("network"));
        tracker.record("a", false, 200, Some("network"));

        let m = tracker.metrics("a");
        assert_eq!(m.total_calls, 3);
        assert_eq!(m.successful_calls, 1);
        assert_eq!(m.failed_calls, 2);
        assert_eq!(m.total_response_time_ms, 600);
        assert_eq!(m.error_types.get("network"), Some(&2));
        assert_eq!(m.average_latency_ms(), 200.0);
        assert_eq!(tracker.classify("a"), HealthClassification::Poor);
    }

    #[test]
    fn test_error_type_cap() {
        let tracker = HealthTracker::new(2);
        tracker.record("p", false, 1, Some("one"));
        tracker.record("p", false, 1, Some("two"));
        tracker.record("p", false, 1, Some("three"));
        tracker.record("p", false, 1, Some("one"));

        let m = tracker.metrics("p");
        assert_eq!(m.error_types.len(), 2);
        assert_eq!(m.error_types.get("one"), Some(&2));
        assert!(!m.error_types.contains_key("three"));
        assert_eq!(m.failed_calls, 4);
    }

    #[test]
    fn test_recommendation_order() {
        let tracker = HealthTracker::default();

        // 80% success, 20% rate limited -> rate limit advice
        for _ in 0..8 {
            tracker.record("rl", true, 100, None);
        }
        tracker.record("rl", false, 100, Some("rate_limit"));
        tracker.record("rl", false, 100, Some("rate_limit"));
        assert!(tracker.recommend("rl").contains("Rate limited"));
        assert_eq!(tracker.metrics("rl").rate_limit_hits, 2);

        // Healthy but slow
        tracker.record("slow", true, 12_000, None);
        assert!(tracker.recommend("slow").contains("latency"));

        // Failing dominates everything else
        tracker.record("bad", false, 20_000, Some("rate_limit"));
        assert!(tracker.recommend("bad").contains("switch"));
    }

    #[test]
    fn test_reset() {
        let tracker = HealthTracker::default();
        tracker.record("a", false, 1, Some("timeout"));
        tracker.record("b", true, 1, None);
        tracker.reset("a");
        assert_eq!(tracker.metrics("a").total_calls, 0);
        assert_eq!(tracker.metrics("b").total_calls, 1);
        tracker.reset_all();
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let tracker = Arc::new(HealthTracker::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record("shared", i % 2 == 0, 1, Some("network"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let m = tracker.metrics("shared");
        assert_eq!(m.total_calls, 800);
        assert_eq!(m.successful_calls + m.failed_calls, 800);
    }

    #[test]
    fn test_snapshot_serializes() {
        let tracker = HealthTracker::default();
        tracker.record("openai", true, 50, None);
        let json = serde_json::to_value(tracker.snapshot()).unwrap();
        assert_eq!(json[0]["provider"], "openai");
        assert_eq!(json[0]["classification"], "excellent");
    }
}
