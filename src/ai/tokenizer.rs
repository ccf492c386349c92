//! Token Estimation and Budget Accounting
//!
//! Token counts drive every budgeting decision in the planner and the usage
//! tracker, so estimation is behind the [`TokenEstimator`] trait and can be
//! swapped per provider for a real tokenizer.
//!
//! ## Approximation bias
//!
//! The default [`CharRatioEstimator`] uses `ceil(chars / 4)`. It is cheap and
//! deterministic but is NOT a tokenizer: it undercounts text dense in
//! punctuation, code, numbers and non-Latin scripts (where a token is often
//! one or two characters) and overcounts long common English words. Budgets
//! computed with it should be validated against real tokenizer output before
//! running near a model's limit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::planner::CHARS_PER_TOKEN;

/// Pluggable token estimator
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`
    fn estimate(&self, text: &str) -> usize;

    /// Estimator name for logging
    fn name(&self) -> &str;
}

/// Shared estimator handle
pub type SharedEstimator = Arc<dyn TokenEstimator>;

/// Character-ratio estimator: `ceil(chars / chars_per_token)`
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn name(&self) -> &str {
        "char-ratio"
    }
}

/// Word-based estimator (0.75 tokens per word, plus one)
#[derive(Debug, Clone, Copy, Default)]
pub struct WordEstimator;

impl TokenEstimator for WordEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let words = text.split_whitespace().count();
        (words as f32 * 0.75).ceil() as usize + 1
    }

    fn name(&self) -> &str {
        "word"
    }
}

/// Estimator selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    CharRatio,
    Word,
}

impl EstimatorKind {
    pub fn build(self) -> SharedEstimator {
        match self {
            Self::CharRatio => Arc::new(CharRatioEstimator::default()),
            Self::Word => Arc::new(WordEstimator),
        }
    }
}

/// Default estimator used across the crate
pub fn default_estimator() -> SharedEstimator {
    EstimatorKind::default().build()
}

/// Running token budget for a single prompt
#[derive(Debug, Clone)]
pub struct TokenBudget {
    max_tokens: usize,
    current_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            current_tokens: 0,
        }
    }

    /// Whether `tokens` more would still fit
    pub fn fits(&self, tokens: usize) -> bool {
        self.current_tokens + tokens <= self.max_tokens
    }

    /// Reserve `tokens` if they fit; returns false and leaves the budget
    /// untouched otherwise.
    pub fn try_add(&mut self, tokens: usize) -> bool {
        if self.fits(tokens) {
            self.current_tokens += tokens;
            true
        } else {
            debug!(
                "Cannot add {} tokens, would exceed budget: {}/{}",
                tokens,
                self.current_tokens + tokens,
                self.max_tokens
            );
            false
        }
    }

    /// Unconditionally account for `tokens` (used for mandatory prompt text)
    pub fn force_add(&mut self, tokens: usize) {
        self.current_tokens += tokens;
    }

    pub fn current(&self) -> usize {
        self.current_tokens
    }

    pub fn max(&self) -> usize {
        self.max_tokens
    }

    pub fn remaining(&self) -> usize {
        self.max_tokens.saturating_sub(self.current_tokens)
    }

    pub fn is_exceeded(&self) -> bool {
        self.current_tokens > self.max_tokens
    }

    /// Utilization percentage
    pub fn utilization(&self) -> f64 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.current_tokens as f64 / self.max_tokens as f64 * 100.0
    }
}
