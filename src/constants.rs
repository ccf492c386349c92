//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Call executor constants
pub mod executor {
    /// Default maximum attempts per provider (first call included)
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1_000;

    /// Maximum computed backoff delay (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Upper bound on a provider-supplied retry-after hint (seconds)
    pub const MAX_RETRY_AFTER_SECS: u64 = 300;

    /// Retries allowed for empty or unparseable responses
    pub const INVALID_RESPONSE_RETRIES: u32 = 1;

    /// Jitter is drawn from `[0, delay / JITTER_DIVISOR)`
    pub const JITTER_DIVISOR: u64 = 4;
}

/// Request throttling constants
pub mod throttle {
    /// Maximum simultaneous generation requests
    pub const MAX_CONCURRENT_REQUESTS: usize = 3;

    /// Minimum spacing between request starts (milliseconds)
    pub const REQUEST_DELAY_MS: u64 = 500;
}

/// Context budget planner constants
pub mod planner {
    /// Windows at or above this size get the supplementary tier
    pub const LARGE_WINDOW_MIN: u32 = 50_000;

    /// Windows above this size get the comprehensive tier
    pub const LARGE_WINDOW_MAX: u32 = 200_000;

    /// Extra fragments added by the supplementary tier
    pub const SUPPLEMENTARY_FRAGMENTS: usize = 3;

    /// Fixed response reserve for ultra-large windows
    pub const ULTRA_WINDOW_RESERVE: u32 = 10_000;

    /// Proportional response reserve for smaller windows (percent)
    pub const DEFAULT_RESERVE_PCT: u32 = 10;

    /// Lower clamp for the proportional reserve
    pub const MIN_RESERVE: u32 = 1_024;

    /// Upper clamp for the proportional reserve
    pub const MAX_RESERVE: u32 = 8_192;

    /// Characters per token used by the default estimator
    pub const CHARS_PER_TOKEN: usize = 4;
}

/// Health tracker constants
pub mod health {
    /// Distinct error types tracked per provider
    pub const MAX_ERROR_TYPES: usize = 16;

    /// Success rate thresholds (percent)
    pub const EXCELLENT_PCT: f64 = 95.0;
    pub const GOOD_PCT: f64 = 90.0;
    pub const FAIR_PCT: f64 = 75.0;

    /// Rate-limit share above which backoff is recommended (percent)
    pub const RATE_LIMIT_WARN_PCT: f64 = 10.0;

    /// Average latency above which optimization is recommended (milliseconds)
    pub const SLOW_LATENCY_MS: f64 = 10_000.0;
}

/// Context usage tracker constants
pub mod usage {
    /// Window assumed for models missing from the descriptor table
    pub const DEFAULT_CONTEXT_WINDOW: u32 = 8_192;

    /// Utilization above which a larger window is suggested (percent)
    pub const HIGH_UTILIZATION_PCT: f64 = 80.0;

    /// Utilization below which a smaller model is suggested (percent)
    pub const LOW_UTILIZATION_PCT: f64 = 10.0;

    /// Context-to-template ratio considered disproportionate
    pub const CONTEXT_TEMPLATE_RATIO: usize = 3;

    /// Context size below which the ratio check is skipped (tokens)
    pub const CONTEXT_RATIO_MIN_TOKENS: usize = 1_000;
}

/// HTTP/Network constants
pub mod network {
    /// Default per-attempt timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}
