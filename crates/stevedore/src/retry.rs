//! Shared retry configuration for API calls.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Default number of retries per request.
pub const DEFAULT_RETRY_COUNT: usize = 3;

/// Base backoff interval in seconds. Attempt `n` sleeps `interval^n`.
pub const RETRY_INTERVAL_SECS: u64 = 2;

/// Maximum backoff delay in seconds.
pub const MAX_BACKOFF_SECS: u64 = 60;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay; successive attempts grow exponentially from here.
    pub interval: Duration,
    /// Maximum number of retry attempts after the initial call.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(RETRY_INTERVAL_SECS),
            max_retries: DEFAULT_RETRY_COUNT,
            with_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with a custom attempt budget.
    #[must_use]
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Set the base interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    ///
    /// With the 2-second base interval this yields the 2s, 4s, 8s, ...
    /// schedule, capped at [`MAX_BACKOFF_SECS`].
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.interval)
            .with_factor(2.0)
            .with_max_delay(Duration::from_secs(MAX_BACKOFF_SECS))
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}
