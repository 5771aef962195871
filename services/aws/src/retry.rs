//! Retry policy with exponential backoff and jitter.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of transport attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff strategy to use.
    pub backoff: BackoffStrategy,
    /// Maximum attempts while waiting for a newly created resource to
    /// become visible. Only used when a call opts in.
    pub max_not_found_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(20),
            backoff: BackoffStrategy::ExponentialWithJitter { factor: 2.0 },
            max_not_found_attempts: 3,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given max attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Create a new retry config with the given initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a new retry config with the given max delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Create a new retry config with the given backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Create a new retry config with the given not-found budget.
    pub fn with_max_not_found_attempts(mut self, attempts: u32) -> Self {
        self.max_not_found_attempts = attempts;
        self
    }

    /// Send every call exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            max_not_found_attempts: 1,
            ..Default::default()
        }
    }
}

/// Backoff strategy for determining retry delays.
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant,
    /// Linear increase in delay (delay * attempt).
    Linear,
    /// Exponential increase in delay (delay * factor^attempt).
    Exponential { factor: f64 },
    /// Exponential with random jitter to avoid thundering herd.
    ///
    /// The delay lies in `[base, 2 * base)`, so successive delays never
    /// shrink as long as `factor >= 2`.
    ExponentialWithJitter { factor: f64 },
}

impl BackoffStrategy {
    /// Calculate the delay for a given retry number (0-indexed).
    pub fn delay(&self, retry: u32, initial_delay: Duration, max_delay: Duration) -> Duration {
        let delay = match self {
            BackoffStrategy::Constant => initial_delay,
            BackoffStrategy::Linear => initial_delay.saturating_mul(retry + 1),
            BackoffStrategy::Exponential { factor } => {
                let multiplier = factor.powi(retry as i32);
                secs_f64_saturating(initial_delay.as_secs_f64() * multiplier, max_delay)
            }
            BackoffStrategy::ExponentialWithJitter { factor } => {
                let base_multiplier = factor.powi(retry as i32);
                let base_delay = initial_delay.as_secs_f64() * base_multiplier;

                // Add jitter: random value between 0 and base_delay
                let jitter = rand::thread_rng().gen::<f64>() * base_delay;

                secs_f64_saturating(base_delay + jitter, max_delay)
            }
        };

        std::cmp::min(delay, max_delay)
    }
}

/// `Duration::from_secs_f64` panics on overflow, large exponents fall back to `max`.
fn secs_f64_saturating(secs: f64, max: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(max)
}

/// Retry policy that determines when and how to retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
}

impl RetryPolicy {
    /// Create a new retry policy from config.
    pub fn new(config: RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns true if another attempt fits in `budget` total attempts.
    pub fn should_retry(&self, budget: u32) -> bool {
        self.attempt + 1 < budget
    }

    /// Record a retry and return the delay before it.
    ///
    /// Returns None once `budget` total attempts have been used.
    pub fn next_delay(&mut self, budget: u32) -> Option<Duration> {
        if !self.should_retry(budget) {
            return None;
        }

        let delay = self.config.backoff.delay(
            self.attempt,
            self.config.initial_delay,
            self.config.max_delay,
        );

        self.attempt += 1;
        Some(delay)
    }
}
