use crate::error::{ApiError, ErrorClass, Result};
use crate::retry::{RetryConfig, RetryPolicy};
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// What the executor tells each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number.
    pub number: u32,
    /// The previous attempt was rejected with an expired credential, load a
    /// fresh one before signing.
    pub refresh_credential: bool,
}

/// Per call retry settings, taken from the request descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// The call is safe to send more than once.
    pub retryable: bool,
    /// Retry "not found" errors while a new resource becomes visible.
    pub retry_not_found: bool,
    /// Total wall-clock budget of the call.
    pub deadline: Option<Duration>,
}

/// Runs a call attempt by attempt until it succeeds, fails terminally, runs
/// out of attempts or out of time.
#[derive(Debug, Clone, Default)]
pub struct TransportExecutor {
    config: RetryConfig,
}

impl TransportExecutor {
    /// Create an executor using `config`.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the retry config.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `attempt_fn` under the retry policy.
    ///
    /// `attempt_fn` must sign and send a fresh request on every call. Its
    /// errors are classified with [`ApiError::class`]; the returned error
    /// records the number of attempts made.
    ///
    /// [`RetryConfig::max_attempts`] caps the total number of attempts, the
    /// one spent on a credential refresh included.
    pub async fn execute<T, F, Fut>(&self, opts: CallOptions, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = opts.deadline.map(|d| Instant::now() + d);
        let mut policy = RetryPolicy::new(self.config.clone());
        let mut attempts = 0;
        let mut refreshed = false;
        let mut refresh_credential = false;

        loop {
            attempts += 1;
            let fut = attempt_fn(Attempt {
                number: attempts,
                refresh_credential,
            });
            refresh_credential = false;

            let result = match deadline {
                Some(at) => match tokio::time::timeout_at(at, fut).await {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(ApiError::timeout(format!(
                            "deadline of {:?} exceeded during attempt {attempts}",
                            opts.deadline.unwrap_or_default()
                        ))
                        .with_attempts(attempts))
                    }
                },
                None => fut.await,
            };

            let err = match result {
                Ok(v) => return Ok(v),
                Err(err) => err,
            };

            let budget = match err.class() {
                ErrorClass::Transient if opts.retryable => self.config.max_attempts,
                ErrorClass::EventualConsistency if opts.retry_not_found => {
                    self.config.max_not_found_attempts
                }
                ErrorClass::CredentialExpired
                    if !refreshed && attempts < self.config.max_attempts =>
                {
                    debug!("credential rejected as expired, refreshing before retry: {err}");
                    refreshed = true;
                    refresh_credential = true;
                    continue;
                }
                _ => return Err(err.with_attempts(attempts)),
            };

            if attempts >= budget {
                return Err(err.with_attempts(attempts));
            }
            let Some(delay) = policy.next_delay(budget) else {
                return Err(err.with_attempts(attempts));
            };

            if let Some(at) = deadline {
                if Instant::now() + delay >= at {
                    return Err(ApiError::timeout(format!(
                        "deadline of {:?} leaves no room for attempt {}",
                        opts.deadline.unwrap_or_default(),
                        attempts + 1
                    ))
                    .with_attempts(attempts)
                    .with_source(err));
                }
            }

            warn!("attempt {attempts} failed, retrying in {delay:?}: {err}");
            tokio::time::sleep(delay).await;
        }
    }
}
