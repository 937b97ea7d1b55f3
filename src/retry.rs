//! Retry with bounded attempts and exponential backoff
//!
//! Used by the step dispatcher for any collaborator marked network-sensitive.
//! Classification prefers the structured error category supplied by the
//! collaborator; substring/regex patterns on the error text remain as a
//! fallback for collaborators that cannot categorize their failures.

use crate::handler::ErrorCategory;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt; total attempts = max_retries + 1
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    /// Multiplier applied per attempt: delay = base * multiplier^(attempt-1)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Add jitter to delays
    #[serde(default)]
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Only retry failures matching one of these; empty means the built-in
    /// transient classification applies
    #[serde(default)]
    pub retry_on: Vec<ErrorMatcher>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            jitter: false,
            jitter_factor: default_jitter_factor(),
            retry_on: Vec::new(),
        }
    }
}

/// Matchers for retriable failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMatcher {
    /// Structured category reported by the collaborator
    Category(ErrorCategory),
    /// Regex applied to the error text (fallback classification)
    Pattern(String),
    /// Network-related errors, by category or text
    Network,
    /// Timeouts, by category or text
    Timeout,
    /// Rate limiting, by category or text
    RateLimit,
}

impl ErrorMatcher {
    pub fn matches(&self, failure: &StepFailure) -> bool {
        let text = failure.message.to_lowercase();
        match self {
            ErrorMatcher::Category(category) => failure.category == Some(*category),
            ErrorMatcher::Pattern(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(&failure.message))
                .unwrap_or(false),
            ErrorMatcher::Network => {
                failure.category == Some(ErrorCategory::Network)
                    || text.contains("network")
                    || text.contains("connection")
                    || text.contains("refused")
                    || text.contains("unreachable")
            }
            ErrorMatcher::Timeout => {
                failure.category == Some(ErrorCategory::Timeout)
                    || text.contains("timeout")
                    || text.contains("timed out")
            }
            ErrorMatcher::RateLimit => {
                failure.category == Some(ErrorCategory::RateLimit)
                    || text.contains("rate limit")
                    || text.contains("429")
                    || text.contains("too many requests")
            }
        }
    }
}

/// A collaborator-reported failure carried through the retry loop
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub message: String,
    pub category: Option<ErrorCategory>,
}

impl StepFailure {
    pub fn new(message: impl Into<String>, category: Option<ErrorCategory>) -> Self {
        Self {
            message: message.into(),
            category,
        }
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub attempts: u32,
    pub last_error: Option<StepFailure>,
}

impl<T> RetryOutcome<T> {
    pub fn success(&self) -> bool {
        self.value.is_some()
    }
}

/// Executes operations under a retry policy
#[derive(Debug, Clone, Default)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, the failure is non-retriable, or
    /// attempts are exhausted
    pub async fn execute_with_retry<F, Fut, T>(&self, operation: F, label: &str) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, StepFailure>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "operation recovered after retries");
                    }
                    return RetryOutcome {
                        value: Some(value),
                        attempts: attempt,
                        last_error: None,
                    };
                }
                Err(failure) => {
                    let exhausted = attempt > self.policy.max_retries;
                    if exhausted || !self.is_retriable(&failure) {
                        debug!(
                            label,
                            attempt,
                            exhausted,
                            error = %failure.message,
                            "giving up"
                        );
                        return RetryOutcome {
                            value: None,
                            attempts: attempt,
                            last_error: Some(failure),
                        };
                    }

                    let delay = self.apply_jitter(self.delay_for_attempt(attempt));
                    info!(
                        label,
                        attempt,
                        max = self.policy.max_retries + 1,
                        ?delay,
                        error = %failure.message,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn is_retriable(&self, failure: &StepFailure) -> bool {
        if !self.policy.retry_on.is_empty() {
            return self
                .policy
                .retry_on
                .iter()
                .any(|matcher| matcher.matches(failure));
        }

        // No explicit matchers: structured category wins, text fallback second
        match failure.category {
            Some(category) => category.is_transient(),
            None => [
                ErrorMatcher::Network,
                ErrorMatcher::Timeout,
                ErrorMatcher::RateLimit,
            ]
            .iter()
            .any(|matcher| matcher.matches(failure)),
        }
    }

    /// delay = min(base_delay * multiplier^(attempt-1), max_delay)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.policy.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = Duration::from_secs_f64(self.policy.base_delay.as_secs_f64() * multiplier);
        delay.min(self.policy.max_delay)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.policy.jitter {
            return delay;
        }
        let mut rng = rand::rng();
        let range = delay.as_secs_f64() * self.policy.jitter_factor;
        let jitter = rng.random_range(-range / 2.0..=range / 2.0);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter_factor() -> f64 {
    0.3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn immediate_success_is_one_attempt() {
        let coordinator = RetryCoordinator::new(fast_policy(3));
        let outcome = coordinator
            .execute_with_retry(|| async { Ok::<_, StepFailure>(7) }, "test")
            .await;
        assert!(outcome.success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.value, Some(7));
    }

    #[tokio::test]
    async fn transient_failures_then_success() {
        let coordinator = RetryCoordinator::new(fast_policy(3));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_for_op = counter.clone();

        let outcome = coordinator
            .execute_with_retry(
                || {
                    let counter = counter_for_op.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 {
                            Err(StepFailure::new(
                                "connection refused",
                                Some(ErrorCategory::Network),
                            ))
                        } else {
                            Ok(n)
                        }
                    }
                },
                "flaky",
            )
            .await;

        assert!(outcome.success());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn attempts_bounded_by_max_retries_plus_one() {
        let coordinator = RetryCoordinator::new(fast_policy(2));
        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async {
                    Err(StepFailure::new(
                        "network unreachable",
                        Some(ErrorCategory::Network),
                    ))
                },
                "hopeless",
            )
            .await;

        assert!(!outcome.success());
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.last_error.is_some());
    }

    #[tokio::test]
    async fn non_retriable_category_fails_fast() {
        let coordinator = RetryCoordinator::new(fast_policy(5));
        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async {
                    Err(StepFailure::new(
                        "bad configuration",
                        Some(ErrorCategory::Configuration),
                    ))
                },
                "fatal",
            )
            .await;

        assert!(!outcome.success());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn uncategorized_error_uses_text_fallback() {
        let coordinator = RetryCoordinator::new(fast_policy(1));

        // "timed out" text is retriable without a category
        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async { Err(StepFailure::new("request timed out", None)) },
                "fallback",
            )
            .await;
        assert_eq!(outcome.attempts, 2);

        // Plain errors are not
        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async { Err(StepFailure::new("syntax error", None)) },
                "fallback",
            )
            .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn explicit_matcher_list_overrides_defaults() {
        let policy = RetryPolicy {
            retry_on: vec![ErrorMatcher::Pattern("exit code 7".to_string())],
            ..fast_policy(1)
        };
        let coordinator = RetryCoordinator::new(policy);

        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async { Err(StepFailure::new("exit code 7", None)) },
                "pattern",
            )
            .await;
        assert_eq!(outcome.attempts, 2);

        let outcome: RetryOutcome<()> = coordinator
            .execute_with_retry(
                || async {
                    // Network category no longer retriable once an explicit list is set
                    Err(StepFailure::new("boom", Some(ErrorCategory::Network)))
                },
                "pattern",
            )
            .await;
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn exponential_backoff_with_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        let coordinator = RetryCoordinator::new(policy);

        assert_eq!(coordinator.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(coordinator.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(coordinator.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(coordinator.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(coordinator.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            jitter_factor: 0.5,
            ..Default::default()
        };
        let coordinator = RetryCoordinator::new(policy);
        for _ in 0..20 {
            let jittered = coordinator.apply_jitter(Duration::from_secs(10));
            let secs = jittered.as_secs_f64();
            assert!((5.0..=15.0).contains(&secs));
        }
    }

    #[test]
    fn matcher_category_and_pattern() {
        let net = StepFailure::new("boom", Some(ErrorCategory::Network));
        assert!(ErrorMatcher::Category(ErrorCategory::Network).matches(&net));
        assert!(!ErrorMatcher::Category(ErrorCategory::Timeout).matches(&net));
        assert!(ErrorMatcher::Network.matches(&net));

        let textual = StepFailure::new("HTTP 429 too many requests", None);
        assert!(ErrorMatcher::RateLimit.matches(&textual));
        assert!(ErrorMatcher::Pattern("429".to_string()).matches(&textual));
    }
}
