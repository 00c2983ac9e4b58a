//! Retry classification and backoff for provider calls.
//!
//! Classification is a pure predicate over (status, message); the backoff
//! policy is exponential with a hard cap and stays orthogonal to the
//! provider adapters.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::core::error::{Error, Result};

pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MAX_DELAY_MS: u64 = 10_000;

const RETRYABLE_MESSAGES: &[&str] = &[
    "rate limit",
    "quota exceeded",
    "service unavailable",
    "timeout",
    "connection",
    "econnrefused",
    "etimedout",
    "enotfound",
    "eai_again",
];

/// Non-retryable statuses fail immediately; 429 and 5xx retry.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|needle| lower.contains(needle))
}

/// Pure retryability predicate for a provider failure.
pub fn is_retryable(status: Option<u16>, message: &str) -> bool {
    match status {
        Some(400) | Some(401) | Some(403) => false,
        Some(status) if is_retryable_status(status) => true,
        Some(_) => is_retryable_message(message),
        None => is_retryable_message(message),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            max_delay: Duration::from_millis(MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-based): base doubled per attempt,
    /// capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as u64))
    }

    /// Run `op` with retries on retryable embedding errors.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    warn!(
                        what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after provider failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Build the embedding error for a provider failure.
pub fn embedding_error(status: Option<u16>, message: impl Into<String>) -> Error {
    let message = message.into();
    Error::Embedding {
        retryable: is_retryable(status, &message),
        message: match status {
            Some(status) => format!("HTTP {status}: {message}"),
            None => message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn auth_and_bad_request_fail_fast() {
        assert!(!is_retryable(Some(400), "bad request"));
        assert!(!is_retryable(Some(401), "unauthorized"));
        assert!(!is_retryable(Some(403), "forbidden"));
    }

    #[test]
    fn throttling_and_server_errors_retry() {
        assert!(is_retryable(Some(429), "too many requests"));
        assert!(is_retryable(Some(500), "oops"));
        assert!(is_retryable(Some(503), "unavailable"));
    }

    #[test]
    fn network_errno_messages_retry() {
        assert!(is_retryable(None, "connect ECONNREFUSED 127.0.0.1:11434"));
        assert!(is_retryable(None, "getaddrinfo ENOTFOUND host"));
        assert!(is_retryable(None, "request timeout after 30s"));
        assert!(is_retryable(None, "rate limit exceeded, slow down"));
        assert!(!is_retryable(None, "model not found"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(1000));
        assert_eq!(policy.delay(1), Duration::from_millis(2000));
        assert_eq!(policy.delay(2), Duration::from_millis(4000));
        assert_eq!(policy.delay(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay(16), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn run_retries_then_succeeds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(embedding_error(Some(429), "rate limit"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_gives_up_after_max_retries() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_retries: 2,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(embedding_error(Some(503), "unavailable")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial try + 2 retries");
    }

    #[tokio::test]
    async fn run_does_not_retry_fatal_errors() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(embedding_error(Some(401), "unauthorized")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
