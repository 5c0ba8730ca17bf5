//! Bounded timeouts and exponential-backoff retries for outbound calls.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::warn;

use crate::api::ApiError;

/// Retry settings shared by every call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, first try included
    pub limit: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Await `fut`, failing with [`ApiError::Timeout`] after `limit`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(limit.as_millis() as u64)),
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the attempt limit is hit.
///
/// Returns the final result together with the number of attempts made.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, op: F) -> (Result<T, ApiError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    with_retry_if(policy, what, |e| e.kind().is_retryable(), op).await
}

/// Like [`with_retry`], but only errors accepted by `retryable` are retried.
pub async fn with_retry_if<T, F, Fut, R>(
    policy: &RetryPolicy,
    what: &str,
    retryable: R,
    mut op: F,
) -> (Result<T, ApiError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
    R: Fn(&ApiError) -> bool,
{
    let attempts = AtomicU32::new(0);
    let limit = policy.limit;

    let result = backoff::future::retry(policy.backoff(), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op();
        let retryable = &retryable;
        async move {
            match fut.await {
                Ok(v) => Ok(v),
                Err(e) if retryable(&e) && attempt < limit => {
                    warn!(what, attempt, limit, error = %e, "Transient failure, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await;

    (result, attempts.load(Ordering::SeqCst))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn fast(limit: u32) -> RetryPolicy {
        RetryPolicy {
            limit,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
        }
    }

    fn unavailable() -> ApiError {
        ApiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retry(&fast(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(unavailable())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_limit_is_respected() {
        let (result, attempts) = with_retry(&fast(2), "test", || async { Err::<(), _>(unavailable()) }).await;

        assert!(result.is_err());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let (result, attempts) = with_retry(&fast(5), "test", || async {
            Err::<(), _>(ApiError::Rejected("market closed".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_predicate_narrows_retries() {
        let (result, attempts) = with_retry_if(&fast(5), "test", ApiError::is_resend_safe, || async {
            Err::<(), _>(ApiError::Timeout(10))
        })
        .await;

        assert!(matches!(result, Err(ApiError::Timeout(10))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ApiError>(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::Timeout(10)));
        assert!(err.kind().is_retryable());
    }
}
