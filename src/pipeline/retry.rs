//! Bounded retry for calls to external collaborators.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::errors::{PipelineError, ServiceError};

/// Fixed-delay retry that only retries connection failures.
///
/// Any other [`ServiceError`] (HTTP status, decode, timeout) fails
/// immediately as `PermanentExternal`. After `max_attempts` connection
/// failures the last error is wrapped in `TransientExternal`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_secs(config.delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails permanently or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. `on_retry(attempt, err)` is
    /// called before sleeping, so callers can surface a retry notice.
    pub async fn run<T, F, Fut, R>(
        &self,
        stage: &str,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
        R: FnMut(u32, &ServiceError),
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max => {
                    tracing::warn!(stage, attempt, max, error = %err, "retrying after connection failure");
                    on_retry(attempt, &err);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(PipelineError::TransientExternal {
                        stage: stage.to_string(),
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => return Err(PipelineError::PermanentExternal(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    fn refused() -> ServiceError {
        ServiceError::Connect {
            service: "ocr".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut notices = Vec::new();
        let result = quick()
            .run(
                "extract-text",
                |attempt| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if attempt < 3 { Err(refused()) } else { Ok("text") }
                    }
                },
                |attempt, _| notices.push(attempt),
            )
            .await;
        assert_eq!(result.unwrap(), "text");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(notices, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempt_count() {
        let result: Result<(), _> = quick()
            .run("extract-text", |_| async { Err(refused()) }, |_, _| {})
            .await;
        match result {
            Err(err @ PipelineError::TransientExternal { attempts: 3, .. }) => {
                assert!(err.to_string().contains("3 attempts"));
                assert!(err.to_string().contains("connection refused"));
            }
            other => panic!("Expected TransientExternal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_status_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = quick()
            .run(
                "extract-text",
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(ServiceError::Status {
                            service: "ocr".to_string(),
                            status: 503,
                            body: String::new(),
                        })
                    }
                },
                |_, _| {},
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(PipelineError::PermanentExternal(_))));
    }

    #[tokio::test]
    async fn test_decode_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let _ = quick()
            .run(
                "extract-text",
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(ServiceError::Decode {
                            service: "ocr".to_string(),
                            message: "bad line".to_string(),
                        })
                    }
                },
                |_, _| {},
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            delay_secs: 2,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }
}
