use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Delay between two attempts of [`with_retry`].
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// `delay * (attempt + 1)`, clamped to `max`.
    Linear { delay: Duration, max: Duration },
    /// Same delay before every retry.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Linear { delay, max } => {
                delay.saturating_mul(attempt.saturating_add(1)).min(*max)
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Linear {
            delay: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Run `operation` up to `attempts` times, returning the first success or the
/// last error.
pub async fn with_retry<T, E, F, Fut>(
    attempts: u32,
    strategy: &RetryStrategy,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(attempts, strategy, |_| true, operation).await
}

/// Like [`with_retry`], but stops early when `retryable` rejects an error.
///
/// Pair with [`CallError::is_circuit_open`](crate::CallError::is_circuit_open)
/// to avoid hammering an open circuit.
pub async fn with_retry_if<T, E, F, Fut, P>(
    attempts: u32,
    strategy: &RetryStrategy,
    retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && retryable(&err) => {
                let delay = strategy.delay_for(attempt);
                warn!(attempt = attempt + 1, attempts, ?delay, error = %err, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `primary`; if it fails, log the failure and return `fallback`'s result.
pub async fn with_fallback<T, E, P, PFut, F, FFut>(primary: P, fallback: F) -> Result<T, E>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match primary().await {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(error = %err, "primary operation failed, using fallback");
            fallback().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::CallError;

    #[test]
    fn linear_grows_and_clamps() {
        let strategy = RetryStrategy::Linear {
            delay: Duration::from_millis(500),
            max: Duration::from_secs(1),
        };
        assert_eq!(strategy.delay_for(0), Duration::from_millis(500));
        assert_eq!(strategy.delay_for(1), Duration::from_secs(1));
        assert_eq!(strategy.delay_for(7), Duration::from_secs(1));
    }

    #[test]
    fn constant_is_flat() {
        let strategy = RetryStrategy::Constant {
            delay: Duration::from_millis(250),
        };
        assert_eq!(strategy.delay_for(0), strategy.delay_for(9));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = with_retry(3, &RetryStrategy::default(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("flaky".to_string())
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_only_the_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_retry(3, &RetryStrategy::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(format!("failure {n}"))
        })
        .await;
        assert_eq!(result.unwrap_err(), "failure 2");
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_open_circuit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), CallError<String>> = with_retry_if(
            5,
            &RetryStrategy::default(),
            |e: &CallError<String>| !e.is_circuit_open(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Open {
                    circuit_id: "external:payments".into(),
                    retry_after: Duration::from_secs(10),
                })
            },
        )
        .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_swallows_primary_failure() {
        let result = with_fallback(
            || async { Err::<&str, _>("primary down".to_string()) },
            || async { Ok("cached") },
        )
        .await;
        assert_eq!(result.unwrap(), "cached");

        let result = with_fallback(
            || async { Ok::<_, String>("fresh") },
            || async { Ok("cached") },
        )
        .await;
        assert_eq!(result.unwrap(), "fresh");
    }
}
