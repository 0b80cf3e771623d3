//! Bounded retry with exponential backoff for engine calls.
//!
//! Only transient failures are retried; fatal provider errors surface
//! immediately. The core adds no wall-clock limit beyond these attempts.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::engines::EngineResult;
#[cfg(test)]
use crate::engines::EngineError;

/// Maximum attempts per engine call.
const MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry; doubles per attempt.
const BASE_DELAY: Duration = Duration::from_millis(200);

/// Run an engine call with bounded exponential backoff on transient errors.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first fatal
/// error immediately.
pub async fn with_backoff<T, F, Fut>(op: &'static str, mut call: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut delay = BASE_DELAY;
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(op, attempt, error = %error, "transient engine failure; retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test_op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Transient {
                        op: "test_op",
                        detail: "rate limited".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.expect("eventually succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: EngineResult<()> = with_backoff("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(EngineError::Fatal {
                    op: "test_op",
                    detail: "bad request".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: EngineResult<()> = with_backoff("test_op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(EngineError::Transient {
                    op: "test_op",
                    detail: "timeout".to_string(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
