//! Database retry logic
//!
//! Transient database failures (connection drops, pool timeouts,
//! serialization conflicts) are retried locally before surfacing as run
//! failures. Uniqueness violations never reach here; the store treats them
//! as idempotent success.

use crate::{Error, Result};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF: Duration = Duration::from_millis(100);

/// Whether an error is worth a local retry.
pub fn is_transient(error: &Error) -> bool {
    match error {
        Error::Database(sqlx::Error::Io(_))
        | Error::Database(sqlx::Error::PoolTimedOut)
        | Error::Database(sqlx::Error::PoolClosed) => true,
        Error::Database(sqlx::Error::Database(db_err)) => {
            // serialization_failure / deadlock_detected
            matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

/// Retry a database operation up to 3 times with a 100 ms backoff between
/// attempts. Non-transient errors fail immediately.
pub async fn retry_transient<F, Fut, T>(operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if is_transient(&err) && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Transient database error, will retry"
                );
                tokio::time::sleep(BACKOFF).await;
            }
            Err(err) => {
                if attempt > 1 {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Database operation failed after retries"
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let result = retry_transient("test_op", || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn non_transient_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = retry_transient("test_op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::InvalidInput("bad".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_is_retried_then_succeeds() {
        let attempts = AtomicU32::new(0);

        let result = retry_transient("test_op", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transient_error_exhausts_after_three_attempts() {
        let attempts = AtomicU32::new(0);

        let result = retry_transient("test_op", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Database(sqlx::Error::PoolTimedOut)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn classification() {
        assert!(is_transient(&Error::Database(sqlx::Error::PoolTimedOut)));
        assert!(!is_transient(&Error::InvalidInput("x".to_string())));
        assert!(!is_transient(&Error::Database(sqlx::Error::RowNotFound)));
    }
}
