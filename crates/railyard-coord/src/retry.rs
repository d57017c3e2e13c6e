use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Retryable;

/// The fixed backoff schedule: 1s, 2s, 4s, capped at three attempts
/// total.
pub const DEFAULT_BACKOFF: [Duration; 3] = [Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)];

/// Retries `op` while it returns a [`Retryable`] error for which
/// [`Retryable::is_transient`] holds, sleeping according to `schedule`
/// between attempts. Exhausting the schedule returns the last error.
///
/// Non-transient errors are returned immediately without consuming a
/// retry slot: conflicts and bad requests are not retried.
pub async fn retry_with_backoff<T, E, F, Fut>(schedule: &[Duration], mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < schedule.len() => {
                let delay = schedule[attempt];
                warn!(attempt, %err, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Blocking counterpart to [`retry_with_backoff`] for callers on a
/// synchronous boundary (a driver's network client trait, not an
/// `async fn`): same schedule, same transient-only retry rule, a
/// thread sleep between attempts instead of a tokio one.
pub fn retry_blocking<T, E, F>(schedule: &[Duration], mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0usize;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < schedule.len() => {
                let delay = schedule[attempt];
                warn!(attempt, %err, ?delay, "retrying after transient failure");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoordError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, CoordError> = retry_with_backoff(&DEFAULT_BACKOFF, move || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CoordError::Transient { message: "boom".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, CoordError> = retry_with_backoff(&DEFAULT_BACKOFF, move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoordError::NoNode { path: "/x".into() })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_schedule_and_returns_last_error() {
        let result: Result<u32, CoordError> =
            retry_with_backoff(&DEFAULT_BACKOFF, || async { Err(CoordError::Transient { message: "still broken".into() }) }).await;
        assert!(result.is_err());
    }

    const FAST_SCHEDULE: [Duration; 3] = [Duration::from_millis(1), Duration::from_millis(1), Duration::from_millis(1)];

    #[test]
    fn blocking_retries_transient_errors_until_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, CoordError> = retry_blocking(&FAST_SCHEDULE, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CoordError::Transient { message: "boom".into() })
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn blocking_does_not_retry_non_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, CoordError> = retry_blocking(&FAST_SCHEDULE, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoordError::NoNode { path: "/x".into() })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
