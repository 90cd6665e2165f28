//! Retry with exponential backoff for requests outside the per-post state machine
//! (archive pages and image downloads).

use std::fmt::Display;
use std::future::Future;

use archiver_core::RetryPolicy;
use archiver_logging::{archiver_debug, archiver_warn};

use crate::FetchError;

pub(crate) trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Run `operation` until it succeeds, fails permanently, or `policy.max_retries`
/// retries have been spent. Returns the last error together with the number of
/// attempts made.
pub(crate) async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display,
{
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    archiver_debug!("{label} succeeded after {retries} retries");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                archiver_warn!(
                    "{label} failed ({err}); retry {retries}/{} in {:?}",
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err((err, retries + 1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use archiver_core::{FailureKind, RetryPolicy};

    use super::with_retry;
    use crate::FetchError;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn stops_after_max_retries() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(2), "op", || {
            calls.set(calls.get() + 1);
            async { Err(FetchError::new(FailureKind::Timeout, "slow")) }
        })
        .await;
        let (_, attempts) = result.unwrap_err();
        assert_eq!(attempts, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast_policy(5), "op", || {
            calls.set(calls.get() + 1);
            async { Err(FetchError::new(FailureKind::HttpStatus { status: 404 }, "gone")) }
        })
        .await;
        assert_eq!(result.unwrap_err().1, 1);
        assert_eq!(calls.get(), 1);
    }
}
