#[cfg(test)]
mod tests {
    use crate::retry::{next_delay, retry, RetryError, RetryExecutor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    /// Test: Operation succeeds after transient failures
    ///
    /// Purpose
    /// - Validate that the executor keeps retrying until the first success
    ///
    /// Flow
    /// - Operation fails on attempts 1 and 2, succeeds on attempt 3
    /// - Run with 5 attempts and a 20ms initial delay
    ///
    /// Expected
    /// - The success value is returned after exactly 3 calls
    /// - Elapsed time covers at least the two backoff sleeps (20ms + >=20ms)
    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let start = Instant::now();

        let result = retry(&token, 5, Duration::from_millis(20), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n * 10)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(30));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    /// Test: Exhausted attempts return the last error verbatim
    ///
    /// Purpose
    /// - Ensure no synthetic "exhausted" error replaces the operation's own error
    ///
    /// Flow
    /// - Operation always fails with a message naming the attempt number
    /// - Run with 3 attempts
    ///
    /// Expected
    /// - Error is `Exhausted` wrapping the third attempt's error
    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let result: Result<(), _> = retry(&token, 3, Duration::from_millis(1), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("attempt {} failed", n))
            }
        })
        .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted("attempt 3 failed".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Test: Cancellation before the first attempt
    ///
    /// Purpose
    /// - Validate that an already cancelled token short-circuits the executor
    ///
    /// Flow
    /// - Cancel the token, then run the executor
    ///
    /// Expected
    /// - The operation is never invoked
    /// - The cancellation error is returned
    #[tokio::test]
    async fn test_retry_cancelled_before_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<u32, RetryError<String>> =
            retry(&token, 5, Duration::from_millis(10), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        assert!(matches!(result, Err(ref e) if e.is_cancelled()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            result.unwrap_err().to_string(),
            "RetryCancellationErr".to_string()
        );
    }

    /// Test: Cancellation during a backoff sleep
    ///
    /// Purpose
    /// - Ensure a cancellation raised while sleeping is seen at the next attempt boundary
    ///
    /// Flow
    /// - First attempt cancels the token and fails
    ///
    /// Expected
    /// - No second attempt is made
    /// - The cancellation error is returned
    #[tokio::test]
    async fn test_retry_cancelled_between_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let result: Result<(), RetryError<&str>> =
            retry(&token, 5, Duration::from_millis(5), || {
                let calls = calls.clone();
                let token = token.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    token.cancel();
                    Err("boom")
                }
            })
            .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Test: Zero attempts is rejected
    ///
    /// Purpose
    /// - A zero attempt budget is a caller misconfiguration, not a silent no-op
    ///
    /// Expected
    /// - `NoAttempts` is returned and the operation is never invoked
    #[tokio::test]
    async fn test_retry_zero_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor = RetryExecutor::new(0, Duration::from_millis(1));

        let result: Result<(), RetryError<&str>> = executor
            .run(&CancellationToken::new(), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(RetryError::NoAttempts));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Test: No backoff after the last attempt
    ///
    /// Flow
    /// - A single always failing attempt with a 10s initial delay
    ///
    /// Expected
    /// - The error is returned right away, without waiting for the delay
    #[tokio::test]
    async fn test_retry_no_sleep_after_final_attempt() {
        let start = Instant::now();

        let result: Result<(), RetryError<&str>> =
            retry(&CancellationToken::new(), 1, Duration::from_secs(10), || async {
                Err("down")
            })
            .await;

        assert_eq!(result, Err(RetryError::Exhausted("down")));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    /// Test: Backoff growth stays within the jitter bounds
    ///
    /// Expected
    /// - Every next delay is >= the current one and at most 1.5x the current one
    /// - A zero delay stays zero
    #[test]
    fn test_next_delay_bounds() {
        let mut delay = Duration::from_millis(100);
        for _ in 0..50 {
            let next = next_delay(delay);
            assert!(next >= delay);
            assert!(next <= delay + delay / 2);
            delay = next;
        }
        assert_eq!(next_delay(Duration::ZERO), Duration::ZERO);
    }
}
