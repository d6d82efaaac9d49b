use rand::{rng, Rng};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error returned by [`retry`] and [`RetryExecutor::run`].
#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// The cancellation token fired before an attempt could start.
    Cancelled,
    /// The executor was asked to run zero attempts.
    NoAttempts,
    /// Every attempt failed; carries the error of the last one, untouched.
    Exhausted(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    /// Returns the last operation error, if the retry ran out of attempts.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "RetryCancellationErr"),
            RetryError::NoAttempts => write!(f, "retry requires at least one attempt"),
            RetryError::Exhausted(err) => write!(f, "{}", err),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Retry settings shared by callers that retry the same kind of operation.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: usize,
    initial_delay: Duration,
}

impl RetryExecutor {
    pub fn new(max_attempts: usize, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        retry(cancel, self.max_attempts, self.initial_delay, operation).await
    }
}

/// Runs `operation` until it succeeds, `attempts` runs have failed, or `cancel` fires.
///
/// The first attempt counts toward `attempts`. After each failure the current delay is
/// slept and then grown by a random jitter in `[0, delay / 2)`, so delays never shrink
/// and are not capped. The token is only checked before each attempt; a sleep already
/// in progress is not interrupted.
///
/// There is no sleep after the final failed attempt: once `attempts` runs have failed
/// the last error is returned immediately, so the total wait is the sum of the first
/// `attempts - 1` delays.
pub async fn retry<T, E, F, Fut>(
    cancel: &CancellationToken,
    attempts: usize,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if attempts == 0 {
        return Err(RetryError::NoAttempts);
    }

    let mut remaining = attempts;
    let mut delay = initial_delay;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        remaining -= 1;
        if remaining == 0 {
            return Err(RetryError::Exhausted(err));
        }

        debug!(
            attempt = attempts - remaining,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, backing off"
        );
        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Grows `delay` by half of a uniform sample in `[0, delay)`.
pub(crate) fn next_delay(delay: Duration) -> Duration {
    let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
    if nanos == 0 {
        return delay;
    }
    let jitter = rng().random_range(0..nanos) / 2;
    delay.saturating_add(Duration::from_nanos(jitter))
}
