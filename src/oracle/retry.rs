//! Bounded retry with exponential backoff.
//!
//! Each attempt yields a tagged [`Attempt`]; whether to try again is decided
//! by [`next_step`], a pure function of the attempt number, the outcome, and
//! the [`RetryPolicy`].
//!
//! Backoff: `base`, `2·base`, `4·base`, … with the exponent capped at 5.

use std::future::Future;
use std::time::Duration;

use super::OracleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exp)
    }
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ok(T),
    Transient(OracleError),
    Fatal(OracleError),
}

impl<T> Attempt<T> {
    pub fn from_result(result: Result<T, OracleError>) -> Self {
        match result {
            Ok(v) => Attempt::Ok(v),
            Err(e) if e.retryable => Attempt::Transient(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Done(Result<T, OracleError>),
    RetryAfter(Duration, OracleError),
}

/// Decide the next step after attempt number `attempt` (0-based).
pub fn next_step<T>(attempt: u32, outcome: Attempt<T>, policy: &RetryPolicy) -> Step<T> {
    match outcome {
        Attempt::Ok(v) => Step::Done(Ok(v)),
        Attempt::Fatal(e) => Step::Done(Err(e)),
        Attempt::Transient(e) if attempt < policy.max_retries => {
            Step::RetryAfter(policy.delay_for(attempt + 1), e)
        }
        Attempt::Transient(e) => Step::Done(Err(e)),
    }
}

/// Run `op` until it succeeds, fails fatally, or the retry budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut attempt = 0u32;
    loop {
        let outcome = op().await;
        match next_step(attempt, outcome, policy) {
            Step::Done(result) => return result,
            Step::RetryAfter(delay, err) => {
                tracing::warn!(
                    file = %label,
                    attempt = attempt + 1,
                    cause = %err.kind,
                    error = %err.message,
                    delay_ms = delay.as_millis() as u64,
                    "oracle call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
