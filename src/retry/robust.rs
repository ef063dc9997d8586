//! Composes [`RetryPolicy`](super::RetryPolicy), [`CircuitBreaker`] and
//! [`ErrorMonitor`] into the single call wrapper every provider and tool
//! goes through (spec §4.B, §9).

use std::future::Future;

use super::breaker::CircuitBreaker;
use super::monitor::ErrorMonitor;
use super::RetryPolicy;
use crate::error::CoreError;

/// Retries `call` under `policy`, gated by `breaker`, logging every failure
/// to `monitor`. The breaker is consulted before each attempt (including
/// the first) and updated immediately after, so a trip mid-retry aborts
/// the remaining attempts instead of burning through them.
pub async fn robust_call<T, F, Fut>(
    function: &str,
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    monitor: &ErrorMonitor,
    mut call: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut last_err: Option<CoreError> = None;

    for attempt in 1..=policy.max_attempts {
        breaker.before_call(function)?;

        match call().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(err) => {
                breaker.record_failure();
                monitor.record(function, err.kind(), err.to_string());

                let retriable = policy.is_retriable(err.kind());
                let exhausted = attempt == policy.max_attempts;
                if !retriable || exhausted {
                    last_err = Some(err);
                    break;
                }
                last_err = Some(err);
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}

/// Like [`robust_call`], but falls back to `fallback` when every attempt
/// (or the breaker) rejects the primary call, instead of propagating the
/// error. Used by the data provider layer to fall through to the next
/// provider in a capability's chain (spec §4.D).
pub async fn robust_call_or_fallback<T, F, Fut, Fb, FbFut>(
    function: &str,
    policy: &RetryPolicy,
    breaker: &CircuitBreaker,
    monitor: &ErrorMonitor,
    call: F,
    fallback: Fb,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
    Fb: FnOnce() -> FbFut,
    FbFut: Future<Output = Result<T, CoreError>>,
{
    match robust_call(function, policy, breaker, monitor, call).await {
        Ok(value) => Ok(value),
        Err(primary_err) => {
            tracing::warn!(function, error = %primary_err, "primary exhausted, trying fallback");
            fallback().await
        }
    }
}
