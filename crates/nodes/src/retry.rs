//! Bounded exponential backoff around language-model calls.

use std::future::Future;

use pipeline::{ModelError, ModelInvocationError, RetryConfig, RetryPolicy};
use tracing::{debug, warn};

use crate::control::RunControl;

/// Calls `op` until it succeeds, fails permanently, or `max_attempts` is
/// reached.
///
/// Every attempt runs under the per-attempt timeout; an elapsed attempt is a
/// transient failure. Between attempts the delay is the configured backoff or
/// the server's `retry_after` hint, whichever is longer, capped at
/// `max_backoff` and at the time left before the run deadline. Once the run is
/// interrupted no further attempt starts and the last error is returned.
#[tracing::instrument(skip(config, control, op))]
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    control: &RunControl,
    label: &str,
    mut op: F,
) -> Result<T, ModelInvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let error = match tokio::time::timeout(config.attempt_timeout(), op()).await {
            Ok(Ok(value)) => {
                debug!(attempt, "model call succeeded");
                return Ok(value);
            }
            Ok(Err(e)) => e,
            Err(_) => ModelError::Transient {
                message: format!("attempt timed out after {:?}", config.attempt_timeout()),
                retry_after: None,
            },
        };

        let after = match error.retry_policy() {
            RetryPolicy::Retryable { after } if attempt < max_attempts => after,
            _ => {
                warn!(attempt, error = %error, "giving up on model call");
                return Err(ModelInvocationError {
                    attempts: attempt,
                    source: error,
                });
            }
        };

        let backoff = config.backoff_after(attempt);
        let delay = after
            .map_or(backoff, |hint| hint.max(backoff))
            .min(config.max_backoff())
            .min(control.remaining());
        warn!(attempt, ?delay, error = %error, "model call failed, retrying");

        let interrupted = tokio::select! {
            () = tokio::time::sleep(delay) => control.interruption(),
            reason = control.interrupted() => Some(reason),
        };
        if let Some(reason) = interrupted {
            warn!(attempt, ?reason, error = %error, "run interrupted, abandoning model call");
            return Err(ModelInvocationError {
                attempts: attempt,
                source: error,
            });
        }
    }
}
