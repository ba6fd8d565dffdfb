//! Bounded calls to collaborators.
//!
//! Every external call goes through [`with_timeout`]. Reads, inserts and
//! generation go through [`with_retry`]: one retry after a short backoff.
//! Performing an action is never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use outreach_common::OutreachError;

/// Maps a collaborator failure onto its [`OutreachError`] variant, e.g.
/// `OutreachError::Store`.
pub type ErrorKind = fn(String) -> OutreachError;

/// Await `fut` for at most `limit`.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: Duration,
    kind: ErrorKind,
    fut: F,
) -> Result<T, OutreachError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(kind(format!("{operation}: {e:#}"))),
        Err(_) => Err(OutreachError::Timeout {
            operation,
            timeout: limit,
        }),
    }
}

/// Like [`with_timeout`], but a failed or timed-out first attempt is retried
/// once after `backoff` (plus up to a second of jitter).
pub async fn with_retry<T, F, Fut>(
    operation: &'static str,
    limit: Duration,
    backoff: Duration,
    kind: ErrorKind,
    mut attempt: F,
) -> Result<T, OutreachError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    match with_timeout(operation, limit, kind, attempt()).await {
        Ok(value) => Ok(value),
        Err(first) => {
            pause_before_retry(operation, &first, backoff).await;
            with_timeout(operation, limit, kind, attempt()).await
        }
    }
}

/// Log the first failure and sleep `backoff` plus up to a second of jitter.
pub async fn pause_before_retry(operation: &'static str, error: &OutreachError, backoff: Duration) {
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    warn!(
        operation,
        error = %error,
        backoff_secs = backoff.as_secs(),
        "Call failed, retrying once after backoff"
    );
    tokio::time::sleep(backoff + jitter).await;
}

/// [`with_retry`] for calls on a `&mut` session, where a closure cannot hand
/// out the borrow twice. `$call` is evaluated once per attempt.
macro_rules! retry_once {
    ($operation:expr, $limit:expr, $backoff:expr, $kind:expr, $call:expr) => {{
        let first = $crate::call::with_timeout($operation, $limit, $kind, $call).await;
        match first {
            Ok(value) => Ok(value),
            Err(first) => {
                $crate::call::pause_before_retry($operation, &first, $backoff).await;
                $crate::call::with_timeout($operation, $limit, $kind, $call).await
            }
        }
    }};
}

pub(crate) use retry_once;
