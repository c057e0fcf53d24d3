//! Bounded retry with exponential backoff for external HTTP calls.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ChannelError, LlmError};

/// First backoff delay.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on any single backoff delay.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Errors that may succeed on a second attempt.
pub(crate) trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-requested delay, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RequestFailed { .. } | LlmError::RateLimited { .. } | LlmError::Unavailable { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for ChannelError {
    fn is_retryable(&self) -> bool {
        match self {
            ChannelError::RequestFailed { .. } | ChannelError::RateLimited { .. } => true,
            ChannelError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Delay before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at 30s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay_ms = INITIAL_BACKOFF_MS.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_MS))
}

/// Run `op` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries have been spent.
pub(crate) async fn retry_with_backoff<T, E, F, Fut>(max_retries: u32, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let backoff = e
                    .retry_after()
                    .map(|d| d.min(Duration::from_millis(MAX_BACKOFF_MS)))
                    .unwrap_or_else(|| backoff_delay(attempt));
                warn!(
                    call = label,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
