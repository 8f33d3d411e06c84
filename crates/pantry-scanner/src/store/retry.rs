//! Retry policy for transactional writes

use std::time::Duration;
use tracing::warn;

use crate::error::{is_transient, StoreError};

/// Bounded exponential backoff for transient transaction conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Delay before attempt `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide what follows a failed attempt
    ///
    /// Returns the next attempt number after sleeping when `error` is a
    /// transient conflict and attempts remain; otherwise the error to surface.
    pub async fn next_attempt(
        &self,
        operation: &'static str,
        attempt: u32,
        error: sqlx::Error,
    ) -> Result<u32, StoreError> {
        if !is_transient(&error) {
            return Err(StoreError::Database {
                operation,
                source: error,
            });
        }

        if attempt >= self.max_attempts {
            return Err(StoreError::RetriesExhausted {
                operation,
                attempts: attempt,
                source: error,
            });
        }

        let delay = self.backoff(attempt);
        warn!(
            operation,
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transaction conflict, retrying"
        );
        tokio::time::sleep(delay).await;

        Ok(attempt + 1)
    }
}
