//! Timeout and retry policy for calls to external capabilities.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SemanticError};

/// Bounds applied to every embedder or summarizer call.
///
/// Each attempt is cut off after `timeout`. Retryable failures (timeouts and
/// errors flagged transient) are retried up to `max_retries` times, sleeping
/// `initial_backoff`, then twice that, and so on between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CapabilityPolicy {
    /// Per-attempt time budget.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_ms")]
    pub initial_backoff: Duration,
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

impl CapabilityPolicy {
    /// Run `op` under this policy.
    ///
    /// `op` is invoked once per attempt. The last error is returned once
    /// retries are exhausted or a non-retryable error occurs.
    pub async fn run<T, F, Fut>(&self, capability: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(SemanticError::Timeout {
                    capability: capability.to_string(),
                    after: self.timeout,
                }),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.initial_backoff.saturating_mul(1 << attempt.min(16));
                    attempt += 1;
                    warn!(capability, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying capability call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
