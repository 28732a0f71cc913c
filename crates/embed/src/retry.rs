use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EmbedError;

/// Bounded exponential backoff with optional jitter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Add up to 25% random jitter so synchronized callers don't stampede.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let with_jitter = if self.jitter {
            exp + (fastrand::f64() * 0.25 * exp as f64) as u64
        } else {
            exp
        };
        Duration::from_millis(with_jitter)
    }
}

/// Run `op` until it succeeds, fails permanently, or retries are exhausted.
///
/// Only errors whose [`EmbedError::is_transient`] is true are retried; the
/// final error is returned unchanged.
pub async fn retry_async<T, F, Fut>(cfg: &RetryConfig, mut op: F) -> Result<T, EmbedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbedError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < cfg.max_retries => {
                let delay = cfg.delay_for(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying embed call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
