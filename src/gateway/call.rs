//! Per-call timeout, retry with backoff, and best-effort wrappers for
//! control-plane calls

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::error::{AppError, Result};

/// How control-plane calls are bounded and retried
#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

impl CallPolicy {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
            attempts: config.route_retry_attempts.max(1),
            base_delay: config.retry_base_delay(),
        }
    }

    /// Run a single call under the per-call timeout
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} exceeded {}ms",
                operation,
                self.timeout.as_millis()
            ))),
        }
    }

    /// Run a call, retrying transient failures with exponential backoff and jitter.
    /// Non-transient errors are returned on first sight.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut make_call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match self.call(operation, make_call()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient control plane failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(exponential + jitter)
    }
}

/// Outcome of a bookkeeping call whose failure must not block routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    Done,
    Skipped(String),
}

impl BestEffort {
    pub fn is_done(&self) -> bool {
        matches!(self, BestEffort::Done)
    }
}

/// Await `fut`, log a failure and convert it into [`BestEffort::Skipped`]
pub async fn best_effort<F>(operation: &str, fut: F) -> BestEffort
where
    F: Future<Output = Result<()>>,
{
    match fut.await {
        Ok(()) => {
            debug!(operation = %operation, "Best-effort call completed");
            BestEffort::Done
        }
        Err(e) => {
            debug!(operation = %operation, error = %e, "Best-effort call skipped");
            BestEffort::Skipped(e.to_string())
        }
    }
}
