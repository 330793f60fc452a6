use std::time::Duration;

use crate::error::SyncError;
use crate::shared::CancelToken;

/// Bounded exponential backoff for transient git failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay after `failed_attempts` consecutive failures
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `retries` is incremented once per extra attempt. Backoff sleeps end
    /// early with [`SyncError::Cancelled`] when the run is cancelled.
    pub fn run<T>(
        &self,
        what: &str,
        cancel: &CancelToken,
        retries: &mut u32,
        mut op: impl FnMut() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "{what}: attempt {attempt}/{max_attempts} failed ({error}), retrying in {}ms",
                        delay.as_millis()
                    );
                    if !cancel.sleep(delay) {
                        return Err(SyncError::Cancelled);
                    }
                    attempt += 1;
                    *retries += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::warn!("{what}: giving up after {attempt} attempts");
                    }
                    return Err(error);
                }
            }
        }
    }
}
