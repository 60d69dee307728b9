//! Bounded retry of store calls with exponential backoff

use std::thread;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::StoreError;
use crate::store::StoreResult;

/// The last error of a retried call and how many attempts were made
#[derive(Debug)]
pub(crate) struct Exhausted {
    pub attempts: u32,
    pub error: StoreError,
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts
///
/// Only transient failures are retried. `op` receives the zero-based
/// attempt number.
pub(crate) fn with_retry<T>(
    policy: &RetryPolicy,
    what: &str,
    partition: usize,
    mut op: impl FnMut(u32) -> StoreResult<T>,
) -> Result<T, Exhausted> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !error.is_transient() || attempt >= max_attempts {
                    return Err(Exhausted {
                        attempts: attempt,
                        error,
                    });
                }
                let delay = policy.backoff(attempt - 1);
                warn!(
                    partition,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "{} failed, retrying",
                    what
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }
    }
}
