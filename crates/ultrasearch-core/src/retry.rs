//! Bounded retries for daemon round trips.
//!
//! Every call to the daemon goes through [`RetryExecutor::run`], which is the
//! single place deciding whether a failure is retried or surfaced. Only
//! [`SearchError::Transient`] failures are retried; everything else
//! propagates after the first attempt. The pause between attempts is fixed.

use crate::config::ClientOptions;
use crate::error::{Result, SearchError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Retries transient daemon failures a bounded number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    max_retries: u32,
    sleep: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::from_options(&ClientOptions::default())
    }
}

impl RetryExecutor {
    /// Create an executor making at most `max_retries + 1` attempts
    pub fn new(max_retries: u32, sleep: Duration) -> Self {
        RetryExecutor { max_retries, sleep }
    }

    /// Create an executor from the client options
    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.max_retries, options.retry_sleep())
    }

    /// Maximum number of attempts per call
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `action`, retrying transient failures.
    ///
    /// `name` labels the round trip in diagnostics. When every attempt fails
    /// transiently the last failure is returned.
    pub fn run<T, F>(&self, name: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match action() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(action = name, attempt, "Daemon call succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    warn!(
                        action = name,
                        attempt,
                        max_attempts = self.max_attempts(),
                        error = %e,
                        "Daemon call failed, retrying"
                    );
                    thread::sleep(self.sleep);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(
                            action = name,
                            attempts = attempt,
                            error = %e,
                            "Giving up on daemon call"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
