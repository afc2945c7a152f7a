// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry policies for transient failures.
//!
//! Replication reconnects deliberately use a *fixed* delay between attempts
//! rather than exponential backoff: a write cluster peer is either coming
//! back or being removed from the peer set, and a predictable cadence keeps
//! convergence time bounded. Resolver reloads use a bounded fast retry.
//!
//! # Example
//!
//! ```
//! use registry_engine::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! // Replication: fixed delay, never give up (peer removal stops it)
//! let replication = RetryConfig::replication(Duration::from_secs(5));
//! assert_eq!(replication.max_retries, None);
//! assert_eq!(replication.factor, 1.0);
//!
//! // Resolver reload: few quick attempts, then report the failure
//! let resolver = RetryConfig::resolver();
//! assert_eq!(resolver.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for retry behavior.
///
/// `factor == 1.0` yields a fixed delay; `max_retries == None` retries until
/// the caller cancels the surrounding task.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl RetryConfig {
    /// Fixed-delay, unbounded retry for replication peer reconnects.
    /// Stops only when the peer pipeline is cancelled.
    #[must_use]
    pub fn replication(delay: Duration) -> Self {
        Self {
            max_retries: None,
            initial_delay: delay,
            max_delay: delay,
            factor: 1.0,
        }
    }

    /// Quick bounded retry for a resolver reload; if it still fails the
    /// caller decides whether the failure is terminal.
    #[must_use]
    pub fn resolver() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// The delay following `delay`, honoring the factor and cap.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempts
                    );
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if let Some(max) = config.max_retries {
                    if attempts >= max {
                        return Err(err);
                    }
                    warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    );
                } else {
                    warn!(
                        "Operation '{}' failed (attempt {}, will keep retrying): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    );
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
