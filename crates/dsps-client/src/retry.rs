// Copyright (C) 2025 DSPS Contributors
// SPDX-License-Identifier: MIT
//! Bounded retry with exponential backoff and jitter for one-shot API calls.
//!
//! Polling fetches never go through this wrapper: the polling loop has its
//! own error-mode backoff, and retrying in both layers would double the
//! delay.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::info;

/// Retry configuration. Immutable after construction.
///
/// The interval before retry attempt `n` (1-indexed) is
/// `interval_sec · interval_multiplier^n ± interval_jitter_sec`, floored at
/// zero.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the initial attempt (0 = no retries).
    pub count: u32,
    /// Base interval in seconds.
    pub interval_sec: f64,
    /// Multiplier applied per attempt.
    pub interval_multiplier: f64,
    /// Uniform random offset in seconds, in `[-jitter, +jitter]`.
    pub interval_jitter_sec: f64,
}

impl RetryConfig {
    pub fn new(
        count: u32,
        interval_sec: f64,
        interval_multiplier: f64,
        interval_jitter_sec: f64,
    ) -> Self {
        Self {
            count,
            interval_sec,
            interval_multiplier,
            interval_jitter_sec,
        }
    }

    /// Interval before retry attempt `attempt` (1-indexed), with `jitter`
    /// drawn uniformly from `[-1, +1]`.
    pub(crate) fn interval_for_attempt(&self, attempt: u32, jitter: f64) -> Duration {
        let secs = self.interval_sec * self.interval_multiplier.powi(attempt as i32)
            + jitter * self.interval_jitter_sec;
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for RetryConfig {
    /// Retry intervals before each retry:
    ///   1st retry: 1.0 · 1.5^1 ± 0.5 = 1.0  to 2.0  sec
    ///   2nd retry: 1.0 · 1.5^2 ± 0.5 = 1.75 to 2.75 sec
    ///   3rd retry: 1.0 · 1.5^3 ± 0.5 = 2.88 to 3.88 sec
    fn default() -> Self {
        Self {
            count: 3,
            interval_sec: 1.0,
            interval_multiplier: 1.5,
            interval_jitter_sec: 0.5,
        }
    }
}

/// Executes fallible async tasks with bounded retries.
#[derive(Debug, Clone)]
pub struct Retry {
    config: RetryConfig,
}

impl Retry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `task`, retrying up to `count` additional times on failure.
    /// After exhausting retries, the last error is returned unchanged.
    pub async fn perform<T, E, F, Fut>(&self, description: &str, mut task: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut next_attempt: u32 = 1;
        loop {
            match task().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if next_attempt > self.config.count {
                        return Err(e);
                    }
                    let jitter = rand::thread_rng().gen_range(-1.0..=1.0);
                    let interval = self.config.interval_for_attempt(next_attempt, jitter);
                    info!(
                        task = description,
                        attempt = next_attempt,
                        max_retries = self.config.count,
                        error = %e,
                        "will retry after {}ms",
                        interval.as_millis(),
                    );
                    tokio::time::sleep(interval).await;
                    next_attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(count: u32) -> RetryConfig {
        RetryConfig::new(count, 0.001, 1.0, 0.0)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let retry = Retry::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let result: Result<u32, String> = retry
            .perform("task", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_on_second_attempt_stops_retrying() {
        let retry = Retry::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let result: Result<&str, String> = retry
            .perform("task", || {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_retries_and_returns_last_error() {
        let retry = Retry::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = retry
            .perform("task", || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(format!("failure {n}"))
                }
            })
            .await;
        // 1 initial attempt + exactly 3 retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err(), "failure 3");
    }

    #[tokio::test]
    async fn test_zero_count_never_retries() {
        let retry = Retry::new(fast_config(0));
        let attempts = Arc::new(AtomicU32::new(0));
        let result: Result<(), String> = retry
            .perform("task", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_string())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interval_formula() {
        let config = RetryConfig::new(3, 1.0, 1.5, 0.5);
        assert_eq!(
            config.interval_for_attempt(1, 0.0),
            Duration::from_secs_f64(1.5)
        );
        assert_eq!(
            config.interval_for_attempt(2, 0.0),
            Duration::from_secs_f64(2.25)
        );
        assert_eq!(
            config.interval_for_attempt(1, 1.0),
            Duration::from_secs_f64(2.0)
        );
        assert_eq!(
            config.interval_for_attempt(1, -1.0),
            Duration::from_secs_f64(1.0)
        );
    }

    #[test]
    fn test_interval_never_negative() {
        let config = RetryConfig::new(1, 0.1, 1.0, 10.0);
        assert_eq!(config.interval_for_attempt(1, -1.0), Duration::ZERO);
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.count, 3);
        assert_eq!(config.interval_sec, 1.0);
        assert_eq!(config.interval_multiplier, 1.5);
        assert_eq!(config.interval_jitter_sec, 0.5);
    }
}
