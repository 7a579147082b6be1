//! Bounded polling for page conditions.
//!
//! The browser driver has no push notification for "selector present" or
//! "network quiet", so it polls a probe until it succeeds or the deadline
//! passes. Every wait is bounded; a timeout becomes
//! [`DriverError::WaitTimeout`] and the caller decides whether that is a retry,
//! an empty page or the end of pagination.

#![cfg_attr(not(feature = "browser"), allow(dead_code))]

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::driver::{DriverError, DriverResult};

/// Default poll interval for checking conditions (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout and poll interval for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }
}

/// Poll `probe` until it yields `Ok(true)`.
///
/// Probe errors are treated like `false`: the page may be mid-navigation and
/// the execution context briefly unavailable.
pub async fn poll_until<F, Fut>(probe: F, config: WaitConfig, description: &str) -> DriverResult<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = DriverResult<bool>>,
{
    let start = Instant::now();

    loop {
        if let Ok(true) = probe().await {
            return Ok(());
        }

        if start.elapsed() >= config.timeout {
            return Err(DriverError::WaitTimeout {
                condition: description.to_string(),
                timeout: config.timeout,
            });
        }

        sleep(config.poll_interval).await;
    }
}

/// Poll `sample` until it returns the same value twice in a row, `quiet`
/// apart. Used to approximate "network idle" from a resource counter.
pub async fn poll_until_stable<F, Fut>(
    sample: F,
    quiet: Duration,
    config: WaitConfig,
    description: &str,
) -> DriverResult<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = DriverResult<u64>>,
{
    let start = Instant::now();
    let mut previous: Option<u64> = None;

    loop {
        match sample().await {
            Ok(value) if previous == Some(value) => return Ok(()),
            Ok(value) => previous = Some(value),
            Err(_) => previous = None,
        }

        if start.elapsed() >= config.timeout {
            return Err(DriverError::WaitTimeout {
                condition: description.to_string(),
                timeout: config.timeout,
            });
        }

        sleep(quiet).await;
    }
}
