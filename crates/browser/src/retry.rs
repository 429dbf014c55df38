//! Bounded polling shared by endpoint readiness and login detection.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use webpilot_core::Result;

/// A retry schedule: probe, wait `interval`, probe again, give up once the
/// next probe would land past `ceiling`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    /// Polls `probe` until it yields a value. `Ok(Some(v))` stops the loop,
    /// `Ok(None)` schedules another round, `Err` aborts immediately so a dead
    /// connection fails the caller fast instead of spinning out the ceiling.
    /// Returns `Ok(None)` when the ceiling is reached.
    pub async fn wait_until<T, F, Fut>(&self, mut probe: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let start = Instant::now();
        loop {
            if let Some(value) = probe().await? {
                return Ok(Some(value));
            }
            if start.elapsed() + self.interval > self.ceiling {
                return Ok(None);
            }
            sleep(self.interval).await;
        }
    }

}
