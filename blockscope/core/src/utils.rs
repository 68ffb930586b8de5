use std::{fmt::Display, future::Future, time::Duration};

use log::warn;

/// Bounded retries with a delay growing linearly with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Runs `operation` until it succeeds or `max_attempts` attempts have failed, returning the
    /// last error in the latter case.
    pub async fn run<F, Fut, T, E>(&self, label: &str, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => err,
            };

            let delay = self.base_delay * attempt;
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                label, attempt, self.max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
