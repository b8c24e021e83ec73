//! Call pacing for the public REST API
//!
//! `Throttle` enforces a minimum spacing between requests using the
//! monotonic clock; `ExponentialBackoff` spaces out retries after
//! transport failures.

use std::sync::Mutex;
use std::thread::sleep;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Block until at least `min_interval` has passed since the previous call
    pub fn wait(&self) {
        let mut last_call = self.last_call.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed);
            }
        }

        *last_call = Some(Instant::now());
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, or an error once retries are spent
    pub fn next_delay(&mut self) -> Result<Duration, MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let factor = 2_u32.saturating_pow(self.current_attempt);
        let delay = std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay);
        self.current_attempt += 1;
        Ok(delay)
    }

    pub fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay()?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay);
        Ok(())
    }
}
