//! Minimum-interval gate.
//!
//! A [`Throttle`] lets a call through at most once per `min_interval`. The
//! slot is claimed before the guarded work starts, so a second caller that
//! arrives while a poll is still running is skipped as well.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Claim the slot if the interval has elapsed since the last claim.
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last_run = self.last_run.lock().unwrap_or_else(|e| e.into_inner());

        match *last_run {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                *last_run = Some(now);
                true
            }
        }
    }

    /// Time left until the next call would be let through.
    pub fn remaining(&self) -> Duration {
        let last_run = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        match *last_run {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Forget the last claim so the next call goes through.
    pub fn reset(&self) {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
