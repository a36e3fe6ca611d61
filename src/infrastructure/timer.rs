use crate::types::{DEFAULT_RECONNECT_FALLBACK, RECONNECT_INTERVALS};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Reconnect timer: walks a list of growing intervals, then sticks to the last one.
///
/// With jitter enabled the delay is `d/2 + random[0, d/2]`, so gateways that lost
/// the server at the same moment do not all come back in lockstep.
#[derive(Debug, Clone)]
pub struct Timer {
    attempts: u32,
    intervals: Vec<u64>,
    jitter: bool,
}

impl Timer {
    pub fn new(intervals: Vec<u64>) -> Self {
        Self {
            attempts: 0,
            intervals,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the next delay duration
    pub fn next_delay(&mut self) -> Duration {
        let base = self
            .intervals
            .get(self.attempts as usize)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(DEFAULT_RECONNECT_FALLBACK);

        self.attempts = self.attempts.saturating_add(1);

        let delay = if self.jitter { equal_jitter(base) } else { base };
        Duration::from_millis(delay)
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Sleep for the next backoff delay
    pub async fn schedule_timeout(&mut self) {
        let delay = self.next_delay();
        tracing::debug!("Next reconnect attempt in {:?}", delay);
        sleep(delay).await;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(RECONNECT_INTERVALS.to_vec())
    }
}

fn equal_jitter(ms: u64) -> u64 {
    let half = ms / 2;
    half + rand::rng().random_range(0..=ms - half)
}
