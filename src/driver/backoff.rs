use crate::error::ConnectionErrorKind;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Capped exponential backoff with a per-window attempt budget
///
/// Once more than `max_attempts` failures land inside `window`, or the
/// failure is a protocol mismatch, every further retry waits `max`.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    initial: Duration,
    max: Duration,
    max_attempts: u32,
    window: Duration,
    consecutive: u32,
    recent: VecDeque<Instant>,
}

impl RetryBackoff {
    pub const fn new(initial: Duration, max: Duration, max_attempts: u32, window: Duration) -> Self {
        Self {
            initial,
            max,
            max_attempts,
            window,
            consecutive: 0,
            recent: VecDeque::new(),
        }
    }

    /// Consecutive failures since the last success
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Whether the attempt budget of the current window is used up
    pub fn window_exhausted(&self) -> bool {
        self.recent.len() > self.max_attempts as usize
    }

    /// Register a failure at `now` and return the delay before retrying
    pub fn next_delay(&mut self, now: Instant, kind: ConnectionErrorKind) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);

        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.push_back(now);

        if kind == ConnectionErrorKind::ProtocolMismatch || self.window_exhausted() {
            return self.max;
        }

        let exponent = (self.consecutive - 1).min(16);
        self.initial.saturating_mul(1u32 << exponent).min(self.max)
    }

    /// Forget the failure streak after a successful sample
    pub const fn reset(&mut self) {
        self.consecutive = 0;
    }
}
