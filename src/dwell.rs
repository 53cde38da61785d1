//! Dwell-time tracking for the relay
//!
//! Remembers when the relay last changed state and answers the minimum and
//! maximum on-time questions the decision engine asks every tick. All
//! queries take the caller's `now` so a tick evaluates every guard against
//! the same instant.

use crate::config::ThresholdConfig;
use crate::relay::RelayState;
use std::time::Duration;
use tokio::time::Instant;

/// State of the relay and when it was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DwellRecord {
    state: RelayState,
    since: Instant,
}

/// Tracks how long the relay has held its current state
#[derive(Debug, Clone)]
pub struct DwellTracker {
    record: DwellRecord,
    min_on: Duration,
    max_on: Option<Duration>,
    min_off: Duration,
}

impl DwellTracker {
    /// Start tracking from `state` entered at `since`
    pub const fn new(
        state: RelayState,
        since: Instant,
        min_on: Duration,
        max_on: Option<Duration>,
        min_off: Duration,
    ) -> Self {
        Self {
            record: DwellRecord { state, since },
            min_on,
            max_on,
            min_off,
        }
    }

    /// Tracker using the configured dwell limits
    pub fn from_config(state: RelayState, since: Instant, thresholds: &ThresholdConfig) -> Self {
        Self::new(
            state,
            since,
            thresholds.min_on(),
            thresholds.max_on(),
            thresholds.min_off(),
        )
    }

    /// State the tracker believes the relay is in
    pub const fn state(&self) -> RelayState {
        self.record.state
    }

    /// Overwrite the record after a real relay transition
    pub fn record_transition(&mut self, new_state: RelayState, now: Instant) {
        self.record = DwellRecord {
            state: new_state,
            since: now,
        };
    }

    /// Time spent in the current state
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.record.since)
    }

    /// Minimum on-time floor; always satisfied while off
    pub fn min_dwell_satisfied(&self, now: Instant) -> bool {
        match self.record.state {
            RelayState::On => self.elapsed(now) >= self.min_on,
            RelayState::Off => true,
        }
    }

    /// Maximum on-time ceiling; never exceeded while off or when unbounded
    pub fn max_dwell_exceeded(&self, now: Instant) -> bool {
        match (self.record.state, self.max_on) {
            (RelayState::On, Some(max_on)) => self.elapsed(now) > max_on,
            _ => false,
        }
    }

    /// Minimum off-time guard; always satisfied while on
    pub fn min_off_satisfied(&self, now: Instant) -> bool {
        match self.record.state {
            RelayState::Off => self.elapsed(now) >= self.min_off,
            RelayState::On => true,
        }
    }
}
