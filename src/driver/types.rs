use crate::decision::Decision;
use crate::source::PowerReading;
use std::time::Duration;

/// Control loop lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for the first good sample (relay held off)
    Initializing,
    /// Sampling normally
    Running,
    /// Source failing; retrying with backoff
    Degraded { retry_count: u32 },
    /// Shutting down
    Terminating,
}

impl DriverState {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Running => write!(f, "Running"),
            Self::Degraded { retry_count } => write!(f, "Degraded({})", retry_count),
            Self::Terminating => write!(f, "Terminating"),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Reading used for the decision
    pub reading: PowerReading,
    /// Decision taken
    pub decision: Decision,
    /// Whether the relay actually switched
    pub transitioned: bool,
    /// Delay until the next tick should start, measured from tick start
    pub next_delay: Duration,
    /// The sample was abandoned because shutdown was requested
    pub interrupted: bool,
}

/// Counters over the lifetime of the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    pub failed_samples: u64,
    pub transitions: u64,
    /// Ticks that took longer than their scheduled interval
    pub overruns: u64,
}
