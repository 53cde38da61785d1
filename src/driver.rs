//! Core driver logic for Helios
//!
//! [`SwitchDriver`] owns the power source, the relay actuator and the dwell
//! tracker. Each tick samples power, asks the decision engine for the next
//! relay state, applies it and records any transition. The loop itself lives
//! in `runtime`; this module holds construction and read-only accessors.

mod backoff;
mod runtime;
mod types;


pub use backoff::RetryBackoff;
pub use types::{DriverState, DriverStats, TickReport};

use crate::advisory::{AdvisoryProvider, AdvisorySource};
use crate::config::{Config, ControlConfig, ThresholdConfig};
use crate::dwell::DwellTracker;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::relay::{RelayActuator, RelayOutput, RelayState, output_from_config};
use crate::source::{ModbusPowerSource, PowerSource};
use crate::switch_log::{SwitchLogFile, TransitionSink};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable handle used to stop a running driver
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the driver to stop after (or during) the current tick
    pub fn request_shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Main driver for Helios
pub struct SwitchDriver {
    thresholds: ThresholdConfig,
    control: ControlConfig,
    tz: Tz,

    source: Box<dyn PowerSource>,
    relay: RelayActuator<Box<dyn RelayOutput>>,
    dwell: DwellTracker,
    advisory: Option<Box<dyn AdvisorySource>>,
    sink: Option<Box<dyn TransitionSink>>,
    backoff: RetryBackoff,

    /// Lifecycle state, observable through [`SwitchDriver::subscribe_state`]
    state: watch::Sender<DriverState>,
    shutdown: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,

    /// When `start` ran; anchors the startup grace period
    started_at: Option<Instant>,
    /// Set once a relay write failed; the relay position is unknown after that
    relay_faulted: bool,
    stats: DriverStats,
    logger: StructuredLogger,
}

impl SwitchDriver {
    /// Create a driver from explicit components
    ///
    /// The configuration is validated here so an invalid threshold set fails
    /// before the relay is ever touched.
    pub fn new(
        config: &Config,
        source: Box<dyn PowerSource>,
        output: Box<dyn RelayOutput>,
    ) -> Result<Self> {
        config.validate()?;
        let tz = config.tz()?;

        let control = config.control.clone();
        let backoff = RetryBackoff::new(
            Duration::from_millis(control.backoff_initial_ms),
            Duration::from_millis(control.backoff_max_ms),
            control.max_retries_per_window,
            Duration::from_secs(control.retry_window_seconds),
        );

        let logger =
            get_logger_with_context(LogContext::new("driver").with_endpoint(source.describe()));
        let (state_tx, _) = watch::channel(DriverState::Initializing);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            thresholds: config.thresholds.clone(),
            control,
            tz,
            source,
            relay: RelayActuator::new(output),
            dwell: DwellTracker::from_config(RelayState::Off, Instant::now(), &config.thresholds),
            advisory: None,
            sink: None,
            backoff,
            state: state_tx,
            shutdown: Arc::new(shutdown_tx),
            shutdown_rx,
            started_at: None,
            relay_faulted: false,
            stats: DriverStats::default(),
            logger,
        })
    }

    /// Create a driver wired to the configured inverter, relay, advisory
    /// inputs and switching log
    pub fn from_config(config: &Config) -> Result<Self> {
        let tz = config.tz()?;
        let source = Box::new(ModbusPowerSource::new(&config.inverter));
        let output = output_from_config(&config.relay);
        let mut driver = Self::new(config, source, output)?;

        if let Some(provider) = AdvisoryProvider::from_config(&config.advisory, tz)? {
            driver = driver.with_advisory(Box::new(provider));
        }
        if let Some(path) = config.switch_log.path.as_deref() {
            driver = driver.with_sink(Box::new(SwitchLogFile::new(
                path,
                config.switch_log.log_samples,
            )));
        }
        Ok(driver)
    }

    /// Attach an advisory source
    #[must_use]
    pub fn with_advisory(mut self, advisory: Box<dyn AdvisorySource>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    /// Attach a sink for switching events
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn TransitionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DriverState {
        self.state.borrow().clone()
    }

    /// Watch lifecycle state changes
    pub fn subscribe_state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// State the relay was last driven to
    pub const fn relay_state(&self) -> RelayState {
        self.relay.state()
    }

    pub const fn dwell(&self) -> &DwellTracker {
        &self.dwell
    }

    pub const fn stats(&self) -> DriverStats {
        self.stats
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn set_state(&self, next: DriverState) {
        let previous = self.state.send_replace(next.clone());
        if previous != next {
            self.logger
                .debug(&format!("Driver state {} -> {}", previous, next));
        }
    }
}
