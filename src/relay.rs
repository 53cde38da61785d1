//! Relay actuation
//!
//! [`RelayActuator`] is the only mutator of the relay state. It applies a
//! desired state idempotently and reports whether the hardware actually
//! changed. Hardware write failures are fatal: once a write fails, the real
//! position of the relay is unknown.

use crate::config::{RelayBackend, RelayConfig};
use crate::error::{HeliosError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Relay position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    pub const fn from_on(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => write!(f, "ON"),
            Self::Off => write!(f, "OFF"),
        }
    }
}

/// Physical relay output
#[async_trait::async_trait]
pub trait RelayOutput: Send {
    /// Human-readable identity for logs
    fn describe(&self) -> String;

    /// Prepare the output; must leave the relay released
    async fn initialize(&mut self) -> Result<()>;

    /// Drive the relay on or off
    async fn write(&mut self, on: bool) -> Result<()>;
}

/// Relay on a Linux sysfs GPIO line
pub struct SysfsGpioOutput {
    pin: u32,
    root: PathBuf,
    active_low: bool,
    logger: StructuredLogger,
}

impl SysfsGpioOutput {
    /// Create an output for `pin` below `root` (normally `/sys/class/gpio`)
    pub fn new(pin: u32, root: impl Into<PathBuf>, active_low: bool) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("relay").with_field("gpio", pin.to_string()),
        );
        Self {
            pin,
            root: root.into(),
            active_low,
            logger,
        }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn level(&self, on: bool) -> &'static str {
        if on != self.active_low { "1" } else { "0" }
    }

    async fn write_attr(&self, name: &str, value: &str) -> Result<()> {
        let path = self.pin_dir().join(name);
        tokio::fs::write(&path, value).await.map_err(|e| {
            HeliosError::hardware_fault(format!("write {:?} to {}: {}", value, path.display(), e))
        })
    }
}

#[async_trait::async_trait]
impl RelayOutput for SysfsGpioOutput {
    fn describe(&self) -> String {
        format!("sysfs GPIO {} ({})", self.pin, self.root.display())
    }

    async fn initialize(&mut self) -> Result<()> {
        if !tokio::fs::try_exists(self.pin_dir()).await.unwrap_or(false) {
            self.logger.info(&format!("Exporting GPIO {}", self.pin));
            let export = self.root.join("export");
            tokio::fs::write(&export, self.pin.to_string())
                .await
                .map_err(|e| {
                    HeliosError::hardware_fault(format!("export GPIO {}: {}", self.pin, e))
                })?;
            // udev needs a moment to fix permissions on the new line
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // "low"/"high" set direction and initial level in one step
        let direction = if self.active_low { "high" } else { "low" };
        self.write_attr("direction", direction).await?;
        self.logger.debug("GPIO configured as output, relay released");
        Ok(())
    }

    async fn write(&mut self, on: bool) -> Result<()> {
        self.write_attr("value", self.level(on)).await
    }
}

/// Output that only logs, for machines without a relay attached
pub struct DryRunOutput {
    logger: StructuredLogger,
}

impl DryRunOutput {
    pub fn new() -> Self {
        Self {
            logger: get_logger("relay"),
        }
    }
}

impl Default for DryRunOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RelayOutput for DryRunOutput {
    fn describe(&self) -> String {
        "dry run".to_string()
    }

    async fn initialize(&mut self) -> Result<()> {
        self.logger.info("Dry run: relay output is simulated");
        Ok(())
    }

    async fn write(&mut self, on: bool) -> Result<()> {
        self.logger.info(if on {
            "Dry run: ==> engaging"
        } else {
            "Dry run: ==> disengaging"
        });
        Ok(())
    }
}

/// Build the configured output
pub fn output_from_config(config: &RelayConfig) -> Box<dyn RelayOutput> {
    match config.backend {
        RelayBackend::SysfsGpio => Box::new(SysfsGpioOutput::new(
            config.gpio_pin,
            config.sysfs_root.clone(),
            config.active_low,
        )),
        RelayBackend::DryRun => Box::new(DryRunOutput::new()),
    }
}

#[async_trait::async_trait]
impl<T: RelayOutput + ?Sized> RelayOutput for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn initialize(&mut self) -> Result<()> {
        (**self).initialize().await
    }

    async fn write(&mut self, on: bool) -> Result<()> {
        (**self).write(on).await
    }
}

/// Idempotent relay driver; starts and fails safe in [`RelayState::Off`]
pub struct RelayActuator<O: RelayOutput> {
    output: O,
    state: RelayState,
    logger: StructuredLogger,
}

impl<O: RelayOutput> RelayActuator<O> {
    /// Wrap an output; the relay is assumed released until `initialize`
    pub fn new(output: O) -> Self {
        Self {
            output,
            state: RelayState::Off,
            logger: get_logger("relay"),
        }
    }

    /// Configure the output and force it off
    pub async fn initialize(&mut self) -> Result<()> {
        self.logger
            .info(&format!("Initializing relay output: {}", self.output.describe()));
        self.output.initialize().await?;
        self.output.write(false).await?;
        self.state = RelayState::Off;
        Ok(())
    }

    /// Current relay state
    pub const fn state(&self) -> RelayState {
        self.state
    }

    /// Apply `desired`; returns whether a transition happened
    pub async fn apply(&mut self, desired: RelayState) -> Result<bool> {
        if desired == self.state {
            return Ok(false);
        }
        self.output.write(desired.is_on()).await.inspect_err(|e| {
            self.logger
                .error(&format!("Failed to switch relay {}: {}", desired, e));
        })?;
        self.state = desired;
        Ok(true)
    }

    /// Write OFF regardless of the believed state
    pub async fn force_off(&mut self) -> Result<()> {
        self.output.write(false).await?;
        self.state = RelayState::Off;
        Ok(())
    }
}
