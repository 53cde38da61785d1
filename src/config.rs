//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Configuration is loaded once at startup and
//! treated as immutable for the lifetime of the process.

use crate::error::{HeliosError, Result};
use crate::modbus::RegisterType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Environment variable that points at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "HELIOS_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inverter Modbus TCP endpoint and power register layout
    pub inverter: InverterConfig,

    /// Relay output configuration
    pub relay: RelayConfig,

    /// Switching thresholds and dwell limits
    pub thresholds: ThresholdConfig,

    /// Control loop retry and lifecycle policy
    pub control: ControlConfig,

    /// Optional advisory inputs (scaling factors, forecast signal)
    pub advisory: AdvisoryConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Human-readable switching log
    pub switch_log: SwitchLogConfig,

    /// IANA timezone used for log timestamps and day-of-year lookups
    pub timezone: String,
}

/// Modbus TCP connection parameters for the PV inverter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// Hostname or IP address of the inverter
    pub host: String,

    /// TCP port (typically 502)
    pub port: u16,

    /// Modbus unit identifier
    pub unit_id: u8,

    /// Holding register that carries total AC power
    pub power_register: u16,

    /// Number of 16-bit words to read
    pub register_count: u16,

    /// How the words are decoded into watts
    pub data_type: RegisterType,

    /// Multiplier applied to the decoded value
    pub scale: f64,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Register read timeout in milliseconds
    pub read_timeout_ms: u64,
}

/// Relay output backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayBackend {
    /// Linux sysfs GPIO (`/sys/class/gpio`)
    SysfsGpio,
    /// Log writes without touching hardware
    DryRun,
}

/// Relay output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Output backend
    pub backend: RelayBackend,

    /// GPIO line number driving the relay
    pub gpio_pin: u32,

    /// Invert the electrical level (relay boards that energize on low)
    pub active_low: bool,

    /// Root of the sysfs GPIO tree
    pub sysfs_root: String,
}

/// Switching thresholds and dwell-time limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Generated power at or above which the relay may turn on
    pub turn_on_watts: f64,

    /// Generated power at or below which the relay turns off
    pub turn_off_watts: f64,

    /// Minimum time the relay stays on once energized (0 disables)
    pub min_on_seconds: u64,

    /// Maximum continuous on time; `null` means unbounded
    pub max_on_seconds: Option<u64>,

    /// Minimum time the relay stays off after releasing (0 disables)
    pub min_off_seconds: u64,

    /// Sampling interval in milliseconds
    pub sample_interval_ms: u64,
}

/// What the driver does with the relay when asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Leave the relay in its last decided state
    Hold,
    /// Release the relay before exiting
    ForceOff,
}

/// Control loop lifecycle and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// How long startup waits for a first good sample before running anyway
    pub startup_grace_seconds: u64,

    /// First retry delay after a failed sample
    pub backoff_initial_ms: u64,

    /// Upper bound for the retry delay
    pub backoff_max_ms: u64,

    /// Failed attempts allowed per window before falling back to the max delay
    pub max_retries_per_window: u32,

    /// Sliding window for counting failed attempts
    pub retry_window_seconds: u64,

    /// Relay handling on shutdown
    pub shutdown_policy: ShutdownPolicy,
}

/// Advisory inputs computed outside this process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    /// File with one threshold scaling factor per line, indexed by day of year
    pub scaling_factors_file: Option<String>,

    /// JSON file with `favorable` / `threshold_factor` written by a forecaster
    pub signal_file: Option<String>,

    /// Signal file older than this is ignored
    pub signal_max_age_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level override
    pub console_level: Option<String>,

    /// Optional file-specific level override
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Switching log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchLogConfig {
    /// Path of the switching log; `null` disables it
    pub path: Option<String>,

    /// Also append a `date power threshold` line for every tick
    pub log_samples: bool,
}

impl ThresholdConfig {
    /// Minimum on duration
    pub const fn min_on(&self) -> Duration {
        Duration::from_secs(self.min_on_seconds)
    }

    /// Maximum on duration, `None` when unbounded
    pub fn max_on(&self) -> Option<Duration> {
        self.max_on_seconds.map(Duration::from_secs)
    }

    /// Minimum off duration
    pub const fn min_off(&self) -> Duration {
        Duration::from_secs(self.min_off_seconds)
    }

    /// Sampling interval
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Check the hysteresis and dwell invariants
    pub fn validate(&self) -> Result<()> {
        if !self.turn_on_watts.is_finite() || !self.turn_off_watts.is_finite() {
            return Err(HeliosError::invalid_thresholds(
                "thresholds must be finite numbers",
            ));
        }
        if self.turn_off_watts < 0.0 {
            return Err(HeliosError::invalid_thresholds(format!(
                "turn_off_watts ({}) must not be negative",
                self.turn_off_watts
            )));
        }
        if self.turn_on_watts < self.turn_off_watts {
            return Err(HeliosError::invalid_thresholds(format!(
                "turn_on_watts ({}) must be >= turn_off_watts ({})",
                self.turn_on_watts, self.turn_off_watts
            )));
        }
        if let Some(max_on) = self.max_on_seconds
            && self.min_on_seconds > max_on
        {
            return Err(HeliosError::invalid_thresholds(format!(
                "min_on_seconds ({}) must be <= max_on_seconds ({})",
                self.min_on_seconds, max_on
            )));
        }
        if self.sample_interval_ms == 0 {
            return Err(HeliosError::invalid_thresholds(
                "sample_interval_ms must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from an explicit path, `HELIOS_CONFIG`, or the
    /// default locations, falling back to built-in defaults
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| HeliosError::validation("timezone", "Unknown IANA timezone"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.inverter.host.is_empty() {
            return Err(HeliosError::validation(
                "inverter.host",
                "Host cannot be empty",
            ));
        }

        if self.inverter.port == 0 {
            return Err(HeliosError::validation(
                "inverter.port",
                "Port must be greater than 0",
            ));
        }

        if self.inverter.register_count < self.inverter.data_type.word_count() {
            return Err(HeliosError::validation(
                "inverter.register_count",
                "Too few registers for the configured data_type",
            ));
        }

        if !self.inverter.scale.is_finite() || self.inverter.scale <= 0.0 {
            return Err(HeliosError::validation(
                "inverter.scale",
                "Must be a positive number",
            ));
        }

        if self.inverter.read_timeout_ms == 0 || self.inverter.connect_timeout_ms == 0 {
            return Err(HeliosError::validation(
                "inverter.read_timeout_ms",
                "Timeouts must be greater than 0",
            ));
        }

        if self.control.backoff_initial_ms == 0 {
            return Err(HeliosError::validation(
                "control.backoff_initial_ms",
                "Must be greater than 0",
            ));
        }

        if self.control.backoff_max_ms < self.control.backoff_initial_ms {
            return Err(HeliosError::validation(
                "control.backoff_max_ms",
                "Must be >= backoff_initial_ms",
            ));
        }

        if self.control.max_retries_per_window == 0 {
            return Err(HeliosError::validation(
                "control.max_retries_per_window",
                "Must be greater than 0",
            ));
        }

        crate::logging::parse_log_level(&self.logging.level)?;
        self.tz()?;
        self.thresholds.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inverter.port, 502);
        assert_eq!(config.inverter.unit_id, 3);
        assert_eq!(config.inverter.power_register, 30775);
        assert_eq!(config.control.shutdown_policy, ShutdownPolicy::ForceOff);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.inverter.host = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.inverter.port = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.inverter.register_count = 1;
        assert!(config.validate().is_err());

        config = Config::default();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_invariants() {
        let mut t = ThresholdConfig::default();
        t.turn_on_watts = 500.0;
        t.turn_off_watts = 800.0;
        assert!(matches!(
            t.validate(),
            Err(HeliosError::InvalidThresholds { .. })
        ));

        let mut t = ThresholdConfig::default();
        t.min_on_seconds = 600;
        t.max_on_seconds = Some(300);
        assert!(matches!(
            t.validate(),
            Err(HeliosError::InvalidThresholds { .. })
        ));

        // Equal thresholds and an unbounded cap are fine
        let mut t = ThresholdConfig::default();
        t.turn_off_watts = t.turn_on_watts;
        t.max_on_seconds = None;
        assert!(t.validate().is_ok());
        assert_eq!(t.max_on(), None);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.inverter.port, deserialized.inverter.port);
        assert_eq!(config.thresholds, deserialized.thresholds);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "inverter:\n  host: 10.0.0.7\nthresholds:\n  turn_on_watts: 1500\n  max_on_seconds: null\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.inverter.host, "10.0.0.7");
        assert_eq!(config.inverter.port, 502);
        assert!((config.thresholds.turn_on_watts - 1500.0).abs() < f64::EPSILON);
        assert_eq!(config.thresholds.max_on_seconds, None);
        assert_eq!(config.relay.backend, RelayBackend::SysfsGpio);
    }
}
