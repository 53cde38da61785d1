//! Power source client
//!
//! Acquires the inverter's current generated power. The source performs no
//! decision logic: it either yields a non-negative watt value or a typed
//! connection error.

use crate::config::InverterConfig;
use crate::error::{ConnectionErrorKind, HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::modbus::{ModbusClient, RegisterReader, RegisterType, decode_power};
use tokio::time::Instant;

/// A successful power measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    /// Generated power in watts, never negative
    pub watts: f64,
    /// Monotonic time of the observation
    pub observed_at: Instant,
}

impl PowerSample {
    /// Build a sample, clamping negative power to zero
    pub fn new(watts: f64, observed_at: Instant) -> Self {
        Self {
            watts: if watts > 0.0 { watts } else { 0.0 },
            observed_at,
        }
    }
}

/// Outcome of one sampling attempt, as seen by the decision engine
#[derive(Debug, Clone, PartialEq)]
pub enum PowerReading {
    /// Fresh measurement
    Available(PowerSample),
    /// No usable measurement this tick
    Unavailable {
        kind: ConnectionErrorKind,
        message: String,
    },
}

impl PowerReading {
    /// Measured watts, if any
    pub const fn watts(&self) -> Option<f64> {
        match self {
            Self::Available(sample) => Some(sample.watts),
            Self::Unavailable { .. } => None,
        }
    }

    /// Whether a measurement was obtained
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Failure marker from a source error
    pub fn failed(error: &HeliosError) -> Self {
        let (kind, message) = match error {
            HeliosError::Connection { kind, message } => (*kind, message.clone()),
            other => (ConnectionErrorKind::Transient, other.to_string()),
        };
        Self::Unavailable { kind, message }
    }
}

impl From<Result<PowerSample>> for PowerReading {
    fn from(result: Result<PowerSample>) -> Self {
        match result {
            Ok(sample) => Self::Available(sample),
            Err(e) => Self::failed(&e),
        }
    }
}

/// Anything that can report the current PV generation
#[async_trait::async_trait]
pub trait PowerSource: Send {
    /// Human-readable identity for logs
    fn describe(&self) -> String;

    /// Read the current generated power
    async fn sample(&mut self) -> Result<PowerSample>;

    /// Release any held connection
    async fn close(&mut self) {}
}

/// Power source backed by a single inverter register over Modbus TCP
pub struct ModbusPowerSource<R: RegisterReader = ModbusClient> {
    reader: R,
    register: u16,
    count: u16,
    data_type: RegisterType,
    scale: f64,
    logger: StructuredLogger,
}

impl ModbusPowerSource<ModbusClient> {
    /// Create a source talking to the configured inverter
    pub fn new(config: &InverterConfig) -> Self {
        Self::with_reader(ModbusClient::new(config), config)
    }
}

impl<R: RegisterReader> ModbusPowerSource<R> {
    /// Create a source on top of an arbitrary register reader
    pub fn with_reader(reader: R, config: &InverterConfig) -> Self {
        Self {
            reader,
            register: config.power_register,
            count: config.register_count,
            data_type: config.data_type,
            scale: config.scale,
            logger: get_logger("source"),
        }
    }

    /// Underlying reader
    pub const fn reader(&self) -> &R {
        &self.reader
    }

    async fn read_once(&mut self) -> Result<PowerSample> {
        if !self.reader.is_connected() {
            self.reader.connect().await?;
        }

        let registers = self
            .reader
            .read_holding_registers(self.register, self.count)
            .await?;
        let observed_at = Instant::now();

        let watts = match decode_power(&registers, self.data_type)? {
            Some(raw) => raw * self.scale,
            None => {
                self.logger
                    .debug("Inverter reports no value (NaN marker); treating as 0 W");
                0.0
            }
        };

        if watts < 0.0 {
            self.logger
                .debug(&format!("Clamping negative power {:.0} W to 0 W", watts));
        }

        Ok(PowerSample::new(watts, observed_at))
    }
}

#[async_trait::async_trait]
impl<R: RegisterReader> PowerSource for ModbusPowerSource<R> {
    fn describe(&self) -> String {
        format!(
            "{} register {} ({:?})",
            self.reader.endpoint(),
            self.register,
            self.data_type
        )
    }

    async fn sample(&mut self) -> Result<PowerSample> {
        match self.read_once().await {
            Ok(sample) => Ok(sample),
            Err(e) if e.is_transient() => {
                // Reconnect once before giving up on this tick
                self.logger
                    .warn(&format!("Read failed ({}), reconnecting once", e));
                self.reader.disconnect().await;
                self.read_once().await
            }
            Err(e) => Err(e),
        }
    }

    async fn close(&mut self) {
        self.reader.disconnect().await;
    }
}
