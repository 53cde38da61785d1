//! Modbus TCP client for PV inverter communication
//!
//! This module provides async Modbus TCP register reads against the inverter,
//! classifying failures into transient network problems and protocol
//! mismatches (wrong unit, register or layout), plus the register decoders
//! used to turn raw words into watts.

use crate::config::InverterConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::ExceptionCode;
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// Raw register data types understood by [`decode_power`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    U16,
    S16,
    U32,
    S32,
    F32,
}

impl RegisterType {
    /// Number of 16-bit words the type occupies
    pub const fn word_count(self) -> u16 {
        match self {
            Self::U16 | Self::S16 => 1,
            Self::U32 | Self::S32 | Self::F32 => 2,
        }
    }
}

/// Register access used by the power source
///
/// Implemented by [`ModbusClient`]; tests substitute scripted readers.
#[async_trait::async_trait]
pub trait RegisterReader: Send {
    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;

    /// Whether a connection is currently held
    fn is_connected(&self) -> bool;

    /// Establish the connection
    async fn connect(&mut self) -> Result<()>;

    /// Drop the connection
    async fn disconnect(&mut self);

    /// Read `count` holding registers starting at `address`
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
}

/// Modbus TCP client for the inverter
pub struct ModbusClient {
    /// Modbus TCP client connection
    client: Option<tokio_modbus::client::Context>,

    /// Configuration
    config: InverterConfig,

    /// Connection timeout
    connection_timeout: Duration,

    /// Operation timeout
    operation_timeout: Duration,

    /// Logger
    logger: StructuredLogger,
}

impl ModbusClient {
    /// Create a new Modbus client
    pub fn new(config: &InverterConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("modbus")
                .with_endpoint(format!("{}:{}", config.host, config.port))
                .with_field("unit", config.unit_id.to_string()),
        );
        Self {
            client: None,
            config: config.clone(),
            connection_timeout: Duration::from_millis(config.connect_timeout_ms),
            operation_timeout: Duration::from_millis(config.read_timeout_ms),
            logger,
        }
    }

    /// Resolve the configured endpoint to a socket address
    ///
    /// Takes owned values so the `connect` future does not borrow the client
    /// across the lookup.
    async fn resolve(host: String, port: u16, connect_timeout: Duration) -> Result<SocketAddr> {
        let trimmed = host.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(HeliosError::protocol_mismatch(format!(
                "Invalid socket address: {:?}",
                host
            )));
        }

        let address = format!("{}:{}", trimmed, port);
        if let Ok(addr) = address.parse::<SocketAddr>() {
            return Ok(addr);
        }

        match timeout(connect_timeout, tokio::net::lookup_host(address.clone())).await {
            Ok(Ok(mut addrs)) => addrs.next().ok_or_else(|| {
                HeliosError::transient(format!("No addresses found for {}", address))
            }),
            Ok(Err(e)) => Err(HeliosError::transient(format!(
                "Failed to resolve {}: {}",
                address, e
            ))),
            Err(_) => Err(HeliosError::transient("Address resolution timeout")),
        }
    }

    /// Get client reference or error if not connected
    fn get_client(&mut self) -> Result<&mut tokio_modbus::client::Context> {
        self.client
            .as_mut()
            .ok_or_else(|| HeliosError::transient("Not connected to Modbus server"))
    }
}

#[async_trait::async_trait]
impl RegisterReader for ModbusClient {
    fn endpoint(&self) -> String {
        format!(
            "{}:{} unit {}",
            self.config.host, self.config.port, self.config.unit_id
        )
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        let socket_addr = Self::resolve(
            self.config.host.clone(),
            self.config.port,
            self.connection_timeout,
        )
        .await?;

        self.logger
            .info(&format!("Connecting to Modbus server at {}", socket_addr));

        let slave = Slave(self.config.unit_id);
        match timeout(self.connection_timeout, tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(client)) => {
                self.client = Some(client);
                self.logger.info("Successfully connected to Modbus server");
                Ok(())
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to connect to Modbus server: {}", e);
                self.logger.warn(&error_msg);
                Err(HeliosError::transient(error_msg))
            }
            Err(_) => {
                let error_msg = "Connection timeout".to_string();
                self.logger.warn(&error_msg);
                Err(HeliosError::transient(error_msg))
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.logger.info("Disconnecting from Modbus server");
        }
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let timeout_duration = self.operation_timeout;

        self.logger.trace(&format!(
            "Reading {} registers from address {}",
            count, address
        ));

        let client = self.get_client()?;
        let request = client.read_holding_registers(address, count);

        match timeout(timeout_duration, request).await {
            Ok(Ok(Ok(response))) => {
                if response.len() < usize::from(count) {
                    return Err(HeliosError::protocol_mismatch(format!(
                        "Short response: expected {} registers, got {}",
                        count,
                        response.len()
                    )));
                }
                self.logger.trace(&format!("Read registers: {:?}", response));
                Ok(response)
            }
            Ok(Ok(Err(exception))) => {
                let error = classify_exception(exception, address);
                self.logger.error(&error.to_string());
                Err(error)
            }
            Ok(Err(e)) => {
                let error = classify_modbus_error(&e);
                self.logger.warn(&error.to_string());
                Err(error)
            }
            Err(_) => {
                let error_msg = "Read operation timeout".to_string();
                self.logger.warn(&error_msg);
                Err(HeliosError::transient(error_msg))
            }
        }
    }
}

/// Map a Modbus exception response onto the connection error taxonomy
pub fn classify_exception(exception: ExceptionCode, address: u16) -> HeliosError {
    match exception {
        ExceptionCode::IllegalFunction
        | ExceptionCode::IllegalDataAddress
        | ExceptionCode::IllegalDataValue => HeliosError::protocol_mismatch(format!(
            "Inverter rejected read of register {}: {}",
            address, exception
        )),
        other => HeliosError::transient(format!(
            "Inverter busy or failing on register {}: {}",
            address, other
        )),
    }
}

fn classify_modbus_error(error: &tokio_modbus::Error) -> HeliosError {
    if let tokio_modbus::Error::Transport(e) = error {
        HeliosError::transient(format!("Modbus transport error: {}", e))
    } else {
        HeliosError::protocol_mismatch(format!("Modbus protocol error: {}", error))
    }
}

/// Decode 32-bit float from two 16-bit registers (big-endian)
pub fn decode_32bit_float(registers: &[u16]) -> Result<f32> {
    let words = take_words(registers, 2)?;
    let raw = (u32::from(words[0]) << 16) | u32::from(words[1]);
    Ok(f32::from_bits(raw))
}

/// Decode a power register into watts
///
/// Returns `Ok(None)` for the SunSpec/SMA "not a number" markers, which the
/// inverter reports while it is not producing.
pub fn decode_power(registers: &[u16], data_type: RegisterType) -> Result<Option<f64>> {
    let words = take_words(registers, data_type.word_count())?;
    let value = match data_type {
        RegisterType::U16 => {
            if words[0] == 0xFFFF {
                return Ok(None);
            }
            f64::from(words[0])
        }
        RegisterType::S16 => {
            if words[0] == 0x8000 {
                return Ok(None);
            }
            f64::from(words[0].cast_signed())
        }
        RegisterType::U32 => {
            let raw = (u32::from(words[0]) << 16) | u32::from(words[1]);
            if raw == 0xFFFF_FFFF {
                return Ok(None);
            }
            f64::from(raw)
        }
        RegisterType::S32 => {
            let raw = (u32::from(words[0]) << 16) | u32::from(words[1]);
            if raw == 0x8000_0000 {
                return Ok(None);
            }
            f64::from(raw.cast_signed())
        }
        RegisterType::F32 => {
            let value = decode_32bit_float(words)?;
            if !value.is_finite() {
                return Ok(None);
            }
            f64::from(value)
        }
    };
    Ok(Some(value))
}

fn take_words(registers: &[u16], count: u16) -> Result<&[u16]> {
    registers.get(..usize::from(count)).ok_or_else(|| {
        HeliosError::protocol_mismatch(format!(
            "Insufficient registers: need {}, got {}",
            count,
            registers.len()
        ))
    })
}
