//! # Helios - PV surplus relay switcher
//!
//! Reads the current generation of a photovoltaic inverter over Modbus TCP
//! and switches a single relay-driven load (a heater, a pump) on when there
//! is enough surplus, with hysteresis and dwell-time limits so the relay
//! does not chatter.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `modbus`: Modbus TCP register client and power decoding
//! - `source`: Power source abstraction over the inverter
//! - `dwell`: Minimum/maximum on-time bookkeeping
//! - `decision`: Pure switching rules
//! - `relay`: Relay outputs and the idempotent actuator
//! - `advisory`: Optional read-only advice (scaling table, forecast signal)
//! - `switch_log`: Record of every relay transition
//! - `driver`: The control loop tying it all together

pub mod advisory;
pub mod config;
pub mod decision;
pub mod driver;
pub mod dwell;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod relay;
pub mod source;
pub mod switch_log;

// Re-export commonly used types
pub use config::Config;
pub use driver::{ShutdownHandle, SwitchDriver};
pub use error::{HeliosError, Result};
