//! Error types and handling for Helios
//!
//! This module defines the error types used throughout the application.
//! Source failures carry a [`ConnectionErrorKind`] so the control loop can
//! tell a flaky network apart from a misconfigured register map.

use thiserror::Error;

/// Result type alias for Helios operations
pub type Result<T> = std::result::Result<T, HeliosError>;

/// Classification of a failed power-source read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Refused, timed out or dropped; retrying is sensible
    Transient,
    /// Wrong address, unit or register layout; retrying will not help
    ProtocolMismatch,
}

impl std::fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::ProtocolMismatch => write!(f, "protocol mismatch"),
        }
    }
}

/// Main error type for Helios
#[derive(Debug, Error)]
pub enum HeliosError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Threshold/dwell settings violate their invariants
    #[error("Invalid thresholds: {message}")]
    InvalidThresholds { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Power source (inverter) communication errors
    #[error("Connection error ({kind}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// Relay hardware write failed; the physical state is unknown
    #[error("Actuation error: hardware fault: {message}")]
    Actuation { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl HeliosError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new invalid-thresholds error
    pub fn invalid_thresholds<S: Into<String>>(message: S) -> Self {
        Self::InvalidThresholds {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a transient connection error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            kind: ConnectionErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Create a protocol-mismatch connection error
    pub fn protocol_mismatch<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            kind: ConnectionErrorKind::ProtocolMismatch,
            message: message.into(),
        }
    }

    /// Create a new hardware fault
    pub fn hardware_fault<S: Into<String>>(message: S) -> Self {
        Self::Actuation {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Connection kind, if this is a source failure
    pub const fn connection_kind(&self) -> Option<ConnectionErrorKind> {
        match self {
            Self::Connection { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying the failed operation soon is sensible
    pub fn is_transient(&self) -> bool {
        self.connection_kind() == Some(ConnectionErrorKind::Transient)
    }
}

impl From<std::io::Error> for HeliosError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HeliosError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HeliosError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
