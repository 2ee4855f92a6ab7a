//! Custom error types for the application.
//!
//! This module defines every error the acquisition core can surface. Using the
//! `thiserror` crate, it provides a centralized and consistent way to handle the
//! different kinds of failures, from configuration issues to instrument replies
//! that cannot be decoded.
//!
//! ## Error Hierarchy
//!
//! - **[`ConfigError`]**: Loading, validating or saving [`Settings`](crate::config::Settings).
//! - **[`ConnectError`]**: Missing address/port or a transport that cannot be opened.
//!   Surfaced immediately, never retried.
//! - **[`LinkError`]**: Failures talking to an open instrument link. Decode failures
//!   carry the raw reply so the framing mismatch can be logged verbatim.
//! - **[`AcquisitionError`]**: Link errors wrapped with the intent of the caller
//!   (`CouldNotMeasure`, `CouldNotGetInfo`).
//! - **[`ExportError`]**: Writing tables of measurements or samples.
//!
//! The aggregation model has no error type: missing optional geometry degrades to
//! `NaN` derived values instead.

use thiserror::Error;

/// Convenience alias for results of acquisition operations.
pub type AppResult<T> = std::result::Result<T, AcquisitionError>;

/// Errors raised while loading, validating or persisting settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Reading or writing the settings file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be serialized back to TOML.
    #[error("Settings serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Load(Box::new(value))
    }
}

/// Errors raised while opening the instrument link.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectError {
    /// No instrument address is configured.
    #[error("No instrument address configured")]
    NoAddress,

    /// No instrument port is configured.
    #[error("No instrument port configured")]
    NoPort,

    /// The transport to the instrument could not be opened.
    #[error("Could not create instrument link at {address}:{port}: {reason}")]
    CouldNotCreateLink {
        /// Address that was dialled.
        address: String,
        /// Port that was dialled.
        port: u16,
        /// Underlying transport failure.
        reason: String,
    },
}

/// Errors raised by queries on an instrument link.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The link has no open connection.
    #[error("Instrument not connected")]
    NotConnected,

    /// Writing to or reading from the transport failed.
    #[error("Instrument I/O error: {0}")]
    Io(String),

    /// The instrument did not reply in time.
    #[error("Timeout after {timeout_ms} ms waiting for reply to '{command}'")]
    Timeout {
        /// Query that timed out.
        command: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The instrument closed the connection.
    #[error("Connection closed by instrument")]
    ConnectionClosed,

    /// A resistance reply could not be decoded as a number.
    #[error("Could not decode '{raw}' as a number")]
    DoubleCouldNotBeDecoded {
        /// Reply exactly as received.
        raw: String,
    },
}

impl From<std::io::Error> for LinkError {
    fn from(value: std::io::Error) -> Self {
        LinkError::Io(value.to_string())
    }
}

/// Errors raised by the acquisition controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// No instrument is connected.
    #[error("Nanovoltmeter not connected")]
    NotConnected,

    /// Opening the instrument link failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// A resistance measurement failed.
    #[error("Could not measure resistance: {0}")]
    CouldNotMeasure(#[source] LinkError),

    /// The instrument identity could not be read.
    #[error("Could not get instrument information: {0}")]
    CouldNotGetInfo(#[source] LinkError),
}

impl AcquisitionError {
    /// True when the underlying reply reached the host but could not be decoded.
    ///
    /// This points at a framing/protocol mismatch rather than a connectivity problem.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            AcquisitionError::CouldNotMeasure(LinkError::DoubleCouldNotBeDecoded { .. })
                | AcquisitionError::CouldNotGetInfo(LinkError::DoubleCouldNotBeDecoded { .. })
        )
    }
}

/// Errors raised while writing exported tables.
#[derive(Error, Debug)]
pub enum ExportError {
    /// A record could not be written.
    #[error("Table write error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
