//! Nanovoltmeter link: transport seam, TCP transport, reply decoding and simulation.
//!
//! The instrument answers each query with the reply to the *previous* query of the
//! same kind (a one-deep buffer). [`InstrumentLink`] hides this by tracking the
//! current [`ReturnMode`] and flushing the buffer whenever the mode changes.
//!
//! # Layout
//! - [`Transport`]: one open, message-oriented connection (query in, line out).
//! - [`Connector`]: opens a [`Transport`] for an address and port.
//! - [`TcpTransport`] / [`TcpConnector`]: the production implementation.
//! - [`SimulatedNanovoltmeter`] / [`SimulatedConnector`]: an in-process instrument
//!   with the same buffering behaviour, for tests and demos.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::{ConnectError, LinkError};

mod decode;
mod link;
mod simulated;
mod transport;

pub use decode::ReplyDecoder;
pub use link::{InstrumentLink, LinkGuard};
pub use simulated::{SimulatedConnector, SimulatedNanovoltmeter, SimulatorHandle, SIMULATED_IDENTITY};
pub use transport::{TcpConnector, TcpTransport, DEFAULT_CONNECT_TIMEOUT};

/// Which kind of reply the instrument is currently primed to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnMode {
    /// Identity string (`*IDN?`).
    Identifier,
    /// Four-wire resistance reading.
    Resistance,
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnMode::Identifier => f.write_str("identifier"),
            ReturnMode::Resistance => f.write_str("resistance"),
        }
    }
}

/// A single open connection to the instrument.
///
/// Implementations send `command` with the instrument's line terminator and return
/// the next reply line exactly as received, framing included.
#[async_trait]
pub trait Transport: Send {
    /// Send a query and wait up to `timeout` for one reply line.
    async fn query(&mut self, command: &str, timeout: Duration) -> Result<String, LinkError>;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

/// Opens transports to the instrument.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport to `address:port`.
    async fn open(&self, address: &str, port: u16) -> Result<Box<dyn Transport>, ConnectError>;
}

/// Protocol parameters for an [`InstrumentLink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Upper bound on waiting for any single reply.
    pub query_timeout: Duration,
    /// Pause after each flush query, and the floor between burst readings.
    pub min_query_delay: Duration,
    /// Discarded queries issued on every mode change.
    pub flush_count: usize,
    /// Identity query.
    pub identify_command: String,
    /// Resistance query.
    pub resistance_command: String,
    /// Reply decoder.
    pub decoder: ReplyDecoder,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            min_query_delay: Duration::from_secs(2),
            flush_count: 3,
            identify_command: "*IDN?".to_string(),
            resistance_command: "MEAS:FRES?".to_string(),
            decoder: ReplyDecoder::default(),
        }
    }
}

impl LinkConfig {
    /// Query that primes the instrument for `mode`.
    pub fn command_for(&self, mode: ReturnMode) -> &str {
        match mode {
            ReturnMode::Identifier => &self.identify_command,
            ReturnMode::Resistance => &self.resistance_command,
        }
    }

    /// Same configuration with a different inter-query delay.
    pub fn with_min_query_delay(mut self, delay: Duration) -> Self {
        self.min_query_delay = delay;
        self
    }
}
