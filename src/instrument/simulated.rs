//! In-process nanovoltmeter for tests and demos.
//!
//! The simulator reproduces the behaviour the link has to cope with: every reply
//! is the answer to the *previous* query, identity replies are framed with ``1` ``
//! and readings with `1'`. Every command received is recorded so tests can check
//! exactly what was sent.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{Connector, Transport};
use crate::error::{ConnectError, LinkError};

/// Identity string reported by the simulator.
pub const SIMULATED_IDENTITY: &str = "Simulated Ohm Meter";

const IDENTITY_PREFIX: &str = "1`";
const READING_PREFIX: &str = "1'";
const GARBAGE_READING: &str = "1'OVERLOAD\n";

#[derive(Debug)]
struct SimState {
    identify_command: String,
    resistance_command: String,
    identity: String,
    commands: Vec<String>,
    pending: Option<String>,
    buffered: bool,
    scripted: VecDeque<f64>,
    fixed_reading: Option<f64>,
    failing: bool,
    garbage: bool,
    latency: Duration,
    open: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            identify_command: "*IDN?".to_string(),
            resistance_command: "MEAS:FRES?".to_string(),
            identity: SIMULATED_IDENTITY.to_string(),
            commands: Vec::new(),
            pending: None,
            buffered: true,
            scripted: VecDeque::new(),
            fixed_reading: None,
            failing: false,
            garbage: false,
            latency: Duration::ZERO,
            open: true,
        }
    }
}

impl SimState {
    fn fresh_reply(&mut self, command: &str) -> Option<String> {
        if command == self.identify_command {
            Some(format!("{}{}\n", IDENTITY_PREFIX, self.identity))
        } else if command == self.resistance_command {
            let value = self
                .scripted
                .pop_front()
                .or(self.fixed_reading)
                .unwrap_or_else(|| rand::thread_rng().gen_range(1.0e-4..1.9e-4));
            Some(format!("{}{:+E}\n", READING_PREFIX, value))
        } else {
            None
        }
    }
}

/// Shared view of a simulator's state, used to script it and inspect traffic.
#[derive(Debug, Clone, Default)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatorHandle {
    /// Every command received so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Queue readings (ohms) returned, in order, by the next resistance queries.
    pub fn push_readings(&self, readings: impl IntoIterator<Item = f64>) {
        self.state.lock().scripted.extend(readings);
    }

    /// Reading returned once the scripted queue is empty; `None` means random.
    pub fn set_fixed_reading(&self, reading: Option<f64>) {
        self.state.lock().fixed_reading = reading;
    }

    /// Whether replies lag one query behind. On by default.
    pub fn set_buffered(&self, buffered: bool) {
        let mut state = self.state.lock();
        state.buffered = buffered;
        state.pending = None;
    }

    /// Make every query fail with an I/O error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Make resistance queries return an undecodable reply.
    pub fn set_garbage(&self, garbage: bool) {
        self.state.lock().garbage = garbage;
    }

    /// Delay applied before every reply.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Override the identity string.
    pub fn set_identity(&self, identity: impl Into<String>) {
        self.state.lock().identity = identity.into();
    }

    /// False once the link has closed its transport.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

/// Simulated nanovoltmeter transport.
#[derive(Debug, Clone, Default)]
pub struct SimulatedNanovoltmeter {
    handle: SimulatorHandle,
}

impl SimulatedNanovoltmeter {
    /// A simulator with default commands and random readings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulator answering to custom query strings.
    pub fn with_commands(identify: impl Into<String>, resistance: impl Into<String>) -> Self {
        let sim = Self::default();
        {
            let mut state = sim.handle.state.lock();
            state.identify_command = identify.into();
            state.resistance_command = resistance.into();
        }
        sim
    }

    /// Handle for scripting and inspection.
    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Transport for SimulatedNanovoltmeter {
    async fn query(&mut self, command: &str, timeout: Duration) -> Result<String, LinkError> {
        let latency = {
            let mut state = self.handle.state.lock();
            if !state.open {
                return Err(LinkError::ConnectionClosed);
            }
            state.commands.push(command.to_string());
            state.latency
        };

        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(LinkError::Timeout {
                command: command.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.handle.state.lock();
        if state.failing {
            return Err(LinkError::Io("simulated instrument failure".to_string()));
        }

        let Some(fresh) = state.fresh_reply(command) else {
            return Err(LinkError::Timeout {
                command: command.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        };

        let reply = if state.buffered {
            state.pending.replace(fresh.clone()).unwrap_or(fresh)
        } else {
            fresh
        };

        if state.garbage && command == state.resistance_command {
            return Ok(GARBAGE_READING.to_string());
        }
        tracing::trace!(command, reply = ?reply, "Simulated instrument reply");
        Ok(reply)
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        self.handle.state.lock().open = false;
        Ok(())
    }
}

/// Connector that hands out a shared [`SimulatedNanovoltmeter`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    simulator: SimulatedNanovoltmeter,
    refuse: bool,
}

impl SimulatedConnector {
    /// Connector for a fresh simulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for an existing simulator.
    pub fn with_simulator(simulator: SimulatedNanovoltmeter) -> Self {
        Self {
            simulator,
            refuse: false,
        }
    }

    /// Connector whose `open` always fails, as an unreachable gateway would.
    pub fn refusing() -> Self {
        Self {
            simulator: SimulatedNanovoltmeter::default(),
            refuse: true,
        }
    }

    /// Handle onto the simulator this connector opens.
    pub fn handle(&self) -> SimulatorHandle {
        self.simulator.handle()
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn open(&self, address: &str, port: u16) -> Result<Box<dyn Transport>, ConnectError> {
        if self.refuse {
            return Err(ConnectError::CouldNotCreateLink {
                address: address.to_string(),
                port,
                reason: "simulated gateway unreachable".to_string(),
            });
        }
        let simulator = self.simulator.clone();
        simulator.handle.state.lock().open = true;
        tracing::info!(address, port, "Opened simulated instrument");
        Ok(Box::new(simulator))
    }
}
