//! The single owned connection to the nanovoltmeter.
//!
//! All queries go through one `tokio::sync::Mutex`, so two queries can never be in
//! flight at once. Callers that need several queries back to back (a burst)
//! take a [`LinkGuard`] and keep it for the whole sequence.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{Connector, LinkConfig, ReturnMode, Transport};
use crate::error::{ConnectError, LinkError};

struct LinkState {
    transport: Option<Box<dyn Transport>>,
    mode: Option<ReturnMode>,
}

/// Owned link to one instrument.
pub struct InstrumentLink {
    state: Mutex<LinkState>,
    config: LinkConfig,
}

impl std::fmt::Debug for InstrumentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentLink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InstrumentLink {
    /// Open a link through `connector` and probe the instrument's identity.
    ///
    /// A missing or empty address fails with [`ConnectError::NoAddress`], a missing
    /// port with [`ConnectError::NoPort`]. The identity probe is diagnostic only:
    /// its failure is logged and the link is still returned.
    pub async fn connect(
        connector: &dyn Connector,
        address: Option<&str>,
        port: Option<u16>,
        config: LinkConfig,
    ) -> Result<Self, ConnectError> {
        let address = address
            .filter(|a| !a.trim().is_empty())
            .ok_or(ConnectError::NoAddress)?;
        let port = port.ok_or(ConnectError::NoPort)?;

        let transport = connector.open(address, port).await?;
        let link = Self::from_transport(transport, config);

        match link.identify().await {
            Ok(identity) => info!(address, port, %identity, "Instrument link established"),
            Err(e) => warn!(address, port, error = %e, "Instrument link open but identity probe failed"),
        }
        Ok(link)
    }

    /// Wrap an already open transport. No probe is sent.
    ///
    /// The return mode starts unknown, so the first query of either kind flushes.
    pub fn from_transport(transport: Box<dyn Transport>, config: LinkConfig) -> Self {
        Self {
            state: Mutex::new(LinkState {
                transport: Some(transport),
                mode: None,
            }),
            config,
        }
    }

    /// Protocol parameters in use.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Exclusive access for a sequence of queries.
    pub async fn lock(&self) -> LinkGuard<'_> {
        LinkGuard {
            state: self.state.lock().await,
            config: &self.config,
        }
    }

    /// Instrument identity string, framing removed.
    pub async fn identify(&self) -> Result<String, LinkError> {
        self.lock().await.identify().await
    }

    /// One four-wire resistance reading in ohms.
    pub async fn measure_resistance(&self) -> Result<f64, LinkError> {
        self.lock().await.measure_resistance().await
    }

    /// Issue the flush sequence for `mode` and record it as current.
    pub async fn flush(&self, mode: ReturnMode) {
        self.lock().await.flush(mode).await;
    }

    /// Mode the instrument is currently primed for, if known.
    pub async fn mode(&self) -> Option<ReturnMode> {
        self.state.lock().await.mode
    }

    /// True until [`close`](Self::close) is called.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.transport.is_some()
    }

    /// Close the transport. Later queries fail with [`LinkError::NotConnected`].
    pub async fn close(&self) -> Result<(), LinkError> {
        let mut state = self.state.lock().await;
        state.mode = None;
        match state.transport.take() {
            Some(mut transport) => transport.close().await,
            None => Ok(()),
        }
    }
}

/// Held lock on an [`InstrumentLink`]; queries through it run back to back.
pub struct LinkGuard<'a> {
    state: MutexGuard<'a, LinkState>,
    config: &'a LinkConfig,
}

impl LinkGuard<'_> {
    /// See [`InstrumentLink::identify`].
    pub async fn identify(&mut self) -> Result<String, LinkError> {
        let raw = self.query_in_mode(ReturnMode::Identifier).await?;
        Ok(self.config.decoder.decode_text(&raw).to_string())
    }

    /// See [`InstrumentLink::measure_resistance`].
    pub async fn measure_resistance(&mut self) -> Result<f64, LinkError> {
        let raw = self.query_in_mode(ReturnMode::Resistance).await?;
        self.config.decoder.decode_f64(&raw).inspect_err(|_| {
            warn!(raw = ?raw, "Could not decode resistance reply");
        })
    }

    /// See [`InstrumentLink::flush`]. Query failures are logged and ignored.
    ///
    /// A closed link sends nothing and keeps its mode unknown.
    pub async fn flush(&mut self, mode: ReturnMode) {
        let config = self.config;
        let command = config.command_for(mode);
        let (timeout, delay, count) = (config.query_timeout, config.min_query_delay, config.flush_count);

        let Some(transport) = self.state.transport.as_mut() else {
            debug!(%mode, "Flush skipped on closed link");
            return;
        };
        debug!(%mode, count, "Flushing instrument reply buffer");
        for attempt in 1..=count {
            if let Err(e) = transport.query(command, timeout).await {
                warn!(%mode, attempt, error = %e, "Flush query failed");
            }
            pause(delay).await;
        }
        self.state.mode = Some(mode);
    }

    async fn query_in_mode(&mut self, mode: ReturnMode) -> Result<String, LinkError> {
        if self.state.transport.is_none() {
            return Err(LinkError::NotConnected);
        }
        if self.state.mode != Some(mode) {
            self.flush(mode).await;
        }

        let config = self.config;
        let command = config.command_for(mode);
        let transport = self
            .state
            .transport
            .as_mut()
            .ok_or(LinkError::NotConnected)?;
        transport.query(command, config.query_timeout).await
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
