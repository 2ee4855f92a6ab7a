//! Acquisition controller: connection lifecycle, single and burst measurements.
//!
//! The controller owns at most one [`InstrumentLink`] and publishes every status
//! change on a `tokio::sync::broadcast` channel. Measurements flip the status to
//! [`EquipmentStatus::Measuring`] and always restore the status that was current
//! before they started, on success and on failure alike. The prior status is
//! read only once the link lock is held, so overlapping callers restore in order.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::error::{AcquisitionError, AppResult};
use crate::instrument::{Connector, InstrumentLink, LinkConfig, LinkGuard, TcpConnector};

/// Default capacity of the status channel.
pub const DEFAULT_STATUS_CAPACITY: usize = 64;

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    /// No link.
    #[default]
    Disconnected,
    /// Link being opened.
    Connecting,
    /// Link open and idle.
    Connected,
    /// A measurement is in progress.
    Measuring,
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EquipmentStatus::Disconnected => "disconnected",
            EquipmentStatus::Connecting => "connecting",
            EquipmentStatus::Connected => "connected",
            EquipmentStatus::Measuring => "measuring",
        };
        f.write_str(label)
    }
}

/// Drives one nanovoltmeter.
pub struct AcquisitionController {
    connector: Arc<dyn Connector>,
    link_config: Mutex<LinkConfig>,
    link: RwLock<Option<Arc<InstrumentLink>>>,
    status: Mutex<EquipmentStatus>,
    status_tx: broadcast::Sender<EquipmentStatus>,
    identity: Mutex<Option<String>>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl fmt::Debug for AcquisitionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionController")
            .field("status", &*self.status.lock())
            .field("link_config", &*self.link_config.lock())
            .finish_non_exhaustive()
    }
}

impl AcquisitionController {
    /// Controller that opens links through `connector`.
    pub fn new(connector: Arc<dyn Connector>, link_config: LinkConfig) -> Self {
        let (status_tx, _) = broadcast::channel(DEFAULT_STATUS_CAPACITY);
        Self {
            connector,
            link_config: Mutex::new(link_config),
            link: RwLock::new(None),
            status: Mutex::new(EquipmentStatus::Disconnected),
            status_tx,
            identity: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Controller for a real instrument over TCP.
    pub fn with_tcp(link_config: LinkConfig) -> Self {
        Self::new(Arc::new(TcpConnector::default()), link_config)
    }

    /// Current status.
    pub fn status(&self) -> EquipmentStatus {
        *self.status.lock()
    }

    /// Receive every status change from now on, including repeats.
    pub fn subscribe(&self) -> broadcast::Receiver<EquipmentStatus> {
        self.status_tx.subscribe()
    }

    /// Identity reported after the last successful connect, if any.
    pub fn identity(&self) -> Option<String> {
        self.identity.lock().clone()
    }

    /// Protocol parameters handed to new links.
    pub fn link_config(&self) -> LinkConfig {
        self.link_config.lock().clone()
    }

    /// Replace the protocol parameters. Takes effect on the next [`connect`](Self::connect).
    pub fn set_link_config(&self, link_config: LinkConfig) {
        *self.link_config.lock() = link_config;
    }

    fn set_status(&self, status: EquipmentStatus) {
        *self.status.lock() = status;
        info!(%status, "Equipment status changed");
        // No receivers is fine.
        let _ = self.status_tx.send(status);
    }

    async fn current_link(&self) -> AppResult<Arc<InstrumentLink>> {
        if self.status() == EquipmentStatus::Disconnected {
            return Err(AcquisitionError::NotConnected);
        }
        self.link
            .read()
            .await
            .clone()
            .ok_or(AcquisitionError::NotConnected)
    }

    /// Open a link to `address:port`, replacing any existing one.
    ///
    /// Status goes `connecting` then `connected`, or back to `disconnected` on
    /// failure. A diagnostic identify follows a successful connect; its failure is
    /// ignored.
    pub async fn connect(&self, address: Option<&str>, port: Option<u16>) -> AppResult<()> {
        let previous = self.link.write().await.take();
        if let Some(previous) = previous {
            if let Err(e) = previous.close().await {
                warn!(error = %e, "Failed to close previous instrument link");
            }
        }
        *self.identity.lock() = None;

        self.set_status(EquipmentStatus::Connecting);
        let link = match InstrumentLink::connect(
            self.connector.as_ref(),
            address,
            port,
            self.link_config(),
        )
        .await
        {
            Ok(link) => link,
            Err(e) => {
                warn!(error = %e, "Could not connect to nanovoltmeter");
                self.set_status(EquipmentStatus::Disconnected);
                return Err(e.into());
            }
        };

        *self.link.write().await = Some(Arc::new(link));
        self.set_status(EquipmentStatus::Connected);

        match self.identify().await {
            Ok(identity) => *self.identity.lock() = Some(identity),
            Err(e) => debug!(error = %e, "Post-connect identify failed"),
        }
        Ok(())
    }

    /// Close the link. Status becomes `disconnected`.
    pub async fn disconnect(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            if let Err(e) = link.close().await {
                warn!(error = %e, "Error while closing instrument link");
            }
        }
        *self.identity.lock() = None;
        self.set_status(EquipmentStatus::Disconnected);
    }

    /// Instrument identity string.
    pub async fn identify(&self) -> AppResult<String> {
        let link = self.current_link().await?;
        link.identify()
            .await
            .map_err(AcquisitionError::CouldNotGetInfo)
    }

    /// One resistance reading in ohms.
    pub async fn measure_once(&self) -> AppResult<f64> {
        let link = self.current_link().await?;
        let mut guard = link.lock().await;

        let prior = self.status();
        self.set_status(EquipmentStatus::Measuring);
        let result = guard
            .measure_resistance()
            .await
            .map_err(AcquisitionError::CouldNotMeasure);
        self.set_status(prior);
        result
    }

    /// `count` sequential readings, `max(period_secs, min_query_delay)` apart.
    ///
    /// `count < 1` or a negative (or NaN) period returns an empty vector without
    /// touching the link. The link stays locked for the whole burst. A
    /// [`request_stop`](Self::request_stop) ends the burst early and returns the
    /// readings taken so far.
    pub async fn measure_burst(&self, count: u32, period_secs: f64) -> AppResult<Vec<f64>> {
        if count < 1 || period_secs.is_nan() || period_secs < 0.0 {
            debug!(count, period_secs, "Ignoring empty burst request");
            return Ok(Vec::new());
        }
        let link = self.current_link().await?;
        let interval = Duration::try_from_secs_f64(period_secs)
            .unwrap_or(Duration::MAX)
            .max(link.config().min_query_delay);

        let mut guard = link.lock().await;
        self.stop_requested.store(false, Ordering::SeqCst);
        let prior = self.status();
        self.set_status(EquipmentStatus::Measuring);
        let result = self.run_burst(&mut guard, count, interval).await;
        self.set_status(prior);
        result
    }

    async fn run_burst(
        &self,
        guard: &mut LinkGuard<'_>,
        count: u32,
        interval: Duration,
    ) -> AppResult<Vec<f64>> {
        let mut readings = Vec::with_capacity(count as usize);

        for index in 0..count {
            if self.stop_requested.load(Ordering::SeqCst) {
                info!(taken = readings.len(), count, "Burst stopped on request");
                break;
            }

            let value = guard
                .measure_resistance()
                .await
                .map_err(AcquisitionError::CouldNotMeasure)?;
            debug!(index, value, "Burst reading");
            readings.push(value);

            if index + 1 < count {
                // Register before checking the flag so a stop that lands in between still wakes us.
                let notified = self.stop_notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.stop_requested.load(Ordering::SeqCst) {
                    info!(taken = readings.len(), count, "Burst stopped on request");
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = notified => {}
                }
            }
        }
        Ok(readings)
    }

    /// Ask a running burst to stop after its current reading.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }
}
