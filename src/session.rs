//! Session orchestration.
//!
//! A [`Session`] ties the acquisition controller, the shared data model and the
//! persisted [`Settings`] together. It is what a front end drives: connect, take a
//! burst, delete a selection, rename the current sample or location, save.
//!
//! Every reading of a burst is recorded with a snapshot of the settings taken when
//! the burst started, so renaming the sample mid-burst only affects later bursts.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::acquisition::{AcquisitionController, EquipmentStatus};
use crate::config::{Settings, SettingsStore};
use crate::error::{AppResult, ConfigError};
use crate::instrument::Connector;
use crate::model::{Measurement, ModelHandle};

/// Controller, model and settings for one acquisition session.
pub struct Session {
    settings: RwLock<Settings>,
    store: Arc<dyn SettingsStore>,
    controller: Arc<AcquisitionController>,
    model: ModelHandle,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &*self.settings.read())
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session that talks to the instrument over TCP.
    ///
    /// Settings are read from `store` and validated.
    pub fn new(store: Arc<dyn SettingsStore>) -> Result<Self, ConfigError> {
        let settings = store.load()?;
        settings.validate()?;
        let controller = AcquisitionController::with_tcp(settings.link_config());
        Ok(Self::from_parts(settings, store, controller, ModelHandle::default()))
    }

    /// Session whose links are opened through `connector`.
    pub fn with_connector(
        store: Arc<dyn SettingsStore>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ConfigError> {
        let settings = store.load()?;
        settings.validate()?;
        let controller = AcquisitionController::new(connector, settings.link_config());
        Ok(Self::from_parts(settings, store, controller, ModelHandle::default()))
    }

    /// Assemble a session from existing collaborators. No validation is done.
    pub fn from_parts(
        settings: Settings,
        store: Arc<dyn SettingsStore>,
        controller: AcquisitionController,
        model: ModelHandle,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            store,
            controller: Arc::new(controller),
            model,
        }
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Shared data model.
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Acquisition controller, e.g. to subscribe to status or stop a burst.
    pub fn controller(&self) -> &Arc<AcquisitionController> {
        &self.controller
    }

    /// Current equipment status.
    pub fn status(&self) -> EquipmentStatus {
        self.controller.status()
    }

    /// Connect to the configured address and port.
    ///
    /// The link is opened with the protocol parameters of the current settings.
    pub async fn connect(&self) -> AppResult<()> {
        let (address, port, link_config) = {
            let settings = self.settings.read();
            let (address, port) = settings.instrument_endpoint();
            (address.map(str::to_string), port, settings.link_config())
        };
        self.controller.set_link_config(link_config);
        self.controller.connect(address.as_deref(), port).await
    }

    /// Close the instrument link.
    pub async fn disconnect(&self) {
        self.controller.disconnect().await;
    }

    /// Instrument identity string.
    pub async fn identify(&self) -> AppResult<String> {
        self.controller.identify().await
    }

    /// Take a burst with the configured count and period and record every reading.
    ///
    /// Returns the recorded measurements in acquisition order.
    #[instrument(skip(self))]
    pub async fn measure(&self) -> AppResult<Vec<Measurement>> {
        let settings = self.settings.read().normalized();
        let readings = self
            .controller
            .measure_burst(
                settings.acquisition.burst_count,
                settings.acquisition.period_secs,
            )
            .await?;

        let recorded: Vec<Measurement> = readings
            .into_iter()
            .map(|resistance| {
                self.model.record_measurement(
                    resistance,
                    settings.sample_info(),
                    settings.location_info(),
                    settings.resistivity_info(),
                    settings.line_resistance_info(),
                )
            })
            .collect();
        info!(count = recorded.len(), sample = %settings.sample.name, "Recorded burst");
        Ok(recorded)
    }

    /// Remove the listed measurements. Returns how many were removed.
    pub fn delete(&self, ids: &[Uuid]) -> usize {
        self.model.delete_measurements(ids)
    }

    /// Name under which the next readings are recorded.
    ///
    /// A name not seen before opens a new sample on the next reading.
    pub fn set_sample_name(&self, name: impl Into<String>) {
        self.settings.write().sample.name = name.into();
    }

    /// Location name for the next readings.
    ///
    /// A name different from the current location opens a new location.
    pub fn set_location_name(&self, name: impl Into<String>) {
        self.settings.write().location.name = name.into();
    }

    /// Replace the settings wholesale after validating them.
    pub fn update_settings(&self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        *self.settings.write() = settings;
        Ok(())
    }

    /// Persist the current settings through the store.
    pub fn save_settings(&self) -> Result<(), ConfigError> {
        let settings = self.settings();
        self.store.save(&settings)
    }
}
