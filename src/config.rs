//! Layered settings using Figment
//!
//! Settings are loaded from:
//! 1. a TOML file (default `config/resistivity.toml`)
//! 2. environment variables prefixed with `RESISTIVITY_`, using `__` between
//!    nesting levels (e.g. `RESISTIVITY_INSTRUMENT__PORT=5025`)
//!
//! Every field has a default, so a missing or empty file yields a usable
//! [`Settings`]. Persistence is injected through [`SettingsStore`] rather than
//! owned by the acquisition core.
//!
//! # Example
//! ```no_run
//! use resistivity_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Instrument: {:?}", settings.instrument.address);
//! # Ok::<(), resistivity_daq::error::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::instrument::{LinkConfig, ReplyDecoder};
use crate::logging::LogFormat;
use crate::model::{LineResistanceInfo, LocationInfo, ResistivityInfo, SampleInfo};
use crate::units::{ConvertibleUnit, DisplayUnits, LengthUnits};
use crate::validation;

/// Default settings file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/resistivity.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RESISTIVITY_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Instrument link settings
    pub instrument: InstrumentSettings,
    /// Burst acquisition settings
    pub acquisition: AcquisitionSettings,
    /// Current sample
    pub sample: SampleSettings,
    /// Current probe location
    pub location: LocationSettings,
    /// Resistivity derivation
    pub resistivity: ResistivitySettings,
    /// Line resistance derivation
    pub line_resistance: LineResistanceSettings,
    /// Preferred display units
    pub units: DisplayUnits,
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format (pretty, compact, json)
    pub log_format: LogFormat,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Nanovoltmeter connection and protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Instrument gateway IP address
    pub address: Option<String>,
    /// Instrument gateway TCP port
    pub port: Option<u16>,
    /// Per-query reply timeout in milliseconds
    pub query_timeout_ms: u64,
    /// Pause after each query before the instrument can be trusted again
    pub min_query_delay_ms: u64,
    /// Queries issued to flush the reply buffer after a mode change
    pub flush_count: usize,
    /// Identity query
    pub identify_command: String,
    /// Four-wire resistance query
    pub resistance_command: String,
    /// Framing markers stripped from the front of replies
    pub framing_prefixes: Vec<String>,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            address: Some("169.254.1.103".to_string()),
            port: Some(1234),
            query_timeout_ms: 5000,
            min_query_delay_ms: 2000,
            flush_count: 3,
            identify_command: "*IDN?".to_string(),
            resistance_command: "MEAS:FRES?".to_string(),
            framing_prefixes: vec!["1`".to_string(), "1'".to_string()],
        }
    }
}

/// Burst acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Readings per burst (floored at 1)
    pub burst_count: u32,
    /// Seconds between readings (floored at `f64::EPSILON`)
    pub period_secs: f64,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            burst_count: 1,
            period_secs: 1.0,
        }
    }
}

/// Name of the sample being measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleSettings {
    /// Sample name
    pub name: String,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            name: "Sample".to_string(),
        }
    }
}

/// Name of the probe location being measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationSettings {
    /// Location name
    pub name: String,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            name: "Location".to_string(),
        }
    }
}

/// Resistivity geometry as entered by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResistivitySettings {
    /// Derive resistivity for new readings
    pub enabled: bool,
    /// Sample thickness, in `thickness_units`
    pub thickness: f64,
    /// Unit of `thickness`
    pub thickness_units: LengthUnits,
    /// Thickness correction factor
    pub thickness_correction_factor: f64,
    /// Finite width correction factor
    pub finite_width_correction_factor: f64,
}

impl Default for ResistivitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            thickness: 1.0,
            thickness_units: LengthUnits::Millimeter,
            thickness_correction_factor: 1.0,
            finite_width_correction_factor: 1.0,
        }
    }
}

/// Line resistance geometry as entered by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineResistanceSettings {
    /// Derive line resistance for new readings
    pub enabled: bool,
    /// Voltage sensing probe gap, in `gap_units`
    pub voltage_sensing_gap: Option<f64>,
    /// Unit of `voltage_sensing_gap`
    pub gap_units: LengthUnits,
}

impl Default for LineResistanceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            voltage_sensing_gap: Some(20.0),
            gap_units: LengthUnits::Millimeter,
        }
    }
}

impl Settings {
    /// Load settings from the default file and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `RESISTIVITY_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file path plus environment variables
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| {
            Err(ConfigError::Validation(format!("{field}: {reason}")))
        };

        if !VALID_LOG_LEVELS.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if let Some(address) = &self.instrument.address {
            if let Err(reason) = validation::is_valid_ip(address) {
                return invalid("instrument.address", reason);
            }
        }
        if let Some(port) = self.instrument.port {
            if let Err(reason) = validation::is_valid_port(port) {
                return invalid("instrument.port", reason);
            }
        }
        if let Err(reason) = validation::is_in_range(self.instrument.flush_count, 1..=16) {
            return invalid("instrument.flush_count", reason);
        }
        if let Err(reason) = validation::is_not_empty(&self.instrument.identify_command) {
            return invalid("instrument.identify_command", reason);
        }
        if let Err(reason) = validation::is_not_empty(&self.instrument.resistance_command) {
            return invalid("instrument.resistance_command", reason);
        }

        let geometry = [
            ("resistivity.thickness", self.resistivity.thickness),
            (
                "resistivity.thickness_correction_factor",
                self.resistivity.thickness_correction_factor,
            ),
            (
                "resistivity.finite_width_correction_factor",
                self.resistivity.finite_width_correction_factor,
            ),
        ];
        for (field, value) in geometry {
            if let Err(reason) = validation::is_positive_finite(value) {
                return invalid(field, reason);
            }
        }

        Ok(())
    }

    /// Copy with the acquisition floors applied (burst count ≥ 1, period ≥ ε).
    pub fn normalized(&self) -> Self {
        let mut settings = self.clone();
        settings.acquisition.burst_count = settings.acquisition.burst_count.max(1);
        let period = settings.acquisition.period_secs;
        if period.is_nan() || period < f64::EPSILON {
            settings.acquisition.period_secs = f64::EPSILON;
        }
        settings
    }

    /// Instrument address and port, if both are configured.
    pub fn instrument_endpoint(&self) -> (Option<&str>, Option<u16>) {
        (self.instrument.address.as_deref(), self.instrument.port)
    }

    /// Protocol parameters for an [`InstrumentLink`](crate::instrument::InstrumentLink).
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            query_timeout: Duration::from_millis(self.instrument.query_timeout_ms),
            min_query_delay: Duration::from_millis(self.instrument.min_query_delay_ms),
            flush_count: self.instrument.flush_count,
            identify_command: self.instrument.identify_command.clone(),
            resistance_command: self.instrument.resistance_command.clone(),
            decoder: ReplyDecoder::new(self.instrument.framing_prefixes.clone()),
        }
    }

    /// Snapshot of the current sample name.
    pub fn sample_info(&self) -> SampleInfo {
        SampleInfo::new(self.sample.name.clone())
    }

    /// Snapshot of the current location name.
    pub fn location_info(&self) -> LocationInfo {
        LocationInfo::new(self.location.name.clone())
    }

    /// Resistivity geometry with thickness converted to meters.
    pub fn resistivity_info(&self) -> ResistivityInfo {
        ResistivityInfo {
            enabled: self.resistivity.enabled,
            thickness: self.resistivity.thickness_units.to_base(self.resistivity.thickness),
            thickness_correction_factor: self.resistivity.thickness_correction_factor,
            finite_width_correction_factor: self.resistivity.finite_width_correction_factor,
        }
    }

    /// Line resistance geometry with the gap converted to meters.
    pub fn line_resistance_info(&self) -> LineResistanceInfo {
        let units = self.line_resistance.gap_units;
        LineResistanceInfo {
            enabled: self.line_resistance.enabled,
            voltage_sensing_gap: self
                .line_resistance
                .voltage_sensing_gap
                .map(|gap| units.to_base(gap)),
        }
    }
}

/// Load/save collaborator for [`Settings`].
pub trait SettingsStore: Send + Sync {
    /// Read the persisted settings.
    fn load(&self) -> Result<Settings, ConfigError>;

    /// Persist `settings`.
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// Settings persisted to a TOML file, with environment overrides on load.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    /// Store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TomlSettingsStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        Settings::load_from(&self.path)
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(settings)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        tracing::debug!(path = %self.path.display(), "Saved settings");
        Ok(())
    }
}

/// Settings kept in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    /// Store seeded with `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        Ok(self.settings.lock().clone())
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.settings.lock() = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ResistanceUnits;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.instrument.address.as_deref(), Some("169.254.1.103"));
        assert_eq!(settings.instrument.port, Some(1234));
        assert_eq!(settings.instrument.flush_count, 3);
        assert_eq!(settings.line_resistance.voltage_sensing_gap, Some(20.0));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.acquisition, AcquisitionSettings::default());
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            r##"
[instrument]
address = "10.0.0.5"
port = 5025
framing_prefixes = ["#1"]

[acquisition]
burst_count = 10

[application]
log_format = "json"

[units]
resistance = "milli_ohms"
"##,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.instrument.address.as_deref(), Some("10.0.0.5"));
        assert_eq!(settings.instrument.port, Some(5025));
        assert_eq!(settings.instrument.framing_prefixes, vec!["#1".to_string()]);
        assert_eq!(settings.instrument.resistance_command, "MEAS:FRES?");
        assert_eq!(settings.acquisition.burst_count, 10);
        assert_eq!(settings.units.resistance, ResistanceUnits::MilliOhms);
        assert_eq!(settings.application.log_format, LogFormat::Json);
        assert_eq!(settings.application.log_level, "info");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "verbose".to_string();
        assert!(matches!(settings.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_instrument_settings() {
        let mut settings = Settings::default();
        settings.instrument.address = Some("not-an-ip".to_string());
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.instrument.port = Some(0);
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.instrument.flush_count = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_non_positive_geometry_rejected() {
        let mut settings = Settings::default();
        settings.resistivity.thickness_correction_factor = 0.0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("thickness_correction_factor"));
    }

    #[test]
    fn test_normalized_applies_floors() {
        let mut settings = Settings::default();
        settings.acquisition.burst_count = 0;
        settings.acquisition.period_secs = -3.0;
        let normalized = settings.normalized();
        assert_eq!(normalized.acquisition.burst_count, 1);
        assert_eq!(normalized.acquisition.period_secs, f64::EPSILON);
    }

    #[test]
    fn test_info_snapshots_convert_to_meters() {
        let mut settings = Settings::default();
        settings.resistivity.enabled = true;
        settings.resistivity.thickness = 250.0;
        settings.resistivity.thickness_units = LengthUnits::Micron;
        settings.line_resistance.enabled = true;

        let resistivity = settings.resistivity_info();
        assert!((resistivity.thickness - 250.0e-6).abs() < 1e-18);

        let line = settings.line_resistance_info();
        assert_eq!(line.voltage_sensing_gap, Some(0.02));
        assert_eq!(settings.sample_info().name, "Sample");
    }

    #[test]
    fn test_toml_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlSettingsStore::new(dir.path().join("nested").join("settings.toml"));

        let mut settings = Settings::default();
        settings.sample.name = "Wafer 7".to_string();
        settings.instrument.port = Some(5025);
        settings.units.length = LengthUnits::Micron;
        store.save(&settings).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.sample.name, "Wafer 7");
        assert_eq!(loaded.instrument.port, Some(5025));
        assert_eq!(loaded.units.length, LengthUnits::Micron);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        let mut settings = store.load().unwrap();
        settings.location.name = "Edge".to_string();
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap().location.name, "Edge");
    }
}
