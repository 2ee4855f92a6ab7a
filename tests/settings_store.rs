//! Integration tests for settings persistence and session wiring
//!
//! File-backed settings go through a temporary directory; sessions run against
//! the simulated instrument.

use resistivity_daq::config::{MemorySettingsStore, Settings, SettingsStore, TomlSettingsStore};
use resistivity_daq::error::ConfigError;
use resistivity_daq::instrument::SimulatedConnector;
use resistivity_daq::session::Session;
use resistivity_daq::units::{LengthUnits, ResistivityUnits};
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_toml_store_round_trip() {
    let dir = tempdir().unwrap();
    let store = TomlSettingsStore::new(dir.path().join("nested").join("resistivity.toml"));

    let mut settings = Settings::default();
    settings.sample.name = "Wafer 7".to_string();
    settings.location.name = "Center".to_string();
    settings.acquisition.burst_count = 5;
    settings.resistivity.enabled = true;
    settings.resistivity.thickness = 250.0;
    settings.resistivity.thickness_units = LengthUnits::Micron;
    settings.units.resistivity = ResistivityUnits::MicroOhmCentimeters;

    store.save(&settings).unwrap();
    assert!(store.path().exists());
    assert_eq!(store.load().unwrap(), settings);
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/resistivity.toml");
    let settings = Settings::load_from(path).unwrap();
    assert!(settings.validate().is_ok());
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[instrument]\naddress = \"not-an-ip\"\n").unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert!(matches!(settings.validate(), Err(ConfigError::Validation(_))));

    let store: Arc<dyn SettingsStore> = Arc::new(TomlSettingsStore::new(&path));
    let err = Session::new(store).unwrap_err();
    assert!(err.to_string().contains("instrument.address"));
}

#[test]
fn test_malformed_file_fails_to_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[acquisition]\nburst_count = \"many\"\n").unwrap();
    assert!(matches!(Settings::load_from(&path), Err(ConfigError::Load(_))));
}

#[tokio::test]
async fn test_session_snapshots_geometry_in_meters() {
    let mut settings = Settings::default();
    settings.instrument.min_query_delay_ms = 0;
    settings.acquisition.burst_count = 2;
    settings.acquisition.period_secs = 0.0;
    settings.resistivity.enabled = true;
    settings.resistivity.thickness = 500.0;
    settings.resistivity.thickness_units = LengthUnits::Nanometer;
    settings.line_resistance.enabled = true;
    settings.line_resistance.voltage_sensing_gap = Some(20.0);

    let store = Arc::new(MemorySettingsStore::new(settings));
    let session = Session::with_connector(store, Arc::new(SimulatedConnector::new())).unwrap();
    session.connect().await.unwrap();

    let recorded = session.measure().await.unwrap();
    assert_eq!(recorded.len(), 2);
    for m in &recorded {
        assert!((m.resistivity_info.thickness - 5.0e-7).abs() < 1e-18);
        assert_eq!(m.line_resistance_info.voltage_sensing_gap, Some(0.02));
        assert!((m.line_resistance() - m.resistance / 0.02).abs() < 1e-12);
        assert!(!m.resistivity().is_nan());
    }

    // Later geometry changes do not touch recorded measurements.
    let mut changed = session.settings();
    changed.resistivity.thickness = 1.0;
    session.update_settings(changed).unwrap();
    let stored = session.model().measurements_by_ids(&[recorded[0].id]);
    assert_eq!(stored[0].resistivity_info.thickness, recorded[0].resistivity_info.thickness);
}

#[tokio::test]
async fn test_session_save_persists_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("resistivity.toml");
    let store = Arc::new(TomlSettingsStore::new(&path));
    let session = Session::with_connector(store.clone(), Arc::new(SimulatedConnector::new())).unwrap();

    session.set_sample_name("Film 3");
    session.set_location_name("Edge");
    session.save_settings().unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded.sample.name, "Film 3");
    assert_eq!(reloaded.location.name, "Edge");
}
