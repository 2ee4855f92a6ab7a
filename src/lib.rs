//! # Resistivity DAQ Core Library
//!
//! Four-point-probe resistance acquisition from a networked nanovoltmeter, with
//! readings aggregated into samples and locations and derived resistivity and line
//! resistance. The CLI in `main.rs` is a thin front end over this library.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: `AcquisitionController`, which owns the instrument link,
//!   publishes `EquipmentStatus` changes and runs single and burst measurements.
//! - **`config`**: Layered `Settings` (TOML file + `RESISTIVITY_` environment
//!   variables) and the `SettingsStore` persistence seam.
//! - **`error`**: The error taxonomy shared by every module.
//! - **`export`**: The `Exportable` row contract (`header()` / `data()`).
//! - **`instrument`**: Transport and connector traits, the TCP transport, reply
//!   decoding, the buffer-flushing `InstrumentLink` and a simulated instrument.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`model`**: Measurements, samples, locations, statistics and the shared
//!   `ModelHandle`.
//! - **`session`**: Orchestration of controller, model and settings.
//! - **`units`**: Display unit conversion.
//! - **`validation`**: Small reusable validators for configuration values.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod export;
pub mod instrument;
pub mod logging;
pub mod model;
pub mod session;
pub mod units;
pub mod validation;
