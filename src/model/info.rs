//! Value objects captured alongside every measurement.
//!
//! These are snapshots: a [`Measurement`](super::Measurement) stores copies taken at
//! the moment it was recorded, so later configuration changes never alter history.

use serde::{Deserialize, Serialize};
use std::f64::consts::{LN_2, PI};
use uuid::Uuid;

/// Identity of a physical sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name. Two infos with the same name denote the same sample.
    pub name: String,
    /// 1-based number assigned when the sample is first created (0 until then).
    pub number: usize,
    /// Measurements taken under this sample so far.
    pub measurement_count: usize,
}

impl SampleInfo {
    /// A fresh, unnumbered sample identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            number: 0,
            measurement_count: 0,
        }
    }
}

/// Identity of a probe location on a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// Stable identifier.
    pub id: Uuid,
    /// Display name, compared against the sample's current location.
    pub name: String,
    /// 1-based number within the owning sample (0 until assigned).
    pub number: usize,
    /// Measurements taken at this location so far.
    pub measurement_count: usize,
}

impl LocationInfo {
    /// A fresh, unnumbered location identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            number: 0,
            measurement_count: 0,
        }
    }
}

/// Geometry used to derive resistivity from a four-point-probe resistance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResistivityInfo {
    /// Whether resistivity should be derived at all.
    pub enabled: bool,
    /// Sample thickness in meters.
    pub thickness: f64,
    /// Dimensionless thickness correction factor.
    pub thickness_correction_factor: f64,
    /// Dimensionless finite width correction factor.
    pub finite_width_correction_factor: f64,
}

impl Default for ResistivityInfo {
    fn default() -> Self {
        Self {
            enabled: false,
            thickness: 1.0e-3,
            thickness_correction_factor: 1.0,
            finite_width_correction_factor: 1.0,
        }
    }
}

impl ResistivityInfo {
    /// `(π / ln 2) · t · f1 · f2 · R` in ohm-meters, or NaN when disabled.
    pub fn resistivity(&self, resistance: f64) -> f64 {
        if !self.enabled {
            return f64::NAN;
        }
        (PI / LN_2)
            * self.thickness
            * self.thickness_correction_factor
            * self.finite_width_correction_factor
            * resistance
    }
}

/// Probe gap used to derive line resistance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LineResistanceInfo {
    /// Whether line resistance should be derived at all.
    pub enabled: bool,
    /// Voltage sensing gap in meters, if known.
    pub voltage_sensing_gap: Option<f64>,
}

impl LineResistanceInfo {
    /// `R / gap` in ohms per meter; NaN when disabled or the gap is absent or not positive.
    pub fn line_resistance(&self, resistance: f64) -> f64 {
        match self.voltage_sensing_gap {
            Some(gap) if self.enabled && gap > 0.0 => resistance / gap,
            _ => f64::NAN,
        }
    }
}
