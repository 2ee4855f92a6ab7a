//! Sample and location aggregates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::info::{LineResistanceInfo, LocationInfo, ResistivityInfo, SampleInfo};
use super::measurement::Measurement;
use super::statistics::{MeasurementType, Statistics};

/// A probe location: an append-only run of measurements under one name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Identity and counters.
    pub info: LocationInfo,
    /// Measurements in insertion order.
    pub measurements: Vec<Measurement>,
}

impl Location {
    fn new(info: LocationInfo) -> Self {
        Self {
            info,
            measurements: Vec::new(),
        }
    }
}

/// A physical sample: its locations plus running statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Identity and counters.
    pub info: SampleInfo,
    /// Locations in insertion order; the last one is current.
    pub locations: Vec<Location>,
    /// Resistance statistics over every measurement of this sample.
    pub resistance_statistics: Statistics,
    /// Resistivity statistics over every measurement of this sample.
    pub resistivity_statistics: Statistics,
    /// Line resistance statistics over every measurement of this sample.
    pub line_resistance_statistics: Statistics,
}

impl Sample {
    pub(crate) fn new(info: SampleInfo) -> Self {
        Self {
            info,
            locations: Vec::new(),
            resistance_statistics: Statistics::new(MeasurementType::Resistance),
            resistivity_statistics: Statistics::new(MeasurementType::Resistivity),
            line_resistance_statistics: Statistics::new(MeasurementType::LineResistance),
        }
    }

    /// The most recently created location, if any.
    pub fn current_location(&self) -> Option<&Location> {
        self.locations.last()
    }

    /// Every measurement of this sample, locations concatenated in order.
    pub fn flattened(&self) -> impl Iterator<Item = &Measurement> + '_ {
        self.locations.iter().flat_map(|l| l.measurements.iter())
    }

    /// Number of measurements currently held (after deletions).
    pub fn len(&self) -> usize {
        self.locations.iter().map(|l| l.measurements.len()).sum()
    }

    /// True when no measurements are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a reading, opening a new location when `location_info.name` differs
    /// from the current location's name. Counters are bumped before the
    /// measurement snapshots them.
    pub(crate) fn record(
        &mut self,
        resistance: f64,
        location_info: LocationInfo,
        resistivity_info: ResistivityInfo,
        line_resistance_info: LineResistanceInfo,
        number: u64,
    ) -> Measurement {
        let reuse_current = self
            .current_location()
            .is_some_and(|current| current.info.name == location_info.name);
        if !reuse_current {
            let mut info = location_info;
            info.number = self.locations.len() + 1;
            info.measurement_count = 0;
            self.locations.push(Location::new(info));
        }

        self.info.measurement_count += 1;
        let sample_info = self.info.clone();

        let current = self.locations.len() - 1;
        let location = &mut self.locations[current];
        location.info.measurement_count += 1;

        let measurement = Measurement::new(
            resistance,
            sample_info,
            location.info.clone(),
            resistivity_info,
            line_resistance_info,
            number,
        );
        location.measurements.push(measurement.clone());

        self.recompute_statistics();
        measurement
    }

    /// Drop every measurement whose id is in `ids`. Returns how many were removed.
    ///
    /// Numbers and counters are left as they were; only statistics are recomputed.
    pub(crate) fn remove(&mut self, ids: &HashSet<Uuid>) -> usize {
        let before = self.len();
        for location in &mut self.locations {
            location.measurements.retain(|m| !ids.contains(&m.id));
        }
        let removed = before - self.len();
        if removed > 0 {
            self.recompute_statistics();
        }
        removed
    }

    /// Statistics for `kind`.
    pub fn statistics(&self, kind: MeasurementType) -> &Statistics {
        match kind {
            MeasurementType::Resistance => &self.resistance_statistics,
            MeasurementType::Resistivity => &self.resistivity_statistics,
            MeasurementType::LineResistance => &self.line_resistance_statistics,
        }
    }

    fn recompute_statistics(&mut self) {
        let resistance: Vec<f64> = self.flattened().map(|m| m.resistance).collect();
        let resistivity: Vec<f64> = self.flattened().map(Measurement::resistivity).collect();
        let line_resistance: Vec<f64> = self.flattened().map(Measurement::line_resistance).collect();

        self.resistance_statistics.update(resistance);
        self.resistivity_statistics.update(resistivity);
        self.line_resistance_statistics.update(line_resistance);
    }
}
