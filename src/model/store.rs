//! Aggregation root and its shared, observable handle.
//!
//! [`DataModel`] is a plain single-owner value: every mutation takes `&mut self`.
//! [`ModelHandle`] wraps it in `Arc<parking_lot::RwLock<_>>` so readers never observe
//! a half-applied record or delete, and fans out [`ModelEvent`]s over a
//! `tokio::sync::broadcast` channel once the write lock has been released.

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::aggregate::Sample;
use super::info::{LineResistanceInfo, LocationInfo, ResistivityInfo, SampleInfo};
use super::measurement::Measurement;
use super::statistics::{MeasurementType, Statistics};

/// Default capacity of the model change channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Field a flattened view can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Global sequence number.
    Number,
    /// Composite `sample-location-measurement` key, compared numerically.
    SampleId,
    /// Sample name.
    SampleName,
    /// Location name.
    LocationName,
    /// Raw resistance.
    Resistance,
    /// Derived resistivity.
    Resistivity,
    /// Derived line resistance.
    LineResistance,
    /// Capture timestamp.
    Date,
}

/// Direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One entry of a multi-key sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Field to compare.
    pub key: SortKey,
    /// Direction.
    pub order: SortOrder,
}

impl SortDescriptor {
    /// Ascending on `key`.
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            order: SortOrder::Ascending,
        }
    }

    /// Descending on `key`.
    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            order: SortOrder::Descending,
        }
    }

    fn compare(&self, a: &Measurement, b: &Measurement) -> Ordering {
        let ordering = match self.key {
            SortKey::Number => a.number.cmp(&b.number),
            SortKey::SampleId => sample_id_key(a).cmp(&sample_id_key(b)),
            SortKey::SampleName => a.sample_info.name.cmp(&b.sample_info.name),
            SortKey::LocationName => a.location_info.name.cmp(&b.location_info.name),
            SortKey::Resistance => a.resistance.total_cmp(&b.resistance),
            SortKey::Resistivity => a.resistivity().total_cmp(&b.resistivity()),
            SortKey::LineResistance => a.line_resistance().total_cmp(&b.line_resistance()),
            SortKey::Date => a.date.cmp(&b.date),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

fn sample_id_key(m: &Measurement) -> (usize, usize, usize) {
    (
        m.sample_info.number,
        m.location_info.number,
        m.location_info.measurement_count,
    )
}

/// The aggregation root: samples in insertion order plus the global counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    samples: Vec<Sample>,
    measurement_counter: u64,
    resistance_statistics: Statistics,
    resistivity_statistics: Statistics,
    line_resistance_statistics: Statistics,
}

impl Default for DataModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DataModel {
    /// An empty model.
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            measurement_counter: 0,
            resistance_statistics: Statistics::new(MeasurementType::Resistance),
            resistivity_statistics: Statistics::new(MeasurementType::Resistivity),
            line_resistance_statistics: Statistics::new(MeasurementType::LineResistance),
        }
    }

    /// A model pre-filled with random readings in `1.0e-4..1.9e-4` Ω.
    ///
    /// Samples are named `Sample 1..` and locations `Location 1..`; every reading has
    /// resistivity and line resistance enabled so derived columns are populated.
    pub fn with_demo_data(samples: usize, locations: usize, per_location: usize) -> Self {
        let mut model = Self::new();
        let mut rng = rand::thread_rng();
        let resistivity = ResistivityInfo {
            enabled: true,
            thickness: 1.0e-6,
            thickness_correction_factor: 1.0,
            finite_width_correction_factor: 1.0,
        };
        let line_resistance = LineResistanceInfo {
            enabled: true,
            voltage_sensing_gap: Some(0.02),
        };

        for s in 1..=samples {
            for l in 1..=locations {
                for _ in 0..per_location {
                    model.record_measurement(
                        rng.gen_range(1.0e-4..1.9e-4),
                        SampleInfo::new(format!("Sample {s}")),
                        LocationInfo::new(format!("Location {l}")),
                        resistivity,
                        line_resistance,
                    );
                }
            }
        }
        model
    }

    /// Samples in insertion order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Global sequence number of the most recent measurement (0 when none).
    pub fn measurement_counter(&self) -> u64 {
        self.measurement_counter
    }

    /// Statistics over every measurement held by the model.
    pub fn statistics(&self, kind: MeasurementType) -> &Statistics {
        match kind {
            MeasurementType::Resistance => &self.resistance_statistics,
            MeasurementType::Resistivity => &self.resistivity_statistics,
            MeasurementType::LineResistance => &self.line_resistance_statistics,
        }
    }

    /// Record a reading, bucketing it into a sample and location by name.
    ///
    /// A sample is created when no existing sample has `sample_info.name`; within
    /// it a location is created when the current location's name differs.
    pub fn record_measurement(
        &mut self,
        resistance: f64,
        sample_info: SampleInfo,
        location_info: LocationInfo,
        resistivity_info: ResistivityInfo,
        line_resistance_info: LineResistanceInfo,
    ) -> Measurement {
        let index = match self
            .samples
            .iter()
            .position(|s| s.info.name == sample_info.name)
        {
            Some(index) => index,
            None => {
                let mut info = sample_info;
                info.number = self.samples.len() + 1;
                info.measurement_count = 0;
                debug!(sample = %info.name, number = info.number, "Creating sample");
                self.samples.push(Sample::new(info));
                self.samples.len() - 1
            }
        };

        self.measurement_counter += 1;
        let measurement = self.samples[index].record(
            resistance,
            location_info,
            resistivity_info,
            line_resistance_info,
            self.measurement_counter,
        );
        self.recompute_statistics();
        measurement
    }

    /// Remove every measurement whose id is listed. Returns how many were removed.
    ///
    /// Statistics of the affected samples and the global statistics are
    /// recomputed; nothing is renumbered.
    pub fn delete_measurements(&mut self, ids: &[Uuid]) -> usize {
        let ids: HashSet<Uuid> = ids.iter().copied().collect();
        let removed: usize = self.samples.iter_mut().map(|s| s.remove(&ids)).sum();
        if removed > 0 {
            self.recompute_statistics();
        }
        removed
    }

    /// Every measurement, samples then locations concatenated in insertion order.
    pub fn flattened(&self) -> impl Iterator<Item = &Measurement> + '_ {
        self.samples.iter().flat_map(Sample::flattened)
    }

    /// Filtered and sorted copy of the flattened measurements.
    ///
    /// `filter` is a case-insensitive substring matched against sample name,
    /// location name and sample id; empty matches everything. The sort is stable,
    /// applies `sort` in order of precedence, and breaks remaining ties by global
    /// sequence number.
    pub fn flattened_view(&self, filter: &str, sort: &[SortDescriptor]) -> Vec<Measurement> {
        let needle = filter.to_lowercase();
        let mut view: Vec<Measurement> = self
            .flattened()
            .filter(|m| m.matches_lowercase(&needle))
            .cloned()
            .collect();

        view.sort_by(|a, b| {
            sort.iter()
                .map(|descriptor| descriptor.compare(a, b))
                .find(|ordering| ordering.is_ne())
                .unwrap_or_else(|| a.number.cmp(&b.number))
        });
        view
    }

    /// Samples having at least one measurement that matches `filter`.
    pub fn filtered_samples(&self, filter: &str) -> Vec<&Sample> {
        let needle = filter.to_lowercase();
        self.samples
            .iter()
            .filter(|s| s.flattened().any(|m| m.matches_lowercase(&needle)))
            .collect()
    }

    /// Measurements whose id is listed, in flattened order.
    pub fn measurements_by_ids(&self, ids: &[Uuid]) -> Vec<Measurement> {
        let ids: HashSet<&Uuid> = ids.iter().collect();
        self.flattened()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect()
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

/// Change notification published by [`ModelHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A measurement was appended.
    MeasurementRecorded {
        /// Id of the new measurement.
        id: Uuid,
        /// Its global sequence number.
        number: u64,
    },
    /// Measurements were removed.
    MeasurementsDeleted {
        /// How many were removed.
        count: usize,
    },
}

/// Shared, thread-safe access to a [`DataModel`] with change notifications.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<RwLock<DataModel>>,
    events: broadcast::Sender<ModelEvent>,
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new(DataModel::new())
    }
}

impl ModelHandle {
    /// Wrap `model` for shared access.
    pub fn new(model: DataModel) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(model)),
            events,
        }
    }

    /// Subscribe to change events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    /// Run `f` against a consistent read view.
    pub fn read<R>(&self, f: impl FnOnce(&DataModel) -> R) -> R {
        f(&self.inner.read())
    }

    /// Owned copy of the whole model.
    pub fn snapshot(&self) -> DataModel {
        self.inner.read().clone()
    }

    /// See [`DataModel::record_measurement`]. Publishes [`ModelEvent::MeasurementRecorded`].
    pub fn record_measurement(
        &self,
        resistance: f64,
        sample_info: SampleInfo,
        location_info: LocationInfo,
        resistivity_info: ResistivityInfo,
        line_resistance_info: LineResistanceInfo,
    ) -> Measurement {
        let measurement = self.inner.write().record_measurement(
            resistance,
            sample_info,
            location_info,
            resistivity_info,
            line_resistance_info,
        );
        // No receivers is fine.
        let _ = self.events.send(ModelEvent::MeasurementRecorded {
            id: measurement.id,
            number: measurement.number,
        });
        measurement
    }

    /// See [`DataModel::delete_measurements`]. Publishes an event when anything was removed.
    pub fn delete_measurements(&self, ids: &[Uuid]) -> usize {
        let count = self.inner.write().delete_measurements(ids);
        if count > 0 {
            let _ = self.events.send(ModelEvent::MeasurementsDeleted { count });
        }
        count
    }

    /// See [`DataModel::flattened_view`].
    pub fn flattened_view(&self, filter: &str, sort: &[SortDescriptor]) -> Vec<Measurement> {
        self.inner.read().flattened_view(filter, sort)
    }

    /// Owned copies of [`DataModel::filtered_samples`].
    pub fn filtered_samples(&self, filter: &str) -> Vec<Sample> {
        self.inner
            .read()
            .filtered_samples(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// See [`DataModel::measurements_by_ids`].
    pub fn measurements_by_ids(&self, ids: &[Uuid]) -> Vec<Measurement> {
        self.inner.read().measurements_by_ids(ids)
    }
}
