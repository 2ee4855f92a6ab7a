use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::info::{LineResistanceInfo, LocationInfo, ResistivityInfo, SampleInfo};

/// A single recorded resistance reading. Immutable once created.
///
/// The embedded infos are snapshots taken when the reading landed, with the sample
/// and location counters already incremented to include this measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Stable identifier, used for selection and deletion.
    pub id: Uuid,
    /// Raw resistance in ohms.
    pub resistance: f64,
    /// Sample identity at capture time.
    pub sample_info: SampleInfo,
    /// Location identity at capture time.
    pub location_info: LocationInfo,
    /// Resistivity geometry at capture time.
    pub resistivity_info: ResistivityInfo,
    /// Line resistance geometry at capture time.
    pub line_resistance_info: LineResistanceInfo,
    /// Global sequence number, 1-based and never reused.
    pub number: u64,
    /// Capture timestamp.
    pub date: DateTime<Utc>,
}

impl Measurement {
    pub(crate) fn new(
        resistance: f64,
        sample_info: SampleInfo,
        location_info: LocationInfo,
        resistivity_info: ResistivityInfo,
        line_resistance_info: LineResistanceInfo,
        number: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resistance,
            sample_info,
            location_info,
            resistivity_info,
            line_resistance_info,
            number,
            date: Utc::now(),
        }
    }

    /// Derived resistivity in ohm-meters, NaN when not applicable.
    pub fn resistivity(&self) -> f64 {
        self.resistivity_info.resistivity(self.resistance)
    }

    /// Derived line resistance in ohms per meter, NaN when not applicable.
    pub fn line_resistance(&self) -> f64 {
        self.line_resistance_info.line_resistance(self.resistance)
    }

    /// Composite display key `"{sample}-{location}-{location measurement}"`.
    pub fn sample_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.sample_info.number, self.location_info.number, self.location_info.measurement_count
        )
    }

    /// Case-insensitive substring match against sample name, location name and sample id.
    ///
    /// `needle` must already be lowercased; an empty needle matches everything.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.sample_info.name.to_lowercase().contains(needle)
            || self.location_info.name.to_lowercase().contains(needle)
            || self.sample_id().to_lowercase().contains(needle)
    }
}
