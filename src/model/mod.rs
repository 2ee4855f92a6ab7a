//! Hierarchical aggregation model: sample → location → measurement.
//!
//! Readings are bucketed by name into [`Sample`]s and [`Location`]s, stamped with a
//! global sequence number, and summarised by per-sample and global
//! [`Statistics`]. Nothing in this module returns an error: missing optional
//! geometry shows up as NaN derived values.

mod aggregate;
mod info;
mod measurement;
mod statistics;
mod store;

pub use aggregate::{Location, Sample};
pub use info::{LineResistanceInfo, LocationInfo, ResistivityInfo, SampleInfo};
pub use measurement::Measurement;
pub use statistics::{MeasurementType, Statistics};
pub use store::{
    DataModel, ModelEvent, ModelHandle, SortDescriptor, SortKey, SortOrder, DEFAULT_EVENT_CAPACITY,
};
