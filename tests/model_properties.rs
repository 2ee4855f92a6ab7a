//! Integration tests for the aggregation model
//!
//! Sequence numbering, sample/location bucketing, statistics, deletion and the
//! filtered, sorted flattened view.

use resistivity_daq::model::{
    DataModel, LineResistanceInfo, LocationInfo, MeasurementType, ModelEvent, ModelHandle,
    ResistivityInfo, SampleInfo, SortDescriptor, SortKey,
};
use std::f64::consts::{LN_2, PI};

fn record(model: &mut DataModel, value: f64, sample: &str, location: &str) -> u64 {
    model
        .record_measurement(
            value,
            SampleInfo::new(sample),
            LocationInfo::new(location),
            ResistivityInfo::default(),
            LineResistanceInfo::default(),
        )
        .number
}

#[test]
fn test_sequence_numbers_are_dense_and_never_reused() {
    let mut model = DataModel::new();
    let numbers: Vec<u64> = (0..5)
        .map(|i| record(&mut model, f64::from(i), "S", "L"))
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let last = model.flattened().last().unwrap().id;
    assert_eq!(model.delete_measurements(&[last]), 1);
    assert_eq!(record(&mut model, 9.0, "S", "L"), 6);
    assert_eq!(model.measurement_counter(), 6);
}

#[test]
fn test_bucketing_by_sample_and_location_name() {
    let mut model = DataModel::new();
    record(&mut model, 1.0, "A", "x");
    record(&mut model, 2.0, "A", "x");
    record(&mut model, 3.0, "A", "y");
    record(&mut model, 4.0, "B", "x");
    // Returning to an earlier location name opens a new location.
    record(&mut model, 5.0, "A", "x");

    let samples = model.samples();
    assert_eq!(samples.len(), 2);
    let a = &samples[0];
    let names: Vec<&str> = a.locations.iter().map(|l| l.info.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "x"]);
    assert_eq!(a.info.measurement_count, 4);
    assert_eq!(a.locations[0].info.measurement_count, 2);
    assert_eq!(a.current_location().unwrap().info.number, 3);

    let ids: Vec<String> = model.flattened().map(|m| m.sample_id()).collect();
    assert_eq!(ids, vec!["1-1-1", "1-1-2", "1-2-1", "1-3-1", "2-1-1"]);
}

#[test]
fn test_sample_statistics() {
    let mut model = DataModel::new();
    for value in [10.0, 20.0, 30.0] {
        record(&mut model, value, "S", "L");
    }
    let stats = model.samples()[0].statistics(MeasurementType::Resistance);
    assert_eq!(stats.mean, 20.0);
    assert_eq!(stats.min, 10.0);
    assert_eq!(stats.max, 30.0);
    assert!((stats.std_dev - (200.0f64 / 3.0).sqrt()).abs() < 1e-12);
    assert_eq!(stats.count, 3);

    // Derivations were disabled, so the derived statistics stay empty.
    let resistivity = model.statistics(MeasurementType::Resistivity);
    assert_eq!(resistivity.count, 0);
    assert_eq!(resistivity.mean, 0.0);
}

#[test]
fn test_deletion_recomputes_statistics() {
    let mut model = DataModel::new();
    for value in [10.0, 20.0, 30.0] {
        record(&mut model, value, "S", "L");
    }
    let ids: Vec<_> = model
        .flattened()
        .filter(|m| m.resistance != 20.0)
        .map(|m| m.id)
        .collect();
    assert_eq!(model.delete_measurements(&ids), 2);

    let stats = model.statistics(MeasurementType::Resistance);
    assert_eq!((stats.mean, stats.min, stats.max, stats.std_dev), (20.0, 20.0, 20.0, 0.0));
    // Surviving measurement keeps its number and sample id.
    let survivor = model.flattened().next().unwrap();
    assert_eq!((survivor.number, survivor.sample_id().as_str()), (2, "1-1-2"));
}

#[test]
fn test_derived_quantities() {
    let mut model = DataModel::new();
    let resistivity = ResistivityInfo {
        enabled: true,
        thickness: 1.0e-6,
        thickness_correction_factor: 0.9,
        finite_width_correction_factor: 0.5,
    };
    let line = LineResistanceInfo {
        enabled: true,
        voltage_sensing_gap: Some(0.02),
    };
    let m = model.record_measurement(
        2.0,
        SampleInfo::new("S"),
        LocationInfo::new("L"),
        resistivity,
        line,
    );

    let expected = PI / LN_2 * 1.0e-6 * 0.9 * 0.5 * 2.0;
    assert!((m.resistivity() - expected).abs() < 1e-18);
    assert!((m.line_resistance() - 100.0).abs() < 1e-9);

    let missing_gap = LineResistanceInfo {
        enabled: true,
        voltage_sensing_gap: None,
    };
    let m = model.record_measurement(
        2.0,
        SampleInfo::new("S"),
        LocationInfo::new("L"),
        ResistivityInfo::default(),
        missing_gap,
    );
    assert!(m.line_resistance().is_nan());
    assert!(m.resistivity().is_nan());
    // NaN derived values are skipped by the statistics.
    assert_eq!(model.statistics(MeasurementType::LineResistance).count, 1);
}

#[test]
fn test_filtered_and_sorted_view() {
    let mut model = DataModel::new();
    record(&mut model, 3.0, "Wafer", "Center");
    record(&mut model, 1.0, "Wafer", "Edge");
    record(&mut model, 2.0, "Film", "Center");
    record(&mut model, 1.0, "Film", "Center");

    let by_resistance = model.flattened_view("", &[SortDescriptor::ascending(SortKey::Resistance)]);
    let numbers: Vec<u64> = by_resistance.iter().map(|m| m.number).collect();
    // Equal resistances fall back to sequence number.
    assert_eq!(numbers, vec![2, 4, 3, 1]);

    let centers = model.flattened_view(
        "cEnTeR",
        &[
            SortDescriptor::ascending(SortKey::SampleName),
            SortDescriptor::descending(SortKey::Number),
        ],
    );
    let numbers: Vec<u64> = centers.iter().map(|m| m.number).collect();
    assert_eq!(numbers, vec![4, 3, 1]);

    let wafers = model.filtered_samples("edge");
    assert_eq!(wafers.len(), 1);
    assert_eq!(wafers[0].info.name, "Wafer");

    assert!(model.flattened_view("nothing matches", &[]).is_empty());
}

#[test]
fn test_sample_id_sort_is_numeric() {
    let mut model = DataModel::new();
    for i in 0..11 {
        record(&mut model, 1.0, "S", &format!("L{i}"));
    }
    let view = model.flattened_view("", &[SortDescriptor::descending(SortKey::SampleId)]);
    assert_eq!(view[0].sample_id(), "1-11-1");
    assert_eq!(view[1].sample_id(), "1-10-1");
    assert_eq!(view[2].sample_id(), "1-9-1");
}

#[test]
fn test_demo_data_shape() {
    let model = DataModel::with_demo_data(3, 2, 4);
    assert_eq!(model.samples().len(), 3);
    assert!(model.samples().iter().all(|s| s.locations.len() == 2));
    assert_eq!(model.flattened().count(), 24);
    assert_eq!(model.measurement_counter(), 24);
}

#[tokio::test]
async fn test_handle_publishes_events() {
    let handle = ModelHandle::default();
    let mut events = handle.subscribe();

    let m = handle.record_measurement(
        1.0,
        SampleInfo::new("S"),
        LocationInfo::new("L"),
        ResistivityInfo::default(),
        LineResistanceInfo::default(),
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ModelEvent::MeasurementRecorded { id: m.id, number: 1 }
    );

    assert_eq!(handle.delete_measurements(&[m.id]), 1);
    assert_eq!(
        events.recv().await.unwrap(),
        ModelEvent::MeasurementsDeleted { count: 1 }
    );
    assert_eq!(handle.measurements_by_ids(&[m.id]).len(), 0);
}
