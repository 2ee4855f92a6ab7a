//! Row-oriented export contract.
//!
//! Every exportable entity yields an ordered `header()` and a `data()` row of the
//! same length, so a collection of rows can be written under one header. Values
//! are in base units unless wrapped in [`Scaled`], which converts them to the
//! preferred [`DisplayUnits`] and labels the headers accordingly.

use chrono::Local;
use std::io::Write;

use crate::error::ExportError;

use crate::model::{
    LineResistanceInfo, LocationInfo, Measurement, MeasurementType, ResistivityInfo, Sample,
    SampleInfo, Statistics,
};
use crate::units::{
    ConvertibleUnit, DisplayUnits, LineResistanceUnits, ResistanceUnits, ResistivityUnits,
};

/// An entity that can be written as one row of a table.
pub trait Exportable {
    /// Column titles.
    fn header(&self) -> Vec<String>;

    /// Column values, aligned with [`header`](Self::header).
    fn data(&self) -> Vec<String>;
}

/// Header of the first item plus one data row per item.
///
/// Returns an empty header when `items` is empty.
pub fn table<'a, T, I>(items: I) -> (Vec<String>, Vec<Vec<String>>)
where
    T: Exportable + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut header = Vec::new();
    let mut rows = Vec::new();
    for item in items {
        if header.is_empty() {
            header = item.header();
        }
        rows.push(item.data());
    }
    (header, rows)
}

/// Write `header` and `rows` as tab-separated records.
///
/// Fields holding a tab, quote or line break are quoted, so every record keeps
/// the header's column count. Nothing is written when `header` is empty.
pub fn write_table<W: Write>(
    writer: W,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<(), ExportError> {
    if header.is_empty() {
        return Ok(());
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Exportable for SampleInfo {
    fn header(&self) -> Vec<String> {
        strings(["Sample Name", "Sample Number", "Sample Measurement Number"])
    }

    fn data(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.number.to_string(),
            self.measurement_count.to_string(),
        ]
    }
}

impl Exportable for LocationInfo {
    fn header(&self) -> Vec<String> {
        strings(["Location Name", "Location Number", "Location Measurement Number"])
    }

    fn data(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.number.to_string(),
            self.measurement_count.to_string(),
        ]
    }
}

impl Exportable for ResistivityInfo {
    fn header(&self) -> Vec<String> {
        strings([
            "Should Calculate Resistivity",
            "Sample Thickness [m]",
            "Thickness Correction Factor",
            "Finite Width Correction Factor",
        ])
    }

    fn data(&self) -> Vec<String> {
        vec![
            self.enabled.to_string(),
            self.thickness.to_string(),
            self.thickness_correction_factor.to_string(),
            self.finite_width_correction_factor.to_string(),
        ]
    }
}

impl Exportable for LineResistanceInfo {
    fn header(&self) -> Vec<String> {
        strings(["Should Calculate Line Resistance", "Voltage Sensing Gap [m]"])
    }

    fn data(&self) -> Vec<String> {
        vec![
            self.enabled.to_string(),
            self.voltage_sensing_gap.unwrap_or(f64::NAN).to_string(),
        ]
    }
}

fn base_symbol(kind: MeasurementType) -> &'static str {
    match kind {
        MeasurementType::Resistance => ResistanceUnits::Ohms.symbol(),
        MeasurementType::Resistivity => ResistivityUnits::OhmMeters.symbol(),
        MeasurementType::LineResistance => LineResistanceUnits::OhmsPerMeter.symbol(),
    }
}

fn statistics_header(kind: MeasurementType, symbol: &str) -> Vec<String> {
    let label = format!("{} [{}]", kind.label(), symbol);
    vec![
        format!("Mean: {}", label),
        format!("Std. Dev. {}", label),
        format!("Min. {}", label),
        format!("Max. {}", label),
    ]
}

fn statistics_data(stats: &Statistics, convert: impl Fn(f64) -> f64) -> Vec<String> {
    [stats.mean, stats.std_dev, stats.min, stats.max]
        .into_iter()
        .map(|v| convert(v).to_string())
        .collect()
}

impl Exportable for Statistics {
    fn header(&self) -> Vec<String> {
        statistics_header(self.kind, base_symbol(self.kind))
    }

    fn data(&self) -> Vec<String> {
        statistics_data(self, |v| v)
    }
}

fn measurement_header(
    resistance: &str,
    resistivity: &str,
    line_resistance: &str,
    m: &Measurement,
) -> Vec<String> {
    let mut header = vec![
        "Measurement Number".to_string(),
        "Sample ID".to_string(),
        format!("Resistance [{}]", resistance),
        format!("Resistivity [{}]", resistivity),
        format!("Line Resistance [{}]", line_resistance),
    ];
    header.extend(m.sample_info.header());
    header.extend(m.location_info.header());
    header.extend(m.line_resistance_info.header());
    header.extend(m.resistivity_info.header());
    header.extend(strings(["Date Collected", "Time Collected"]));
    header
}

fn measurement_data(m: &Measurement, resistance: f64, resistivity: f64, line: f64) -> Vec<String> {
    let local = m.date.with_timezone(&Local);
    let mut data = vec![
        m.number.to_string(),
        m.sample_id(),
        resistance.to_string(),
        resistivity.to_string(),
        line.to_string(),
    ];
    data.extend(m.sample_info.data());
    data.extend(m.location_info.data());
    data.extend(m.line_resistance_info.data());
    data.extend(m.resistivity_info.data());
    data.push(local.format("%Y-%m-%d").to_string());
    data.push(local.format("%H:%M:%S%.3f").to_string());
    data
}

impl Exportable for Measurement {
    fn header(&self) -> Vec<String> {
        measurement_header(
            ResistanceUnits::Ohms.symbol(),
            ResistivityUnits::OhmMeters.symbol(),
            LineResistanceUnits::OhmsPerMeter.symbol(),
            self,
        )
    }

    fn data(&self) -> Vec<String> {
        measurement_data(
            self,
            self.resistance,
            self.resistivity(),
            self.line_resistance(),
        )
    }
}

impl Exportable for Sample {
    fn header(&self) -> Vec<String> {
        let mut header = self.info.header();
        header.extend(self.resistance_statistics.header());
        header.extend(self.resistivity_statistics.header());
        header.extend(self.line_resistance_statistics.header());
        header
    }

    fn data(&self) -> Vec<String> {
        let mut data = self.info.data();
        data.extend(self.resistance_statistics.data());
        data.extend(self.resistivity_statistics.data());
        data.extend(self.line_resistance_statistics.data());
        data
    }
}

/// An entity exported in the given display units.
#[derive(Debug, Clone, Copy)]
pub struct Scaled<'a, T> {
    /// Wrapped entity.
    pub inner: &'a T,
    /// Target units.
    pub units: DisplayUnits,
}

impl<'a, T> Scaled<'a, T> {
    /// Export `inner` in `units`.
    pub fn new(inner: &'a T, units: DisplayUnits) -> Self {
        Self { inner, units }
    }
}

fn convert_for(units: &DisplayUnits, kind: MeasurementType) -> (&'static str, Box<dyn Fn(f64) -> f64>) {
    match kind {
        MeasurementType::Resistance => {
            let u = units.resistance;
            (u.symbol(), Box::new(move |v| u.from_base(v)))
        }
        MeasurementType::Resistivity => {
            let u = units.resistivity;
            (u.symbol(), Box::new(move |v| u.from_base(v)))
        }
        MeasurementType::LineResistance => {
            let u = units.line_resistance;
            (u.symbol(), Box::new(move |v| u.from_base(v)))
        }
    }
}

impl Exportable for Scaled<'_, Statistics> {
    fn header(&self) -> Vec<String> {
        let (symbol, _) = convert_for(&self.units, self.inner.kind);
        statistics_header(self.inner.kind, symbol)
    }

    fn data(&self) -> Vec<String> {
        let (_, convert) = convert_for(&self.units, self.inner.kind);
        statistics_data(self.inner, convert)
    }
}

impl Exportable for Scaled<'_, Measurement> {
    fn header(&self) -> Vec<String> {
        measurement_header(
            self.units.resistance.symbol(),
            self.units.resistivity.symbol(),
            self.units.line_resistance.symbol(),
            self.inner,
        )
    }

    fn data(&self) -> Vec<String> {
        let m = self.inner;
        measurement_data(
            m,
            self.units.resistance.from_base(m.resistance),
            self.units.resistivity.from_base(m.resistivity()),
            self.units.line_resistance.from_base(m.line_resistance()),
        )
    }
}

impl Exportable for Scaled<'_, Sample> {
    fn header(&self) -> Vec<String> {
        let sample = self.inner;
        let mut header = sample.info.header();
        for stats in [
            &sample.resistance_statistics,
            &sample.resistivity_statistics,
            &sample.line_resistance_statistics,
        ] {
            header.extend(Scaled::new(stats, self.units).header());
        }
        header
    }

    fn data(&self) -> Vec<String> {
        let sample = self.inner;
        let mut data = sample.info.data();
        for stats in [
            &sample.resistance_statistics,
            &sample.resistivity_statistics,
            &sample.line_resistance_statistics,
        ] {
            data.extend(Scaled::new(stats, self.units).data());
        }
        data
    }
}
