//! Display unit conversion.
//!
//! Every quantity is stored in a fixed base unit (ohms, ohm-meters, ohms per meter,
//! meters, seconds). A unit tag carries a multiplicative scale factor that converts
//! a base value into that display unit; [`ConvertibleUnit::to_base`] divides by the
//! same factor so the two directions are exact inverses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A display unit that converts to and from a fixed base unit.
pub trait ConvertibleUnit: Copy + fmt::Display {
    /// Multiplier taking a base value into this unit.
    fn scale_factor(self) -> f64;

    /// Short symbol used in headers and tables (e.g. `mΩ`).
    fn symbol(self) -> &'static str;

    /// Convert a value expressed in the base unit into this unit.
    fn from_base(self, value: f64) -> f64 {
        value * self.scale_factor()
    }

    /// Convert a value expressed in this unit into the base unit.
    fn to_base(self, value: f64) -> f64 {
        value / self.scale_factor()
    }
}

macro_rules! display_symbol {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.symbol())
            }
        }
    };
}

/// Resistance units. Base unit: ohms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResistanceUnits {
    /// nΩ
    NanoOhms,
    /// µΩ
    MicroOhms,
    /// mΩ
    MilliOhms,
    /// Ω
    #[default]
    Ohms,
    /// kΩ
    KiloOhms,
    /// MΩ
    MegaOhms,
    /// GΩ
    GigaOhms,
}

impl ResistanceUnits {
    /// All resistance units, smallest first.
    pub const ALL: [ResistanceUnits; 7] = [
        ResistanceUnits::NanoOhms,
        ResistanceUnits::MicroOhms,
        ResistanceUnits::MilliOhms,
        ResistanceUnits::Ohms,
        ResistanceUnits::KiloOhms,
        ResistanceUnits::MegaOhms,
        ResistanceUnits::GigaOhms,
    ];
}

impl ConvertibleUnit for ResistanceUnits {
    fn scale_factor(self) -> f64 {
        match self {
            ResistanceUnits::NanoOhms => 1.0e9,
            ResistanceUnits::MicroOhms => 1.0e6,
            ResistanceUnits::MilliOhms => 1.0e3,
            ResistanceUnits::Ohms => 1.0,
            ResistanceUnits::KiloOhms => 1.0e-3,
            ResistanceUnits::MegaOhms => 1.0e-6,
            ResistanceUnits::GigaOhms => 1.0e-9,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ResistanceUnits::NanoOhms => "nΩ",
            ResistanceUnits::MicroOhms => "µΩ",
            ResistanceUnits::MilliOhms => "mΩ",
            ResistanceUnits::Ohms => "Ω",
            ResistanceUnits::KiloOhms => "kΩ",
            ResistanceUnits::MegaOhms => "MΩ",
            ResistanceUnits::GigaOhms => "GΩ",
        }
    }
}
display_symbol!(ResistanceUnits);

/// Resistivity units. Base unit: ohm-meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResistivityUnits {
    /// µΩ-cm
    MicroOhmCentimeters,
    /// Ω-µm
    OhmMicrometers,
    /// Ω-mm
    OhmMillimeters,
    /// Ω-m
    #[default]
    OhmMeters,
}

impl ResistivityUnits {
    /// All resistivity units.
    pub const ALL: [ResistivityUnits; 4] = [
        ResistivityUnits::MicroOhmCentimeters,
        ResistivityUnits::OhmMicrometers,
        ResistivityUnits::OhmMillimeters,
        ResistivityUnits::OhmMeters,
    ];
}

impl ConvertibleUnit for ResistivityUnits {
    fn scale_factor(self) -> f64 {
        match self {
            ResistivityUnits::MicroOhmCentimeters => 1.0e8,
            ResistivityUnits::OhmMicrometers => 1.0e6,
            ResistivityUnits::OhmMillimeters => 1.0e3,
            ResistivityUnits::OhmMeters => 1.0,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            ResistivityUnits::MicroOhmCentimeters => "µΩ-cm",
            ResistivityUnits::OhmMicrometers => "Ω-µm",
            ResistivityUnits::OhmMillimeters => "Ω-mm",
            ResistivityUnits::OhmMeters => "Ω-m",
        }
    }
}
display_symbol!(ResistivityUnits);

/// Line resistance units. Base unit: ohms per meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineResistanceUnits {
    /// nΩ/m
    NanoOhmsPerMeter,
    /// µΩ/m
    MicroOhmsPerMeter,
    /// mΩ/m
    MilliOhmsPerMeter,
    /// Ω/m
    #[default]
    OhmsPerMeter,
    /// Ω/mm
    OhmsPerMillimeter,
    /// kΩ/m
    KiloOhmsPerMeter,
    /// MΩ/m
    MegaOhmsPerMeter,
    /// GΩ/m
    GigaOhmsPerMeter,
}

impl LineResistanceUnits {
    /// All line resistance units.
    pub const ALL: [LineResistanceUnits; 8] = [
        LineResistanceUnits::NanoOhmsPerMeter,
        LineResistanceUnits::MicroOhmsPerMeter,
        LineResistanceUnits::MilliOhmsPerMeter,
        LineResistanceUnits::OhmsPerMeter,
        LineResistanceUnits::OhmsPerMillimeter,
        LineResistanceUnits::KiloOhmsPerMeter,
        LineResistanceUnits::MegaOhmsPerMeter,
        LineResistanceUnits::GigaOhmsPerMeter,
    ];
}

impl ConvertibleUnit for LineResistanceUnits {
    fn scale_factor(self) -> f64 {
        match self {
            LineResistanceUnits::NanoOhmsPerMeter => 1.0e9,
            LineResistanceUnits::MicroOhmsPerMeter => 1.0e6,
            LineResistanceUnits::MilliOhmsPerMeter => 1.0e3,
            LineResistanceUnits::OhmsPerMeter => 1.0,
            LineResistanceUnits::OhmsPerMillimeter => 1.0e-3,
            LineResistanceUnits::KiloOhmsPerMeter => 1.0e-3,
            LineResistanceUnits::MegaOhmsPerMeter => 1.0e-6,
            LineResistanceUnits::GigaOhmsPerMeter => 1.0e-9,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            LineResistanceUnits::NanoOhmsPerMeter => "nΩ/m",
            LineResistanceUnits::MicroOhmsPerMeter => "µΩ/m",
            LineResistanceUnits::MilliOhmsPerMeter => "mΩ/m",
            LineResistanceUnits::OhmsPerMeter => "Ω/m",
            LineResistanceUnits::OhmsPerMillimeter => "Ω/mm",
            LineResistanceUnits::KiloOhmsPerMeter => "kΩ/m",
            LineResistanceUnits::MegaOhmsPerMeter => "MΩ/m",
            LineResistanceUnits::GigaOhmsPerMeter => "GΩ/m",
        }
    }
}
display_symbol!(LineResistanceUnits);

/// Length units. Base unit: meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnits {
    /// m
    Meter,
    /// cm
    Centimeter,
    /// mm
    #[default]
    Millimeter,
    /// µm
    Micron,
    /// nm
    Nanometer,
}

impl LengthUnits {
    /// All length units, largest first.
    pub const ALL: [LengthUnits; 5] = [
        LengthUnits::Meter,
        LengthUnits::Centimeter,
        LengthUnits::Millimeter,
        LengthUnits::Micron,
        LengthUnits::Nanometer,
    ];
}

impl ConvertibleUnit for LengthUnits {
    fn scale_factor(self) -> f64 {
        match self {
            LengthUnits::Meter => 1.0,
            LengthUnits::Centimeter => 1.0e2,
            LengthUnits::Millimeter => 1.0e3,
            LengthUnits::Micron => 1.0e6,
            LengthUnits::Nanometer => 1.0e9,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            LengthUnits::Meter => "m",
            LengthUnits::Centimeter => "cm",
            LengthUnits::Millimeter => "mm",
            LengthUnits::Micron => "µm",
            LengthUnits::Nanometer => "nm",
        }
    }
}
display_symbol!(LengthUnits);

/// Time units. Base unit: seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnits {
    /// µs
    Microseconds,
    /// ms
    Milliseconds,
    /// s
    #[default]
    Seconds,
    /// min
    Minutes,
    /// hrs
    Hours,
}

impl TimeUnits {
    /// All time units, smallest first.
    pub const ALL: [TimeUnits; 5] = [
        TimeUnits::Microseconds,
        TimeUnits::Milliseconds,
        TimeUnits::Seconds,
        TimeUnits::Minutes,
        TimeUnits::Hours,
    ];
}

impl ConvertibleUnit for TimeUnits {
    fn scale_factor(self) -> f64 {
        match self {
            TimeUnits::Microseconds => 1.0e6,
            TimeUnits::Milliseconds => 1.0e3,
            TimeUnits::Seconds => 1.0,
            TimeUnits::Minutes => 1.0 / 60.0,
            TimeUnits::Hours => 1.0 / 3600.0,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            TimeUnits::Microseconds => "µs",
            TimeUnits::Milliseconds => "ms",
            TimeUnits::Seconds => "s",
            TimeUnits::Minutes => "min",
            TimeUnits::Hours => "hrs",
        }
    }
}
display_symbol!(TimeUnits);

/// Preferred display units for each quantity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayUnits {
    /// Unit for raw resistance.
    pub resistance: ResistanceUnits,
    /// Unit for derived resistivity.
    pub resistivity: ResistivityUnits,
    /// Unit for derived line resistance.
    pub line_resistance: LineResistanceUnits,
    /// Unit for lengths (thickness, probe gap).
    pub length: LengthUnits,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f64; 7] = [0.0, 1.0, -3.5, 1.0e-12, 6.02e23, 1.234_567e-4, 42.0];

    fn assert_round_trip<U: ConvertibleUnit + fmt::Debug>(unit: U) {
        for x in SAMPLES {
            let back = unit.from_base(unit.to_base(x));
            let tolerance = f64::EPSILON * x.abs().max(1.0) * 4.0;
            assert!(
                (back - x).abs() <= tolerance,
                "{:?}: {} -> {} (tolerance {})",
                unit,
                x,
                back,
                tolerance
            );
        }
    }

    #[test]
    fn every_unit_round_trips() {
        ResistanceUnits::ALL.into_iter().for_each(assert_round_trip);
        ResistivityUnits::ALL.into_iter().for_each(assert_round_trip);
        LineResistanceUnits::ALL.into_iter().for_each(assert_round_trip);
        LengthUnits::ALL.into_iter().for_each(assert_round_trip);
        TimeUnits::ALL.into_iter().for_each(assert_round_trip);
    }

    #[test]
    fn scale_factors_convert_from_base() {
        assert_eq!(ResistanceUnits::MilliOhms.from_base(0.5), 500.0);
        assert_eq!(ResistanceUnits::KiloOhms.from_base(2_000.0), 2.0);
        assert_eq!(ResistivityUnits::MicroOhmCentimeters.from_base(1.0e-8), 1.0);
        assert_eq!(LengthUnits::Millimeter.to_base(20.0), 0.02);
        assert_eq!(TimeUnits::Minutes.from_base(120.0), 2.0);
    }

    #[test]
    fn display_uses_symbol() {
        assert_eq!(ResistanceUnits::MicroOhms.to_string(), "µΩ");
        assert_eq!(LineResistanceUnits::OhmsPerMillimeter.to_string(), "Ω/mm");
        assert_eq!(LengthUnits::Nanometer.to_string(), "nm");
    }

    #[test]
    fn units_deserialize_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            unit: ResistivityUnits,
        }
        let parsed: Wrapper = toml::from_str("unit = \"ohm_millimeters\"").unwrap();
        assert_eq!(parsed.unit, ResistivityUnits::OhmMillimeters);
    }
}
