use serde::{Deserialize, Serialize};

/// Which measurement field a [`Statistics`] summarises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementType {
    /// Raw resistance, ohms.
    Resistance,
    /// Derived resistivity, ohm-meters.
    Resistivity,
    /// Derived line resistance, ohms per meter.
    LineResistance,
}

impl MeasurementType {
    /// Human readable name used in export headers.
    pub fn label(self) -> &'static str {
        match self {
            MeasurementType::Resistance => "Resistance",
            MeasurementType::Resistivity => "Resistivity",
            MeasurementType::LineResistance => "Line Resistance",
        }
    }
}

/// Mean, population standard deviation, min and max over one measurement field.
///
/// Always recomputed from scratch. NaN inputs are skipped; when nothing remains
/// every field is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Field being summarised.
    pub kind: MeasurementType,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Number of values that contributed (NaN excluded).
    pub count: usize,
}

impl Statistics {
    /// Zeroed statistics for `kind`.
    pub fn new(kind: MeasurementType) -> Self {
        Self {
            kind,
            mean: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
            count: 0,
        }
    }

    /// Recompute from `values`.
    pub fn update<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        let values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            *self = Self::new(self.kind);
            return;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        self.mean = mean;
        self.std_dev = variance.sqrt();
        self.min = values.iter().copied().fold(f64::INFINITY, f64::min);
        self.max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.count = values.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let mut stats = Statistics::new(MeasurementType::Resistance);
        stats.update([10.0, 20.0, 30.0]);
        assert_eq!(stats.mean, 20.0);
        assert!((stats.std_dev - (200.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((stats.std_dev - 8.165).abs() < 1e-3);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn empty_resets_to_zero() {
        let mut stats = Statistics::new(MeasurementType::Resistivity);
        stats.update([1.0, 2.0]);
        stats.update(std::iter::empty());
        assert_eq!(stats, Statistics::new(MeasurementType::Resistivity));
    }

    #[test]
    fn nan_values_are_skipped() {
        let mut stats = Statistics::new(MeasurementType::LineResistance);
        stats.update([f64::NAN, 4.0, f64::NAN, 6.0]);
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.count, 2);

        stats.update([f64::NAN]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let mut stats = Statistics::new(MeasurementType::Resistance);
        stats.update([1.25e-4]);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.min, stats.max);
    }
}
