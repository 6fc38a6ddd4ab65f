use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cleaned observation. Sources never hand out sentinel or missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Basic statistics logged alongside a fetch, useful for eyeballing drift.
/// `std` is the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Z-score transform fitted on one window and reused to invert forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: f64,
    pub std: f64,
}

impl Normalization {
    /// Population mean/std of `values`. A zero (or undefined) spread becomes 1.
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self { mean: 0.0, std: 1.0 };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        let std = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        Self { mean, std }
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| (v - self.mean) / self.std).collect()
    }

    pub fn invert(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v * self.std + self.mean).collect()
    }
}

/// Mean absolute error over the common prefix of both slices.
pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = predicted.len().min(actual.len());
    if n == 0 {
        return f64::NAN;
    }
    predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_window_normalizes_with_unit_std() {
        let norm = Normalization::fit(&[4.0; 5]);
        assert_eq!(norm.mean, 4.0);
        assert_eq!(norm.std, 1.0);
        assert_eq!(norm.apply(&[4.0, 5.0]), vec![0.0, 1.0]);
    }

    #[test]
    fn invert_undoes_apply() {
        let values = [1.0, 3.0, 8.0, -2.0];
        let norm = Normalization::fit(&values);
        let back = norm.invert(&norm.apply(&values));
        for (a, b) in back.iter().zip(values) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn mae_of_zero_forecast_against_hundreds() {
        assert_eq!(mean_absolute_error(&[0.0; 10], &[100.0; 10]), 100.0);
        assert!(mean_absolute_error(&[], &[]).is_nan());
    }

    #[test]
    fn fit_uses_population_std() {
        let norm = Normalization::fit(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((norm.mean - 5.0).abs() < 1e-12);
        assert!((norm.std - 2.0).abs() < 1e-12);
        assert_eq!(Normalization::fit(&[]), Normalization { mean: 0.0, std: 1.0 });
    }
}
