//! Weighted overlay: susceptibility index and its three-class threshold surface.
//!
//! `index = Σ weight_i × normalized_band_i` over the five overlay bands.
//! Elevation takes no part; it is a classifier feature only.
use serde::{Deserialize, Serialize};

use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::normalize::{NormalizedCell, NormalizedStack};

/// Overlay weights. They must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayWeights {
    pub slope: f64,
    pub rainfall: f64,
    pub vegetation: f64,
    pub roughness: f64,
    pub drainage: f64,
}

impl Default for OverlayWeights {
    fn default() -> Self {
        Self {
            slope: 0.30,
            rainfall: 0.22,
            vegetation: 0.18,
            roughness: 0.15,
            drainage: 0.15,
        }
    }
}

impl OverlayWeights {
    pub const SUM_TOLERANCE: f64 = 1e-9;

    pub fn sum(&self) -> f64 {
        self.slope + self.rainfall + self.vegetation + self.roughness + self.drainage
    }

    pub fn validate(&self) -> Result<()> {
        let all = [self.slope, self.rainfall, self.vegetation, self.roughness, self.drainage];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(LandslideError::InvalidConfig("overlay weights must be finite and non-negative".into()));
        }
        if (self.sum() - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(LandslideError::InvalidConfig(format!(
                "overlay weights sum to {}, expected 1.0",
                self.sum()
            )));
        }
        Ok(())
    }

    /// Weighted sum of one cell's normalized values.
    #[inline]
    pub fn combine(&self, n: &NormalizedCell) -> f64 {
        self.slope * n.slope
            + self.rainfall * n.rainfall
            + self.vegetation * n.vegetation
            + self.roughness * n.roughness
            + self.drainage * n.drainage
    }
}

/// Ordinal risk class. Codes 1–3 are part of the output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClass {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskClass {
    pub const ALL: [RiskClass; 3] = [RiskClass::Low, RiskClass::Medium, RiskClass::High];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RiskClass::Low),
            2 => Some(RiskClass::Medium),
            3 => Some(RiskClass::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskClass::Low => "low",
            RiskClass::Medium => "medium",
            RiskClass::High => "high",
        }
    }
}

/// Policy thresholds on the index. Intervals are half-open on the left:
/// `index ≤ low_max → Low`, `low_max < index ≤ medium_max → Medium`, else `High`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { low_max: 0.25, medium_max: 0.6 }
    }
}

impl Thresholds {
    pub fn classify(&self, index: f64) -> RiskClass {
        if index <= self.low_max {
            RiskClass::Low
        } else if index <= self.medium_max {
            RiskClass::Medium
        } else {
            RiskClass::High
        }
    }

    /// Classify a stored index against the thresholds narrowed to the same
    /// precision, so a stored 0.6 compares equal to a 0.6 threshold.
    pub fn classify_stored(&self, index: f32) -> RiskClass {
        if index <= self.low_max as f32 {
            RiskClass::Low
        } else if index <= self.medium_max as f32 {
            RiskClass::Medium
        } else {
            RiskClass::High
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.low_max.is_finite() && self.medium_max.is_finite() && self.low_max < self.medium_max) {
            return Err(LandslideError::InvalidConfig(format!(
                "thresholds must satisfy low_max < medium_max, got {} / {}",
                self.low_max, self.medium_max
            )));
        }
        Ok(())
    }
}

/// Continuous susceptibility index over the normalized stack.
/// A cell missing any overlay band is missing in the index.
pub fn susceptibility_index(norm: &NormalizedStack, weights: &OverlayWeights) -> RasterGrid {
    RasterGrid::from_fn(&norm.slope, |r, c| match norm.cell(r, c) {
        Some(cell) => weights.combine(&cell) as f32,
        None => f32::NAN,
    })
}

/// Class codes (1–3 as f32) from an index surface.
pub fn threshold_classes(index: &RasterGrid, thresholds: &Thresholds) -> RasterGrid {
    index.map(|v| thresholds.classify_stored(v).code() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::normalize::NormalizationTable;
    use crate::predictors::PredictorStack;
    use approx::assert_abs_diff_eq;

    fn next_up(v: f32) -> f32 {
        f32::from_bits(v.to_bits() + 1)
    }

    #[test]
    fn default_weights_sum_to_one() {
        let w = OverlayWeights::default();
        assert!((w.sum() - 1.0).abs() <= OverlayWeights::SUM_TOLERANCE);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn off_by_a_hair_weights_are_rejected() {
        let w = OverlayWeights { drainage: 0.151, ..OverlayWeights::default() };
        assert!(w.validate().is_err());
    }

    #[test]
    fn threshold_boundaries_are_closed_on_the_right() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0.0), RiskClass::Low);
        assert_eq!(t.classify(0.25), RiskClass::Low);
        assert_eq!(t.classify(0.250_000_1), RiskClass::Medium);
        assert_eq!(t.classify(0.6), RiskClass::Medium);
        assert_eq!(t.classify(0.600_000_1), RiskClass::High);
        assert_eq!(t.classify(1.0), RiskClass::High);
    }

    #[test]
    fn exactly_one_class_per_index() {
        let t = Thresholds::default();
        for i in 0..=1000 {
            let x = i as f64 / 1000.0;
            let preds = [x <= 0.25, x > 0.25 && x <= 0.6, x > 0.6];
            assert_eq!(preds.iter().filter(|p| **p).count(), 1);
            let expected = RiskClass::ALL[preds.iter().position(|p| *p).unwrap()];
            assert_eq!(t.classify(x), expected);
        }
    }

    #[test]
    fn documented_scenario_is_medium() {
        let table = NormalizationTable::default();
        let cell = NormalizedCell::from_raw(&table, 40.0, 1200.0, 0.3, 60.0, 50.0);
        let index = OverlayWeights::default().combine(&cell);
        assert_abs_diff_eq!(index, 0.518, epsilon = 1e-3);
        assert_eq!(Thresholds::default().classify(index), RiskClass::Medium);
    }

    #[test]
    fn index_is_monotone_in_slope() {
        let table = NormalizationTable::default();
        let w = OverlayWeights::default();
        let mut prev = f64::NEG_INFINITY;
        for s in 0..=90 {
            let cell = NormalizedCell::from_raw(&table, s as f64, 800.0, 0.4, 70.0, 30.0);
            let idx = w.combine(&cell);
            assert!(idx >= prev, "slope {s}: {idx} < {prev}");
            prev = idx;
        }
    }

    #[test]
    fn index_stays_in_unit_interval() {
        let table = NormalizationTable::default();
        let w = OverlayWeights::default();
        let lo = w.combine(&NormalizedCell::from_raw(&table, -10.0, -1.0, 2.0, -1.0, -1.0));
        let hi = w.combine(&NormalizedCell::from_raw(&table, 90.0, 9000.0, -1.0, 900.0, 900.0));
        assert_abs_diff_eq!(lo, 0.0);
        assert_abs_diff_eq!(hi, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn class_surface_keeps_missing_cells() {
        let mut idx = crate::fixtures::grid(3, 1, 0.1);
        idx.set(0, 1, 0.7);
        idx.set(0, 2, f32::NAN);
        let classes = threshold_classes(&idx, &Thresholds::default());
        assert_eq!(classes.value(0, 0), Some(1.0));
        assert_eq!(classes.value(0, 1), Some(3.0));
        assert_eq!(classes.value(0, 2), None);
    }

    #[test]
    fn stored_boundary_indices_keep_their_class() {
        let mut idx = fixtures::grid(4, 1, 0.0);
        idx.set(0, 0, 0.25);
        idx.set(0, 1, next_up(0.25));
        idx.set(0, 2, 0.6);
        idx.set(0, 3, next_up(0.6));
        let classes = threshold_classes(&idx, &Thresholds::default());
        assert_eq!(classes.value(0, 0), Some(1.0));
        assert_eq!(classes.value(0, 1), Some(2.0));
        assert_eq!(classes.value(0, 2), Some(2.0));
        assert_eq!(classes.value(0, 3), Some(3.0));
    }

    #[test]
    fn bands_all_at_point_six_are_medium() {
        // Raw values that each normalize to 0.6 under the default table.
        let mk = |v: f32| fixtures::grid(2, 2, v);
        let stack = PredictorStack::new(mk(1000.0), mk(36.0), mk(1500.0), mk(0.2), mk(90.0), mk(72.0)).unwrap();
        let norm = NormalizedStack::from_stack(&stack, &NormalizationTable::default());
        let index = susceptibility_index(&norm, &OverlayWeights::default());
        assert_abs_diff_eq!(index.value(1, 1).unwrap(), 0.6, epsilon = 1e-6);
        let classes = threshold_classes(&index, &Thresholds::default());
        assert_eq!(classes.value(1, 1), Some(2.0));
    }
}
