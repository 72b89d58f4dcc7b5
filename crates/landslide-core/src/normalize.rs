//! Per-band linear rescaling to [0, 1].
//!
//! Values outside a band's declared range clamp to the boundary; there is no
//! extrapolation and no error. Missing cells stay missing.
use serde::{Deserialize, Serialize};

use crate::bands::Band;
use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::predictors::PredictorStack;

/// A linear range `[lo, hi]` mapped onto `[0, 1]`, optionally inverted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRange {
    pub lo: f64,
    pub hi: f64,
    #[serde(default)]
    pub invert: bool,
}

impl NormRange {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi, invert: false }
    }

    pub const fn inverted(lo: f64, hi: f64) -> Self {
        Self { lo, hi, invert: true }
    }

    #[inline]
    pub fn apply(&self, v: f64) -> f64 {
        let t = ((v - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0);
        if self.invert { 1.0 - t } else { t }
    }

    pub fn apply_grid(&self, g: &RasterGrid) -> RasterGrid {
        g.map(|v| self.apply(v as f64) as f32)
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !(self.lo.is_finite() && self.hi.is_finite() && self.hi > self.lo) {
            return Err(LandslideError::InvalidConfig(format!(
                "normalization range for {name} must satisfy lo < hi, got [{}, {}]",
                self.lo, self.hi
            )));
        }
        Ok(())
    }
}

/// Declared ranges of the five overlay bands.
///
/// `rainfall` applies to the baseline (seasonal total); forecasts carry their
/// own range because their totals cover a much shorter horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationTable {
    pub slope: NormRange,
    pub rainfall: NormRange,
    pub vegetation: NormRange,
    pub roughness: NormRange,
    pub drainage: NormRange,
}

impl Default for NormalizationTable {
    fn default() -> Self {
        Self {
            slope: NormRange::new(0.0, 60.0),
            rainfall: NormRange::new(0.0, 2500.0),
            vegetation: NormRange::inverted(-0.2, 0.8),
            roughness: NormRange::new(0.0, 150.0),
            drainage: NormRange::new(0.0, 120.0),
        }
    }
}

impl NormalizationTable {
    /// Range for an overlay band; `None` for elevation, which is a classifier feature only.
    pub fn range(&self, band: Band) -> Option<NormRange> {
        match band {
            Band::Elevation => None,
            Band::Slope => Some(self.slope),
            Band::Rainfall => Some(self.rainfall),
            Band::Vegetation => Some(self.vegetation),
            Band::Roughness => Some(self.roughness),
            Band::Drainage => Some(self.drainage),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for band in Band::OVERLAY {
            if let Some(r) = self.range(band) {
                r.validate(band.name())?;
            }
        }
        Ok(())
    }
}

/// Normalized values of the five overlay bands at one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCell {
    pub slope: f64,
    pub rainfall: f64,
    pub vegetation: f64,
    pub roughness: f64,
    pub drainage: f64,
}

impl NormalizedCell {
    /// Normalize raw band values.
    pub fn from_raw(table: &NormalizationTable, slope: f64, rainfall: f64, vegetation: f64, roughness: f64, drainage: f64) -> Self {
        Self {
            slope: table.slope.apply(slope),
            rainfall: table.rainfall.apply(rainfall),
            vegetation: table.vegetation.apply(vegetation),
            roughness: table.roughness.apply(roughness),
            drainage: table.drainage.apply(drainage),
        }
    }
}

/// The five overlay bands rescaled to [0, 1] on the stack grid.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedStack {
    pub slope: RasterGrid,
    pub rainfall: RasterGrid,
    pub vegetation: RasterGrid,
    pub roughness: RasterGrid,
    pub drainage: RasterGrid,
}

impl NormalizedStack {
    /// Normalize all overlay bands of `stack`.
    pub fn from_stack(stack: &PredictorStack, table: &NormalizationTable) -> Self {
        Self {
            slope: table.slope.apply_grid(stack.band(Band::Slope)),
            rainfall: table.rainfall.apply_grid(stack.band(Band::Rainfall)),
            vegetation: table.vegetation.apply_grid(stack.band(Band::Vegetation)),
            roughness: table.roughness.apply_grid(stack.band(Band::Roughness)),
            drainage: table.drainage.apply_grid(stack.band(Band::Drainage)),
        }
    }

    /// Replace only the rainfall band; the other four are reused unchanged.
    pub fn with_rainfall(&self, rainfall: &RasterGrid, range: &NormRange) -> Result<Self> {
        if !rainfall.same_geometry(&self.slope) {
            return Err(LandslideError::GeometryMismatch { band: Band::Rainfall.name().into() });
        }
        Ok(Self {
            slope: self.slope.clone(),
            rainfall: range.apply_grid(rainfall),
            vegetation: self.vegetation.clone(),
            roughness: self.roughness.clone(),
            drainage: self.drainage.clone(),
        })
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<NormalizedCell> {
        Some(NormalizedCell {
            slope: self.slope.value(row, col)? as f64,
            rainfall: self.rainfall.value(row, col)? as f64,
            vegetation: self.vegetation.value(row, col)? as f64,
            roughness: self.roughness.value(row, col)? as f64,
            drainage: self.drainage.value(row, col)? as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn linear_inside_range_clamped_outside() {
        let r = NormRange::new(0.0, 60.0);
        assert_abs_diff_eq!(r.apply(30.0), 0.5);
        assert_eq!(r.apply(-5.0), 0.0);
        assert_eq!(r.apply(75.0), 1.0);
    }

    #[test]
    fn vegetation_is_inverted() {
        let t = NormalizationTable::default();
        assert_abs_diff_eq!(t.vegetation.apply(0.3), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(t.vegetation.apply(0.8), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.vegetation.apply(-0.5), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn scenario_values_normalize_as_documented() {
        let c = NormalizedCell::from_raw(&NormalizationTable::default(), 40.0, 1200.0, 0.3, 60.0, 50.0);
        assert_abs_diff_eq!(c.slope, 0.6667, epsilon = 1e-4);
        assert_abs_diff_eq!(c.rainfall, 0.48, epsilon = 1e-12);
        assert_abs_diff_eq!(c.vegetation, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c.roughness, 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(c.drainage, 0.4167, epsilon = 1e-4);
    }

    #[test]
    fn inverted_range_fails_validation() {
        let mut t = NormalizationTable::default();
        t.roughness = NormRange::new(150.0, 0.0);
        assert!(t.validate().is_err());
        assert!(NormalizationTable::default().validate().is_ok());
    }

    #[test]
    fn missing_cells_stay_missing() {
        let mut g = crate::fixtures::grid(2, 1, 30.0);
        g.set(0, 1, f32::NAN);
        let out = NormRange::new(0.0, 60.0).apply_grid(&g);
        assert_eq!(out.value(0, 0), Some(0.5));
        assert_eq!(out.value(0, 1), None);
    }
}
