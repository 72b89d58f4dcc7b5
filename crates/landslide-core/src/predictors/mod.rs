//! Predictor stack builder: elevation → slope, roughness, drainage proxy;
//! daily rainfall → monsoon total; reflectance scenes → NDVI composite.
//!
//! The result is a [`PredictorStack`], a fixed-schema record of the six
//! canonical bands on one shared grid, clipped to the study region.
mod gradient;
pub mod rainfall;
pub mod roughness;
pub mod slope;
pub mod vegetation;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bands::{canonical_names, Band, BAND_COUNT};
use crate::coords::{DateRange, Region};
use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::sources::{DailyRaster, InputBundle, ReflectanceScene};

pub use rainfall::accumulate_rainfall;
pub use roughness::compute_roughness;
pub use slope::compute_slope;
pub use vegetation::median_ndvi;

/// Parameters of the derived bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Rainfall and imagery window, end exclusive.
    pub window: DateRange,
    /// Scenes at or above this cloudy-pixel percentage are discarded.
    pub max_cloud_pct: f64,
    /// Radius of the circular roughness kernel (m).
    pub roughness_radius_m: f64,
    /// Drainage proxy = slope × this factor. A stand-in for flow accumulation.
    pub drainage_factor: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        let ymd = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self {
            window: DateRange::new(ymd(2024, 6, 1), ymd(2024, 9, 30)),
            max_cloud_pct: 30.0,
            roughness_radius_m: 1000.0,
            drainage_factor: 1.5,
        }
    }
}

impl PredictorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window.is_empty() {
            return Err(LandslideError::InvalidConfig(format!(
                "predictor window {} .. {} is empty",
                self.window.start, self.window.end
            )));
        }
        if !(self.max_cloud_pct > 0.0 && self.max_cloud_pct <= 100.0) {
            return Err(LandslideError::InvalidConfig("max_cloud_pct must lie in (0, 100]".into()));
        }
        if !(self.roughness_radius_m > 0.0) {
            return Err(LandslideError::InvalidConfig("roughness_radius_m must be positive".into()));
        }
        if !(self.drainage_factor.is_finite() && self.drainage_factor >= 0.0) {
            return Err(LandslideError::InvalidConfig("drainage_factor must be finite and non-negative".into()));
        }
        Ok(())
    }
}

/// The six canonical predictor bands on one grid.
///
/// Fields are private so the shared geometry cannot drift after construction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictorStack {
    elevation: RasterGrid,
    slope: RasterGrid,
    rainfall: RasterGrid,
    vegetation: RasterGrid,
    roughness: RasterGrid,
    drainage: RasterGrid,
}

impl PredictorStack {
    /// Assemble a stack, checking every band shares the elevation geometry.
    pub fn new(
        elevation: RasterGrid,
        slope: RasterGrid,
        rainfall: RasterGrid,
        vegetation: RasterGrid,
        roughness: RasterGrid,
        drainage: RasterGrid,
    ) -> Result<Self> {
        let stack = Self { elevation, slope, rainfall, vegetation, roughness, drainage };
        for band in Band::ALL {
            let g = stack.band(band);
            g.check_shape(band.name())?;
            if !g.same_geometry(&stack.elevation) {
                return Err(LandslideError::GeometryMismatch { band: band.name().into() });
            }
        }
        Ok(stack)
    }

    /// Assemble a stack from an ordered, named band list.
    ///
    /// The names must be exactly the canonical six in canonical order.
    pub fn from_named(bands: Vec<(String, RasterGrid)>) -> Result<Self> {
        let found: Vec<String> = bands.iter().map(|(n, _)| n.clone()).collect();
        let expected = canonical_names();
        if found.len() != BAND_COUNT || found.iter().zip(expected.iter()).any(|(f, e)| f != e) {
            return Err(LandslideError::BandMismatch {
                expected: expected.iter().map(|s| s.to_string()).collect(),
                found,
            });
        }
        let grids: Vec<RasterGrid> = bands.into_iter().map(|(_, g)| g).collect();
        let [elevation, slope, rainfall, vegetation, roughness, drainage]: [RasterGrid; BAND_COUNT] =
            grids.try_into().map_err(|_| LandslideError::BandMismatch {
                expected: expected.iter().map(|s| s.to_string()).collect(),
                found: Vec::new(),
            })?;
        Self::new(elevation, slope, rainfall, vegetation, roughness, drainage)
    }

    pub fn band(&self, band: Band) -> &RasterGrid {
        match band {
            Band::Elevation => &self.elevation,
            Band::Slope => &self.slope,
            Band::Rainfall => &self.rainfall,
            Band::Vegetation => &self.vegetation,
            Band::Roughness => &self.roughness,
            Band::Drainage => &self.drainage,
        }
    }

    pub fn band_names(&self) -> [&'static str; BAND_COUNT] {
        canonical_names()
    }

    /// Reference grid for the stack's shared geometry.
    pub fn geometry(&self) -> &RasterGrid {
        &self.elevation
    }

    /// Feature vector at `(row, col)` in canonical order; `None` if any band is missing.
    pub fn features(&self, row: usize, col: usize) -> Option<[f64; BAND_COUNT]> {
        let mut out = [0f64; BAND_COUNT];
        for band in Band::ALL {
            out[band.index()] = self.band(band).value(row, col)? as f64;
        }
        Some(out)
    }

    /// A copy of this stack with the rainfall band replaced.
    pub fn with_rainfall(&self, rainfall: RasterGrid) -> Result<Self> {
        Self::new(
            self.elevation.clone(),
            self.slope.clone(),
            rainfall,
            self.vegetation.clone(),
            self.roughness.clone(),
            self.drainage.clone(),
        )
    }
}

/// Raw inputs of the stack builder.
pub struct PredictorSources<'a> {
    pub elevation: &'a RasterGrid,
    pub rainfall_days: &'a [DailyRaster],
    pub scenes: &'a [ReflectanceScene],
    pub region: &'a Region,
}

impl<'a> From<&'a InputBundle> for PredictorSources<'a> {
    fn from(b: &'a InputBundle) -> Self {
        Self {
            elevation: &b.elevation,
            rainfall_days: &b.rainfall_days,
            scenes: &b.scenes,
            region: &b.region,
        }
    }
}

/// Derive the six canonical bands and clip them to the region.
///
/// Terrain derivatives are computed before clipping so cells on the region
/// boundary see their true neighbours.
pub fn build_predictor_stack(src: &PredictorSources<'_>, cfg: &PredictorConfig) -> Result<PredictorStack> {
    let dem = src.elevation;
    dem.check_shape("elevation")?;
    if dem.valid_count() == 0 {
        return Err(LandslideError::SourceUnavailable { name: "elevation".into() });
    }

    let slope = compute_slope(dem);
    let roughness = compute_roughness(dem, cfg.roughness_radius_m);
    let factor = cfg.drainage_factor as f32;
    let drainage = slope.map(|s| s * factor);
    let rainfall = accumulate_rainfall(src.rainfall_days, &cfg.window, src.region, dem)?;
    let vegetation = median_ndvi(src.scenes, &cfg.window, cfg.max_cloud_pct, src.region, dem)?;

    let region = src.region;
    let stack = PredictorStack::new(
        dem.clone().clipped(region),
        slope.clipped(region),
        rainfall.clipped(region),
        vegetation.clipped(region),
        roughness.clipped(region),
        drainage.clipped(region),
    )?;

    info!(
        region = %region.name,
        width = dem.width,
        height = dem.height,
        valid_cells = stack.geometry().valid_count(),
        max_slope = ?stack.band(Band::Slope).max_value(),
        "predictor stack built"
    );
    Ok(stack)
}
