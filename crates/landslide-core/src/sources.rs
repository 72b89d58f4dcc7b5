//! Input records and the raster source interface.
//!
//! Acquisition and caching of base rasters belong to the caller. The core only
//! consumes already-fetched grids, plus a [`RasterSource`] for the one input
//! it looks up by name at run time (the forecast rainfall surface).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::coords::{DateRange, Region};
use crate::error::Result;
use crate::grid::RasterGrid;
use crate::samples::LabeledPoint;

/// One day of gridded precipitation (mm).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRaster {
    pub date: NaiveDate,
    pub grid: RasterGrid,
}

/// One optical scene with the two bands needed for NDVI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectanceScene {
    pub id: String,
    pub date: NaiveDate,
    /// Scene-level cloudy pixel percentage, 0–100.
    pub cloud_pct: f64,
    pub red: RasterGrid,
    pub nir: RasterGrid,
}

/// A multi-band raster as returned by a source. Zero bands means "empty".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedBands {
    pub bands: Vec<(String, RasterGrid)>,
}

impl NamedBands {
    pub fn single(name: impl Into<String>, grid: RasterGrid) -> Self {
        Self { bands: vec![(name.into(), grid)] }
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// The first band and its name, whatever that name is.
    pub fn first(&self) -> Option<(&str, &RasterGrid)> {
        self.bands.first().map(|(n, g)| (n.as_str(), g))
    }
}

/// A lookup of named rasters by identifier, date window and region.
///
/// `None` signals that the source is unavailable. Callers treat this as a
/// recoverable condition.
pub trait RasterSource {
    fn load(&self, id: &str, window: &DateRange, region: &Region) -> Option<NamedBands>;
}

/// A source that never has anything.
pub struct NoSource;

impl RasterSource for NoSource {
    fn load(&self, _id: &str, _window: &DateRange, _region: &Region) -> Option<NamedBands> {
        None
    }
}

/// In-memory source keyed by identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySource {
    pub assets: HashMap<String, NamedBands>,
}

impl InMemorySource {
    pub fn insert(&mut self, id: impl Into<String>, bands: NamedBands) {
        self.assets.insert(id.into(), bands);
    }
}

impl RasterSource for InMemorySource {
    fn load(&self, id: &str, _window: &DateRange, region: &Region) -> Option<NamedBands> {
        let asset = self.assets.get(id)?;
        let bbox = region.bbox();
        let bands = asset
            .bands
            .iter()
            .filter(|(_, g)| g.bbox().intersects(&bbox))
            .cloned()
            .collect();
        Some(NamedBands { bands })
    }
}

/// Everything the baseline pipeline consumes, as one serialisable bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBundle {
    pub region: Region,
    pub elevation: RasterGrid,
    #[serde(default)]
    pub rainfall_days: Vec<DailyRaster>,
    #[serde(default)]
    pub scenes: Vec<ReflectanceScene>,
    /// Forecast assets looked up by name at run time.
    #[serde(default)]
    pub forecast_assets: InMemorySource,
}

impl InputBundle {
    /// Load a bundle from JSON, masking input nodata sentinels and checking shapes.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut bundle: InputBundle = serde_json::from_str(&text)?;
        bundle.prepare()?;
        Ok(bundle)
    }

    fn prepare(&mut self) -> Result<()> {
        self.elevation.mask_nodata();
        self.elevation.check_shape("elevation")?;
        for day in &mut self.rainfall_days {
            day.grid.mask_nodata();
            day.grid.check_shape("rainfall")?;
        }
        for scene in &mut self.scenes {
            for (name, g) in [("red", &mut scene.red), ("nir", &mut scene.nir)] {
                g.mask_nodata();
                g.check_shape(name)?;
            }
        }
        for asset in self.forecast_assets.assets.values_mut() {
            for (name, g) in &mut asset.bands {
                g.mask_nodata();
                g.check_shape(name)?;
            }
        }
        Ok(())
    }
}

/// Load labelled points from a JSON array.
pub fn load_points(path: &Path) -> Result<Vec<LabeledPoint>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
