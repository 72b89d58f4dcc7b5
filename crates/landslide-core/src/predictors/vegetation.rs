//! Vegetation index: median NDVI composite of low-cloud scenes.
use tracing::debug;

use crate::coords::{DateRange, Region};
use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::sources::ReflectanceScene;

/// Normalized difference `(nir − red) / (nir + red)`; missing when either
/// input is missing or the denominator is zero.
pub fn normalized_difference(nir: &RasterGrid, red: &RasterGrid) -> RasterGrid {
    let red = red.resample_to(nir);
    RasterGrid::from_fn(nir, |r, c| match (nir.value(r, c), red.value(r, c)) {
        (Some(n), Some(rd)) if (n + rd).abs() > f32::EPSILON => (n - rd) / (n + rd),
        _ => f32::NAN,
    })
}

/// Median of per-scene NDVI over scenes inside `window` whose cloud fraction
/// is strictly below `max_cloud_pct` and whose footprint meets the region.
pub fn median_ndvi(
    scenes: &[ReflectanceScene],
    window: &DateRange,
    max_cloud_pct: f64,
    region: &Region,
    target: &RasterGrid,
) -> Result<RasterGrid> {
    let bbox = region.bbox();
    let per_scene: Vec<RasterGrid> = scenes
        .iter()
        .filter(|s| window.contains(s.date) && s.cloud_pct < max_cloud_pct)
        .filter(|s| s.nir.bbox().intersects(&bbox))
        .map(|s| normalized_difference(&s.nir, &s.red).resample_to(target))
        .collect();

    if per_scene.is_empty() {
        return Err(LandslideError::SourceUnavailable { name: "reflectance".into() });
    }
    debug!(scenes = per_scene.len(), "compositing NDVI");

    Ok(RasterGrid::from_fn(target, |r, c| {
        let mut vals: Vec<f32> = per_scene.iter().filter_map(|g| g.value(r, c)).collect();
        median(&mut vals).unwrap_or(f32::NAN)
    }))
}

/// Median with even-length averaging of the two middle values.
fn median(vals: &mut [f32]) -> Option<f32> {
    if vals.is_empty() {
        return None;
    }
    vals.sort_by(|a, b| a.total_cmp(b));
    let mid = vals.len() / 2;
    if vals.len() % 2 == 1 {
        Some(vals[mid])
    } else {
        Some((vals[mid - 1] + vals[mid]) / 2.0)
    }
}
