//! Accumulated rainfall over a date window.
use tracing::debug;

use crate::coords::{DateRange, Region};
use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::sources::DailyRaster;

/// Sum daily precipitation records inside `window` onto the geometry of `target`.
///
/// Days whose footprint misses the region are ignored. Per cell, missing
/// daily values are skipped; a cell with no present value on any day is
/// missing. Fails with `SourceUnavailable` when no day qualifies.
pub fn accumulate_rainfall(
    days: &[DailyRaster],
    window: &DateRange,
    region: &Region,
    target: &RasterGrid,
) -> Result<RasterGrid> {
    let bbox = region.bbox();
    let selected: Vec<RasterGrid> = days
        .iter()
        .filter(|d| window.contains(d.date) && d.grid.bbox().intersects(&bbox))
        .map(|d| d.grid.resample_to(target))
        .collect();

    if selected.is_empty() {
        return Err(LandslideError::SourceUnavailable { name: "rainfall".into() });
    }
    debug!(days = selected.len(), "accumulating daily rainfall");

    Ok(RasterGrid::from_fn(target, |r, c| {
        let mut total = 0f64;
        let mut any = false;
        for g in &selected {
            if let Some(v) = g.value(r, c) {
                total += v as f64;
                any = true;
            }
        }
        if any { total as f32 } else { f32::NAN }
    }))
}
