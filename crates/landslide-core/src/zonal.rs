//! Region-restricted aggregation: per-class areas, region means and index
//! percentiles at a declared resolution.
//!
//! A surface is read on a lattice whose stride approximates the requested
//! scale. The central cell of each block stands for the whole block,
//! weighted by the block's area. When the lattice would exceed the element
//! cap, best-effort mode doubles the stride until it fits; strict mode fails.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::Region;
use crate::error::{LandslideError, Result};
use crate::grid::RasterGrid;
use crate::overlay::RiskClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub zonal_scale_m: f64,
    pub percentile_scale_m: f64,
    pub region_mean_scale_m: f64,
    /// Upper bound on cells examined by one aggregation.
    pub max_elements: u64,
    pub best_effort: bool,
    /// Point query buffer radius (m).
    pub point_radius_m: f64,
    /// Point query sampling resolution (m).
    pub point_scale_m: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            zonal_scale_m: 100.0,
            percentile_scale_m: 500.0,
            region_mean_scale_m: 5000.0,
            max_elements: 1_000_000_000,
            best_effort: true,
            point_radius_m: 150.0,
            point_scale_m: 150.0,
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        let scales = [
            ("zonal_scale_m", self.zonal_scale_m),
            ("percentile_scale_m", self.percentile_scale_m),
            ("region_mean_scale_m", self.region_mean_scale_m),
            ("point_radius_m", self.point_radius_m),
            ("point_scale_m", self.point_scale_m),
        ];
        for (name, v) in scales {
            if !(v.is_finite() && v > 0.0) {
                return Err(LandslideError::InvalidConfig(format!("{name} must be positive, got {v}")));
            }
        }
        if self.max_elements == 0 {
            return Err(LandslideError::InvalidConfig("max_elements must be at least 1".into()));
        }
        Ok(())
    }
}

// ── Lattice sampling ──────────────────────────────────────────────────────────

/// One lattice read: the cell value and the area (km²) it stands for.
struct BlockSample {
    value: f64,
    area_km2: f64,
}

fn lattice_stride(grid: &RasterGrid, scale_m: f64, cfg: &AggregationConfig) -> Result<usize> {
    let (cx, cy) = grid.cell_size_m();
    let mut stride = ((scale_m / (cx * cy).sqrt()).round() as usize).max(1);
    loop {
        let examined = (grid.height.div_ceil(stride) * grid.width.div_ceil(stride)) as u64;
        if examined <= cfg.max_elements {
            return Ok(stride);
        }
        if !cfg.best_effort {
            return Err(LandslideError::ElementCapExceeded { examined, cap: cfg.max_elements });
        }
        stride *= 2;
        debug!(examined, cap = cfg.max_elements, stride, "coarsening aggregation lattice");
    }
}

fn sample_blocks(grid: &RasterGrid, region: &Region, scale_m: f64, cfg: &AggregationConfig) -> Result<Vec<BlockSample>> {
    let stride = lattice_stride(grid, scale_m, cfg)?;
    let bbox = region.bbox();
    let mut out = Vec::new();
    for r in (0..grid.height).step_by(stride) {
        let rows = stride.min(grid.height - r);
        let strip_km2: f64 = (r..r + rows).map(|rr| grid.cell_area_km2(rr)).sum();
        for c in (0..grid.width).step_by(stride) {
            let cols = stride.min(grid.width - c);
            let (rc, cc) = (r + rows / 2, c + cols / 2);
            let Some(v) = grid.value(rc, cc) else { continue };
            let ll = grid.cell_center(rc, cc);
            if !bbox.contains(ll) || !region.contains(ll) {
                continue;
            }
            out.push(BlockSample { value: v as f64, area_km2: strip_km2 * cols as f64 });
        }
    }
    Ok(out)
}

// ── Zonal areas ───────────────────────────────────────────────────────────────

/// Per-class area totals of a classified surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZonalStats {
    pub low_km2: f64,
    pub medium_km2: f64,
    pub high_km2: f64,
    /// Area of every evaluated (non-missing, in-region) cell.
    pub evaluated_km2: f64,
}

/// Class shares in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassPercentages {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl ZonalStats {
    pub fn area(&self, class: RiskClass) -> f64 {
        match class {
            RiskClass::Low => self.low_km2,
            RiskClass::Medium => self.medium_km2,
            RiskClass::High => self.high_km2,
        }
    }

    pub fn class_total_km2(&self) -> f64 {
        self.low_km2 + self.medium_km2 + self.high_km2
    }

    /// `area(c) / Σ area × 100`; all zero when the total is zero.
    pub fn percentages(&self) -> ClassPercentages {
        let total = self.class_total_km2();
        if total <= 0.0 {
            return ClassPercentages::default();
        }
        ClassPercentages {
            low: self.low_km2 / total * 100.0,
            medium: self.medium_km2 / total * 100.0,
            high: self.high_km2 / total * 100.0,
        }
    }

    /// Share of the high class in percent.
    pub fn high_share(&self) -> f64 {
        self.percentages().high
    }
}

/// Sum pixel area per class code over `region`.
pub fn zonal_areas(surface: &RasterGrid, region: &Region, scale_m: f64, cfg: &AggregationConfig) -> Result<ZonalStats> {
    let mut stats = ZonalStats::default();
    for b in sample_blocks(surface, region, scale_m, cfg)? {
        stats.evaluated_km2 += b.area_km2;
        match RiskClass::from_code(b.value.round() as u8) {
            Some(RiskClass::Low) => stats.low_km2 += b.area_km2,
            Some(RiskClass::Medium) => stats.medium_km2 += b.area_km2,
            Some(RiskClass::High) => stats.high_km2 += b.area_km2,
            None => {}
        }
    }
    Ok(stats)
}

/// Area-weighted mean of `surface` over `region`; `None` without valid cells.
pub fn region_mean(surface: &RasterGrid, region: &Region, scale_m: f64, cfg: &AggregationConfig) -> Result<Option<f64>> {
    let blocks = sample_blocks(surface, region, scale_m, cfg)?;
    let area: f64 = blocks.iter().map(|b| b.area_km2).sum();
    if blocks.is_empty() || area <= 0.0 {
        return Ok(None);
    }
    Ok(Some(blocks.iter().map(|b| b.value * b.area_km2).sum::<f64>() / area))
}

/// Percentiles (0–100) of `surface` over `region`, linearly interpolated
/// between closest ranks. Every entry is `None` without valid cells.
pub fn percentiles(
    surface: &RasterGrid,
    region: &Region,
    scale_m: f64,
    cfg: &AggregationConfig,
    ps: &[f64],
) -> Result<Vec<Option<f64>>> {
    let mut vals: Vec<f64> = sample_blocks(surface, region, scale_m, cfg)?.into_iter().map(|b| b.value).collect();
    vals.sort_by(|a, b| a.total_cmp(b));
    Ok(ps.iter().map(|&p| percentile_sorted(&vals, p)).collect())
}

/// Index quartiles (25th, 50th, 75th) at the configured percentile scale.
pub fn index_percentiles(index: &RasterGrid, region: &Region, cfg: &AggregationConfig) -> Result<IndexPercentiles> {
    let q = percentiles(index, region, cfg.percentile_scale_m, cfg, &[25.0, 50.0, 75.0])?;
    Ok(IndexPercentiles { p25: q[0], p50: q[1], p75: q[2] })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexPercentiles {
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
}

fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * t)
}
