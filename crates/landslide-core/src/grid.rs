use serde::{Deserialize, Serialize};

use crate::coords::{BBox, LatLon, Region, METRES_PER_DEGREE};
use crate::error::{LandslideError, Result};

/// A single-band geographic raster storing values as f32, row-major.
///
/// Row 0 is the southernmost row (min_lat), column 0 the westernmost.
/// Cells are area-registered: cell `(r, c)` covers
/// `[min_lon + c·dx, min_lon + (c+1)·dx) × [min_lat + r·dy, min_lat + (r+1)·dy)`.
///
/// Missing values are stored as NaN and surface as `None` from every accessor.
/// On the wire they are JSON `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    #[serde(with = "nodata_serde")]
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    /// Input-side sentinel for missing values; cleared by [`RasterGrid::mask_nodata`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f32>,
}

impl RasterGrid {
    /// Create a new grid over `bounds` filled with the given value.
    pub fn new(width: usize, height: usize, bounds: BBox, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            min_lon: bounds.min_lon,
            max_lon: bounds.max_lon,
            min_lat: bounds.min_lat,
            max_lat: bounds.max_lat,
            nodata: None,
        }
    }

    /// A grid with the same geometry as `other`, filled with `fill`.
    pub fn like(other: &RasterGrid, fill: f32) -> Self {
        Self::new(other.width, other.height, other.bbox(), fill)
    }

    /// A grid with the geometry of `other`, each cell computed by `f(row, col)`.
    pub fn from_fn<F>(other: &RasterGrid, f: F) -> Self
    where
        F: Fn(usize, usize) -> f32 + Sync + Send,
    {
        let mut out = Self::like(other, f32::NAN);
        out.data = fill_rows(other.width, other.height, f);
        out
    }

    /// Verify that the buffer length matches the declared dimensions.
    pub fn check_shape(&self, name: &str) -> Result<()> {
        if self.data.len() != self.width * self.height {
            return Err(LandslideError::GeometryMismatch { band: name.to_string() });
        }
        Ok(())
    }

    /// Replace the input sentinel (if any) with NaN.
    pub fn mask_nodata(&mut self) {
        if let Some(sentinel) = self.nodata.take() {
            for v in &mut self.data {
                if *v == sentinel {
                    *v = f32::NAN;
                }
            }
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    /// The cell value, or `None` when missing.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        let v = self.get(row, col);
        if v.is_nan() { None } else { Some(v) }
    }

    pub fn bbox(&self) -> BBox {
        BBox {
            min_lon: self.min_lon,
            max_lon: self.max_lon,
            min_lat: self.min_lat,
            max_lat: self.max_lat,
        }
    }

    /// Cell size in degrees `(dx, dy)`.
    pub fn cell_size_deg(&self) -> (f64, f64) {
        let dx = if self.width > 0 { (self.max_lon - self.min_lon) / self.width as f64 } else { 0.0 };
        let dy = if self.height > 0 { (self.max_lat - self.min_lat) / self.height as f64 } else { 0.0 };
        (dx, dy)
    }

    /// Cell size in metres `(x, y)` at the grid's mid latitude.
    /// Falls back to 90 m on an axis whose extent is degenerate.
    pub fn cell_size_m(&self) -> (f64, f64) {
        let (dx, dy) = self.cell_size_deg();
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let cx = dx.abs() * METRES_PER_DEGREE * mid_lat.to_radians().cos();
        let cy = dy.abs() * METRES_PER_DEGREE;
        let fix = |v: f64| if v < 1e-3 { 90.0 } else { v };
        (fix(cx), fix(cy))
    }

    /// Area of one cell in row `row`, in km².
    pub fn cell_area_km2(&self, row: usize) -> f64 {
        let (dx, dy) = self.cell_size_deg();
        let lat = self.min_lat + (row as f64 + 0.5) * dy;
        let w_km = dx.abs() * METRES_PER_DEGREE * lat.to_radians().cos() / 1000.0;
        let h_km = dy.abs() * METRES_PER_DEGREE / 1000.0;
        w_km * h_km
    }

    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let (dx, dy) = self.cell_size_deg();
        LatLon::new(
            self.min_lat + (row as f64 + 0.5) * dy,
            self.min_lon + (col as f64 + 0.5) * dx,
        )
    }

    /// The `(row, col)` of the cell containing `ll`, or `None` outside the grid.
    pub fn cell_index(&self, ll: LatLon) -> Option<(usize, usize)> {
        if self.width == 0 || self.height == 0 || !self.bbox().contains(ll) {
            return None;
        }
        let (dx, dy) = self.cell_size_deg();
        let c = ((ll.lon - self.min_lon) / dx).floor() as usize;
        let r = ((ll.lat - self.min_lat) / dy).floor() as usize;
        Some((r.min(self.height - 1), c.min(self.width - 1)))
    }

    /// Nearest-cell value at `ll`.
    pub fn value_at(&self, ll: LatLon) -> Option<f32> {
        self.cell_index(ll).and_then(|(r, c)| self.value(r, c))
    }

    /// True when both grids share dimensions and bounds.
    pub fn same_geometry(&self, other: &RasterGrid) -> bool {
        const EPS: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && (self.min_lon - other.min_lon).abs() < EPS
            && (self.max_lon - other.max_lon).abs() < EPS
            && (self.min_lat - other.min_lat).abs() < EPS
            && (self.max_lat - other.max_lat).abs() < EPS
    }

    /// Nearest-neighbour resample onto the geometry of `target`.
    pub fn resample_to(&self, target: &RasterGrid) -> RasterGrid {
        if self.same_geometry(target) {
            return self.clone();
        }
        RasterGrid::from_fn(target, |r, c| {
            self.value_at(target.cell_center(r, c)).unwrap_or(f32::NAN)
        })
    }

    /// Mask every cell whose centre lies outside `region`.
    pub fn clip(&mut self, region: &Region) {
        let bbox = region.bbox();
        for r in 0..self.height {
            for c in 0..self.width {
                let ll = self.cell_center(r, c);
                if !bbox.contains(ll) || !region.contains(ll) {
                    self.set(r, c, f32::NAN);
                }
            }
        }
    }

    pub fn clipped(mut self, region: &Region) -> Self {
        self.clip(region);
        self
    }

    /// Apply `f` to every present value; missing values stay missing.
    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> RasterGrid {
        let mut out = self.clone();
        for v in &mut out.data {
            if !v.is_nan() {
                *v = f(*v);
            }
        }
        out
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn max_value(&self) -> Option<f32> {
        self.data.iter().copied().filter(|v| !v.is_nan()).reduce(f32::max)
    }
}

/// Evaluate `f(row, col)` for every cell, row-parallel under `threading`.
pub(crate) fn fill_rows<F>(width: usize, height: usize, f: F) -> Vec<f32>
where
    F: Fn(usize, usize) -> f32 + Sync + Send,
{
    let mut data = vec![f32::NAN; width * height];
    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        data.par_chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(r, row)| {
                for (c, v) in row.iter_mut().enumerate() {
                    *v = f(r, c);
                }
            });
    }
    #[cfg(not(feature = "threading"))]
    {
        for (r, row) in data.chunks_mut(width.max(1)).enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = f(r, c);
            }
        }
    }
    data
}

mod nodata_serde {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[f32], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(data.len()))?;
        for v in data {
            let cell = if v.is_nan() { None } else { Some(*v) };
            seq.serialize_element(&cell)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f32>, D::Error> {
        let raw: Vec<Option<f32>> = Vec::deserialize(d)?;
        Ok(raw.into_iter().map(|v| v.unwrap_or(f32::NAN)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds() -> BBox {
        BBox { min_lon: 79.0, max_lon: 79.1, min_lat: 30.0, max_lat: 30.1 }
    }

    #[test]
    fn cell_center_maps_back_to_same_cell() {
        let g = RasterGrid::new(10, 5, unit_bounds(), 0.0);
        for r in 0..5 {
            for c in 0..10 {
                assert_eq!(g.cell_index(g.cell_center(r, c)), Some((r, c)));
            }
        }
        assert!(g.cell_index(LatLon::new(31.0, 79.05)).is_none());
    }

    #[test]
    fn missing_values_round_trip_as_null() {
        let mut g = RasterGrid::new(2, 1, unit_bounds(), 1.5);
        g.set(0, 1, f32::NAN);
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.contains("[1.5,null]"), "{json}");
        let back: RasterGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(0, 0), Some(1.5));
        assert_eq!(back.value(0, 1), None);
    }

    #[test]
    fn nodata_sentinel_is_masked() {
        let mut g = RasterGrid::new(3, 1, unit_bounds(), 7.0);
        g.set(0, 2, -9999.0);
        g.nodata = Some(-9999.0);
        g.mask_nodata();
        assert_eq!(g.valid_count(), 2);
        assert!(g.nodata.is_none());
    }

    #[test]
    fn resample_nearest_onto_finer_grid() {
        let mut coarse = RasterGrid::new(2, 2, unit_bounds(), 0.0);
        coarse.set(0, 0, 1.0);
        coarse.set(0, 1, 2.0);
        coarse.set(1, 0, 3.0);
        coarse.set(1, 1, 4.0);
        let fine = RasterGrid::new(4, 4, unit_bounds(), 0.0);
        let out = coarse.resample_to(&fine);
        assert_eq!(out.value(0, 0), Some(1.0));
        assert_eq!(out.value(1, 3), Some(2.0));
        assert_eq!(out.value(3, 0), Some(3.0));
        assert_eq!(out.value(2, 2), Some(4.0));
    }

    #[test]
    fn clip_masks_cells_outside_region() {
        let g = RasterGrid::new(10, 10, unit_bounds(), 1.0);
        let half = Region::from_bounds("west", 79.0, 30.0, 79.05, 30.1);
        let clipped = g.clipped(&half);
        assert_eq!(clipped.valid_count(), 50);
        assert_eq!(clipped.value(3, 2), Some(1.0));
        assert_eq!(clipped.value(3, 7), None);
    }

    #[test]
    fn cell_area_matches_extent() {
        let g = RasterGrid::new(10, 10, unit_bounds(), 0.0);
        let total: f64 = (0..g.height).map(|r| g.cell_area_km2(r) * g.width as f64).sum();
        // 0.1° × 0.1° at ~30° N ≈ 11.13 km × 9.63 km.
        assert!((total - 107.2).abs() < 0.5, "total area {total}");
    }
}
