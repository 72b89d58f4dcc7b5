//! Per-cell slope angle (Horn method).
//!
//! Slope is computed in degrees at every cell using Horn's (1981) 3×3
//! weighted finite-difference gradient. The x cellsize follows the row's
//! latitude so geographic grids are not distorted away from the equator.
use crate::coords::METRES_PER_DEGREE;
use crate::grid::RasterGrid;
use super::gradient::horn_gradient;

/// Compute the slope band (degrees, 0–90) from an elevation grid.
///
/// Per row `r`:
///   cellsize_y = dy° × 111_320 m/°
///   cellsize_x = dx° × 111_320 × cos(lat_r) m/°
///   slope      = atan(√(dz_dx² + dz_dy²)) × 180/π
///
/// Missing elevation cells produce missing slope cells.
pub fn compute_slope(elevation: &RasterGrid) -> RasterGrid {
    let (dx, dy) = elevation.cell_size_deg();
    let (fallback_x, fallback_y) = elevation.cell_size_m();
    let cellsize_y = {
        let v = dy.abs() * METRES_PER_DEGREE;
        if v < 1e-3 { fallback_y } else { v }
    };

    RasterGrid::from_fn(elevation, |r, c| {
        let lat = elevation.cell_center(r, 0).lat;
        let cx = dx.abs() * METRES_PER_DEGREE * lat.to_radians().cos();
        let cellsize_x = if cx < 1e-3 { fallback_x } else { cx };
        match horn_gradient(elevation, r, c, cellsize_x, cellsize_y) {
            Some((dz_dx, dz_dy)) => {
                let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();
                (slope_rad.to_degrees() as f32).max(0.0)
            }
            None => f32::NAN,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::BBox;

    /// Planar ramp rising eastward at `target_deg`, ≈90 m pixels at the equator.
    fn make_ramp_field(n: usize, target_deg: f64) -> RasterGrid {
        let pixel_deg = 90.0 / 111_320.0;
        let extent = n as f64 * pixel_deg;
        let mut g = RasterGrid::new(
            n,
            n,
            BBox { min_lon: 0.0, max_lon: extent, min_lat: 0.0, max_lat: extent },
            0.0,
        );
        let cellsize_m = pixel_deg * 111_320.0;
        let rise_per_cell = cellsize_m * target_deg.to_radians().tan();
        for r in 0..n {
            for c in 0..n {
                g.set(r, c, (c as f64 * rise_per_cell) as f32);
            }
        }
        g
    }

    #[test]
    fn slope_ramp_interior_within_tenth_degree() {
        let target = 10.0f32;
        let slope = compute_slope(&make_ramp_field(32, target as f64));
        for r in 1..31 {
            for c in 1..31 {
                let s = slope.value(r, c).unwrap();
                assert!((s - target).abs() < 0.1, "cell ({r},{c}) slope {s}");
            }
        }
    }

    #[test]
    fn slope_flat_field_is_zero() {
        let g = RasterGrid::new(8, 8, BBox { min_lon: 79.0, max_lon: 79.01, min_lat: 30.0, max_lat: 30.01 }, 500.0);
        let slope = compute_slope(&g);
        assert_eq!(slope.max_value(), Some(0.0));
    }

    #[test]
    fn missing_elevation_stays_missing() {
        let mut g = make_ramp_field(8, 20.0);
        g.set(4, 4, f32::NAN);
        let slope = compute_slope(&g);
        assert_eq!(slope.value(4, 4), None);
        assert!(slope.value(4, 3).is_some());
    }
}
