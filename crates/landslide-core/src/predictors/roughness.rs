//! Terrain roughness proxy: local standard deviation of elevation.
//!
//! The neighbourhood is a circular kernel of fixed radius in metres. High
//! local relief marks rugged, fractured terrain that is more landslide prone.
use crate::grid::RasterGrid;

/// Cell offsets `(dr, dc)` whose centres lie within `radius_m` of the origin.
fn circle_offsets(cellsize_x: f64, cellsize_y: f64, radius_m: f64) -> Vec<(isize, isize)> {
    let kr = (radius_m / cellsize_y).floor() as isize;
    let kc = (radius_m / cellsize_x).floor() as isize;
    let mut offsets = Vec::new();
    for dr in -kr..=kr {
        for dc in -kc..=kc {
            let y = dr as f64 * cellsize_y;
            let x = dc as f64 * cellsize_x;
            if x * x + y * y <= radius_m * radius_m {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

/// Population standard deviation of present elevations within `radius_m`.
///
/// The centre is always in the kernel, so any present centre yields a
/// value ≥ 0. Missing centres yield missing output.
pub fn compute_roughness(elevation: &RasterGrid, radius_m: f64) -> RasterGrid {
    let (cx, cy) = elevation.cell_size_m();
    let offsets = circle_offsets(cx, cy, radius_m.max(0.0));
    let (h, w) = (elevation.height as isize, elevation.width as isize);

    RasterGrid::from_fn(elevation, |r, c| {
        if elevation.value(r, c).is_none() {
            return f32::NAN;
        }
        let mut n = 0u32;
        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        for &(dr, dc) in &offsets {
            let rr = r as isize + dr;
            let cc = c as isize + dc;
            if rr < 0 || cc < 0 || rr >= h || cc >= w {
                continue;
            }
            if let Some(z) = elevation.value(rr as usize, cc as usize) {
                let z = z as f64;
                n += 1;
                sum += z;
                sum_sq += z * z;
            }
        }
        let mean = sum / n as f64;
        let var = (sum_sq / n as f64 - mean * mean).max(0.0);
        var.sqrt() as f32
    })
}
