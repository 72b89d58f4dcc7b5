//! Shared Horn (1981) 3×3 gradient helper used by the slope band.
//! `pub(crate)` only.

use crate::grid::RasterGrid;

/// Horn (1981) weighted 3×3 gradient at cell `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run, or `None` when the
/// centre cell is missing.
///
/// 3×3 neighbourhood layout as `(row, col)` offsets. Rows grow northward, so
/// the labels are mirrored top to bottom; only the magnitude is used.
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · cellsize_x)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · cellsize_y)`
///
/// Neighbours off the grid edge or missing take the centre value, so border
/// cells and cells next to data gaps still get a (damped) gradient.
pub(crate) fn horn_gradient(
    g: &RasterGrid,
    r: usize,
    c: usize,
    cellsize_x: f64,
    cellsize_y: f64,
) -> Option<(f64, f64)> {
    let z = g.value(r, c)? as f64;
    let at = |dr: isize, dc: isize| -> f64 {
        let rr = r as isize + dr;
        let cc = c as isize + dc;
        if rr < 0 || cc < 0 || rr >= g.height as isize || cc >= g.width as isize {
            return z;
        }
        g.value(rr as usize, cc as usize).map(f64::from).unwrap_or(z)
    };

    let nw = at(-1, -1);
    let n  = at(-1,  0);
    let ne = at(-1,  1);
    let w  = at( 0, -1);
    let e  = at( 0,  1);
    let sw = at( 1, -1);
    let s  = at( 1,  0);
    let se = at( 1,  1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w + sw)) / (8.0 * cellsize_x);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * cellsize_y);
    Some((dz_dx, dz_dy))
}
