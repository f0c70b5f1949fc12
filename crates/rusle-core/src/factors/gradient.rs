//! Horn (1981) 3×3 gradient on a lon/lat elevation raster.
//! `pub(super)` only, consumed by the terrain factor.

use crate::grid::Raster;

/// Horn weighted 3×3 gradient at `(r, c)`.
///
/// Returns `(dz_dx, dz_dy)` as dimensionless rise/run.
///
/// 3×3 neighbourhood layout:
/// ```text
///   NW(-1,-1)  N(-1, 0)  NE(-1,+1)
///   W ( 0,-1)  *         E ( 0,+1)
///   SW(+1,-1)  S(+1, 0)  SE(+1,+1)
/// ```
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · dx)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · dy)`
///
/// Neighbours beyond the raster edge are clamped to the edge; masked
/// neighbours take the centre elevation. Returns `None` when the centre itself
/// is masked.
pub(super) fn horn_gradient(
    dem: &Raster<f32>,
    r: usize,
    c: usize,
    dx: f64,
    dy: f64,
) -> Option<(f64, f64)> {
    let centre = dem.get(r, c)? as f64;
    let h = dem.height() as isize;
    let w = dem.width() as isize;
    let z = |dr: isize, dc: isize| -> f64 {
        let nr = (r as isize + dr).clamp(0, h - 1) as usize;
        let nc = (c as isize + dc).clamp(0, w - 1) as usize;
        dem.get(nr, nc).map_or(centre, |v| v as f64)
    };

    let nw = z(-1, -1);
    let n  = z(-1,  0);
    let ne = z(-1,  1);
    let w_ = z( 0, -1);
    let e  = z( 0,  1);
    let sw = z( 1, -1);
    let s  = z( 1,  0);
    let se = z( 1,  1);

    let dz_dx = ((ne + 2.0 * e + se) - (nw + 2.0 * w_ + sw)) / (8.0 * dx);
    let dz_dy = ((nw + 2.0 * n + ne) - (sw + 2.0 * s + se)) / (8.0 * dy);
    Some((dz_dx, dz_dy))
}
