//! Slope and the slope length-steepness factor (LS).
//!
//! Slope is derived from the elevation raster with Horn's method, converted to
//! percent, and fed to the empirical LS polynomial:
//!
//!   LS = (0.53·s + 0.076·s² + 0.76) · √(λ / 100)
//!
//! where `s` is slope in percent and `λ` a constant flow-accumulation length
//! (metres). λ is a configuration constant, not a flow-accumulation raster.

use crate::aoi::AoiMask;
use crate::error::Result;
use crate::factors::gradient::horn_gradient;
use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;

/// Slope outputs shared by the LS and P factors.
#[derive(Debug, Clone)]
pub struct TerrainLayers {
    /// Slope in percent, clipped to the AOI.
    pub slope_percent: Raster<f32>,
    pub ls: FactorRaster<f32>,
}

/// Slope in degrees at every unmasked pixel of `dem`.
///
/// Pixel spacing comes from the grid: east-west spacing shrinks with cos(lat)
/// row by row, north-south spacing is constant.
pub fn slope_degrees(dem: &Raster<f32>) -> Raster<f32> {
    let mut out = Raster::masked(dem.grid.clone());
    let dy = dem.grid.cell_dy_m();
    for r in 0..dem.height() {
        let dx = dem.grid.cell_dx_m(r);
        for c in 0..dem.width() {
            let slope = horn_gradient(dem, r, c, dx, dy).map(|(dz_dx, dz_dy)| {
                (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan().to_degrees() as f32
            });
            out.set(r, c, slope);
        }
    }
    out
}

/// tan(deg · π/180) · 100
#[inline]
pub fn degrees_to_percent(deg: f64) -> f64 {
    (deg * std::f64::consts::PI / 180.0).tan() * 100.0
}

#[inline]
pub fn ls_from_slope_percent(s: f64, flow_accumulation: f64) -> f64 {
    (0.53 * s + 0.076 * s * s + 0.76) * (flow_accumulation / 100.0).sqrt()
}

/// Derive slope percent and LS from elevation, both clipped to the AOI.
///
/// Slope is computed on the unclipped DEM so pixels on the AOI boundary still
/// see their real neighbours.
pub fn terrain_factor(dem: &Raster<f32>, mask: &AoiMask, flow_accumulation: f64) -> Result<TerrainLayers> {
    let slope_deg = slope_degrees(dem);
    let slope_percent = mask.clip(&slope_deg)?.map(|d| degrees_to_percent(d as f64) as f32);
    let ls = slope_percent.map(|s| ls_from_slope_percent(s as f64, flow_accumulation) as f32);
    if let Some(max) = slope_percent.max_value() {
        tracing::debug!(max_slope_percent = max, "terrain factor");
    }
    Ok(TerrainLayers {
        slope_percent,
        ls: FactorRaster::new(FactorKind::LS, ls),
    })
}
