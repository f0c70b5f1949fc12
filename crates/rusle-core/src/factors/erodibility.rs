//! Soil erodibility (K) from USDA texture classes.
//!
//! Codes follow the USDA texture triangle numbering used by OpenLandMap
//! (1 = sand … 12 = clay). K values come from empirical USDA tables and are not
//! monotonic in the code.

use crate::aoi::AoiMask;
use crate::error::Result;
use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;

/// `(code, texture, K)`
pub const K_TABLE: [(i32, &str, f64); 12] = [
    (1, "sand", 0.0288),
    (2, "loamy sand", 0.0341),
    (3, "sandy loam", 0.036),
    (4, "silt", 0.0394),
    (5, "silt loam", 0.0423),
    (6, "loam", 0.0264),
    (7, "sandy clay loam", 0.0394),
    (8, "silty clay loam", 0.0499),
    (9, "clay loam", 0.050),
    (10, "sandy clay", 0.045),
    (11, "silty clay", 0.0170),
    (12, "clay", 0.0053),
];

/// K for a texture code. Codes outside 1..=12 yield 0, which zeroes soil loss
/// on those pixels rather than failing the run.
pub fn erodibility_for_code(code: i32) -> f64 {
    K_TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map_or(0.0, |(_, _, k)| *k)
}

/// Reclassify a texture raster to K, clipped to the AOI.
pub fn soil_erodibility(texture: &Raster<i32>, mask: &AoiMask) -> Result<FactorRaster<f32>> {
    let clipped = mask.clip(texture)?;
    let unknown = clipped
        .values()
        .filter(|code| !(1..=12).contains(code))
        .count();
    if unknown > 0 {
        tracing::warn!(unknown, "texture codes outside 1..=12 mapped to K = 0");
    }
    let k = clipped.map(|code| erodibility_for_code(code) as f32);
    Ok(FactorRaster::new(FactorKind::K, k))
}
