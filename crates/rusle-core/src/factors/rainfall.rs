//! Rainfall-runoff erosivity (R) from two precipitation constants.

use crate::aoi::AoiMask;
use crate::error::{Result, RusleError};
use crate::factors::{FactorKind, FactorRaster};

const SLOPE: f64 = 143.0;
const INTERCEPT: f64 = 89.7;
/// mm³ → the unit the regression was fitted in.
const SCALE: f64 = 1e-6;

/// R = 143 · log10(P · P1² · 10⁻⁶) + 89.7
///
/// `p` is mean annual precipitation and `p1` the average maximum 24 h
/// precipitation, both in mm.
pub fn rainfall_factor(p: f64, p1: f64) -> Result<f64> {
    let arg = p * p1 * p1 * SCALE;
    if !(arg.is_finite() && arg > 0.0) {
        return Err(RusleError::Domain(format!(
            "rainfall factor needs P·P1²·1e-6 > 0, got {arg} (P = {p}, P1 = {p1})"
        )));
    }
    Ok(SLOPE * arg.log10() + INTERCEPT)
}

/// R broadcast as a constant over the AOI.
pub fn rainfall_raster(p: f64, p1: f64, mask: &AoiMask) -> Result<FactorRaster<f32>> {
    let r = rainfall_factor(p, p1)?;
    tracing::debug!(r, "rainfall factor");
    Ok(FactorRaster::new(FactorKind::R, mask.constant(r as f32)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::{AreaOfInterest, Polygon};
    use crate::grid::GridRef;
    use approx::assert_relative_eq;

    #[test]
    fn reference_precipitation() {
        // 780 · 648² · 1e-6 = 327.52512
        let r = rainfall_factor(780.0, 648.0).unwrap();
        assert_relative_eq!(r, 143.0 * 327.52512f64.log10() + 89.7, epsilon = 1e-9);
        assert_relative_eq!(r, 449.37998, epsilon = 1e-4);
    }

    #[test]
    fn unit_argument_gives_intercept() {
        // P · P1² · 1e-6 = 1 → log10 = 0
        assert_relative_eq!(rainfall_factor(1.0, 1000.0).unwrap(), 89.7, epsilon = 1e-9);
    }

    #[test]
    fn non_positive_argument_is_domain_error() {
        for (p, p1) in [(0.0, 648.0), (-780.0, 648.0), (780.0, 0.0), (f64::NAN, 1.0)] {
            assert!(matches!(rainfall_factor(p, p1), Err(RusleError::Domain(_))), "P={p} P1={p1}");
        }
    }

    #[test]
    fn raster_is_constant_inside_aoi_only() {
        let aoi = AreaOfInterest::new(1, vec![Polygon::rectangle(0.0, 0.0, 1.0, 1.0)]);
        let mask = aoi.mask(&GridRef::geographic(2, 1, 0.0, 2.0, 0.0, 1.0));
        let r = rainfall_raster(780.0, 648.0, &mask).unwrap();
        assert_eq!(r.kind(), FactorKind::R);
        assert_relative_eq!(r.raster().get(0, 0).unwrap(), 449.38, epsilon = 1e-2);
        assert_eq!(r.raster().get(0, 1), None);
    }
}
