//! Conservation practice factor (P) from land cover and slope.
//!
//! Land-cover categories follow the MODIS IGBP scheme (LC_Type1): 1–10 natural
//! vegetation, 11 wetlands, 12 croplands, 13 urban, 14 cropland/natural
//! mosaic, 15+ snow, barren and water. Only croplands and mosaics get a
//! slope-dependent P; everything else is a flat value.

use crate::aoi::AoiMask;
use crate::error::{Result, RusleError};
use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;
use crate::source::{DateRange, TimeSeries};

const CROPLAND: i32 = 12;
const MOSAIC: i32 = 14;

/// Upper slope bound (percent, inclusive) → P for agricultural pixels.
/// Slopes above the last bound take [`STEEP_AGRICULTURAL_P`].
const AGRICULTURAL_BANDS: [(f64, f64); 6] = [
    (2.0, 0.6),
    (5.0, 0.5),
    (8.0, 0.5),
    (12.0, 0.6),
    (16.0, 0.7),
    (20.0, 0.8),
];
const STEEP_AGRICULTURAL_P: f64 = 0.9;
const DEFAULT_P: f64 = 1.0;

/// P for one pixel. Rules are evaluated in order, first match wins.
///
/// A NaN slope on an agricultural pixel matches no band and falls through to
/// the default of 1.0.
pub fn practice_value(category: i32, slope_percent: f64) -> f64 {
    if category < 11 {
        return 0.8;
    }
    if category == 11 || category == 13 || category > MOSAIC {
        return 1.0;
    }
    if category == CROPLAND || category == MOSAIC {
        for (upper, p) in AGRICULTURAL_BANDS {
            if slope_percent <= upper {
                return p;
            }
        }
        if slope_percent > 20.0 {
            return STEEP_AGRICULTURAL_P;
        }
    }
    DEFAULT_P
}

/// Derive P from the first land-cover frame in `range`, joined with slope.
///
/// The analysis needs exactly one classification for the window; an empty
/// window has no sensible default and fails with `MissingLayer`.
pub fn practice_factor(
    land_cover: &TimeSeries<i32>,
    range: &DateRange,
    slope_percent: &Raster<f32>,
    mask: &AoiMask,
) -> Result<FactorRaster<f32>> {
    let window = land_cover.filter_date(range);
    let frame = window.first().ok_or_else(|| RusleError::MissingLayer {
        asset: land_cover.asset.clone(),
        start: range.start,
        end: range.end,
    })?;
    if window.frames.len() > 1 {
        tracing::debug!(
            frames = window.frames.len(),
            used = %frame.date,
            "several land-cover frames in window, using the first"
        );
    }
    let lulc = mask.clip(&frame.raster)?;
    let p = lulc.zip_map(slope_percent, "practice factor", |cat, slope| {
        practice_value(cat, slope as f64) as f32
    })?;
    Ok(FactorRaster::new(FactorKind::P, p))
}
