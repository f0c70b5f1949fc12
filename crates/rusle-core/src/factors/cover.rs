//! Vegetation cover factor (C) from an NDVI time series.
//!
//! Per-pixel median over the analysis window, scaled to [-1, 1], then
//! C = 0.1 · (1 − NDVI) / 2. Pixels inside the AOI with no valid observation
//! get the configured fill value instead.

use crate::aoi::AoiMask;
use crate::error::Result;
use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;
use crate::source::{DateRange, TimeSeries};

#[inline]
pub fn cover_from_ndvi(ndvi: f64) -> f64 {
    0.1 * ((1.0 - ndvi) / 2.0)
}

/// Median of `values`; the mean of the two middle values for even counts.
/// Reorders the slice. `None` when empty.
pub fn median(values: &mut [f32]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = n / 2;
    if n % 2 == 1 {
        Some(values[mid] as f64)
    } else {
        Some((values[mid - 1] as f64 + values[mid] as f64) / 2.0)
    }
}

/// Per-pixel temporal median of the frames in `series`. Frames must be aligned
/// with `mask`. Pixels with no finite observation stay masked.
fn temporal_median(series: &TimeSeries<f32>, mask: &AoiMask) -> Result<Raster<f32>> {
    let grid = mask.grid();
    for frame in &series.frames {
        grid.check_aligned(&frame.raster.grid, "ndvi median")?;
    }
    let mut out = Raster::masked(grid.clone());
    let mut stack: Vec<f32> = Vec::with_capacity(series.frames.len());
    for r in 0..grid.height {
        for c in 0..grid.width {
            stack.clear();
            stack.extend(
                series
                    .frames
                    .iter()
                    .filter_map(|f| f.raster.get(r, c))
                    .filter(|v| v.is_finite()),
            );
            out.set(r, c, median(&mut stack).map(|m| m as f32));
        }
    }
    Ok(out)
}

/// Derive C over the AOI.
///
/// An empty window is not an error: every AOI pixel then takes `fill`.
pub fn vegetation_cover(
    series: &TimeSeries<f32>,
    range: &DateRange,
    scale_factor: f64,
    fill: f64,
    mask: &AoiMask,
) -> Result<FactorRaster<f32>> {
    let window = series.filter_date(range);
    if window.is_empty() {
        tracing::warn!(
            asset = %series.asset,
            start = %range.start,
            end = %range.end,
            "no NDVI frames in window, C falls back to fill value"
        );
    }
    let ndvi_raw = temporal_median(&window, mask)?;
    let clipped = mask.clip(&ndvi_raw)?;

    let mut filled = 0usize;
    let mut out = Raster::masked(mask.grid().clone());
    for r in 0..out.height() {
        for c in 0..out.width() {
            if !mask.contains(r, c) {
                continue;
            }
            let value = match clipped.get(r, c) {
                Some(raw) => cover_from_ndvi(raw as f64 * scale_factor),
                None => {
                    filled += 1;
                    fill
                }
            };
            out.set(r, c, Some(value as f32));
        }
    }
    tracing::debug!(frames = window.frames.len(), filled, "vegetation cover factor");
    Ok(FactorRaster::new(FactorKind::C, out))
}
