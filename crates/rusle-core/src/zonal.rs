//! Zonal statistics over the AOI at a fixed aggregation resolution.
//!
//! Rasters are resampled (nearest neighbour) onto an aggregation grid whose
//! cells are roughly `scale_m` on a side and cover the AOI bounding box. Each
//! aggregation cell whose centre falls inside the AOI contributes its geodesic
//! footprint. Both reductions are a single pass accumulating per-row partials.

use serde::Serialize;

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::aoi::AreaOfInterest;
use crate::cancel::CancelToken;
use crate::classify::{ClassDefinition, CLASSES, CLASS_COUNT};
use crate::error::{Result, RusleError};
use crate::grid::{GridRef, Raster, METRES_PER_DEGREE};

pub const M2_PER_HECTARE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationSpec {
    /// Aggregation resolution in metres.
    pub scale_m: f64,
    /// Upper bound on aggregation cells per reduction.
    pub max_pixels: u64,
}

/// Build the aggregation grid for `source` and `aoi`.
///
/// Covers the intersection of the AOI bounding box with the raster extent,
/// split into `ceil(extent_m / scale_m)` equal cells per axis. East-west
/// extent is measured at the middle latitude.
pub fn aggregation_grid(source: &GridRef, aoi: &AreaOfInterest, spec: &AggregationSpec) -> Result<GridRef> {
    let bbox = aoi.bbox();
    let min_lon = bbox.min_lon.max(source.min_lon);
    let max_lon = bbox.max_lon.min(source.max_lon);
    let min_lat = bbox.min_lat.max(source.min_lat);
    let max_lat = bbox.max_lat.min(source.max_lat);
    if !(min_lon < max_lon && min_lat < max_lat) {
        tracing::warn!(basin = aoi.basin_id(), "AOI does not overlap the raster extent");
        return Ok(GridRef { width: 0, height: 0, ..source.clone() });
    }

    let mid_lat = (min_lat + max_lat) / 2.0;
    let width_m = (max_lon - min_lon) * METRES_PER_DEGREE * mid_lat.to_radians().cos();
    let height_m = (max_lat - min_lat) * METRES_PER_DEGREE;
    let cols = (width_m / spec.scale_m).ceil().max(1.0) as u64;
    let rows = (height_m / spec.scale_m).ceil().max(1.0) as u64;
    let requested = cols.saturating_mul(rows);
    if requested > spec.max_pixels {
        return Err(RusleError::AggregationTooLarge { requested, cap: spec.max_pixels });
    }
    Ok(GridRef {
        crs: source.crs.clone(),
        width: cols as usize,
        height: rows as usize,
        min_lon,
        max_lon,
        min_lat,
        max_lat,
    })
}

/// Hectares per soil-loss class. All five classes are always present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AreaSummary {
    hectares: [f64; CLASS_COUNT],
}

impl AreaSummary {
    pub fn from_hectares(hectares: [f64; CLASS_COUNT]) -> Self {
        Self { hectares }
    }

    /// Area of class `number` (1..=5); 0 for any other number.
    pub fn hectares(&self, number: u8) -> f64 {
        match number {
            1..=5 => self.hectares[number as usize - 1],
            _ => 0.0,
        }
    }

    pub fn total_hectares(&self) -> f64 {
        self.hectares.iter().sum()
    }

    /// `(definition, hectares)` in class order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static ClassDefinition, f64)> + '_ {
        CLASSES.iter().zip(self.hectares.iter().copied())
    }
}

/// Per-row partial result that can be merged in any order.
trait Partial: Default + Send {
    fn merge(self, other: Self) -> Self;
}

#[derive(Default)]
struct ClassAreas([f64; CLASS_COUNT]);

impl Partial for ClassAreas {
    fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
        self
    }
}

#[derive(Default)]
struct WeightedSum {
    sum: f64,
    weight: f64,
}

impl Partial for WeightedSum {
    fn merge(self, other: Self) -> Self {
        Self { sum: self.sum + other.sum, weight: self.weight + other.weight }
    }
}

/// Visit every aggregation cell inside the AOI as `(lon, lat, area_m2)`.
fn reduce_rows<A, F>(agg: &GridRef, aoi: &AreaOfInterest, cancel: &CancelToken, visit: F) -> Result<A>
where
    A: Partial,
    F: Fn(&mut A, f64, f64, f64) + Sync,
{
    let row = |r: usize| -> Result<A> {
        cancel.check()?;
        let mut acc = A::default();
        let area = agg.cell_area_m2(r);
        for c in 0..agg.width {
            let (lon, lat) = agg.cell_center(r, c);
            if aoi.contains(lon, lat) {
                visit(&mut acc, lon, lat, area);
            }
        }
        Ok(acc)
    };

    #[cfg(feature = "threading")]
    {
        (0..agg.height)
            .into_par_iter()
            .map(row)
            .try_reduce(A::default, |a, b| Ok(a.merge(b)))
    }
    #[cfg(not(feature = "threading"))]
    {
        let mut total = A::default();
        for r in 0..agg.height {
            total = total.merge(row(r)?);
        }
        Ok(total)
    }
}

/// Sum of geodesic pixel area per class inside the AOI, in hectares.
pub fn area_by_class(
    classes: &Raster<u8>,
    aoi: &AreaOfInterest,
    spec: &AggregationSpec,
    cancel: &CancelToken,
) -> Result<AreaSummary> {
    let agg = aggregation_grid(&classes.grid, aoi, spec)?;
    let totals: ClassAreas = reduce_rows(&agg, aoi, cancel, |acc: &mut ClassAreas, lon, lat, area| {
        if let Some(class @ 1..=5) = classes.sample(lon, lat) {
            acc.0[class as usize - 1] += area;
        }
    })?;
    let hectares = totals.0.map(|m2| m2 / M2_PER_HECTARE);
    tracing::debug!(cells = agg.len(), ?hectares, "area by class");
    Ok(AreaSummary::from_hectares(hectares))
}

/// Area-weighted mean of `soil_loss` over the AOI. `None` when no unmasked
/// pixel falls inside it.
pub fn mean_soil_loss(
    soil_loss: &Raster<f32>,
    aoi: &AreaOfInterest,
    spec: &AggregationSpec,
    cancel: &CancelToken,
) -> Result<Option<f64>> {
    let agg = aggregation_grid(&soil_loss.grid, aoi, spec)?;
    let acc: WeightedSum = reduce_rows(&agg, aoi, cancel, |acc: &mut WeightedSum, lon, lat, area| {
        if let Some(v) = soil_loss.sample(lon, lat).filter(|v| v.is_finite()) {
            acc.sum += v as f64 * area;
            acc.weight += area;
        }
    })?;
    Ok((acc.weight > 0.0).then(|| acc.sum / acc.weight))
}

/// Result of both zonal reductions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZonalSummary {
    pub areas: AreaSummary,
    pub mean_soil_loss: Option<f64>,
}

/// Run both reductions. They only read their inputs; with the `threading`
/// feature they run concurrently.
pub fn summarize(
    soil_loss: &Raster<f32>,
    classes: &Raster<u8>,
    aoi: &AreaOfInterest,
    spec: &AggregationSpec,
    cancel: &CancelToken,
) -> Result<ZonalSummary> {
    soil_loss.grid.check_aligned(&classes.grid, "zonal summary")?;

    #[cfg(feature = "threading")]
    let (areas, mean) = rayon::join(
        || area_by_class(classes, aoi, spec, cancel),
        || mean_soil_loss(soil_loss, aoi, spec, cancel),
    );
    #[cfg(not(feature = "threading"))]
    let (areas, mean) = (
        area_by_class(classes, aoi, spec, cancel),
        mean_soil_loss(soil_loss, aoi, spec, cancel),
    );

    Ok(ZonalSummary { areas: areas?, mean_soil_loss: mean? })
}
