//! Raster data source seam.
//!
//! The pipeline never fetches imagery itself: everything arrives through a
//! [`RasterSource`]. [`InMemorySource`] is the JSON-backed implementation used
//! by the CLI and the tests; `synthetic::SyntheticSource` generates layers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aoi::BasinFeature;
use crate::error::{Result, RusleError};
use crate::grid::Raster;

/// Half-open date window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// One dated image of a series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame<T> {
    pub date: NaiveDate,
    pub raster: Raster<T>,
}

/// A dated image stack for a single band.
#[derive(Debug, Clone)]
pub struct TimeSeries<T> {
    pub asset: String,
    /// Multiplier that converts stored values to physical units.
    pub scale_factor: f64,
    /// Ordered by date.
    pub frames: Vec<Frame<T>>,
}

impl<T: Copy> TimeSeries<T> {
    /// Frames whose date falls inside `range`, order preserved.
    pub fn filter_date(&self, range: &DateRange) -> TimeSeries<T> {
        TimeSeries {
            asset: self.asset.clone(),
            scale_factor: self.scale_factor,
            frames: self
                .frames
                .iter()
                .filter(|f| range.contains(f.date))
                .cloned()
                .collect(),
        }
    }

    /// Earliest frame, whatever order the frames are stored in.
    pub fn first(&self) -> Option<&Frame<T>> {
        self.frames.iter().min_by_key(|f| f.date)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl TimeSeries<f32> {
    pub fn to_categorical(&self) -> TimeSeries<i32> {
        TimeSeries {
            asset: self.asset.clone(),
            scale_factor: self.scale_factor,
            frames: self
                .frames
                .iter()
                .map(|f| Frame { date: f.date, raster: f.raster.to_categorical() })
                .collect(),
        }
    }
}

/// Provider of the input layers.
///
/// Categorical layers are delivered as `f32` and converted by the caller.
pub trait RasterSource {
    /// Feature collection holding the basin polygons.
    fn basins(&self, asset: &str) -> Result<Vec<BasinFeature>>;

    /// A single-image band.
    fn image(&self, asset: &str, band: &str) -> Result<Raster<f32>>;

    /// An image-collection band. When `range` is given the source may return
    /// only the frames inside it; callers filter again regardless.
    fn series(&self, asset: &str, band: &str, range: Option<&DateRange>) -> Result<TimeSeries<f32>>;
}

fn missing(asset: &str, reason: impl Into<String>) -> RusleError {
    RusleError::Source { asset: asset.to_string(), reason: reason.into() }
}

/// A stored image collection: scale factor plus multi-band frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default = "unit_scale")]
    pub scale_factor: f64,
    pub frames: Vec<StoredFrame>,
}

fn unit_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFrame {
    pub date: NaiveDate,
    pub bands: BTreeMap<String, Raster<f32>>,
}

/// Layers held in memory, deserializable from a JSON scene file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySource {
    #[serde(default)]
    pub basins: BTreeMap<String, Vec<BasinFeature>>,
    /// asset → band → raster
    #[serde(default)]
    pub images: BTreeMap<String, BTreeMap<String, Raster<f32>>>,
    #[serde(default)]
    pub collections: BTreeMap<String, Collection>,
}

impl InMemorySource {
    /// Parse a scene and check every raster's shape before it can be indexed.
    /// Collection frames are put in date order.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut scene: Self =
            serde_json::from_str(text).map_err(|e| missing("scene", format!("invalid scene JSON: {e}")))?;
        scene.validate()?;
        for coll in scene.collections.values_mut() {
            coll.frames.sort_by_key(|f| f.date);
        }
        Ok(scene)
    }

    /// `Source` error naming the first raster with a bad grid or data length.
    pub fn validate(&self) -> Result<()> {
        for (asset, bands) in &self.images {
            for (band, raster) in bands {
                raster
                    .check_shape()
                    .map_err(|e| missing(asset, format!("band {band}: {e}")))?;
            }
        }
        for (asset, coll) in &self.collections {
            for frame in &coll.frames {
                for (band, raster) in &frame.bands {
                    raster
                        .check_shape()
                        .map_err(|e| missing(asset, format!("frame {} band {band}: {e}", frame.date)))?;
                }
            }
        }
        Ok(())
    }

    pub fn with_basins(mut self, asset: &str, features: Vec<BasinFeature>) -> Self {
        self.basins.insert(asset.to_string(), features);
        self
    }

    pub fn with_image(mut self, asset: &str, band: &str, raster: Raster<f32>) -> Self {
        self.images
            .entry(asset.to_string())
            .or_default()
            .insert(band.to_string(), raster);
        self
    }

    /// Append a single-band frame to a collection, creating it if needed.
    pub fn with_frame(
        mut self,
        asset: &str,
        band: &str,
        scale_factor: f64,
        date: NaiveDate,
        raster: Raster<f32>,
    ) -> Self {
        let coll = self
            .collections
            .entry(asset.to_string())
            .or_insert_with(|| Collection { scale_factor, frames: Vec::new() });
        coll.scale_factor = scale_factor;
        let mut bands = BTreeMap::new();
        bands.insert(band.to_string(), raster);
        coll.frames.push(StoredFrame { date, bands });
        coll.frames.sort_by_key(|f| f.date);
        self
    }
}

impl RasterSource for InMemorySource {
    fn basins(&self, asset: &str) -> Result<Vec<BasinFeature>> {
        self.basins
            .get(asset)
            .cloned()
            .ok_or_else(|| missing(asset, "no such feature collection"))
    }

    fn image(&self, asset: &str, band: &str) -> Result<Raster<f32>> {
        self.images
            .get(asset)
            .ok_or_else(|| missing(asset, "no such image"))?
            .get(band)
            .cloned()
            .ok_or_else(|| missing(asset, format!("no band {band}")))
    }

    fn series(&self, asset: &str, band: &str, range: Option<&DateRange>) -> Result<TimeSeries<f32>> {
        let coll = self
            .collections
            .get(asset)
            .ok_or_else(|| missing(asset, "no such collection"))?;
        let mut frames = Vec::with_capacity(coll.frames.len());
        for stored in &coll.frames {
            if range.is_some_and(|r| !r.contains(stored.date)) {
                continue;
            }
            let raster = stored
                .bands
                .get(band)
                .cloned()
                .ok_or_else(|| missing(asset, format!("frame {} has no band {band}", stored.date)))?;
            frames.push(Frame { date: stored.date, raster });
        }
        frames.sort_by_key(|f| f.date);
        Ok(TimeSeries { asset: asset.to_string(), scale_factor: coll.scale_factor, frames })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridRef;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn grid() -> GridRef {
        GridRef::geographic(2, 2, 0.0, 1.0, 0.0, 1.0)
    }

    #[test]
    fn date_range_is_half_open() {
        let r = DateRange::new(d(2020, 1, 1), d(2021, 1, 1));
        assert!(r.contains(d(2020, 1, 1)));
        assert!(r.contains(d(2020, 12, 31)));
        assert!(!r.contains(d(2021, 1, 1)));
        assert!(!r.contains(d(2019, 12, 31)));
    }

    #[test]
    fn series_is_sorted_and_filtered() {
        let src = InMemorySource::default()
            .with_frame("ndvi", "NDVI", 1e-4, d(2020, 6, 1), Raster::filled(grid(), 2.0))
            .with_frame("ndvi", "NDVI", 1e-4, d(2019, 6, 1), Raster::filled(grid(), 1.0))
            .with_frame("ndvi", "NDVI", 1e-4, d(2020, 2, 1), Raster::filled(grid(), 3.0));

        let all = src.series("ndvi", "NDVI", None).unwrap();
        let dates: Vec<_> = all.frames.iter().map(|f| f.date).collect();
        assert_eq!(dates, vec![d(2019, 6, 1), d(2020, 2, 1), d(2020, 6, 1)]);
        assert_eq!(all.scale_factor, 1e-4);

        let range = DateRange::new(d(2020, 1, 1), d(2021, 1, 1));
        let in_range = src.series("ndvi", "NDVI", Some(&range)).unwrap();
        assert_eq!(in_range.frames.len(), 2);
        assert_eq!(all.filter_date(&range).frames.len(), 2);
        assert_eq!(in_range.first().unwrap().date, d(2020, 2, 1));
    }

    #[test]
    fn missing_assets_and_bands_are_source_errors() {
        let src = InMemorySource::default().with_image("dem", "elevation", Raster::filled(grid(), 1.0));
        assert!(src.image("dem", "elevation").is_ok());
        assert!(matches!(src.image("dem", "b0"), Err(RusleError::Source { .. })));
        assert!(matches!(src.image("soil", "b0"), Err(RusleError::Source { .. })));
        assert!(matches!(src.basins("basins"), Err(RusleError::Source { .. })));
        assert!(matches!(src.series("ndvi", "NDVI", None), Err(RusleError::Source { .. })));
    }

    #[test]
    fn scene_with_short_raster_is_rejected() {
        let json = r#"{
            "images": { "dem": { "elevation": {
                "grid": { "width": 2, "height": 2, "min_lon": 0.0, "max_lon": 1.0, "min_lat": 0.0, "max_lat": 1.0 },
                "data": [250.0]
            } } }
        }"#;
        let err = InMemorySource::from_json(json).unwrap_err();
        assert!(matches!(err, RusleError::Source { ref asset, .. } if asset == "dem"), "{err:?}");
    }

    #[test]
    fn scene_with_inverted_extent_is_rejected() {
        let json = r#"{
            "collections": { "ndvi": { "frames": [ { "date": "2020-01-01", "bands": { "NDVI": {
                "grid": { "width": 1, "height": 1, "min_lon": 1.0, "max_lon": 0.0, "min_lat": 0.0, "max_lat": 1.0 },
                "data": [0.5]
            } } } ] } }
        }"#;
        assert!(matches!(InMemorySource::from_json(json), Err(RusleError::Source { .. })));
    }

    #[test]
    fn scene_frames_come_back_in_date_order() {
        let json = r#"{
            "collections": { "lc": { "frames": [
                { "date": "2020-07-01", "bands": { "LC": { "grid": { "width": 1, "height": 1, "min_lon": 0.0, "max_lon": 1.0, "min_lat": 0.0, "max_lat": 1.0 }, "data": [10.0] } } },
                { "date": "2020-01-01", "bands": { "LC": { "grid": { "width": 1, "height": 1, "min_lon": 0.0, "max_lon": 1.0, "min_lat": 0.0, "max_lat": 1.0 }, "data": [12.0] } } }
            ] } }
        }"#;
        let src = InMemorySource::from_json(json).unwrap();
        let series = src.series("lc", "LC", None).unwrap();
        assert_eq!(series.first().unwrap().date, d(2020, 1, 1));
        assert_eq!(series.first().unwrap().raster.get(0, 0), Some(12.0));
        assert_eq!(series.scale_factor, 1.0);

        // Frames pushed out of order through the public fields are sorted too.
        let mut unsorted = src.clone();
        unsorted.collections.get_mut("lc").unwrap().frames.reverse();
        let series = unsorted.series("lc", "LC", None).unwrap();
        assert_eq!(series.first().unwrap().date, d(2020, 1, 1));
    }

    #[test]
    fn scene_json_round_trips_through_serde() {
        let src = InMemorySource::default().with_image("dem", "elevation", Raster::filled(grid(), 5.0));
        let json = serde_json::to_string(&src).unwrap();
        let back = InMemorySource::from_json(&json).unwrap();
        assert_eq!(back.image("dem", "elevation").unwrap().get(1, 1), Some(5.0));
    }
}
