//! RUSLE soil-erosion risk for a single river basin.
//!
//! A = R · K · LS · C · P is evaluated pixelwise over the basin, classified
//! into five risk bands and summarized as hectares per band plus the
//! area-weighted mean loss. Input layers come through [`source::RasterSource`];
//! maps and the report leave through the sink traits in [`report`].

pub mod aoi;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod factors;
pub mod grid;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod synthetic;
pub mod zonal;

pub use aoi::{AreaOfInterest, BasinFeature, Polygon};
pub use cancel::CancelToken;
pub use config::{AssetIds, RunConfig};
pub use error::{Result, RusleError};
pub use grid::{GridRef, Raster};
pub use pipeline::{RunOutput, RusleRunner};
pub use report::{LayerStyle, OutlineStyle, Report, ReportSink, VisualizationSink};
pub use source::{DateRange, InMemorySource, RasterSource};
pub use synthetic::{SyntheticScene, SyntheticSource};
