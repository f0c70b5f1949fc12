//! Error taxonomy for a pipeline run.
//!
//! Every variant is fatal to the run that raised it; the pipeline never retries
//! and never hands partial output to a sink after one of these is returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RusleError {
    /// Invalid math input, e.g. a non-positive logarithm argument.
    #[error("domain error: {0}")]
    Domain(String),

    /// A required time-bounded layer has no observation in the analysis window.
    #[error("missing layer: {asset} has no observation in [{start}, {end})")]
    MissingLayer {
        asset: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    /// The AOI selector matched no feature.
    #[error("no feature in {asset} has {field} == {value}")]
    NotFound {
        asset: String,
        field: &'static str,
        value: i64,
    },

    /// The aggregation grid would exceed the configured pixel budget.
    #[error("aggregation needs {requested} pixels, cap is {cap}; raise max_pixels or coarsen the scale")]
    AggregationTooLarge { requested: u64, cap: u64 },

    /// Inputs to a pixelwise operation are not on the same grid.
    #[error("alignment error in {op}: {detail}")]
    Alignment { op: &'static str, detail: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The raster source could not deliver an asset.
    #[error("raster source failed for {asset}: {reason}")]
    Source { asset: String, reason: String },

    /// A visualization or report sink rejected its input.
    #[error("sink failed: {0}")]
    Sink(String),

    #[error("run was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, RusleError>;
