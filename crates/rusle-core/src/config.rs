//! Run configuration. Fixed at pipeline construction, never mutated.
//! Defaults reproduce the reference basin study (HydroSHEDS basin 1120029800,
//! calendar year 2020, P = 780 mm, P1 = 648 mm).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::source::DateRange;

/// Identifiers of the assets requested from the raster source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetIds {
    pub basins: String,
    pub soil_texture: String,
    pub soil_texture_band: String,
    pub elevation: String,
    pub elevation_band: String,
    pub ndvi: String,
    pub ndvi_band: String,
    pub land_cover: String,
    pub land_cover_band: String,
}

impl Default for AssetIds {
    fn default() -> Self {
        Self {
            basins: "WWF/HydroSHEDS/v1/Basins/hybas_12".into(),
            soil_texture: "OpenLandMap/SOL/SOL_TEXTURE-CLASS_USDA-TT_M/v02".into(),
            soil_texture_band: "b0".into(),
            elevation: "USGS/SRTMGL1_003".into(),
            elevation_band: "elevation".into(),
            ndvi: "MODIS/006/MOD13A2".into(),
            ndvi_band: "NDVI".into(),
            land_cover: "MODIS/006/MCD12Q1".into(),
            land_cover_band: "LC_Type1".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// `MAIN_BAS` value selecting the basin.
    pub main_id: i64,
    /// Start of the analysis window (inclusive).
    pub date1: NaiveDate,
    /// End of the analysis window (exclusive).
    pub date2: NaiveDate,
    /// Mean annual precipitation (mm).
    pub p_value: f64,
    /// Average maximum 24 h precipitation (mm).
    pub p1_value: f64,
    /// Aggregation resolution in metres.
    pub scale_m: f64,
    /// Pixel budget for each zonal reduction.
    pub max_pixels: u64,
    /// Assumed constant flow-accumulation length (m) in the LS formula.
    pub flow_accumulation: f64,
    /// Multiplier from stored NDVI integers to [-1, 1].
    pub ndvi_scale: f64,
    /// C value for pixels without any NDVI observation.
    pub cover_fill: f64,
    pub assets: AssetIds,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            main_id: 1_120_029_800,
            date1: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN),
            date2: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN),
            p_value: 780.0,
            p1_value: 648.0,
            scale_m: 500.0,
            max_pixels: 10_000_000_000,
            flow_accumulation: 500.0,
            ndvi_scale: 0.0001,
            cover_fill: 0.5,
            assets: AssetIds::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| RusleError::InvalidConfig(format!("cannot parse config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.date1, self.date2)
    }

    /// Reject values no run could succeed with.
    ///
    /// Precipitation only has to be positive here; the rainfall factor itself
    /// owns the log-domain check.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(RusleError::InvalidConfig(msg));
        if !(self.p_value.is_finite() && self.p_value > 0.0) {
            return fail(format!("p_value must be positive, got {}", self.p_value));
        }
        if !(self.p1_value.is_finite() && self.p1_value > 0.0) {
            return fail(format!("p1_value must be positive, got {}", self.p1_value));
        }
        if self.date1 >= self.date2 {
            return fail(format!("empty analysis window [{}, {})", self.date1, self.date2));
        }
        if !(self.scale_m.is_finite() && self.scale_m > 0.0) {
            return fail(format!("scale_m must be positive, got {}", self.scale_m));
        }
        if self.max_pixels == 0 {
            return fail("max_pixels must be at least 1".to_string());
        }
        if !(self.flow_accumulation.is_finite() && self.flow_accumulation > 0.0) {
            return fail(format!(
                "flow_accumulation must be positive, got {}",
                self.flow_accumulation
            ));
        }
        if !(self.ndvi_scale.is_finite() && self.ndvi_scale > 0.0) {
            return fail(format!("ndvi_scale must be positive, got {}", self.ndvi_scale));
        }
        if !self.cover_fill.is_finite() {
            return fail("cover_fill must be finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_reference_study() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.main_id, 1_120_029_800);
        assert_eq!(cfg.date1.to_string(), "2020-01-01");
        assert_eq!(cfg.date2.to_string(), "2021-01-01");
        assert_eq!(cfg.scale_m, 500.0);
        assert_eq!(cfg.max_pixels, 10_000_000_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = RunConfig::from_json(r#"{ "main_id": 42, "p_value": 1200.0, "date1": "2019-01-01", "date2": "2019-07-01" }"#)
            .unwrap();
        assert_eq!(cfg.main_id, 42);
        assert_eq!(cfg.p_value, 1200.0);
        assert_eq!(cfg.p1_value, 648.0);
        assert_eq!(cfg.assets.ndvi_band, "NDVI");
        assert!(cfg.date_range().contains(NaiveDate::from_ymd_opt(2019, 3, 1).unwrap()));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad = [
            RunConfig { p_value: 0.0, ..RunConfig::default() },
            RunConfig { p1_value: -3.0, ..RunConfig::default() },
            RunConfig { date2: RunConfig::default().date1, ..RunConfig::default() },
            RunConfig { scale_m: 0.0, ..RunConfig::default() },
            RunConfig { max_pixels: 0, ..RunConfig::default() },
            RunConfig { flow_accumulation: f64::NAN, ..RunConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(RusleError::InvalidConfig(_))), "{cfg:?}");
        }
        assert!(RunConfig::from_json("{ not json").is_err());
    }
}
