//! Pipeline orchestrator: resolves the AOI, derives every factor, combines,
//! classifies and summarizes, then hands the results to the sinks.

use std::time::Instant;

use serde::Serialize;

use crate::aoi::AreaOfInterest;
use crate::cancel::CancelToken;
use crate::classify::classify;
use crate::config::RunConfig;
use crate::engine::{soil_loss, RusleFactors};
use crate::error::{Result, RusleError};
use crate::factors::{
    practice_factor, rainfall_raster, soil_erodibility, terrain_factor, vegetation_cover, FactorKind,
    FactorRaster,
};
use crate::grid::Raster;
use crate::report::{format_report, layer_style, OutlineStyle, Report, ReportSink, VisualizationSink};
use crate::source::{DateRange, RasterSource, TimeSeries};
use crate::zonal::{summarize, AggregationSpec, ZonalSummary};

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub aoi: AreaOfInterest,
    pub factors: RusleFactors,
    /// Slope in percent over the AOI, as used by P.
    pub slope_percent: Raster<f32>,
    pub soil_loss: FactorRaster<f32>,
    pub classes: FactorRaster<u8>,
    pub summary: ZonalSummary,
    pub report: Report,
    pub elapsed_ms: u64,
}

/// Short run digest, e.g. for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct RunDigest<'a> {
    pub basin_id: i64,
    pub aoi_pixels: usize,
    pub rainfall_factor: Option<f32>,
    pub max_soil_loss: Option<f32>,
    pub report: &'a Report,
    pub elapsed_ms: u64,
}

impl RunOutput {
    pub fn digest(&self) -> RunDigest<'_> {
        RunDigest {
            basin_id: self.aoi.basin_id(),
            aoi_pixels: self.soil_loss.raster().valid_count(),
            rainfall_factor: self.factors.r.raster().values().next(),
            max_soil_loss: self.soil_loss.raster().max_value(),
            report: &self.report,
            elapsed_ms: self.elapsed_ms,
        }
    }
}

/// Runs the RUSLE pipeline for one fixed configuration.
#[derive(Debug, Clone)]
pub struct RusleRunner {
    config: RunConfig,
}

impl RusleRunner {
    /// Fails with `InvalidConfig` before any layer is touched.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Compute every layer and the report without publishing anything.
    ///
    /// Stage order:
    ///   1. AOI selection
    ///   2. Elevation → analysis grid and AOI mask
    ///   3. R, K, LS (+ slope), C, P
    ///   4. Soil loss and classes
    ///   5. Zonal summary and report
    ///
    /// Cancellation is checked between stages and inside the zonal reductions.
    pub fn compute(&self, source: &dyn RasterSource, cancel: &CancelToken) -> Result<RunOutput> {
        let cfg = &self.config;
        let assets = &cfg.assets;
        let range = cfg.date_range();
        let started = Instant::now();
        let span = tracing::info_span!("rusle", basin = cfg.main_id, start = %range.start, end = %range.end);
        let _guard = span.enter();

        // ── 1. AOI ──────────────────────────────────────────────────────────
        cancel.check()?;
        let basins = source.basins(&assets.basins)?;
        let aoi = AreaOfInterest::select_basin(&basins, cfg.main_id, &assets.basins)?;
        tracing::info!(polygons = aoi.polygons().len(), area_km2 = aoi.area_m2() / 1e6, "basin selected");

        // ── 2. Analysis grid ────────────────────────────────────────────────
        cancel.check()?;
        let dem = fetch_image(source, &assets.elevation, &assets.elevation_band)?;
        let mask = aoi.mask(&dem.grid);
        if mask.count() == 0 {
            tracing::warn!("AOI covers no pixel centre of the elevation grid");
        }
        tracing::info!(width = dem.width(), height = dem.height(), aoi_pixels = mask.count(), "analysis grid");

        // ── 3. Factors ──────────────────────────────────────────────────────
        cancel.check()?;
        let r = rainfall_raster(cfg.p_value, cfg.p1_value, &mask)?;

        cancel.check()?;
        let texture = fetch_image(source, &assets.soil_texture, &assets.soil_texture_band)?;
        let k = soil_erodibility(&texture.to_categorical(), &mask)?;

        cancel.check()?;
        let terrain = terrain_factor(&dem, &mask, cfg.flow_accumulation)?;

        cancel.check()?;
        let ndvi = fetch_series(source, &assets.ndvi, &assets.ndvi_band, &range)?;
        let scale = ndvi_scale(ndvi.scale_factor, cfg.ndvi_scale);
        let c = vegetation_cover(&ndvi, &range, scale, cfg.cover_fill, &mask)?;

        cancel.check()?;
        let land_cover = fetch_series(source, &assets.land_cover, &assets.land_cover_band, &range)?.to_categorical();
        let p = practice_factor(&land_cover, &range, &terrain.slope_percent, &mask)?;
        tracing::info!("factors derived");

        // ── 4. Combine and classify ─────────────────────────────────────────
        cancel.check()?;
        let factors = RusleFactors { r, k, ls: terrain.ls, c, p };
        let a = soil_loss(&factors)?;
        let classes = classify(&a);

        // ── 5. Summaries ────────────────────────────────────────────────────
        let spec = AggregationSpec { scale_m: cfg.scale_m, max_pixels: cfg.max_pixels };
        let summary = summarize(a.raster(), classes.raster(), &aoi, &spec, cancel)?;
        let report = format_report(aoi.basin_id(), &summary);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            total_ha = summary.areas.total_hectares(),
            mean_soil_loss = ?summary.mean_soil_loss,
            elapsed_ms,
            "run complete"
        );

        Ok(RunOutput {
            aoi,
            factors,
            slope_percent: terrain.slope_percent,
            soil_loss: a,
            classes,
            summary,
            report,
            elapsed_ms,
        })
    }

    /// Compute, then publish to the sinks. Sinks see nothing unless every
    /// stage succeeded.
    pub fn run(
        &self,
        source: &dyn RasterSource,
        viz: &mut dyn VisualizationSink,
        reports: &mut dyn ReportSink,
        cancel: &CancelToken,
    ) -> Result<RunOutput> {
        let output = self.compute(source, cancel)?;
        publish(&output, viz, reports)?;
        Ok(output)
    }
}

fn fetch_image(source: &dyn RasterSource, asset: &str, band: &str) -> Result<Raster<f32>> {
    let raster = source.image(asset, band)?;
    raster.check_shape().map_err(|reason| RusleError::Source {
        asset: asset.to_string(),
        reason: format!("band {band}: {reason}"),
    })?;
    Ok(raster)
}

fn fetch_series(source: &dyn RasterSource, asset: &str, band: &str, range: &DateRange) -> Result<TimeSeries<f32>> {
    let mut series = source.series(asset, band, Some(range))?;
    for frame in &series.frames {
        frame.raster.check_shape().map_err(|reason| RusleError::Source {
            asset: asset.to_string(),
            reason: format!("frame {} band {band}: {reason}", frame.date),
        })?;
    }
    series.frames.sort_by_key(|f| f.date);
    Ok(series)
}

/// The scale the NDVI series declares, or `configured` when it declares no
/// usable one. Any disagreement is logged.
fn ndvi_scale(declared: f64, configured: f64) -> f64 {
    if !(declared.is_finite() && declared > 0.0) {
        tracing::warn!(declared, configured, "NDVI series has no usable scale factor, using the configured one");
        return configured;
    }
    if (declared - configured).abs() > f64::EPSILON * configured.abs().max(1.0) {
        tracing::warn!(declared, configured, "NDVI scale factor differs from the configured one, using the declared one");
    }
    declared
}

/// Emit the AOI outline, the seven layers in display order, then the report.
pub fn publish(output: &RunOutput, viz: &mut dyn VisualizationSink, reports: &mut dyn ReportSink) -> Result<()> {
    viz.add_outline(&output.aoi, &OutlineStyle::default())?;
    for factor in output.factors.as_array() {
        viz.add_layer(factor.raster(), &layer_style(factor.kind()))?;
    }
    viz.add_layer(output.soil_loss.raster(), &layer_style(FactorKind::SoilLoss))?;
    let classes = output.classes.raster().map(f32::from);
    viz.add_layer(&classes, &layer_style(FactorKind::SoilLossClass))?;
    reports.report(&output.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::{BasinFeature, Polygon};
    use crate::classify::classify_value;
    use crate::factors::erodibility::erodibility_for_code;
    use crate::factors::practice::practice_value;
    use crate::factors::rainfall::rainfall_factor;
    use crate::factors::terrain::ls_from_slope_percent;
    use crate::factors::cover::cover_from_ndvi;
    use crate::grid::GridRef;
    use crate::report::LayerStyle;
    use crate::source::InMemorySource;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder {
        outlines: usize,
        layers: Vec<&'static str>,
        reports: Vec<Report>,
    }

    impl VisualizationSink for Recorder {
        fn add_outline(&mut self, _aoi: &AreaOfInterest, _style: &OutlineStyle) -> Result<()> {
            self.outlines += 1;
            Ok(())
        }

        fn add_layer(&mut self, _raster: &Raster<f32>, style: &LayerStyle) -> Result<()> {
            self.layers.push(style.display_name);
            Ok(())
        }
    }

    impl ReportSink for Recorder {
        fn report(&mut self, report: &Report) -> Result<()> {
            self.reports.push(report.clone());
            Ok(())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn grid() -> GridRef {
        GridRef::geographic(4, 4, 10.0, 10.04, 45.0, 45.04)
    }

    /// Flat basin: silt loam, bare NDVI, cropland, covering the whole grid.
    fn scene(cfg: &RunConfig) -> InMemorySource {
        let g = grid();
        let a = &cfg.assets;
        let basin = BasinFeature {
            hybas_id: 1,
            main_bas: cfg.main_id,
            polygons: vec![Polygon::rectangle(10.0, 45.0, 10.04, 45.04)],
        };
        InMemorySource::default()
            .with_basins(&a.basins, vec![basin])
            .with_image(&a.elevation, &a.elevation_band, Raster::filled(g.clone(), 250.0))
            .with_image(&a.soil_texture, &a.soil_texture_band, Raster::filled(g.clone(), 5.0))
            .with_frame(&a.ndvi, &a.ndvi_band, 1e-4, d(2020, 3, 1), Raster::filled(g.clone(), 0.0))
            .with_frame(&a.ndvi, &a.ndvi_band, 1e-4, d(2020, 7, 1), Raster::filled(g.clone(), 0.0))
            .with_frame(&a.ndvi, &a.ndvi_band, 1e-4, d(2019, 7, 1), Raster::filled(g.clone(), 9000.0))
            .with_frame(&a.land_cover, &a.land_cover_band, 1.0, d(2020, 1, 1), Raster::filled(g, 12.0))
    }

    #[test]
    fn flat_basin_end_to_end() {
        let cfg = RunConfig::default();
        let runner = RusleRunner::new(cfg.clone()).unwrap();
        let mut sink = Recorder::default();
        let mut reports = Recorder::default();
        let out = runner.run(&scene(&cfg), &mut sink, &mut reports, &CancelToken::new()).unwrap();

        let expected = rainfall_factor(780.0, 648.0).unwrap()
            * erodibility_for_code(5)
            * ls_from_slope_percent(0.0, 500.0)
            * cover_from_ndvi(0.0)
            * practice_value(12, 0.0);
        for v in out.soil_loss.raster().values() {
            assert_relative_eq!(v as f64, expected, max_relative = 1e-5);
        }
        assert_eq!(out.soil_loss.raster().valid_count(), 16);

        let class = classify_value(expected);
        assert!(out.classes.raster().values().all(|c| c == class));
        let row = &out.report.rows[class as usize - 1];
        assert_relative_eq!(row.percent, 100.0, epsilon = 1e-9);
        assert_relative_eq!(out.report.total_area_ha, out.aoi.area_m2() / 1e4, max_relative = 1e-6);
        assert_relative_eq!(out.report.mean_soil_loss.unwrap(), expected, max_relative = 1e-5);

        assert_eq!(sink.outlines, 1);
        assert_eq!(
            sink.layers,
            vec![
                "R Factor Map",
                "K Factor Map",
                "LS Factor Map",
                "C Factor Map",
                "P Factor Map",
                "Soil Loss (Continuous)",
                "Soil Loss Class",
            ]
        );
        assert_eq!(reports.reports, vec![out.report.clone()]);
    }

    #[test]
    fn fixed_factors_over_one_pixel() {
        let g = GridRef::geographic(1, 1, 10.0, 10.01, 45.0, 45.01);
        let aoi = AreaOfInterest::new(1, vec![Polygon::rectangle(10.0, 45.0, 10.01, 45.01)]);
        let layer = |kind, v: f32| FactorRaster::new(kind, Raster::filled(g.clone(), v));
        let factors = RusleFactors {
            r: layer(FactorKind::R, 500.0),
            k: layer(FactorKind::K, 0.03),
            ls: layer(FactorKind::LS, 5.0),
            c: layer(FactorKind::C, 0.2),
            p: layer(FactorKind::P, 0.8),
        };
        let a = soil_loss(&factors).unwrap();
        assert_relative_eq!(a.raster().get(0, 0).unwrap(), 12.0, max_relative = 1e-5);
        let classes = classify(&a);
        assert_eq!(classes.raster().get(0, 0), Some(3));

        let spec = AggregationSpec { scale_m: 500.0, max_pixels: 10_000_000_000 };
        let summary = summarize(a.raster(), classes.raster(), &aoi, &spec, &CancelToken::new()).unwrap();
        let report = format_report(1, &summary);
        assert_relative_eq!(report.rows[2].percent, 100.0, epsilon = 1e-9);
        assert_relative_eq!(report.rows[2].area_ha, aoi.area_m2() / 1e4, max_relative = 1e-9);
        assert_relative_eq!(report.mean_soil_loss.unwrap(), 12.0, max_relative = 1e-5);
    }

    #[test]
    fn unknown_basin_publishes_nothing() {
        let cfg = RunConfig::default();
        let src = scene(&cfg);
        let runner = RusleRunner::new(RunConfig { main_id: 7, ..cfg }).unwrap();
        let mut sink = Recorder::default();
        let mut reports = Recorder::default();
        let err = runner.run(&src, &mut sink, &mut reports, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RusleError::NotFound { value: 7, .. }));
        assert_eq!(sink.outlines, 0);
        assert!(sink.layers.is_empty());
        assert!(reports.reports.is_empty());
    }

    #[test]
    fn window_without_land_cover_is_missing_layer() {
        let cfg = RunConfig::default();
        let src = scene(&cfg);
        let later = RunConfig { date1: d(2022, 1, 1), date2: d(2023, 1, 1), ..cfg };
        let runner = RusleRunner::new(later).unwrap();
        let mut sink = Recorder::default();
        let mut reports = Recorder::default();
        let err = runner.run(&src, &mut sink, &mut reports, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RusleError::MissingLayer { .. }), "{err:?}");
        assert!(sink.layers.is_empty());
        assert!(reports.reports.is_empty());
    }

    #[test]
    fn empty_ndvi_window_uses_fill() {
        // Only the 2019 NDVI frame exists before 2020; land cover is moved to match.
        let cfg = RunConfig { date1: d(2019, 1, 1), date2: d(2020, 1, 1), ..RunConfig::default() };
        let g = grid();
        let a = &cfg.assets;
        let mut src = scene(&RunConfig::default());
        src.collections.remove(&a.ndvi);
        let src = src.with_frame(&a.land_cover, &a.land_cover_band, 1.0, d(2019, 1, 1), Raster::filled(g.clone(), 12.0))
            .with_frame(&a.ndvi, &a.ndvi_band, 1e-4, d(2021, 1, 1), Raster::filled(g, 0.0));
        let out = RusleRunner::new(cfg.clone()).unwrap().compute(&src, &CancelToken::new()).unwrap();
        assert!(out.factors.c.raster().values().all(|c| (c as f64 - cfg.cover_fill).abs() < 1e-6));
    }

    #[test]
    fn cancelled_run_stops() {
        let cfg = RunConfig::default();
        let token = CancelToken::new();
        token.cancel();
        let err = RusleRunner::new(cfg.clone()).unwrap().compute(&scene(&cfg), &token).unwrap_err();
        assert!(matches!(err, RusleError::Cancelled));
    }

    #[test]
    fn misaligned_soil_layer_is_rejected() {
        let cfg = RunConfig::default();
        let a = &cfg.assets;
        let coarse = GridRef::geographic(2, 2, 10.0, 10.04, 45.0, 45.04);
        let src = scene(&cfg).with_image(&a.soil_texture, &a.soil_texture_band, Raster::filled(coarse, 5.0));
        let err = RusleRunner::new(cfg.clone()).unwrap().compute(&src, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RusleError::Alignment { .. }), "{err:?}");
    }

    #[test]
    fn short_elevation_raster_is_a_source_error() {
        let cfg = RunConfig::default();
        let a = &cfg.assets;
        let short = Raster { grid: GridRef::geographic(2, 2, 10.0, 10.04, 45.0, 45.04), data: vec![Some(250.0f32)] };
        let src = scene(&cfg).with_image(&a.elevation, &a.elevation_band, short);
        let err = RusleRunner::new(cfg.clone()).unwrap().compute(&src, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, RusleError::Source { .. }), "{err:?}");
    }

    #[test]
    fn earliest_land_cover_frame_wins_regardless_of_listing_order() {
        let cfg = RunConfig::default();
        let a = &cfg.assets;
        let mut src = scene(&cfg).with_frame(
            &a.land_cover,
            &a.land_cover_band,
            1.0,
            d(2020, 7, 1),
            Raster::filled(grid(), 10.0),
        );
        // July (category 10) now listed before January (cropland).
        src.collections.get_mut(&a.land_cover).unwrap().frames.reverse();
        let out = RusleRunner::new(cfg.clone()).unwrap().compute(&src, &CancelToken::new()).unwrap();
        assert!(out.factors.p.raster().values().all(|p| p == 0.6), "{:?}", out.factors.p.raster().data);
    }

    #[test]
    fn ndvi_uses_the_declared_scale() {
        let cfg = RunConfig::default();
        let a = &cfg.assets;
        let mut src = scene(&cfg);
        src.collections.remove(&a.ndvi);
        let src = src.with_frame(&a.ndvi, &a.ndvi_band, 1.0, d(2020, 5, 1), Raster::filled(grid(), 0.6));
        let out = RusleRunner::new(cfg.clone()).unwrap().compute(&src, &CancelToken::new()).unwrap();
        for c in out.factors.c.raster().values() {
            assert_relative_eq!(c as f64, 0.02, epsilon = 1e-6);
        }
    }

    #[test]
    fn ndvi_scale_falls_back_only_without_a_usable_declaration() {
        assert_eq!(ndvi_scale(1e-4, 1e-4), 1e-4);
        assert_eq!(ndvi_scale(1.0, 1e-4), 1.0);
        assert_eq!(ndvi_scale(0.0, 1e-4), 1e-4);
        assert_eq!(ndvi_scale(f64::NAN, 1e-4), 1e-4);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let err = RusleRunner::new(RunConfig { p_value: -1.0, ..RunConfig::default() }).unwrap_err();
        assert!(matches!(err, RusleError::InvalidConfig(_)));
    }
}
