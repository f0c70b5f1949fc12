//! Seeded synthetic scene: every layer the pipeline asks for, generated
//! locally so a run needs no imagery backend.
//!
//! Elevation, soil texture, vegetation vigour and land use each come from an
//! independent fBm field. NDVI is published monthly with a seasonal swing and
//! random cloud gaps; land cover is published once per year.

use chrono::{Datelike, Months, NaiveDate};
use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::aoi::{BasinFeature, Polygon};
use crate::config::RunConfig;
use crate::error::Result;
use crate::grid::{GridRef, Raster};
use crate::source::{DateRange, InMemorySource, RasterSource, TimeSeries};

/// Fractional Brownian motion over Perlin noise.
///
/// Octave amplitude decays by `lacunarity^(−H)`.
pub struct Fbm {
    pub h: f64,
    pub octaves: u32,
    pub lacunarity: f64,
    noise: Perlin,
}

impl Fbm {
    pub fn new(seed: u32, h: f64, octaves: u32) -> Self {
        Self { h, octaves, lacunarity: 2.0, noise: Perlin::new(seed) }
    }

    /// Unscaled value, roughly within ±1.5 for H near 0.75.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let gain = self.lacunarity.powf(-self.h);
        let mut value = 0.0;
        let mut amp = 1.0;
        let mut freq = 1.0;
        for _ in 0..self.octaves {
            value += amp * self.noise.get([x * freq, y * freq]);
            amp *= gain;
            freq *= self.lacunarity;
        }
        value
    }

    /// `sample` squashed into [0, 1].
    pub fn unit(&self, x: f64, y: f64) -> f64 {
        (0.5 + 0.35 * self.sample(x, y)).clamp(0.0, 1.0)
    }
}

/// Parameters of a synthetic scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScene {
    pub seed: u64,
    pub width: usize,
    pub height: usize,
    pub center_lon: f64,
    pub center_lat: f64,
    /// Side length of the scene in degrees.
    pub extent_deg: f64,
    pub base_elevation_m: f64,
    pub relief_m: f64,
    /// Probability that an NDVI observation is lost to cloud.
    pub cloud_fraction: f64,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            seed: 42,
            width: 96,
            height: 96,
            center_lon: 36.8,
            center_lat: -1.3,
            extent_deg: 0.2,
            base_elevation_m: 1_200.0,
            relief_m: 600.0,
            cloud_fraction: 0.15,
        }
    }
}

impl SyntheticScene {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    pub fn grid(&self) -> GridRef {
        let half = self.extent_deg / 2.0;
        GridRef::geographic(
            self.width,
            self.height,
            self.center_lon - half,
            self.center_lon + half,
            self.center_lat - half,
            self.center_lat + half,
        )
    }

    /// Generate every asset named in `config`, covering its analysis window.
    pub fn generate(&self, config: &RunConfig) -> InMemorySource {
        let grid = self.grid();
        let assets = &config.assets;
        let seed32 = (self.seed & 0xFFFF_FFFF) as u32;
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x9E37_79B9_7F4A_7C15);

        let terrain = Fbm::new(seed32, 0.75, 6);
        let soil = Fbm::new(seed32.wrapping_add(1), 0.5, 3);
        let vigour = Fbm::new(seed32.wrapping_add(2), 0.6, 4);
        let landuse = Fbm::new(seed32.wrapping_add(3), 0.5, 3);

        let field = |f: &dyn Fn(f64, f64) -> f32| -> Raster<f32> {
            let mut out = Raster::masked(grid.clone());
            for r in 0..grid.height {
                for c in 0..grid.width {
                    let x = c as f64 / grid.width as f64 * 4.0;
                    let y = r as f64 / grid.height as f64 * 4.0;
                    out.set(r, c, Some(f(x, y)));
                }
            }
            out
        };

        let dem = field(&|x, y| (self.base_elevation_m + self.relief_m * terrain.sample(x, y)) as f32);
        let texture = field(&|x, y| 1.0 + (soil.unit(x, y) * 11.999).floor() as f32);
        let vigour_map = field(&|x, y| vigour.unit(x, y) as f32);
        let landuse_map = field(&|x, y| landuse.unit(x, y) as f32);

        let mut source = InMemorySource::default()
            .with_basins(&assets.basins, self.basins(config.main_id, &mut rng))
            .with_image(&assets.elevation, &assets.elevation_band, dem.clone())
            .with_image(&assets.soil_texture, &assets.soil_texture_band, texture);

        let window = config.date_range();
        for date in month_starts(&window) {
            // Peak greenness mid-year; southern-hemisphere scenes are not flipped.
            let season = (date.month0() as f64 / 12.0 * std::f64::consts::TAU).sin() * 0.1;
            let mut frame = Raster::masked(grid.clone());
            for (i, v) in vigour_map.data.iter().enumerate() {
                if rng.gen_bool(self.cloud_fraction.clamp(0.0, 1.0)) {
                    continue;
                }
                if let Some(v) = v {
                    let ndvi = (0.1 + 0.7 * *v as f64 - season).clamp(-0.2, 0.95);
                    frame.data[i] = Some((ndvi / config.ndvi_scale).round() as f32);
                }
            }
            source = source.with_frame(&assets.ndvi, &assets.ndvi_band, config.ndvi_scale, date, frame);
        }

        let mut lulc = Raster::masked(grid.clone());
        for (i, (u, z)) in landuse_map.data.iter().zip(&dem.data).enumerate() {
            if let (Some(u), Some(z)) = (u, z) {
                let height = (*z as f64 - self.base_elevation_m) / self.relief_m.max(1.0);
                lulc.data[i] = Some(land_cover_category(*u as f64, height));
            }
        }
        for year in window.start.year()..=window.end.year() {
            let Some(date) = NaiveDate::from_ymd_opt(year, 1, 1) else { continue };
            source = source.with_frame(&assets.land_cover, &assets.land_cover_band, 1.0, date, lulc.clone());
        }

        tracing::debug!(seed = self.seed, width = self.width, height = self.height, "synthetic scene generated");
        source
    }

    /// The requested basin as a jittered star polygon round the scene centre,
    /// plus one neighbouring basin in a corner.
    fn basins(&self, main_id: i64, rng: &mut StdRng) -> Vec<BasinFeature> {
        const VERTICES: usize = 24;
        let radius = self.extent_deg * 0.35;
        let exterior = (0..VERTICES)
            .map(|i| {
                let theta = i as f64 / VERTICES as f64 * std::f64::consts::TAU;
                let rho = radius * rng.gen_range(0.75_f64..=1.0_f64);
                [self.center_lon + rho * theta.cos(), self.center_lat + rho * theta.sin()]
            })
            .collect();

        let half = self.extent_deg / 2.0;
        let corner = Polygon::rectangle(
            self.center_lon + half * 0.8,
            self.center_lat + half * 0.8,
            self.center_lon + half,
            self.center_lat + half,
        );
        vec![
            BasinFeature {
                hybas_id: main_id.wrapping_mul(10).wrapping_add(1),
                main_bas: main_id,
                polygons: vec![Polygon::new(exterior)],
            },
            BasinFeature {
                hybas_id: main_id.wrapping_mul(10).wrapping_add(2),
                main_bas: main_id.wrapping_add(1),
                polygons: vec![corner],
            },
        ]
    }
}

/// MODIS IGBP-style category from a land-use draw and normalised height.
fn land_cover_category(draw: f64, height: f64) -> f32 {
    let category = if height > 0.6 {
        1 // evergreen needleleaf on the ridges
    } else if draw < 0.25 {
        10
    } else if draw < 0.55 {
        12
    } else if draw < 0.75 {
        14
    } else if draw < 0.8 {
        13
    } else if draw < 0.85 {
        11
    } else {
        4
    };
    category as f32
}

/// First day of every month overlapping `range`, clipped to its start.
fn month_starts(range: &DateRange) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut date = range.start.with_day(1).unwrap_or(range.start);
    while date < range.end {
        if range.contains(date) {
            out.push(date);
        }
        match date.checked_add_months(Months::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    out
}

/// A [`RasterSource`] backed by a generated scene.
pub struct SyntheticSource {
    scene: SyntheticScene,
    layers: InMemorySource,
}

impl SyntheticSource {
    pub fn new(scene: SyntheticScene, config: &RunConfig) -> Self {
        let layers = scene.generate(config);
        Self { scene, layers }
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }

    /// The generated layers, e.g. to write out as a scene file.
    pub fn layers(&self) -> &InMemorySource {
        &self.layers
    }
}

impl RasterSource for SyntheticSource {
    fn basins(&self, asset: &str) -> Result<Vec<BasinFeature>> {
        self.layers.basins(asset)
    }

    fn image(&self, asset: &str, band: &str) -> Result<Raster<f32>> {
        self.layers.image(asset, band)
    }

    fn series(&self, asset: &str, band: &str, range: Option<&DateRange>) -> Result<TimeSeries<f32>> {
        self.layers.series(asset, band, range)
    }
}
