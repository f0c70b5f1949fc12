use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};

/// Mean Earth radius (IUGG) used for pixel footprints.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Metres per degree of latitude; also used for longitudinal spacing scaled by cos(lat).
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Tolerance (degrees) when comparing grid extents.
const EXTENT_EPS_DEG: f64 = 1e-9;

/// Spatial reference of a raster: coordinate system, pixel counts and extent.
///
/// Geographic (lon/lat degrees) grids only. Row 0 is the northern edge, column 0
/// the western edge; pixel centres sit half a cell inside the extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRef {
    #[serde(default = "default_crs")]
    pub crs: String,
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

fn default_crs() -> String {
    "EPSG:4326".to_string()
}

impl GridRef {
    pub fn geographic(
        width: usize,
        height: usize,
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
    ) -> Self {
        Self {
            crs: default_crs(),
            width,
            height,
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn cell_width_deg(&self) -> f64 {
        (self.max_lon - self.min_lon) / self.width as f64
    }

    #[inline]
    pub fn cell_height_deg(&self) -> f64 {
        (self.max_lat - self.min_lat) / self.height as f64
    }

    /// `(lon, lat)` of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let lon = self.min_lon + (col as f64 + 0.5) * self.cell_width_deg();
        let lat = self.max_lat - (row as f64 + 0.5) * self.cell_height_deg();
        (lon, lat)
    }

    /// Cell containing `(lon, lat)`, or `None` outside the extent.
    /// Points on the eastern/southern edge belong to the last column/row.
    pub fn cell_at(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if self.is_empty()
            || lon < self.min_lon
            || lon > self.max_lon
            || lat < self.min_lat
            || lat > self.max_lat
        {
            return None;
        }
        let col = ((lon - self.min_lon) / self.cell_width_deg()).floor() as usize;
        let row = ((self.max_lat - lat) / self.cell_height_deg()).floor() as usize;
        Some((row.min(self.height - 1), col.min(self.width - 1)))
    }

    /// Southern and northern latitude of row `row`.
    pub fn row_lat_bounds(&self, row: usize) -> (f64, f64) {
        let north = self.max_lat - row as f64 * self.cell_height_deg();
        (north - self.cell_height_deg(), north)
    }

    /// East-west pixel spacing in metres along row `row`.
    pub fn cell_dx_m(&self, row: usize) -> f64 {
        let (_, lat) = self.cell_center(row, 0);
        self.cell_width_deg() * METRES_PER_DEGREE * lat.to_radians().cos()
    }

    /// North-south pixel spacing in metres.
    pub fn cell_dy_m(&self) -> f64 {
        self.cell_height_deg() * METRES_PER_DEGREE
    }

    /// Geodesic footprint (m²) of any pixel in row `row`.
    ///
    /// Spherical zone area: R² · Δλ · (sin φ_north − sin φ_south). Every pixel in
    /// a row has the same footprint on a lon/lat grid.
    pub fn cell_area_m2(&self, row: usize) -> f64 {
        let (south, north) = self.row_lat_bounds(row);
        zone_area_m2(self.cell_width_deg(), south, north)
    }

    /// Non-empty shape and a finite extent with `min < max` on both axes.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("empty grid {}x{}", self.width, self.height));
        }
        let finite = [self.min_lon, self.max_lon, self.min_lat, self.max_lat]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(format!(
                "degenerate extent [{}, {}]x[{}, {}]",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            ));
        }
        Ok(())
    }

    /// Fail with [`RusleError::Alignment`] unless `other` has the same CRS,
    /// dimensions and extent.
    pub fn check_aligned(&self, other: &GridRef, op: &'static str) -> Result<()> {
        if self.crs != other.crs {
            return Err(RusleError::Alignment {
                op,
                detail: format!("crs {} vs {}", self.crs, other.crs),
            });
        }
        if self.width != other.width || self.height != other.height {
            return Err(RusleError::Alignment {
                op,
                detail: format!(
                    "shape {}x{} vs {}x{}",
                    self.width, self.height, other.width, other.height
                ),
            });
        }
        let same_extent = (self.min_lon - other.min_lon).abs() < EXTENT_EPS_DEG
            && (self.max_lon - other.max_lon).abs() < EXTENT_EPS_DEG
            && (self.min_lat - other.min_lat).abs() < EXTENT_EPS_DEG
            && (self.max_lat - other.max_lat).abs() < EXTENT_EPS_DEG;
        if !same_extent {
            return Err(RusleError::Alignment {
                op,
                detail: format!(
                    "extent [{}, {}]x[{}, {}] vs [{}, {}]x[{}, {}]",
                    self.min_lon, self.max_lon, self.min_lat, self.max_lat,
                    other.min_lon, other.max_lon, other.min_lat, other.max_lat,
                ),
            });
        }
        Ok(())
    }
}

/// Area (m²) of the lon/lat box `width_deg` wide between two latitudes.
pub fn zone_area_m2(width_deg: f64, south_deg: f64, north_deg: f64) -> f64 {
    let r2 = MEAN_EARTH_RADIUS_M * MEAN_EARTH_RADIUS_M;
    r2 * width_deg.to_radians() * (north_deg.to_radians().sin() - south_deg.to_radians().sin()).abs()
}

/// A 2D field over a [`GridRef`], row-major. `None` marks a masked pixel
/// (outside the AOI, or no valid observation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster<T> {
    pub grid: GridRef,
    pub data: Vec<Option<T>>,
}

impl<T: Copy> Raster<T> {
    /// Every pixel set to `value`.
    pub fn filled(grid: GridRef, value: T) -> Self {
        let n = grid.len();
        Self { grid, data: vec![Some(value); n] }
    }

    /// Every pixel masked.
    pub fn masked(grid: GridRef) -> Self {
        let n = grid.len();
        Self { grid, data: vec![None; n] }
    }

    /// Build from unmasked row-major values.
    pub fn from_values(grid: GridRef, values: Vec<T>) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(RusleError::Alignment {
                op: "raster construction",
                detail: format!("{} values for a {}x{} grid", values.len(), grid.width, grid.height),
            });
        }
        Ok(Self { grid, data: values.into_iter().map(Some).collect() })
    }

    /// A valid grid carrying exactly one entry per pixel. Deserialized rasters
    /// must pass this before any indexing.
    pub fn check_shape(&self) -> std::result::Result<(), String> {
        self.grid.validate()?;
        if self.data.len() != self.grid.len() {
            return Err(format!(
                "{} values for a {}x{} grid",
                self.data.len(),
                self.grid.width,
                self.grid.height
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.data[row * self.grid.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: Option<T>) {
        self.data[row * self.grid.width + col] = val;
    }

    /// Nearest-neighbour sample at `(lon, lat)`. `None` outside the extent or on
    /// a masked pixel.
    pub fn sample(&self, lon: f64, lat: f64) -> Option<T> {
        let (row, col) = self.grid.cell_at(lon, lat)?;
        self.get(row, col)
    }

    /// Apply `f` to every unmasked pixel; the mask is carried through.
    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Raster<U> {
        Raster {
            grid: self.grid.clone(),
            data: self.data.iter().map(|v| v.map(&f)).collect(),
        }
    }

    /// Pixelwise binary operation. The output is masked wherever either input is.
    pub fn zip_map<U: Copy, V: Copy>(
        &self,
        other: &Raster<U>,
        op: &'static str,
        f: impl Fn(T, U) -> V,
    ) -> Result<Raster<V>> {
        self.grid.check_aligned(&other.grid, op)?;
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        Ok(Raster { grid: self.grid.clone(), data })
    }

    /// Number of unmasked pixels.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_some()).count()
    }

    /// Iterator over unmasked values.
    pub fn values(&self) -> impl Iterator<Item = T> + '_ {
        self.data.iter().filter_map(|v| *v)
    }
}

impl Raster<f32> {
    /// Interpret a continuous raster as integer categories (rounded).
    /// Non-finite pixels become masked.
    pub fn to_categorical(&self) -> Raster<i32> {
        Raster {
            grid: self.grid.clone(),
            data: self
                .data
                .iter()
                .map(|v| v.filter(|x| x.is_finite()).map(|x| x.round() as i32))
                .collect(),
        }
    }

    pub fn min_value(&self) -> Option<f32> {
        self.values().reduce(f32::min)
    }

    pub fn max_value(&self) -> Option<f32> {
        self.values().reduce(f32::max)
    }
}
