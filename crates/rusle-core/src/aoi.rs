//! Area of interest: the basin polygons that clip every raster and bound every
//! aggregation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RusleError};
use crate::grid::{GridRef, Raster, MEAN_EARTH_RADIUS_M};

/// Name of the field the basin filter matches on.
pub const MAIN_BASIN_FIELD: &str = "MAIN_BAS";

/// A polygon in lon/lat degrees. Rings are implicitly closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
    #[serde(default)]
    pub holes: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
    pub fn new(exterior: Vec<[f64; 2]>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    /// Axis-aligned lon/lat rectangle.
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
        ])
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.holes.iter().any(|h| ring_contains(h, lon, lat))
    }

    /// Spherical area in m², holes subtracted.
    pub fn area_m2(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| ring_area_m2(h)).sum();
        (ring_area_m2(&self.exterior) - holes).max(0.0)
    }
}

/// Even-odd ray casting.
fn ring_contains(ring: &[[f64; 2]], x: f64, y: f64) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Area of a lon/lat ring on the sphere (absolute value, either winding).
///
/// Σ (λ₂ − λ₁)(2 + sin φ₁ + sin φ₂) · R² / 2 over the edges. Exact for edges of
/// constant latitude, so lon/lat rectangles match the grid's zone areas.
fn ring_area_m2(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let [lon1, lat1] = ring[i];
        let [lon2, lat2] = ring[(i + 1) % n];
        sum += (lon2 - lon1).to_radians()
            * (2.0 + lat1.to_radians().sin() + lat2.to_radians().sin());
    }
    (sum * MEAN_EARTH_RADIUS_M * MEAN_EARTH_RADIUS_M / 2.0).abs()
}

/// One record of a basin feature collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasinFeature {
    pub hybas_id: i64,
    /// Identifier of the outlet basin this sub-basin drains to.
    pub main_bas: i64,
    pub polygons: Vec<Polygon>,
}

/// Lon/lat bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Resolved, immutable area of interest.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    basin_id: i64,
    polygons: Vec<Polygon>,
    bbox: BBox,
}

impl AreaOfInterest {
    pub fn new(basin_id: i64, polygons: Vec<Polygon>) -> Self {
        let mut bbox = BBox {
            min_lon: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for [lon, lat] in polygons.iter().flat_map(|p| p.exterior.iter().copied()) {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        Self { basin_id, polygons, bbox }
    }

    /// Select every feature whose `MAIN_BAS` equals `main_id` and unite them.
    pub fn select_basin(features: &[BasinFeature], main_id: i64, asset: &str) -> Result<Self> {
        let polygons: Vec<Polygon> = features
            .iter()
            .filter(|f| f.main_bas == main_id)
            .flat_map(|f| f.polygons.iter().cloned())
            .collect();
        if polygons.is_empty() {
            return Err(RusleError::NotFound {
                asset: asset.to_string(),
                field: MAIN_BASIN_FIELD,
                value: main_id,
            });
        }
        Ok(Self::new(main_id, polygons))
    }

    pub fn basin_id(&self) -> i64 {
        self.basin_id
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lon < self.bbox.min_lon
            || lon > self.bbox.max_lon
            || lat < self.bbox.min_lat
            || lat > self.bbox.max_lat
        {
            return false;
        }
        self.polygons.iter().any(|p| p.contains(lon, lat))
    }

    /// Geodesic area in m². Overlapping polygons are counted twice.
    pub fn area_m2(&self) -> f64 {
        self.polygons.iter().map(Polygon::area_m2).sum()
    }

    /// Rasterize onto `grid` by pixel-centre inclusion.
    pub fn mask(&self, grid: &GridRef) -> AoiMask {
        let mut inside = vec![false; grid.len()];
        for r in 0..grid.height {
            for c in 0..grid.width {
                let (lon, lat) = grid.cell_center(r, c);
                inside[r * grid.width + c] = self.contains(lon, lat);
            }
        }
        AoiMask { grid: grid.clone(), inside }
    }
}

/// The AOI rasterized onto a particular grid.
#[derive(Debug, Clone)]
pub struct AoiMask {
    grid: GridRef,
    inside: Vec<bool>,
}

impl AoiMask {
    pub fn grid(&self) -> &GridRef {
        &self.grid
    }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.inside[row * self.grid.width + col]
    }

    pub fn count(&self) -> usize {
        self.inside.iter().filter(|&&b| b).count()
    }

    /// Mask every pixel of `raster` outside the AOI.
    pub fn clip<T: Copy>(&self, raster: &Raster<T>) -> Result<Raster<T>> {
        self.grid.check_aligned(&raster.grid, "clip")?;
        let data = raster
            .data
            .iter()
            .zip(self.inside.iter())
            .map(|(v, &inside)| if inside { *v } else { None })
            .collect();
        Ok(Raster { grid: raster.grid.clone(), data })
    }

    /// A raster holding `value` inside the AOI and masked elsewhere.
    pub fn constant<T: Copy>(&self, value: T) -> Raster<T> {
        Raster {
            grid: self.grid.clone(),
            data: self.inside.iter().map(|&b| b.then_some(value)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::zone_area_m2;
    use approx::assert_relative_eq;

    fn features() -> Vec<BasinFeature> {
        vec![
            BasinFeature {
                hybas_id: 1,
                main_bas: 7,
                polygons: vec![Polygon::rectangle(0.0, 0.0, 1.0, 1.0)],
            },
            BasinFeature {
                hybas_id: 2,
                main_bas: 7,
                polygons: vec![Polygon::rectangle(1.0, 0.0, 2.0, 1.0)],
            },
            BasinFeature {
                hybas_id: 3,
                main_bas: 8,
                polygons: vec![Polygon::rectangle(5.0, 5.0, 6.0, 6.0)],
            },
        ]
    }

    #[test]
    fn select_basin_unites_all_sub_basins() {
        let aoi = AreaOfInterest::select_basin(&features(), 7, "basins").unwrap();
        assert_eq!(aoi.polygons().len(), 2);
        assert!(aoi.contains(0.5, 0.5));
        assert!(aoi.contains(1.5, 0.5));
        assert!(!aoi.contains(5.5, 5.5));
        assert_relative_eq!(aoi.bbox().max_lon, 2.0);
    }

    #[test]
    fn select_basin_without_match_is_not_found() {
        let err = AreaOfInterest::select_basin(&features(), 99, "basins").unwrap_err();
        match err {
            RusleError::NotFound { field, value, .. } => {
                assert_eq!(field, "MAIN_BAS");
                assert_eq!(value, 99);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn hole_is_excluded() {
        let mut p = Polygon::rectangle(0.0, 0.0, 4.0, 4.0);
        p.holes.push(vec![[1.0, 1.0], [3.0, 1.0], [3.0, 3.0], [1.0, 3.0]]);
        assert!(p.contains(0.5, 0.5));
        assert!(!p.contains(2.0, 2.0));
        assert!(p.area_m2() < Polygon::rectangle(0.0, 0.0, 4.0, 4.0).area_m2());
    }

    #[test]
    fn rectangle_area_matches_zone_formula() {
        let p = Polygon::rectangle(10.0, 40.0, 12.0, 41.0);
        assert_relative_eq!(p.area_m2(), zone_area_m2(2.0, 40.0, 41.0), max_relative = 1e-9);
        // Clockwise winding gives the same magnitude.
        let mut cw = p.clone();
        cw.exterior.reverse();
        assert_relative_eq!(cw.area_m2(), p.area_m2(), max_relative = 1e-12);
    }

    #[test]
    fn mask_clips_outside_pixels() {
        let aoi = AreaOfInterest::new(1, vec![Polygon::rectangle(0.0, 0.0, 1.0, 2.0)]);
        let grid = GridRef::geographic(2, 2, 0.0, 2.0, 0.0, 2.0);
        let mask = aoi.mask(&grid);
        assert_eq!(mask.count(), 2);
        let clipped = mask.clip(&Raster::filled(grid, 3.0f32)).unwrap();
        assert_eq!(clipped.data, vec![Some(3.0), None, Some(3.0), None]);
        assert_eq!(mask.constant(1u8).valid_count(), 2);
    }
}
