//! Soil loss: A = R · K · LS · C · P, pixelwise.

use crate::error::{Result, RusleError};
use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;

/// Unit of the soil-loss raster.
pub const SOIL_LOSS_UNIT: &str = "t/ha/yr";

/// The five co-registered factor rasters.
#[derive(Debug, Clone)]
pub struct RusleFactors {
    pub r: FactorRaster<f32>,
    pub k: FactorRaster<f32>,
    pub ls: FactorRaster<f32>,
    pub c: FactorRaster<f32>,
    pub p: FactorRaster<f32>,
}

impl RusleFactors {
    pub fn as_array(&self) -> [&FactorRaster<f32>; 5] {
        [&self.r, &self.k, &self.ls, &self.c, &self.p]
    }
}

/// Pixelwise product of `layers`, accumulated in f64 in the given order.
///
/// All layers must share one grid; a pixel masked in any layer is masked in
/// the product.
pub fn product(layers: &[&Raster<f32>]) -> Result<Raster<f32>> {
    let Some((first, rest)) = layers.split_first() else {
        return Err(RusleError::Alignment {
            op: "product",
            detail: "no input layers".to_string(),
        });
    };
    for layer in rest {
        first.grid.check_aligned(&layer.grid, "soil loss product")?;
    }
    let data = (0..first.data.len())
        .map(|i| {
            layers
                .iter()
                .try_fold(1.0f64, |acc, layer| layer.data[i].map(|v| acc * v as f64))
                .map(|v| v as f32)
        })
        .collect();
    Ok(Raster { grid: first.grid.clone(), data })
}

/// Combine the five factors into the soil-loss raster.
pub fn soil_loss(factors: &RusleFactors) -> Result<FactorRaster<f32>> {
    let expected = [FactorKind::R, FactorKind::K, FactorKind::LS, FactorKind::C, FactorKind::P];
    for (factor, kind) in factors.as_array().iter().zip(expected) {
        if factor.kind() != kind {
            return Err(RusleError::Alignment {
                op: "soil loss",
                detail: format!("expected {kind:?} factor, got {:?}", factor.kind()),
            });
        }
    }
    let layers: Vec<&Raster<f32>> = factors.as_array().iter().map(|f| f.raster()).collect();
    let a = product(&layers)?;
    if let Some(max) = a.max_value() {
        tracing::debug!(max_soil_loss = max, unit = SOIL_LOSS_UNIT, "soil loss combined");
    }
    Ok(FactorRaster::new(FactorKind::SoilLoss, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridRef;
    use approx::assert_relative_eq;

    fn grid() -> GridRef {
        GridRef::geographic(3, 1, 0.0, 3.0, 0.0, 1.0)
    }

    fn layer(kind: FactorKind, values: [f32; 3]) -> FactorRaster<f32> {
        FactorRaster::new(kind, Raster::from_values(grid(), values.to_vec()).unwrap())
    }

    fn factors() -> RusleFactors {
        RusleFactors {
            r: layer(FactorKind::R, [500.0, 449.38, 300.0]),
            k: layer(FactorKind::K, [0.03, 0.0423, 0.0053]),
            ls: layer(FactorKind::LS, [5.0, 13.2, 1.7]),
            c: layer(FactorKind::C, [0.2, 0.031, 0.5]),
            p: layer(FactorKind::P, [0.8, 0.6, 1.0]),
        }
    }

    #[test]
    fn reference_product() {
        let a = soil_loss(&factors()).unwrap();
        assert_eq!(a.kind(), FactorKind::SoilLoss);
        assert_eq!(a.name(), "Soil Loss");
        assert_relative_eq!(a.raster().get(0, 0).unwrap(), 12.0, epsilon = 1e-4);
    }

    #[test]
    fn factor_order_does_not_matter() {
        let f = factors();
        let [r, k, ls, c, p] = f.as_array().map(|x| x.raster());
        let orders: [[&Raster<f32>; 5]; 4] = [
            [r, k, ls, c, p],
            [p, c, ls, k, r],
            [ls, r, p, k, c],
            [c, p, r, ls, k],
        ];
        let base = product(&orders[0]).unwrap();
        for order in &orders[1..] {
            let other = product(order).unwrap();
            for (a, b) in base.values().zip(other.values()) {
                assert_relative_eq!(a, b, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn mask_in_any_factor_masks_the_result() {
        let mut f = factors();
        let mut c = f.c.raster().clone();
        c.set(0, 1, None);
        f.c = FactorRaster::new(FactorKind::C, c);
        let a = soil_loss(&f).unwrap();
        assert!(a.raster().get(0, 1).is_none());
        assert_eq!(a.raster().valid_count(), 2);
    }

    #[test]
    fn misaligned_factor_is_rejected() {
        let mut f = factors();
        let moved = Raster::from_values(GridRef::geographic(3, 1, 1.0, 4.0, 0.0, 1.0), vec![1.0; 3]).unwrap();
        f.p = FactorRaster::new(FactorKind::P, moved);
        assert!(matches!(soil_loss(&f), Err(RusleError::Alignment { .. })));
    }

    #[test]
    fn swapped_factor_tags_are_rejected() {
        let mut f = factors();
        std::mem::swap(&mut f.c, &mut f.p);
        assert!(soil_loss(&f).is_err());
    }
}
