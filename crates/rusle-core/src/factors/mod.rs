//! The five RUSLE factor derivations. Each is a pure function from source
//! layers (plus the AOI mask) to a tagged factor raster.
pub mod cover;
pub mod erodibility;
mod gradient;
pub mod practice;
pub mod rainfall;
pub mod terrain;

use serde::{Deserialize, Serialize};

use crate::grid::Raster;

pub use cover::vegetation_cover;
pub use erodibility::{erodibility_for_code, soil_erodibility};
pub use practice::{practice_factor, practice_value};
pub use rainfall::{rainfall_factor, rainfall_raster};
pub use terrain::{terrain_factor, TerrainLayers};

/// Which quantity a factor raster holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    R,
    K,
    LS,
    C,
    P,
    SoilLoss,
    SoilLossClass,
}

impl FactorKind {
    /// Band name carried by the raster.
    pub fn band_name(self) -> &'static str {
        match self {
            FactorKind::R => "R",
            FactorKind::K => "K",
            FactorKind::LS => "LS",
            FactorKind::C => "C",
            FactorKind::P => "P",
            FactorKind::SoilLoss => "Soil Loss",
            FactorKind::SoilLossClass => "SL_class",
        }
    }
}

/// A named raster produced by exactly one pipeline component.
/// Fields are private so the tag cannot drift from the data after creation.
#[derive(Debug, Clone)]
pub struct FactorRaster<T> {
    kind: FactorKind,
    raster: Raster<T>,
}

impl<T: Copy> FactorRaster<T> {
    pub fn new(kind: FactorKind, raster: Raster<T>) -> Self {
        Self { kind, raster }
    }

    pub fn kind(&self) -> FactorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.band_name()
    }

    pub fn raster(&self) -> &Raster<T> {
        &self.raster
    }

    pub fn into_raster(self) -> Raster<T> {
        self.raster
    }
}
