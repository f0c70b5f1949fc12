//! Ordinal soil-loss risk classes.

use serde::Serialize;

use crate::factors::{FactorKind, FactorRaster};
use crate::grid::Raster;

/// One risk band: `[lower, upper)` in t/ha/yr, class 5 open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassDefinition {
    pub number: u8,
    pub label: &'static str,
    pub lower: f64,
    pub upper: f64,
    /// Hex RGB without the leading `#`.
    pub color: &'static str,
}

pub const CLASS_COUNT: usize = 5;

pub const CLASSES: [ClassDefinition; CLASS_COUNT] = [
    ClassDefinition { number: 1, label: "Slight (<5 t/ha/yr)", lower: 0.0, upper: 5.0, color: "00FF00" },
    ClassDefinition { number: 2, label: "Moderate (5-10 t/ha/yr)", lower: 5.0, upper: 10.0, color: "FFFF00" },
    ClassDefinition { number: 3, label: "High (10-20 t/ha/yr)", lower: 10.0, upper: 20.0, color: "FF7F00" },
    ClassDefinition { number: 4, label: "Very high (20-40 t/ha/yr)", lower: 20.0, upper: 40.0, color: "FF0000" },
    ClassDefinition { number: 5, label: "Severe (>=40 t/ha/yr)", lower: 40.0, upper: f64::INFINITY, color: "8B0000" },
];

/// Class number (1..=5) for a soil-loss value.
///
/// Strict `<` against each upper bound, so a value sitting exactly on a
/// threshold lands in the next class up (5.0 → 2). Negative values fall in
/// class 1. Callers must filter NaN; it compares false everywhere and would
/// land in class 5.
pub fn classify_value(soil_loss: f64) -> u8 {
    CLASSES
        .iter()
        .find(|def| soil_loss < def.upper)
        .map_or(CLASSES[CLASS_COUNT - 1].number, |def| def.number)
}

pub fn definition(number: u8) -> Option<&'static ClassDefinition> {
    CLASSES.iter().find(|d| d.number == number)
}

/// Classify a soil-loss raster. NaN pixels are masked.
pub fn classify(soil_loss: &FactorRaster<f32>) -> FactorRaster<u8> {
    let raster = soil_loss.raster();
    let data = raster
        .data
        .iter()
        .map(|v| v.filter(|x| !x.is_nan()).map(|x| classify_value(x as f64)))
        .collect();
    FactorRaster::new(
        FactorKind::SoilLossClass,
        Raster { grid: raster.grid.clone(), data },
    )
}
