//! Presentation seams: layer styling for map display and the chart/legend
//! rows handed to report sinks. Rendering itself lives behind the sink traits.

use serde::Serialize;

use crate::aoi::AreaOfInterest;
use crate::classify::CLASSES;
use crate::error::Result;
use crate::factors::FactorKind;
use crate::grid::Raster;
use crate::zonal::ZonalSummary;

pub const CHART_TITLE: &str = "Soil Loss Area by Class (Hectares)";
pub const LEGEND_TITLE: &str = "Soil Loss (t/ha/yr)";

const WARM_9: [&str; 9] = ["ffffcc", "ffeda0", "fed976", "feb24c", "fd8d3c", "fc4e2a", "e31a1c", "bd0026", "800026"];
const ORANGE_9: [&str; 9] = ["fff7ec", "fee8c8", "fdd49e", "fdbb84", "fc8d59", "ef6548", "d7301f", "b30000", "7f0000"];
const BROWN_9: [&str; 9] = ["ffffe5", "fff7bc", "fee391", "fec44f", "fe9929", "ec7014", "cc4c02", "993404", "662506"];
const COVER_6: [&str; 6] = ["006400", "32CD32", "FFFF00", "FFA500", "FF0000", "8B0000"];
const PRACTICE_4: [&str; 4] = ["00FF00", "FFFF00", "FFA500", "FF0000"];

/// How a raster layer should be displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStyle {
    pub display_name: &'static str,
    /// Hex RGB stops, low to high.
    pub palette: Vec<&'static str>,
    pub min: f64,
    pub max: f64,
    pub visible: bool,
    pub opacity: f64,
}

/// Display defaults per layer. Only the class map starts visible.
pub fn layer_style(kind: FactorKind) -> LayerStyle {
    let (display_name, palette, min, max): (_, Vec<&'static str>, _, _) = match kind {
        FactorKind::R => ("R Factor Map", WARM_9.to_vec(), 300.0, 900.0),
        FactorKind::K => ("K Factor Map", ORANGE_9.to_vec(), 0.005, 0.05),
        FactorKind::LS => ("LS Factor Map", BROWN_9.to_vec(), 0.0, 20.0),
        FactorKind::C => ("C Factor Map", COVER_6.to_vec(), 0.0, 0.5),
        FactorKind::P => ("P Factor Map", PRACTICE_4.to_vec(), 0.5, 1.0),
        FactorKind::SoilLoss => ("Soil Loss (Continuous)", class_palette(), 0.0, 75.0),
        FactorKind::SoilLossClass => ("Soil Loss Class", class_palette(), 1.0, 5.0),
    };
    LayerStyle {
        display_name,
        palette,
        min,
        max,
        visible: kind == FactorKind::SoilLossClass,
        opacity: 1.0,
    }
}

fn class_palette() -> Vec<&'static str> {
    CLASSES.iter().map(|c| c.color).collect()
}

/// Outline drawn for the AOI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineStyle {
    pub display_name: &'static str,
    pub color: &'static str,
    pub visible: bool,
    pub opacity: f64,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self { display_name: "AOI Outline", color: "808080", visible: true, opacity: 0.7 }
    }
}

/// Receives every map layer of a run.
pub trait VisualizationSink {
    fn add_outline(&mut self, aoi: &AreaOfInterest, style: &OutlineStyle) -> Result<()>;

    fn add_layer(&mut self, raster: &Raster<f32>, style: &LayerStyle) -> Result<()>;
}

/// One chart slice / legend row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub class_number: u8,
    pub label: &'static str,
    pub color: &'static str,
    pub area_ha: f64,
    /// `area_ha` rounded to 0.1 ha for display.
    pub display_area_ha: f64,
    /// Share of the classified area, 0–100. Zero when nothing was classified.
    pub percent: f64,
}

/// Everything a report sink needs: ordered class rows plus the mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub basin_id: i64,
    pub chart_title: &'static str,
    pub legend_title: &'static str,
    pub rows: Vec<ReportRow>,
    pub total_area_ha: f64,
    /// Mean soil loss (t/ha/yr); `None` when the AOI held no valid pixel.
    pub mean_soil_loss: Option<f64>,
}

impl Report {
    /// `(color, label)` pairs for a legend, in class order.
    pub fn legend(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rows.iter().map(|r| (r.color, r.label))
    }
}

/// Receives the report of a successful run.
pub trait ReportSink {
    fn report(&mut self, report: &Report) -> Result<()>;
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Turn the zonal output into chart/legend rows, one per class, in order.
pub fn format_report(basin_id: i64, summary: &ZonalSummary) -> Report {
    let total = summary.areas.total_hectares();
    let rows = summary
        .areas
        .entries()
        .map(|(def, area_ha)| ReportRow {
            class_number: def.number,
            label: def.label,
            color: def.color,
            area_ha,
            display_area_ha: round_tenth(area_ha),
            percent: if total > 0.0 { area_ha / total * 100.0 } else { 0.0 },
        })
        .collect();
    Report {
        basin_id,
        chart_title: CHART_TITLE,
        legend_title: LEGEND_TITLE,
        rows,
        total_area_ha: total,
        mean_soil_loss: summary.mean_soil_loss,
    }
}
