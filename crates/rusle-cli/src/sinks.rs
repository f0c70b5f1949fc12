//! Sinks used by the binary: a console table, PNG layer files, and a no-op.

use std::path::{Path, PathBuf};

use rusle_core::{AreaOfInterest, LayerStyle, OutlineStyle, Raster, Report, ReportSink, RusleError, VisualizationSink};

// ── Console ───────────────────────────────────────────────────────────────────

/// Prints the class table and mean soil loss to stdout.
pub struct ConsoleReport {
    /// Suppress the table, e.g. when JSON goes to stdout instead.
    pub quiet: bool,
}

impl ReportSink for ConsoleReport {
    fn report(&mut self, report: &Report) -> rusle_core::Result<()> {
        if self.quiet {
            return Ok(());
        }
        println!("Basin {}", report.basin_id);
        println!("{}", report.chart_title);
        println!("{:<28} {:>12} {:>8}", report.legend_title, "ha", "%");
        for row in &report.rows {
            println!("{:<28} {:>12.1} {:>7.1}%", row.label, row.display_area_ha, row.percent);
        }
        println!("{:<28} {:>12.1}", "Total", report.total_area_ha);
        match report.mean_soil_loss {
            Some(mean) => println!("Mean soil loss: {mean:.2} t/ha/yr"),
            None => println!("Mean soil loss: n/a (no valid pixel in basin)"),
        }
        Ok(())
    }
}

// ── No-op ─────────────────────────────────────────────────────────────────────

pub struct NullSink;

impl VisualizationSink for NullSink {
    fn add_outline(&mut self, _aoi: &AreaOfInterest, _style: &OutlineStyle) -> rusle_core::Result<()> {
        Ok(())
    }

    fn add_layer(&mut self, _raster: &Raster<f32>, _style: &LayerStyle) -> rusle_core::Result<()> {
        Ok(())
    }
}

// ── PNG ───────────────────────────────────────────────────────────────────────

/// Writes each layer as `<dir>/<layer name>.png`, masked pixels transparent,
/// with the AOI boundary drawn on top.
pub struct PngSink {
    dir: PathBuf,
    outline: Option<(AreaOfInterest, [u8; 4])>,
    written: Vec<PathBuf>,
}

impl PngSink {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf(), outline: None, written: Vec::new() }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

fn sink_err(e: impl std::fmt::Display) -> RusleError {
    RusleError::Sink(e.to_string())
}

fn parse_hex(hex: &str) -> rusle_core::Result<[u8; 3]> {
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| sink_err(format!("bad colour {hex:?}")))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// Linear interpolation along the palette stops, `t` in [0, 1].
fn ramp(stops: &[[u8; 3]], t: f64) -> [u8; 3] {
    if stops.len() == 1 {
        return stops[0];
    }
    let pos = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
    let i = (pos.floor() as usize).min(stops.len() - 2);
    let f = pos - i as f64;
    let mut out = [0u8; 3];
    for (k, v) in out.iter_mut().enumerate() {
        let a = stops[i][k] as f64;
        let b = stops[i + 1][k] as f64;
        *v = (a + (b - a) * f).round() as u8;
    }
    out
}

fn file_name(display_name: &str) -> String {
    let slug: String = display_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect();
    let slug = slug.split('_').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_");
    format!("{slug}.png")
}

impl VisualizationSink for PngSink {
    fn add_outline(&mut self, aoi: &AreaOfInterest, style: &OutlineStyle) -> rusle_core::Result<()> {
        if style.visible {
            let [r, g, b] = parse_hex(style.color)?;
            let alpha = (style.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
            self.outline = Some((aoi.clone(), [r, g, b, alpha]));
        }
        Ok(())
    }

    fn add_layer(&mut self, raster: &Raster<f32>, style: &LayerStyle) -> rusle_core::Result<()> {
        let stops = style.palette.iter().map(|h| parse_hex(h)).collect::<rusle_core::Result<Vec<_>>>()?;
        if stops.is_empty() {
            return Err(sink_err(format!("{} has an empty palette", style.display_name)));
        }
        let span = (style.max - style.min).max(f64::EPSILON);
        let (w, h) = (raster.width() as u32, raster.height() as u32);
        let mut img = image::RgbaImage::new(w, h);
        for r in 0..raster.height() {
            for c in 0..raster.width() {
                if let Some(v) = raster.get(r, c).filter(|v| v.is_finite()) {
                    let [rv, gv, bv] = ramp(&stops, (v as f64 - style.min) / span);
                    img.put_pixel(c as u32, r as u32, image::Rgba([rv, gv, bv, 255]));
                }
            }
        }

        if let Some((aoi, color)) = &self.outline {
            let mask = aoi.mask(&raster.grid);
            let inside = |r: i64, c: i64| {
                r >= 0 && c >= 0 && (r as usize) < raster.height() && (c as usize) < raster.width()
                    && mask.contains(r as usize, c as usize)
            };
            for r in 0..raster.height() as i64 {
                for c in 0..raster.width() as i64 {
                    let edge = inside(r, c)
                        && [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dr, dc)| !inside(r + dr, c + dc));
                    if edge {
                        img.put_pixel(c as u32, r as u32, image::Rgba(*color));
                    }
                }
            }
        }

        let path = self.dir.join(file_name(style.display_name));
        img.save(&path).map_err(sink_err)?;
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_hits_the_end_stops() {
        let stops = [[0, 0, 0], [255, 255, 255]];
        assert_eq!(ramp(&stops, 0.0), [0, 0, 0]);
        assert_eq!(ramp(&stops, 1.0), [255, 255, 255]);
        assert_eq!(ramp(&stops, 0.5), [128, 128, 128]);
        assert_eq!(ramp(&stops, 7.0), [255, 255, 255]);
    }

    #[test]
    fn hex_and_file_names() {
        assert_eq!(parse_hex("FF7F00").unwrap(), [255, 127, 0]);
        assert!(parse_hex("xyz").is_err());
        assert_eq!(file_name("Soil Loss (Continuous)"), "soil_loss_continuous.png");
    }
}
