pub mod annotation;
pub mod glyphs;
pub mod layout;
pub mod raster;
pub mod vector;

use std::path::Path;

use log::debug;

use crate::analysis::SpectrogramMatrix;
use crate::error::{Result, SpectroError};
use crate::settings::{OutputKind, ResolvedSettings};

pub use layout::{AxisScale, CellRect, Device, FrequencyAxis, PageGeometry};
pub use raster::RasterRenderer;
pub use vector::VectorRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOrientation {
    Horizontal,
    /// Rotated 90 degrees counter-clockwise, reading bottom to top
    Vertical,
}

/// Drawing surface shared by the annotation layer and the cell painter.
///
/// Coordinates are device units with the origin at the page's top-left.
/// Levels are gray values in `[0, 1]`, 0 being black.
///
/// Text is anchored at the top-left of its box when horizontal, and at the
/// bottom-left of the rotated box when vertical.
pub trait Canvas {
    fn fill_rect(&mut self, rect: CellRect, level: f64);

    /// Blend `level` over what is already there. Surfaces without
    /// transparency may paint it opaque.
    fn fill_rect_translucent(&mut self, rect: CellRect, level: f64, alpha: f64);

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, level: f64);

    fn text(&mut self, x: f64, y: f64, size: f64, text: &str, orientation: TextOrientation);

    /// (width, height) of `text` drawn horizontally at `size`.
    fn text_extent(&self, text: &str, size: f64) -> (f64, f64);
}

/// Descriptive values printed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMetadata {
    pub file_name: String,
    pub start_time: f64,
    pub duration: f64,
    pub sample_rate: u32,
    pub bins_per_second: f64,
    pub window_size: usize,
}

/// Everything a renderer needs for one page.
pub struct RenderJob<'a> {
    pub matrix: &'a SpectrogramMatrix,
    pub geometry: &'a PageGeometry,
    pub settings: &'a ResolvedSettings,
    pub metadata: &'a PageMetadata,
}

/// An output format.
///
/// # Implementations
/// - `RasterRenderer`: grayscale PNG at the printer DPI
/// - `VectorRenderer`: single-page PDF
pub trait Renderer {
    fn kind(&self) -> OutputKind;

    /// Device the page geometry must be computed for.
    fn device(&self, settings: &ResolvedSettings) -> Device;

    /// Draw `job` and write it to `output`. On failure no file is left behind.
    fn render(&self, job: &RenderJob<'_>, output: &Path) -> Result<()>;
}

pub fn renderer_for(kind: OutputKind) -> Box<dyn Renderer> {
    match kind {
        OutputKind::Raster => Box::new(RasterRenderer),
        OutputKind::Vector => Box::new(VectorRenderer),
    }
}

/// Quantize an intensity to the 8-bit gray level actually printed.
pub fn gray_level(intensity: f64) -> u8 {
    (intensity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Paint every visible window of the matrix onto `canvas`.
///
/// Within a window, adjacent bins that quantize to the same gray level are
/// merged into one rectangle. Blank-paper cells are skipped since the page
/// starts white. Returns the number of rectangles painted.
pub fn paint_cells(canvas: &mut dyn Canvas, matrix: &SpectrogramMatrix, geometry: &PageGeometry) -> usize {
    let windows = geometry.visible_window_count.min(matrix.num_windows());
    let first_bin = matrix.bin_index_min();
    let mut painted = 0;

    for window in 0..windows {
        let x = geometry.window_x(window);
        let mut run: Option<(u8, f64, f64)> = None;

        for (offset, &value) in matrix.window(window).iter().enumerate() {
            let bin = first_bin + offset;
            let level = gray_level(value);
            let (top, bottom) = geometry.cell_span(matrix.frequency_for_bin(bin), matrix.frequency_for_bin(bin + 1));

            run = match run {
                Some((run_level, run_top, run_bottom)) if run_level == level => {
                    Some((level, run_top.min(top), run_bottom.max(bottom)))
                }
                previous => {
                    if let Some(finished) = previous {
                        painted += paint_run(canvas, x, geometry.window_width, finished);
                    }
                    Some((level, top, bottom))
                }
            };
        }
        if let Some(finished) = run {
            painted += paint_run(canvas, x, geometry.window_width, finished);
        }
    }

    debug!("Painted {} cell runs over {} windows", painted, windows);
    painted
}

fn paint_run(canvas: &mut dyn Canvas, x: f64, width: f64, (level, top, bottom): (u8, f64, f64)) -> usize {
    if level == u8::MAX {
        return 0;
    }
    let rect = CellRect { x, y: top, width, height: bottom - top };
    canvas.fill_rect(rect, level as f64 / 255.0);
    1
}

/// Write through a hidden temporary file in the output's directory and
/// rename it into place, so a failed render never leaves a partial output
/// behind. The temporary file is removed when `write` fails.
pub(crate) fn write_atomically<F>(output: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let partial = tempfile::Builder::new()
        .prefix(".spectroprint-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| SpectroError::io(dir, e))?;
    write(partial.path())?;
    partial
        .persist(output)
        .map_err(|e| SpectroError::io(output, e.error))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::BinRange;

    /// Records draw calls instead of drawing.
    #[derive(Default)]
    pub(crate) struct RecordingCanvas {
        pub rects: Vec<(CellRect, f64)>,
        pub translucent: Vec<(CellRect, f64, f64)>,
        pub lines: Vec<((f64, f64), (f64, f64), f64)>,
        pub texts: Vec<(f64, f64, String, TextOrientation)>,
    }

    impl Canvas for RecordingCanvas {
        fn fill_rect(&mut self, rect: CellRect, level: f64) {
            self.rects.push((rect, level));
        }

        fn fill_rect_translucent(&mut self, rect: CellRect, level: f64, alpha: f64) {
            self.translucent.push((rect, level, alpha));
        }

        fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, _level: f64) {
            self.lines.push((from, to, width));
        }

        fn text(&mut self, x: f64, y: f64, _size: f64, text: &str, orientation: TextOrientation) {
            self.texts.push((x, y, text.to_string(), orientation));
        }

        fn text_extent(&self, text: &str, size: f64) -> (f64, f64) {
            (text.chars().count() as f64 * size * 0.5, size)
        }
    }

    pub(crate) fn test_geometry(total_windows: usize) -> PageGeometry {
        let settings = ResolvedSettings { writing_speed: 2.5, ..Default::default() };
        PageGeometry::compute(&settings, Device::Raster { dpi: 100 }, total_windows, 150.0, (10.0, 80.0))
    }

    #[test]
    fn test_equal_levels_are_merged() {
        let rows = vec![
            vec![0.0, 0.0, 0.0, 0.5, 1.0, 1.0, 0.0, 0.0],
            vec![0.2; 8],
        ];
        let matrix = SpectrogramMatrix::from_rows(&rows, BinRange { min: 10, max: 17 }, 64, 5.0);
        let geometry = test_geometry(2);
        let mut canvas = RecordingCanvas::default();

        let painted = paint_cells(&mut canvas, &matrix, &geometry);
        // Window 0: black run, mid-gray, (white skipped), black run. Window 1: one run.
        assert_eq!(painted, 4);
        assert_eq!(canvas.rects.len(), 4);
        assert_eq!(canvas.rects[0].1, 0.0);
        assert!((canvas.rects[1].1 - 128.0 / 255.0).abs() < 1e-12);
        assert!(canvas.rects.iter().all(|(rect, _)| rect.height >= geometry.min_cell_height));
        assert_eq!(canvas.rects[3].0.x, geometry.window_x(1));
    }

    #[test]
    fn test_only_visible_windows_are_painted() {
        let rows = vec![vec![0.0; 4]; 3];
        let matrix = SpectrogramMatrix::from_rows(&rows, BinRange { min: 1, max: 4 }, 16, 10.0);
        let mut geometry = test_geometry(3);
        geometry.visible_window_count = 2;
        let mut canvas = RecordingCanvas::default();
        assert_eq!(paint_cells(&mut canvas, &matrix, &geometry), 2);
    }

    #[test]
    fn test_cells_stay_inside_the_band() {
        // The top bin sits at the band's upper edge, as an outward-rounded
        // range or a full-spectrum reset produces.
        let rows = vec![vec![0.0, 0.3, 0.6, 0.0, 0.1, 0.0, 0.4, 0.0]; 2];
        let matrix = SpectrogramMatrix::from_rows(&rows, BinRange { min: 2, max: 9 }, 64, 10.0);
        for &device in &[Device::Raster { dpi: 100 }, Device::Vector { printer_dpi: 300 }] {
            let settings = ResolvedSettings::default();
            let geometry = PageGeometry::compute(&settings, device, 2, 150.0, (20.0, 90.0));
            let mut canvas = RecordingCanvas::default();
            paint_cells(&mut canvas, &matrix, &geometry);

            assert!(!canvas.rects.is_empty());
            for (rect, _) in &canvas.rects {
                assert!(rect.y >= geometry.spectro_top - 1e-9, "{:?} above band", rect);
                assert!(rect.y + rect.height <= geometry.spectro_bottom() + 1e-9, "{:?} below band", rect);
                assert!(rect.height > 0.0);
            }
        }
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("page.bin");
        let result = write_atomically(&output, |partial| {
            std::fs::write(partial, b"half").map_err(|e| SpectroError::io(partial, e))?;
            Err(SpectroError::render("encoder exploded"))
        });
        assert!(result.is_err());
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomically(&output, |partial| std::fs::write(partial, b"done").map_err(|e| SpectroError::io(partial, e)))
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"done");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
