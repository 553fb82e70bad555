use std::path::Path;

use image::{GrayImage, ImageError, ImageFormat, Luma};
use log::{debug, info};

use super::glyphs::{for_each_pixel, scale_for, GLYPH_SIZE};
use super::layout::{CellRect, Device};
use super::{annotation, paint_cells, write_atomically, Canvas, RenderJob, Renderer, TextOrientation};
use crate::error::{Result, SpectroError};
use crate::settings::{OutputKind, ResolvedSettings};

const WHITE: u8 = u8::MAX;

/// Grayscale page surface. Rectangles are snapped to whole pixels.
pub struct RasterCanvas {
    image: GrayImage,
}

impl RasterCanvas {
    /// A blank white page. Sizes come from `PageGeometry`, which rounds them.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([WHITE])),
        }
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Pixel bounds of `rect`, at least one pixel each way, clipped to the page.
    fn pixel_bounds(&self, rect: CellRect) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.x.round();
        let y0 = rect.y.round();
        let x1 = (rect.x + rect.width).round().max(x0 + 1.0);
        let y1 = (rect.y + rect.height).round().max(y0 + 1.0);

        let clip = |v: f64, limit: u32| v.clamp(0.0, limit as f64) as u32;
        let (width, height) = self.image.dimensions();
        let bounds = (clip(x0, width), clip(y0, height), clip(x1, width), clip(y1, height));
        (bounds.0 < bounds.2 && bounds.1 < bounds.3).then_some(bounds)
    }

    fn blend(&mut self, rect: CellRect, level: f64, alpha: f64) {
        let Some((x0, y0, x1, y1)) = self.pixel_bounds(rect) else {
            return;
        };
        let alpha = alpha.clamp(0.0, 1.0);
        let target = level.clamp(0.0, 1.0) * 255.0;
        for y in y0..y1 {
            for x in x0..x1 {
                let pixel = self.image.get_pixel_mut(x, y);
                let blended = pixel[0] as f64 * (1.0 - alpha) + target * alpha;
                pixel[0] = blended.round() as u8;
            }
        }
    }

    fn set_pixel(&mut self, x: i64, y: i64, value: u8) {
        let (width, height) = self.image.dimensions();
        if x >= 0 && y >= 0 && (x as u64) < width as u64 && (y as u64) < height as u64 {
            self.image.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
}

impl Canvas for RasterCanvas {
    fn fill_rect(&mut self, rect: CellRect, level: f64) {
        self.blend(rect, level, 1.0);
    }

    fn fill_rect_translucent(&mut self, rect: CellRect, level: f64, alpha: f64) {
        self.blend(rect, level, alpha);
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, level: f64) {
        let width = width.max(1.0);
        let half = width / 2.0;
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);

        // Axis-aligned lines are a single rectangle
        if dx == 0.0 || dy == 0.0 {
            let rect = CellRect {
                x: from.0.min(to.0) - if dx == 0.0 { half } else { 0.0 },
                y: from.1.min(to.1) - if dy == 0.0 { half } else { 0.0 },
                width: if dx == 0.0 { width } else { dx.abs() },
                height: if dy == 0.0 { width } else { dy.abs() },
            };
            self.fill_rect(rect, level);
            return;
        }

        let steps = dx.abs().max(dy.abs()).ceil() as usize;
        for step in 0..=steps {
            let t = step as f64 / steps as f64;
            let rect = CellRect {
                x: from.0 + dx * t - half,
                y: from.1 + dy * t - half,
                width,
                height: width,
            };
            self.fill_rect(rect, level);
        }
    }

    fn text(&mut self, x: f64, y: f64, size: f64, text: &str, orientation: TextOrientation) {
        let scale = scale_for(size) as i64;
        let (x, y) = (x.round() as i64, y.round() as i64);
        let mut lit = Vec::new();
        for_each_pixel(text, |column, row| lit.push((column as i64, row as i64)));

        for (column, row) in lit {
            for sy in 0..scale {
                for sx in 0..scale {
                    let (px, py) = match orientation {
                        TextOrientation::Horizontal => (x + column * scale + sx, y + row * scale + sy),
                        TextOrientation::Vertical => (x + row * scale + sy, y - 1 - column * scale - sx),
                    };
                    self.set_pixel(px, py, 0);
                }
            }
        }
    }

    fn text_extent(&self, text: &str, size: f64) -> (f64, f64) {
        let cell = (GLYPH_SIZE * scale_for(size)) as f64;
        (text.chars().count() as f64 * cell, cell)
    }
}

/// Separable box blur, horizontal pass then vertical.
///
/// Each output pixel is the mean of the pixels within `radius` along the pass
/// direction; near the edges only the pixels that exist are averaged.
pub fn box_blur(image: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let horizontal = blur_pass(image, radius, width, height, |x, y| (x, y));
    let transposed = |x: u32, y: u32| (y, x);
    // Vertical pass walks columns as if they were rows
    blur_pass(&horizontal, radius, height, width, transposed)
}

fn blur_pass<F>(source: &GrayImage, radius: u32, length: u32, lanes: u32, at: F) -> GrayImage
where
    F: Fn(u32, u32) -> (u32, u32),
{
    let (width, height) = source.dimensions();
    let mut out = GrayImage::new(width, height);
    let radius = radius as i64;
    for lane in 0..lanes {
        let mut prefix = Vec::with_capacity(length as usize + 1);
        prefix.push(0u64);
        for i in 0..length {
            let (x, y) = at(i, lane);
            let previous = prefix.last().copied().unwrap_or(0);
            prefix.push(previous + source.get_pixel(x, y)[0] as u64);
        }
        for i in 0..length as i64 {
            let lo = (i - radius).max(0) as usize;
            let hi = (i + radius).min(length as i64 - 1) as usize;
            let sum = prefix[hi + 1] - prefix[lo];
            let count = (hi - lo + 1) as u64;
            let (x, y) = at(i as u32, lane);
            out.put_pixel(x, y, Luma([((sum + count / 2) / count) as u8]));
        }
    }
    out
}

/// Draw the complete page (cells, blur, annotations) in memory.
pub fn render_page(job: &RenderJob<'_>) -> GrayImage {
    let geometry = job.geometry;
    let mut canvas = RasterCanvas::new(geometry.page_width as u32, geometry.page_height as u32);
    paint_cells(&mut canvas, job.matrix, geometry);

    if job.settings.blur_radius > 0 {
        debug!("Box blur radius {}", job.settings.blur_radius);
        canvas.image = box_blur(&canvas.image, job.settings.blur_radius);
    }

    annotation::annotate(&mut canvas, job);
    canvas.into_image()
}

/// PNG output at the printer DPI.
pub struct RasterRenderer;

impl Renderer for RasterRenderer {
    fn kind(&self) -> OutputKind {
        OutputKind::Raster
    }

    fn device(&self, settings: &ResolvedSettings) -> Device {
        Device::Raster { dpi: settings.printer_dpi }
    }

    fn render(&self, job: &RenderJob<'_>, output: &Path) -> Result<()> {
        let image = render_page(job);
        info!("Writing {}x{} PNG to {}", image.width(), image.height(), output.display());
        write_atomically(output, |partial| {
            image
                .save_with_format(partial, ImageFormat::Png)
                .map_err(|e| image_error(partial, e))
        })
    }
}

fn image_error(path: &Path, err: ImageError) -> SpectroError {
    match err {
        ImageError::IoError(io) => SpectroError::io(path, io),
        other => SpectroError::render(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_snap_to_pixels() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.fill_rect(CellRect { x: 1.4, y: 2.6, width: 2.2, height: 0.1 }, 0.0);
        let image = canvas.image();
        // x 1..4, y 3..4 (minimum one pixel tall)
        assert_eq!(image.get_pixel(1, 3)[0], 0);
        assert_eq!(image.get_pixel(3, 3)[0], 0);
        assert_eq!(image.get_pixel(4, 3)[0], WHITE);
        assert_eq!(image.get_pixel(1, 4)[0], WHITE);
    }

    #[test]
    fn test_out_of_page_rects_are_clipped() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.fill_rect(CellRect { x: -10.0, y: -10.0, width: 12.0, height: 12.0 }, 0.0);
        canvas.fill_rect(CellRect { x: 50.0, y: 50.0, width: 2.0, height: 2.0 }, 0.0);
        assert_eq!(canvas.image().get_pixel(1, 1)[0], 0);
        assert_eq!(canvas.image().get_pixel(2, 2)[0], WHITE);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let mut canvas = RasterCanvas::new(2, 1);
        canvas.fill_rect(CellRect { x: 0.0, y: 0.0, width: 2.0, height: 1.0 }, 0.0);
        canvas.fill_rect_translucent(CellRect { x: 0.0, y: 0.0, width: 1.0, height: 1.0 }, 1.0, 0.85);
        assert_eq!(canvas.image().get_pixel(0, 0)[0], 217);
        assert_eq!(canvas.image().get_pixel(1, 0)[0], 0);
    }

    #[test]
    fn test_horizontal_line_thickness() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.line((0.0, 5.0), (10.0, 5.0), 2.0, 0.0);
        let image = canvas.image();
        assert_eq!(image.get_pixel(5, 4)[0], 0);
        assert_eq!(image.get_pixel(5, 5)[0], 0);
        assert_eq!(image.get_pixel(5, 6)[0], WHITE);
    }

    #[test]
    fn test_text_draws_inside_its_extent() {
        let mut canvas = RasterCanvas::new(64, 64);
        canvas.text(4.0, 4.0, 16.0, "Hz", TextOrientation::Horizontal);
        let (w, h) = canvas.text_extent("Hz", 16.0);
        assert_eq!((w, h), (32.0, 16.0));
        let dark: Vec<(u32, u32)> = canvas
            .image()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!dark.is_empty());
        assert!(dark.iter().all(|&(x, y)| x >= 4 && x < 36 && y >= 4 && y < 20));
    }

    #[test]
    fn test_vertical_text_runs_upward() {
        let mut canvas = RasterCanvas::new(64, 64);
        canvas.text(10.0, 50.0, 8.0, "HHHH", TextOrientation::Vertical);
        let dark: Vec<(u32, u32)> = canvas
            .image()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(dark.iter().all(|&(x, y)| x >= 10 && x < 18 && y < 50 && y >= 18));
    }

    #[test]
    fn test_box_blur_averages_with_clamped_edges() {
        let mut image = GrayImage::from_pixel(5, 1, Luma([0]));
        image.put_pixel(0, 0, Luma([90]));
        let blurred = box_blur(&image, 1);
        // Edge pixel averages itself and one neighbour
        assert_eq!(blurred.get_pixel(0, 0)[0], 45);
        assert_eq!(blurred.get_pixel(1, 0)[0], 30);
        assert_eq!(blurred.get_pixel(2, 0)[0], 0);
    }

    #[test]
    fn test_box_blur_keeps_flat_images_flat() {
        let image = GrayImage::from_pixel(7, 5, Luma([123]));
        let blurred = box_blur(&image, 3);
        assert!(blurred.pixels().all(|p| p[0] == 123));
        assert_eq!(box_blur(&image, 0), image);
    }
}
