//! Software rasteriser backing headless runs and PNG snapshots.

use std::io::Cursor;

use image::error::{ParameterError, ParameterErrorKind};
use image::{ImageBuffer, ImageError, ImageFormat, ImageResult, Rgba};

use tracing::warn;

use crate::surface::{
    Color, CompositeMode, DrawCommand, DrawingSurface, MAX_SURFACE_DIMENSION, SurfaceSize,
};

/// Alpha of the outer edge of a glow halo relative to the core.
const HALO_ALPHA: f32 = 0.45;

/// Float RGBA pixel buffer implementing [`DrawingSurface`].
#[derive(Debug, Clone)]
pub struct RasterSurface {
    display: SurfaceSize,
    backing: SurfaceSize,
    pixels: Vec<[f32; 4]>,
    composite: CompositeMode,
    commands: u64,
}

impl RasterSurface {
    /// Surface laid out at `width`x`height`, each axis capped at
    /// [`MAX_SURFACE_DIMENSION`]. The pixel buffer is allocated on the first
    /// [`DrawingSurface::resize_backing`].
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            display: capped(SurfaceSize::new(width, height)),
            backing: SurfaceSize::default(),
            pixels: Vec::new(),
            composite: CompositeMode::SourceOver,
            commands: 0,
        }
    }

    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.display = capped(SurfaceSize::new(width, height));
    }

    /// Commands applied since creation.
    #[must_use]
    pub fn commands_applied(&self) -> u64 {
        self.commands
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.backing.width || y >= self.backing.height {
            return None;
        }
        let [r, g, b, a] = self.pixels[self.index(x, y)];
        Some(Color::rgba(r, g, b, a))
    }

    /// Pixels whose brightest channel exceeds `threshold`.
    #[must_use]
    pub fn lit_pixels(&self, threshold: f32) -> usize {
        self.pixels
            .iter()
            .filter(|[r, g, b, _]| r.max(*g).max(*b) > threshold)
            .count()
    }

    /// Encode the backing buffer as PNG bytes.
    pub fn to_png(&self) -> ImageResult<Vec<u8>> {
        if self.backing.is_empty() {
            return Err(ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            )));
        }
        let (width, height) = (self.backing.width, self.backing.height);
        let mut image = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(width, height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let [r, g, b, a] = self.pixels[self.index(x, y)];
            *pixel = Rgba(Color::rgba(r, g, b, a).to_rgba8());
        }
        let mut bytes = Vec::new();
        {
            let mut cursor = Cursor::new(&mut bytes);
            image.write_to(&mut cursor, ImageFormat::Png)?;
        }
        Ok(bytes)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.backing.width as usize) + x as usize
    }

    fn blend(&mut self, x: u32, y: u32, color: Color, coverage: f32, mode: CompositeMode) {
        let alpha = (color.a * coverage).clamp(0.0, 1.0);
        if alpha <= 0.0 || !alpha.is_finite() {
            return;
        }
        let index = self.index(x, y);
        let dst = &mut self.pixels[index];
        let src = [color.r, color.g, color.b];
        match mode {
            CompositeMode::SourceOver => {
                for channel in 0..3 {
                    dst[channel] = src[channel] * alpha + dst[channel] * (1.0 - alpha);
                }
                dst[3] = alpha + dst[3] * (1.0 - alpha);
            }
            CompositeMode::Lighter => {
                for channel in 0..3 {
                    dst[channel] = (dst[channel] + src[channel] * alpha).min(1.0);
                }
                dst[3] = (dst[3] + alpha).min(1.0);
            }
        }
    }

    fn fill_all(&mut self, color: Color) {
        for y in 0..self.backing.height {
            for x in 0..self.backing.width {
                self.blend(x, y, color, 1.0, CompositeMode::SourceOver);
            }
        }
    }

    /// Disc with a one-pixel soft edge, or a quadratic falloff when `halo`.
    fn disc(&mut self, center: [f32; 2], radius: f32, color: Color, halo: bool) {
        if !(center[0].is_finite() && center[1].is_finite() && radius.is_finite()) || radius <= 0.0
        {
            return;
        }
        let (w, h) = (self.backing.width as f32, self.backing.height as f32);
        let reach = radius + 1.0;
        let min_x = (center[0] - reach).floor().max(0.0);
        let max_x = (center[0] + reach).ceil().min(w);
        let min_y = (center[1] - reach).floor().max(0.0);
        let max_y = (center[1] + reach).ceil().min(h);
        if min_x >= max_x || min_y >= max_y {
            return;
        }
        let mode = self.composite;
        for py in min_y as u32..max_y as u32 {
            for px in min_x as u32..max_x as u32 {
                let dx = px as f32 + 0.5 - center[0];
                let dy = py as f32 + 0.5 - center[1];
                let distance = (dx * dx + dy * dy).sqrt();
                let coverage = if halo {
                    let falloff = (1.0 - distance / radius).max(0.0);
                    falloff * falloff * HALO_ALPHA
                } else {
                    (radius + 0.5 - distance).clamp(0.0, 1.0)
                };
                if coverage > 0.0 {
                    self.blend(px, py, color, coverage, mode);
                }
            }
        }
    }

    fn line(&mut self, from: [f32; 2], to: [f32; 2], width: f32, color: Color) {
        let half = (width * 0.5).max(0.5);
        let Some((from, to)) = clip_segment(from, to, self.backing, half + 1.0) else {
            return;
        };
        let dx = to[0] - from[0];
        let dy = to[1] - from[1];
        let length = (dx * dx + dy * dy).sqrt();
        let steps = (length / 0.75).ceil().max(1.0) as u32;
        // Stamps overlap; thin them so the stroke keeps roughly its alpha.
        let stamp = color.with_alpha(color.a / (1.0 + half).min(2.0));
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            self.disc([from[0] + dx * t, from[1] + dy * t], half, stamp, false);
        }
    }

    fn apply(&mut self, command: DrawCommand) {
        match command {
            DrawCommand::Clear { color } => {
                let fill = [color.r, color.g, color.b, color.a];
                self.pixels.iter_mut().for_each(|pixel| *pixel = fill);
            }
            DrawCommand::Fade { color } => self.fill_all(color),
            DrawCommand::SetComposite { mode } => self.composite = mode,
            DrawCommand::FillCircle {
                center,
                radius,
                color,
                glow,
            } => {
                if glow > 0.0 && glow.is_finite() {
                    self.disc(center, radius * (1.0 + glow), color, true);
                }
                self.disc(center, radius, color, false);
            }
            DrawCommand::StrokeLine {
                from,
                to,
                width,
                color,
            } => self.line(from, to, width, color),
            DrawCommand::StrokePolyline {
                points,
                width,
                color,
                closed,
            } => {
                for pair in points.windows(2) {
                    self.line(pair[0], pair[1], width, color);
                }
                if closed
                    && points.len() > 2
                    && let (Some(&last), Some(&first)) = (points.last(), points.first())
                {
                    self.line(last, first, width, color);
                }
            }
        }
    }
}

fn capped(size: SurfaceSize) -> SurfaceSize {
    let clamped = size.clamped(MAX_SURFACE_DIMENSION);
    if clamped != size {
        warn!(
            width = size.width,
            height = size.height,
            limit = MAX_SURFACE_DIMENSION,
            "Raster surface size capped",
        );
    }
    clamped
}

impl DrawingSurface for RasterSurface {
    fn display_size(&self) -> SurfaceSize {
        self.display
    }

    fn backing_size(&self) -> SurfaceSize {
        self.backing
    }

    fn resize_backing(&mut self, size: SurfaceSize) {
        let size = capped(size);
        self.backing = size;
        self.pixels = vec![[0.0; 4]; size.width as usize * size.height as usize];
    }

    fn submit(&mut self, command: DrawCommand) {
        self.commands += 1;
        if self.backing.is_empty() {
            return;
        }
        self.apply(command);
    }
}

/// Liang-Barsky clip of a segment against the surface grown by `margin`.
/// Runs in `f64` so far-off endpoints keep their on-surface precision.
fn clip_segment(
    from: [f32; 2],
    to: [f32; 2],
    size: SurfaceSize,
    margin: f32,
) -> Option<([f32; 2], [f32; 2])> {
    if !from.iter().chain(to.iter()).all(|v| v.is_finite()) {
        return None;
    }
    let margin = f64::from(margin);
    let (x0, y0) = (f64::from(from[0]), f64::from(from[1]));
    let dx = f64::from(to[0]) - x0;
    let dy = f64::from(to[1]) - y0;
    let max_x = f64::from(size.width) + margin;
    let max_y = f64::from(size.height) + margin;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [
        (-dx, x0 + margin),
        (dx, max_x - x0),
        (-dy, y0 + margin),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let point = |t: f64| [(x0 + dx * t) as f32, (y0 + dy * t) as f32];
    Some((point(t0), point(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(width: u32, height: u32) -> RasterSurface {
        let mut surface = RasterSurface::new(width, height);
        surface.resize_backing(surface.display_size());
        surface
    }

    #[test]
    fn oversized_layout_is_capped_per_axis() {
        let mut surface = RasterSurface::new(70_000, 12);
        assert_eq!(
            surface.display_size(),
            SurfaceSize::new(MAX_SURFACE_DIMENSION, 12)
        );
        surface.set_display_size(3, u32::MAX);
        assert_eq!(
            surface.display_size(),
            SurfaceSize::new(3, MAX_SURFACE_DIMENSION)
        );
        surface.resize_backing(SurfaceSize::new(u32::MAX, 2));
        assert_eq!(
            surface.backing_size(),
            SurfaceSize::new(MAX_SURFACE_DIMENSION, 2)
        );
        assert!(surface.pixel(MAX_SURFACE_DIMENSION - 1, 1).is_some());
        assert!(surface.pixel(MAX_SURFACE_DIMENSION, 1).is_none());
    }

    #[test]
    fn commands_before_backing_are_ignored() {
        let mut surface = RasterSurface::new(16, 16);
        surface.submit(DrawCommand::Clear {
            color: Color::BLACK,
        });
        assert_eq!(surface.commands_applied(), 1);
        assert!(surface.pixel(0, 0).is_none());
        assert!(surface.to_png().is_err());
    }

    #[test]
    fn lighter_composite_adds_and_saturates() {
        let mut surface = sized(4, 4);
        surface.submit(DrawCommand::SetComposite {
            mode: CompositeMode::Lighter,
        });
        let red = Color::rgba(0.6, 0.0, 0.0, 1.0);
        for _ in 0..2 {
            surface.submit(DrawCommand::FillCircle {
                center: [2.0, 2.0],
                radius: 3.0,
                color: red,
                glow: 0.0,
            });
        }
        let pixel = surface.pixel(2, 2).expect("inside");
        assert!((pixel.r - 1.0).abs() < 1e-6);
        assert_eq!(pixel.g, 0.0);
    }

    #[test]
    fn fade_darkens_toward_background() {
        let mut surface = sized(2, 2);
        surface.submit(DrawCommand::Clear {
            color: Color::rgba(1.0, 1.0, 1.0, 1.0),
        });
        surface.submit(DrawCommand::Fade {
            color: Color::BLACK.with_alpha(0.5),
        });
        let pixel = surface.pixel(1, 1).expect("inside");
        assert!((pixel.r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn line_far_outside_surface_is_clipped() {
        let mut surface = sized(8, 8);
        surface.submit(DrawCommand::StrokeLine {
            from: [-1.0e9, 4.0],
            to: [1.0e9, 4.0],
            width: 1.0,
            color: Color::rgba(1.0, 1.0, 1.0, 1.0),
        });
        assert!(surface.lit_pixels(0.1) >= 8);
        assert!(clip_segment([-5.0, -5.0], [-1.0, -9.0], surface.backing_size(), 1.0).is_none());
    }
}
