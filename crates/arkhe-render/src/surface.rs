//! Drawing-surface abstraction and the command set scenes issue against it.

use arkhe_core::Bounds;
use serde::{Deserialize, Serialize};

/// Straight-alpha colour with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    #[must_use]
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn from_rgb(rgb: [f32; 3], alpha: f32) -> Self {
        Self::rgba(rgb[0], rgb[1], rgb[2], alpha)
    }

    /// Same colour with a different alpha, clamped into range.
    #[must_use]
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: if alpha.is_finite() {
                alpha.clamp(0.0, 1.0)
            } else {
                0.0
            },
            ..self
        }
    }

    #[must_use]
    pub fn to_rgba8(self) -> [u8; 4] {
        let channel = |value: f32| {
            if value.is_finite() {
                (value * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        };
        [
            channel(self.r),
            channel(self.g),
            channel(self.b),
            channel(self.a),
        ]
    }
}

/// How subsequent fills and strokes combine with existing pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    #[default]
    SourceOver,
    /// Additive blending used for glow.
    Lighter,
}

/// Largest width or height a raster surface lays out at.
pub const MAX_SURFACE_DIMENSION: u32 = 8_192;

/// Pixel dimensions of a surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Each axis capped at `limit`.
    #[must_use]
    pub fn clamped(self, limit: u32) -> Self {
        Self::new(self.width.min(limit), self.height.min(limit))
    }

    #[must_use]
    pub fn as_bounds(&self) -> Bounds {
        Bounds::new(self.width as f32, self.height as f32)
    }

    #[must_use]
    pub fn as_f32(&self) -> (f32, f32) {
        (self.width as f32, self.height as f32)
    }
}

/// One drawing instruction. Coordinates are in surface pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Replace every pixel with `color`.
    Clear { color: Color },
    /// Paint a translucent fill over the whole surface, leaving trails.
    Fade { color: Color },
    SetComposite { mode: CompositeMode },
    /// Filled disc with an optional soft halo `glow` radii wide.
    FillCircle {
        center: [f32; 2],
        radius: f32,
        color: Color,
        glow: f32,
    },
    StrokeLine {
        from: [f32; 2],
        to: [f32; 2],
        width: f32,
        color: Color,
    },
    StrokePolyline {
        points: Vec<[f32; 2]>,
        width: f32,
        color: Color,
        closed: bool,
    },
}

impl DrawCommand {
    /// Whether the command paints pixels, as opposed to changing state.
    #[must_use]
    pub const fn is_paint(&self) -> bool {
        !matches!(self, Self::SetComposite { .. })
    }
}

/// Something a controller can draw on.
///
/// The display size is what the host lays out; the backing size is the
/// pixel buffer actually drawn into. Controllers resize the backing to match
/// the display before drawing.
pub trait DrawingSurface {
    fn display_size(&self) -> SurfaceSize;
    fn backing_size(&self) -> SurfaceSize;
    fn resize_backing(&mut self, size: SurfaceSize);
    fn submit(&mut self, command: DrawCommand);
}

/// Surface that keeps every submitted command.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    display: SurfaceSize,
    backing: SurfaceSize,
    commands: Vec<DrawCommand>,
    backing_resizes: usize,
}

impl RecordingSurface {
    /// New surface with the given display size and an unsized backing.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            display: SurfaceSize::new(width, height),
            ..Self::default()
        }
    }

    /// Simulate the host laying the surface out at a new size.
    pub fn set_display_size(&mut self, width: u32, height: u32) {
        self.display = SurfaceSize::new(width, height);
    }

    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drain the command log.
    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    #[must_use]
    pub fn backing_resizes(&self) -> usize {
        self.backing_resizes
    }

    /// Count of recorded commands for which `predicate` holds.
    pub fn count_where(&self, predicate: impl Fn(&DrawCommand) -> bool) -> usize {
        self.commands
            .iter()
            .filter(|&command| predicate(command))
            .count()
    }
}

impl DrawingSurface for RecordingSurface {
    fn display_size(&self) -> SurfaceSize {
        self.display
    }

    fn backing_size(&self) -> SurfaceSize {
        self.backing
    }

    fn resize_backing(&mut self, size: SurfaceSize) {
        self.backing = size;
        self.backing_resizes += 1;
    }

    fn submit(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}
