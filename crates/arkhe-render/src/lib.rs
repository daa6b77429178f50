//! Projection and drawing for Arkhe(N) panels.
//!
//! Scenes turn a [`arkhe_core::Field`] into [`DrawCommand`]s against any
//! [`DrawingSurface`]. [`RasterSurface`] rasterises them in software for
//! headless runs and PNG snapshots.

mod painter;
pub mod projector;
mod raster;
pub mod scene;
mod surface;

pub use painter::DepthQueue;
pub use projector::{Projection, Projector, Rotation};
pub use raster::RasterSurface;
pub use scene::ScenePainter;
pub use surface::{
    Color, CompositeMode, DrawCommand, DrawingSurface, MAX_SURFACE_DIMENSION, RecordingSurface,
    SurfaceSize,
};
