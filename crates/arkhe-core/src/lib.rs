//! Core types shared across the Arkhe(N) canvas workspace.
//!
//! A [`Field`] owns the simulated entities of one drawing surface and advances
//! them a fixed time step per frame. Rendering lives in `arkhe-render`; frame
//! scheduling and lifecycle live in `arkhe-app`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;
mod field;
pub mod forces;

pub use config::{
    EngineConfig, EngineConfigBuilder, FieldMode, ForceTuning, ProjectionSettings, ViewKind,
    DEFAULT_PALETTE, MAX_ENTITIES,
};
pub use field::Field;
pub use forces::ForceCoefficients;

/// Errors raised when constructing or loading engine configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Configuration text could not be decoded.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Position in surface space. `z` is a depth coordinate used by perspective
/// views and stays zero for planar ones.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// Construct a planar position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Construct a position with depth.
    #[must_use]
    pub const fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Per-frame displacement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

impl Velocity {
    /// Construct a planar velocity vector.
    #[must_use]
    pub const fn new(vx: f32, vy: f32) -> Self {
        Self { vx, vy, vz: 0.0 }
    }

    /// Euclidean magnitude across all three axes.
    #[must_use]
    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy + self.vz * self.vz).sqrt()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.vz.is_finite()
    }
}

/// Extent of the surface an entity field lives on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Zero-area or non-finite bounds cannot host entities.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    /// Half-extent of the depth axis used by perspective views.
    #[must_use]
    pub fn depth(&self) -> f32 {
        self.width.min(self.height) * 0.5
    }

    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(self.width * 0.5, self.height * 0.5)
    }

    /// Whether a position lies in `[0, width) x [0, height)`.
    #[must_use]
    pub fn contains(&self, position: &Position) -> bool {
        position.x >= 0.0
            && position.x < self.width
            && position.y >= 0.0
            && position.y < self.height
    }
}

/// Visual attributes carried by an entity. Glow magnitude at draw time is
/// derived from motion or activation; `glow_gain` only scales it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VisualAttributes {
    /// Index into the configured palette.
    pub category: u8,
    pub radius: f32,
    pub glow_gain: f32,
}

impl Default for VisualAttributes {
    fn default() -> Self {
        Self {
            category: 0,
            radius: 1.5,
            glow_gain: 1.0,
        }
    }
}

/// One simulated particle, wave sample, or lattice node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub position: Position,
    pub velocity: Velocity,
    pub visual: VisualAttributes,
    /// Phase offset for periodic motion, in radians.
    pub phase: f32,
    /// Optional modulation weight in `[0, 1]`.
    pub activation: Option<f32>,
}

impl Entity {
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.velocity.speed()
    }

    /// Glow magnitude for the current frame: activation when present,
    /// otherwise speed normalised by `max_speed`.
    #[must_use]
    pub fn glow(&self, max_speed: f32) -> f32 {
        let drive = match self.activation {
            Some(weight) => weight,
            None if max_speed > f32::EPSILON => self.speed() / max_speed,
            None => 0.0,
        };
        let glow = self.visual.glow_gain * drive.clamp(0.0, 1.0);
        if glow.is_finite() { glow.max(0.0) } else { 0.0 }
    }
}

/// Monotonic per-controller clock advanced by a fixed step each frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeAccumulator {
    value: f64,
    step: f64,
}

impl TimeAccumulator {
    /// Starts a clock at zero. Non-positive or non-finite steps fall back to
    /// the default frame step.
    #[must_use]
    pub fn new(step: f64) -> Self {
        let step = if step.is_finite() && step > 0.0 {
            step
        } else {
            EngineConfig::DEFAULT_TIME_STEP
        };
        Self { value: 0.0, step }
    }

    /// Advances by one step, returning the new value. Always strictly greater
    /// than the previous value.
    pub fn advance(&mut self) -> f64 {
        let next = self.value + self.step;
        self.value = if next > self.value {
            next
        } else {
            // Step fell below the spacing of representable values.
            f64::from_bits(self.value.to_bits() + 1)
        };
        self.value
    }

    /// Same elapsed time, different increment for subsequent frames.
    #[must_use]
    pub fn with_step(self, step: f64) -> Self {
        Self {
            value: self.value,
            ..Self::new(step)
        }
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub const fn step(&self) -> f64 {
        self.step
    }

    /// Time folded modulo `1000·τ` into single precision. Only continuous
    /// across the fold for rates that are multiples of `0.001`; use
    /// [`Self::angle`] for arbitrary rates.
    #[must_use]
    pub fn phase(&self) -> f32 {
        (self.value % (std::f64::consts::TAU * 1_000.0)) as f32
    }

    /// `rate · time` folded into `[0, τ)`.
    #[must_use]
    pub fn angle(&self, rate: f32) -> f32 {
        fold_angle(rate, self.value)
    }
}

/// `rate · time` reduced modulo `τ` in double precision, so the result stays
/// continuous however large `time` grows.
#[must_use]
pub fn fold_angle(rate: f32, time: f64) -> f32 {
    let angle = (f64::from(rate) * time).rem_euclid(std::f64::consts::TAU) as f32;
    // Narrowing can round up to exactly τ.
    if angle.is_finite() && angle < std::f32::consts::TAU {
        angle
    } else {
        0.0
    }
}

impl Default for TimeAccumulator {
    fn default() -> Self {
        Self::new(EngineConfig::DEFAULT_TIME_STEP)
    }
}

/// Read-only snapshot of host domain state, consulted at the start of each
/// frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DomainParams {
    /// Coherence ratio in `[0, 1]`.
    pub coherence: f32,
    /// Fluctuation ratio in `[0, 1]`.
    pub fluctuation: f32,
    /// Force model override. `None` runs the mode from [`EngineConfig`].
    pub mode: Option<FieldMode>,
    /// Toggles the view's alternate rendering branch.
    pub alternate: bool,
}

impl Default for DomainParams {
    fn default() -> Self {
        Self {
            coherence: 0.5,
            fluctuation: 0.2,
            mode: None,
            alternate: false,
        }
    }
}

impl DomainParams {
    /// Clamp ratios into `[0, 1]`, replacing non-finite values with defaults.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let clamp_ratio = |value: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                fallback
            }
        };
        Self {
            coherence: clamp_ratio(self.coherence, defaults.coherence),
            fluctuation: clamp_ratio(self.fluctuation, defaults.fluctuation),
            ..self
        }
    }

    /// Same parameters, overriding the configured field mode.
    #[must_use]
    pub fn with_mode(self, mode: FieldMode) -> Self {
        Self {
            mode: Some(mode),
            ..self
        }
    }

    /// The mode these parameters select when the config names `configured`.
    #[must_use]
    pub fn mode_or(&self, configured: FieldMode) -> FieldMode {
        self.mode.unwrap_or(configured)
    }
}
