//! Per-entity motion primitives: force terms, damping, integration, and the
//! toroidal boundary wrap.

use std::f32::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Bounds, DomainParams, Entity, FieldMode, ForceTuning, Position, Velocity};

/// Below this distance from the focal point radial forces are not applied.
const FOCUS_DEADZONE: f32 = 1.0;

/// Coefficients for one frame, derived from tuning and the domain snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForceCoefficients {
    pub mode: FieldMode,
    pub attraction: f32,
    pub swirl: f32,
    pub damping: f32,
    pub jitter: f32,
    pub wave_amplitude: f32,
    pub wave_frequency: f32,
    pub stiffness: f32,
    pub max_speed: f32,
}

impl ForceCoefficients {
    /// Scale the base tuning by the sanitised domain parameters. The
    /// parameters' mode wins over `configured` when set.
    #[must_use]
    pub fn derive(tuning: &ForceTuning, params: &DomainParams, configured: FieldMode) -> Self {
        let params = params.sanitized();
        Self {
            mode: params.mode_or(configured),
            attraction: tuning.attraction * (0.25 + params.coherence),
            swirl: tuning.swirl * (1.0 + params.fluctuation),
            damping: tuning.damping,
            jitter: tuning.jitter * params.fluctuation,
            wave_amplitude: tuning.wave_amplitude * (0.3 + 0.7 * params.coherence),
            wave_frequency: tuning.wave_frequency,
            stiffness: tuning.stiffness,
            max_speed: tuning.max_speed,
        }
    }
}

/// Height of the travelling wave at horizontal position `x`.
///
/// `band` shifts phase and speed so stacked bands interfere.
#[must_use]
pub fn wave_height(
    x: f32,
    bounds: &Bounds,
    time: f32,
    coefficients: &ForceCoefficients,
    band: u32,
) -> f32 {
    let band = band as f32;
    let normalized = if bounds.width > 0.0 {
        x / bounds.width
    } else {
        0.0
    };
    let amplitude = coefficients.wave_amplitude * bounds.height * (1.0 - band * 0.22).max(0.1);
    let angle = normalized * coefficients.wave_frequency * TAU
        + time * (1.0 + band * 0.35)
        + band * 1.3;
    bounds.height * 0.5 + amplitude * angle.sin()
}

/// Accumulate the mode's acceleration into the entity's velocity.
pub fn apply_forces<R: Rng + ?Sized>(
    entity: &mut Entity,
    coefficients: &ForceCoefficients,
    bounds: &Bounds,
    time: f32,
    rng: &mut R,
) {
    let focus = bounds.center();
    let dx = focus.x - entity.position.x;
    let dy = focus.y - entity.position.y;
    let distance = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = if distance > FOCUS_DEADZONE {
        (dx / distance, dy / distance)
    } else {
        (0.0, 0.0)
    };

    let mut ax = 0.0;
    let mut ay = 0.0;
    let mut az = 0.0;
    match coefficients.mode {
        FieldMode::Ambient => {
            ax += (time * 0.7 + entity.phase).sin() * 0.01;
            ay += (time * 0.5 + entity.phase).cos() * 0.01;
        }
        FieldMode::Converge => {
            ax += ux * coefficients.attraction - uy * coefficients.swirl * 0.25;
            ay += uy * coefficients.attraction + ux * coefficients.swirl * 0.25;
        }
        FieldMode::Vortex => {
            ax += -uy * coefficients.swirl + ux * coefficients.attraction * 0.2;
            ay += ux * coefficients.swirl + uy * coefficients.attraction * 0.2;
        }
        FieldMode::Scatter => {
            ax -= ux * coefficients.attraction;
            ay -= uy * coefficients.attraction;
        }
        FieldMode::Resonance => {
            let band = (entity.visual.category % 3) as u32;
            let target = wave_height(entity.position.x, bounds, time, coefficients, band);
            ay += (target - entity.position.y) * coefficients.stiffness;
            ax += coefficients.max_speed * 0.02;
        }
    }

    // Depth relaxes toward a slow oscillation so 3D views breathe.
    let depth_target = (time * 0.4 + entity.phase).sin() * bounds.depth() * 0.5;
    az += (depth_target - entity.position.z) * 0.002;

    if coefficients.jitter > 0.0 {
        ax += rng.gen_range(-1.0_f32..=1.0) * coefficients.jitter;
        ay += rng.gen_range(-1.0_f32..=1.0) * coefficients.jitter;
        az += rng.gen_range(-1.0_f32..=1.0) * coefficients.jitter * 0.5;
    }

    entity.velocity.vx += ax;
    entity.velocity.vy += ay;
    entity.velocity.vz += az;
}

/// Damp velocity multiplicatively, cap speed, then move the entity.
pub fn integrate(entity: &mut Entity, damping: f32, max_speed: f32) {
    let velocity = &mut entity.velocity;
    velocity.vx *= damping;
    velocity.vy *= damping;
    velocity.vz *= damping;

    let speed = velocity.speed();
    if speed > max_speed && speed.is_finite() {
        let scale = max_speed / speed;
        velocity.vx *= scale;
        velocity.vy *= scale;
        velocity.vz *= scale;
    }

    entity.position.x += velocity.vx;
    entity.position.y += velocity.vy;
    entity.position.z += velocity.vz;
}

/// Fold `value` into `[0, extent)`.
#[must_use]
pub fn wrap_position(value: f32, extent: f32) -> f32 {
    if extent <= 0.0 || !value.is_finite() {
        return 0.0;
    }
    let mut v = value % extent;
    if v < 0.0 {
        v += extent;
    }
    // `-tiny + extent` rounds to `extent`.
    if v >= extent { 0.0 } else { v }
}

/// Toroidal wrap on x/y and a wrap of depth into `[-depth, depth)`.
pub fn wrap_entity(entity: &mut Entity, bounds: &Bounds) {
    entity.position.x = wrap_position(entity.position.x, bounds.width);
    entity.position.y = wrap_position(entity.position.y, bounds.height);
    let depth = bounds.depth();
    if depth > 0.0 {
        entity.position.z = wrap_position(entity.position.z + depth, depth * 2.0) - depth;
    } else {
        entity.position.z = 0.0;
    }
}

/// Random placement inside `bounds` with a small initial velocity.
pub fn spawn_position<R: Rng + ?Sized>(rng: &mut R, bounds: &Bounds) -> (Position, Velocity) {
    let depth = bounds.depth();
    let position = Position::with_depth(
        rng.gen_range(0.0..bounds.width),
        rng.gen_range(0.0..bounds.height),
        if depth > 0.0 {
            rng.gen_range(-depth..depth)
        } else {
            0.0
        },
    );
    let angle = rng.gen_range(0.0..TAU);
    let speed = rng.gen_range(0.05_f32..0.6);
    let velocity = Velocity {
        vx: angle.cos() * speed,
        vy: angle.sin() * speed,
        vz: 0.0,
    };
    (position, velocity)
}
