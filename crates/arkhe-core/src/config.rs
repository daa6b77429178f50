use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Upper bound on entities per field.
pub const MAX_ENTITIES: usize = 20_000;

/// Cyan / violet / amber / rose palette shared by the dashboard panels.
pub const DEFAULT_PALETTE: [[f32; 3]; 4] = [
    [0.30, 0.85, 1.00],
    [0.62, 0.45, 1.00],
    [1.00, 0.78, 0.30],
    [1.00, 0.42, 0.62],
];

/// Scene drawn by a controller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    ParticleField,
    Waves,
    Torus,
    Radar,
    Lattice,
}

impl ViewKind {
    pub const ALL: [ViewKind; 5] = [
        ViewKind::ParticleField,
        ViewKind::Waves,
        ViewKind::Torus,
        ViewKind::Radar,
        ViewKind::Lattice,
    ];

    /// Whether the view routes coordinates through the perspective projector.
    #[must_use]
    pub const fn is_perspective(self) -> bool {
        matches!(self, ViewKind::Torus | ViewKind::Radar | ViewKind::Lattice)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ViewKind::ParticleField => "particle_field",
            ViewKind::Waves => "waves",
            ViewKind::Torus => "torus",
            ViewKind::Radar => "radar",
            ViewKind::Lattice => "lattice",
        }
    }
}

/// Force model applied to every entity each frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    /// Gentle drift with random jitter.
    #[default]
    Ambient,
    /// Centripetal attraction toward the focal point.
    Converge,
    /// Tangential swirl around the focal point.
    Vortex,
    /// Repulsion away from the focal point.
    Scatter,
    /// Spring toward a travelling sine wave.
    Resonance,
}

/// Base coefficients scaled by the live domain parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForceTuning {
    /// Centripetal acceleration at full coherence.
    pub attraction: f32,
    /// Tangential acceleration at zero fluctuation.
    pub swirl: f32,
    /// Multiplicative velocity damping per frame, in `(0, 1]`.
    pub damping: f32,
    /// Random acceleration at full fluctuation.
    pub jitter: f32,
    /// Wave amplitude as a fraction of surface height.
    pub wave_amplitude: f32,
    /// Wave cycles across the surface width.
    pub wave_frequency: f32,
    /// Spring constant pulling samples onto the wave.
    pub stiffness: f32,
    /// Speed cap in surface units per frame.
    pub max_speed: f32,
}

impl Default for ForceTuning {
    fn default() -> Self {
        Self {
            attraction: 0.08,
            swirl: 0.06,
            damping: 0.97,
            jitter: 0.12,
            wave_amplitude: 0.22,
            wave_frequency: 2.0,
            stiffness: 0.02,
            max_speed: 4.0,
        }
    }
}

/// Perspective camera and auto-rotation for 3D views.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectionSettings {
    /// Focal length in surface units.
    pub fov: f32,
    /// Camera distance added to every rotated depth.
    pub distance: f32,
    /// Base (pitch, yaw, roll) in radians.
    pub tilt: [f32; 3],
    /// Auto-rotation rates in radians per time unit.
    pub rotation_rates: [f32; 3],
    /// Upper bound on the perspective scale factor.
    pub max_scale: f32,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            fov: 500.0,
            distance: 400.0,
            tilt: [0.45, 0.0, 0.0],
            rotation_rates: [0.0, 0.35, 0.0],
            max_scale: 6.0,
        }
    }
}

/// Declarative description of one animated panel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub view: ViewKind,
    /// Number of simulated entities seeded on every resize.
    pub entity_count: usize,
    /// Force model, unless the domain parameters override it.
    pub mode: FieldMode,
    pub forces: ForceTuning,
    /// RGB palette entities draw their colours from.
    pub palette: Vec<[f32; 3]>,
    pub background: [f32; 3],
    /// Low-alpha background fill leaving motion trails; `None` clears fully.
    pub trail_fade: Option<f32>,
    /// Perspective settings; required by 3D views.
    pub projection: Option<ProjectionSettings>,
    /// Time accumulator increment per frame.
    pub time_step: f64,
    /// Optional RNG seed for reproducible fields.
    pub rng_seed: Option<u64>,
    /// Whether entities carry an activation weight.
    pub activation: bool,
    /// Maximum distance for proximity links.
    pub link_radius: f32,
    /// Entity radius range in surface units.
    pub radius_range: [f32; 2],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            view: ViewKind::ParticleField,
            entity_count: 200,
            mode: FieldMode::Ambient,
            forces: ForceTuning::default(),
            palette: DEFAULT_PALETTE.to_vec(),
            background: [0.02, 0.03, 0.06],
            trail_fade: Some(0.18),
            projection: None,
            time_step: Self::DEFAULT_TIME_STEP,
            rng_seed: None,
            activation: false,
            link_radius: 60.0,
            radius_range: [0.8, 2.4],
        }
    }
}

impl EngineConfig {
    /// Fixed per-frame time increment (one 60 Hz frame).
    pub const DEFAULT_TIME_STEP: f64 = 1.0 / 60.0;

    /// Preset matching how each dashboard panel configures its view.
    #[must_use]
    pub fn for_view(view: ViewKind) -> Self {
        let base = Self {
            view,
            ..Self::default()
        };
        match view {
            ViewKind::ParticleField => base,
            ViewKind::Waves => Self {
                entity_count: 160,
                mode: FieldMode::Resonance,
                trail_fade: Some(0.25),
                ..base
            },
            ViewKind::Torus => Self {
                entity_count: 180,
                mode: FieldMode::Vortex,
                trail_fade: None,
                projection: Some(ProjectionSettings::default()),
                ..base
            },
            ViewKind::Radar => Self {
                entity_count: 48,
                mode: FieldMode::Ambient,
                trail_fade: Some(0.12),
                activation: true,
                projection: Some(ProjectionSettings {
                    tilt: [1.05, 0.0, 0.0],
                    rotation_rates: [0.0, 0.0, 0.08],
                    ..ProjectionSettings::default()
                }),
                ..base
            },
            ViewKind::Lattice => Self {
                entity_count: 96,
                mode: FieldMode::Converge,
                trail_fade: None,
                activation: true,
                link_radius: 140.0,
                projection: Some(ProjectionSettings {
                    tilt: [0.6, 0.0, 0.0],
                    rotation_rates: [0.0, 0.22, 0.0],
                    ..ProjectionSettings::default()
                }),
                ..base
            },
        }
    }

    /// Starts a builder from the view's preset.
    #[must_use]
    pub fn builder(view: ViewKind) -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::for_view(view),
        }
    }

    /// Decode a JSON configuration and validate it.
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the field cannot simulate.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.entity_count > MAX_ENTITIES {
            return Err(EngineError::InvalidConfig(
                "entity_count exceeds the supported maximum",
            ));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(EngineError::InvalidConfig(
                "time_step must be positive and finite",
            ));
        }
        if self.palette.is_empty() {
            return Err(EngineError::InvalidConfig("palette must not be empty"));
        }
        if self.palette.len() > usize::from(u8::MAX) + 1 {
            return Err(EngineError::InvalidConfig(
                "palette supports at most 256 colours",
            ));
        }
        let forces = &self.forces;
        if !(forces.damping > 0.0 && forces.damping <= 1.0) {
            return Err(EngineError::InvalidConfig("damping must be in (0, 1]"));
        }
        if !(forces.max_speed.is_finite() && forces.max_speed > 0.0) {
            return Err(EngineError::InvalidConfig("max_speed must be positive"));
        }
        let coefficients = [
            forces.attraction,
            forces.swirl,
            forces.jitter,
            forces.wave_amplitude,
            forces.wave_frequency,
            forces.stiffness,
        ];
        if coefficients.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(EngineError::InvalidConfig(
                "force coefficients must be finite and non-negative",
            ));
        }
        if let Some(alpha) = self.trail_fade
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            return Err(EngineError::InvalidConfig("trail_fade must be in (0, 1]"));
        }
        let [min_radius, max_radius] = self.radius_range;
        if !(min_radius > 0.0 && max_radius >= min_radius && max_radius.is_finite()) {
            return Err(EngineError::InvalidConfig(
                "radius_range must be positive and ordered",
            ));
        }
        if !(self.link_radius.is_finite() && self.link_radius >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "link_radius must be non-negative",
            ));
        }
        match &self.projection {
            Some(projection) => {
                if !(projection.fov.is_finite() && projection.fov > 0.0) {
                    return Err(EngineError::InvalidConfig("fov must be positive"));
                }
                if !(projection.distance.is_finite() && projection.distance >= 0.0) {
                    return Err(EngineError::InvalidConfig(
                        "camera distance must be non-negative",
                    ));
                }
                if !(projection.max_scale.is_finite() && projection.max_scale > 0.0) {
                    return Err(EngineError::InvalidConfig("max_scale must be positive"));
                }
                if projection
                    .tilt
                    .iter()
                    .chain(projection.rotation_rates.iter())
                    .any(|angle| !angle.is_finite())
                {
                    return Err(EngineError::InvalidConfig(
                        "rotation angles must be finite",
                    ));
                }
            }
            None if self.view.is_perspective() => {
                return Err(EngineError::InvalidConfig(
                    "perspective views require projection settings",
                ));
            }
            None => {}
        }
        Ok(())
    }

    /// Whether switching from `self` to `other` requires reseeding entities.
    #[must_use]
    pub fn is_structural_change(&self, other: &Self) -> bool {
        self.view != other.view
            || self.entity_count != other.entity_count
            || self.activation != other.activation
            || self.palette.len() != other.palette.len()
            || self.radius_range != other.radius_range
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Fluent construction of an [`EngineConfig`], validated on `build`.
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn entities(mut self, count: usize) -> Self {
        self.config.entity_count = count;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: FieldMode) -> Self {
        self.config.mode = mode;
        self
    }

    #[must_use]
    pub fn forces(mut self, forces: ForceTuning) -> Self {
        self.config.forces = forces;
        self
    }

    #[must_use]
    pub fn palette(mut self, palette: impl Into<Vec<[f32; 3]>>) -> Self {
        self.config.palette = palette.into();
        self
    }

    #[must_use]
    pub fn background(mut self, rgb: [f32; 3]) -> Self {
        self.config.background = rgb;
        self
    }

    #[must_use]
    pub fn trail_fade(mut self, alpha: Option<f32>) -> Self {
        self.config.trail_fade = alpha;
        self
    }

    #[must_use]
    pub fn projection(mut self, projection: Option<ProjectionSettings>) -> Self {
        self.config.projection = projection;
        self
    }

    #[must_use]
    pub fn time_step(mut self, step: f64) -> Self {
        self.config.time_step = step;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.rng_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn activation(mut self, enabled: bool) -> Self {
        self.config.activation = enabled;
        self
    }

    #[must_use]
    pub fn link_radius(mut self, radius: f32) -> Self {
        self.config.link_radius = radius;
        self
    }

    pub fn build(self) -> Result<EngineConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
