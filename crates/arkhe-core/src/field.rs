use std::f32::consts::TAU;
use std::fmt;

use rand::{Rng, rngs::SmallRng};
use tracing::debug;

use crate::forces::{self, ForceCoefficients};
use crate::{
    Bounds, DomainParams, EngineConfig, EngineError, Entity, TimeAccumulator, VisualAttributes,
};

/// Entity field owned by one animation controller.
///
/// Entities exist only while the field has non-degenerate bounds. A change of
/// bounds reseeds every entity at a uniformly random position; parameter
/// updates only rescale force coefficients.
pub struct Field {
    config: EngineConfig,
    entities: Vec<Entity>,
    bounds: Bounds,
    time: TimeAccumulator,
    rng: SmallRng,
    params: DomainParams,
    coefficients: ForceCoefficients,
    frame: u64,
    reseeds: u64,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("view", &self.config.view)
            .field("entities", &self.entities.len())
            .field("bounds", &self.bounds)
            .field("time", &self.time.value())
            .field("frame", &self.frame)
            .finish()
    }
}

impl Field {
    /// Create an unsized field; entities are seeded on the first [`Field::resize`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let params = DomainParams::default();
        let coefficients = ForceCoefficients::derive(&config.forces, &params, config.mode);
        Ok(Self {
            rng: config.seeded_rng(),
            time: TimeAccumulator::new(config.time_step),
            entities: Vec::with_capacity(config.entity_count),
            bounds: Bounds::default(),
            config,
            params,
            coefficients,
            frame: 0,
            reseeds: 0,
        })
    }

    /// Adopt new bounds. Returns whether entities were reseeded.
    pub fn resize(&mut self, bounds: Bounds) -> bool {
        if bounds == self.bounds {
            return false;
        }
        debug!(
            from_width = self.bounds.width,
            from_height = self.bounds.height,
            width = bounds.width,
            height = bounds.height,
            "Field bounds changed; reseeding entities",
        );
        self.bounds = bounds;
        self.reseed();
        true
    }

    /// Recreate every entity at a random position inside the current bounds.
    pub fn reseed(&mut self) {
        self.entities.clear();
        self.reseeds += 1;
        if self.bounds.is_degenerate() {
            return;
        }
        let count = self.config.entity_count;
        for _ in 0..count {
            let entity = self.spawn_entity();
            self.entities.push(entity);
        }
    }

    fn spawn_entity(&mut self) -> Entity {
        let (position, velocity) = forces::spawn_position(&mut self.rng, &self.bounds);
        let palette_len = self.config.palette.len().max(1);
        let [min_radius, max_radius] = self.config.radius_range;
        let visual = VisualAttributes {
            category: (self.rng.gen_range(0..palette_len) % 256) as u8,
            radius: if max_radius > min_radius {
                self.rng.gen_range(min_radius..max_radius)
            } else {
                min_radius
            },
            glow_gain: self.rng.gen_range(0.6_f32..1.4),
        };
        let activation = self
            .config
            .activation
            .then(|| self.rng.gen_range(0.0_f32..1.0));
        Entity {
            position,
            velocity,
            visual,
            phase: self.rng.gen_range(0.0..TAU),
            activation,
        }
    }

    /// Swap in a new domain snapshot. Never touches entity state.
    pub fn set_params(&mut self, params: DomainParams) {
        let params = params.sanitized();
        if params == self.params {
            return;
        }
        self.params = params;
        self.coefficients =
            ForceCoefficients::derive(&self.config.forces, &self.params, self.config.mode);
    }

    /// Apply a new configuration. Structural changes reseed; everything else
    /// only refreshes coefficients. Returns whether entities were reseeded.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<bool, EngineError> {
        config.validate()?;
        let structural = self.config.is_structural_change(&config);
        let step_changed = self.config.time_step != config.time_step;
        self.config = config;
        if step_changed {
            self.time = self.time.with_step(self.config.time_step);
        }
        self.coefficients =
            ForceCoefficients::derive(&self.config.forces, &self.params, self.config.mode);
        if structural {
            self.reseed();
        }
        Ok(structural)
    }

    /// Run one frame of simulation: advance time, apply forces, integrate,
    /// wrap. Degenerate bounds leave the field untouched.
    pub fn step(&mut self) {
        if self.bounds.is_degenerate() {
            return;
        }
        self.time.advance();
        self.frame += 1;
        self.stage_activation();
        self.stage_motion();
    }

    fn stage_activation(&mut self) {
        if !self.config.activation {
            return;
        }
        let coherence = self.params.coherence;
        let cycle = self.time.angle(0.8 + self.params.fluctuation);
        for entity in &mut self.entities {
            let pulse = 0.5 + 0.5 * (cycle + entity.phase).sin();
            let weight = coherence * 0.6 + pulse * 0.4;
            entity.activation = Some(if weight.is_finite() {
                weight.clamp(0.0, 1.0)
            } else {
                0.0
            });
        }
    }

    fn stage_motion(&mut self) {
        let time = self.time.phase();
        let bounds = self.bounds;
        let coefficients = self.coefficients;
        let mut respawns = 0usize;
        for entity in &mut self.entities {
            forces::apply_forces(entity, &coefficients, &bounds, time, &mut self.rng);
            forces::integrate(entity, coefficients.damping, coefficients.max_speed);
            if !(entity.position.is_finite() && entity.velocity.is_finite()) {
                let (position, velocity) = forces::spawn_position(&mut self.rng, &bounds);
                entity.position = position;
                entity.velocity = velocity;
                respawns += 1;
            }
            forces::wrap_entity(entity, &bounds);
        }
        if respawns > 0 {
            debug!(respawns, frame = self.frame, "Respawned non-finite entities");
        }
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.bounds
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn time(&self) -> &TimeAccumulator {
        &self.time
    }

    #[must_use]
    pub const fn params(&self) -> &DomainParams {
        &self.params
    }

    #[must_use]
    pub const fn coefficients(&self) -> &ForceCoefficients {
        &self.coefficients
    }

    /// Frames simulated since creation.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Times the entity set has been recreated.
    #[must_use]
    pub const fn reseeds(&self) -> u64 {
        self.reseeds
    }

    /// RGB colour for an entity's palette category.
    #[must_use]
    pub fn color_of(&self, entity: &Entity) -> [f32; 3] {
        let palette = &self.config.palette;
        palette
            .get(usize::from(entity.visual.category) % palette.len().max(1))
            .copied()
            .unwrap_or([1.0, 1.0, 1.0])
    }
}
