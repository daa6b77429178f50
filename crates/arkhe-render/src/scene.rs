//! Per-view drawing. Every view issues its commands through a [`DepthQueue`];
//! planar views push at depth zero so submission order is kept.

use std::f32::consts::TAU;

use arkhe_core::{Bounds, EngineConfig, Entity, Field, ViewKind, fold_angle, forces};
use tracing::trace;

use crate::painter::DepthQueue;
use crate::projector::{Projection, Projector, Rotation};
use crate::surface::{Color, CompositeMode, DrawCommand, DrawingSurface, SurfaceSize};

/// Only the first entities take part in proximity links.
const LINK_CANDIDATES: usize = 400;
const GLOW_SPREAD: f32 = 3.0;
const WAVE_BANDS: u32 = 3;
const WAVE_SAMPLE_SPACING: f32 = 8.0;
const TORUS_RINGS: usize = 18;
const TORUS_TUBES: usize = 8;
const TORUS_SEGMENTS: usize = 24;
const RADAR_RINGS: usize = 4;
const RADAR_SEGMENTS: usize = 64;
const RADAR_SWEEP_RATE: f32 = 1.4;
const RADAR_TRAIL: usize = 5;
const LATTICE_LAYERS: usize = 3;

/// Draws one field per frame onto a surface.
#[derive(Debug)]
pub struct ScenePainter {
    projector: Projector,
    queue: DepthQueue,
    needs_clear: bool,
}

impl ScenePainter {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            projector: projector_for(config),
            queue: DepthQueue::new(),
            needs_clear: true,
        }
    }

    /// Pick up new projection settings and repaint from a clean background.
    pub fn reconfigure(&mut self, config: &EngineConfig) {
        self.projector = projector_for(config);
        self.needs_clear = true;
    }

    /// Force the next frame to clear instead of fading, e.g. after the
    /// backing buffer was reallocated.
    pub fn invalidate(&mut self) {
        self.needs_clear = true;
    }

    #[must_use]
    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Draw `field` and return the number of commands submitted.
    pub fn paint(&mut self, field: &Field, surface: &mut dyn DrawingSurface) -> usize {
        let size = surface.backing_size();
        if size.is_empty() {
            return 0;
        }
        let config = field.config();
        let background = config.background;
        let command = match config.trail_fade {
            Some(alpha) if !self.needs_clear => DrawCommand::Fade {
                color: Color::from_rgb(background, alpha),
            },
            _ => DrawCommand::Clear {
                color: Color::from_rgb(background, 1.0),
            },
        };
        self.needs_clear = false;
        surface.submit(command);
        surface.submit(DrawCommand::SetComposite {
            mode: CompositeMode::Lighter,
        });

        match config.view {
            ViewKind::ParticleField => particle_field(field, &mut self.queue),
            ViewKind::Waves => waves(field, &mut self.queue),
            ViewKind::Torus => torus(&self.stage(field, size), field, &mut self.queue),
            ViewKind::Radar => radar(&self.stage(field, size), field, &mut self.queue),
            ViewKind::Lattice => lattice(&self.stage(field, size), field, &mut self.queue),
        }

        let drawn = self.queue.flush(surface);
        surface.submit(DrawCommand::SetComposite {
            mode: CompositeMode::SourceOver,
        });
        trace!(view = config.view.as_str(), drawn, "Painted frame");
        drawn + 3
    }

    fn stage(&self, field: &Field, size: SurfaceSize) -> Stage {
        let settings = field.config().projection.unwrap_or_default();
        let fov = self.projector.fov();
        let unit = (fov + self.projector.distance()) / fov;
        Stage {
            projector: self.projector,
            rotation: Rotation::at(field.time().value(), &settings),
            size: size.as_f32(),
            unit: if unit.is_finite() && unit > 0.0 { unit } else { 1.0 },
        }
    }
}

fn projector_for(config: &EngineConfig) -> Projector {
    config
        .projection
        .as_ref()
        .map(Projector::new)
        .unwrap_or_default()
}

fn palette_color(field: &Field, index: usize) -> [f32; 3] {
    let palette = &field.config().palette;
    palette
        .get(index % palette.len().max(1))
        .copied()
        .unwrap_or([1.0, 1.0, 1.0])
}

fn entity_dot(field: &Field, entity: &Entity, center: [f32; 2], radius: f32) -> DrawCommand {
    DrawCommand::FillCircle {
        center,
        radius,
        color: Color::from_rgb(field.color_of(entity), 0.85),
        glow: entity.glow(field.coefficients().max_speed) * GLOW_SPREAD,
    }
}

/// Lines between points closer than `radius`, fading with distance.
fn proximity_links(
    points: &[([f32; 2], [f32; 3])],
    radius: f32,
    width: f32,
    queue: &mut DepthQueue,
) {
    if radius <= 0.0 {
        return;
    }
    for (i, (a, color)) in points.iter().enumerate() {
        for (b, _) in &points[i + 1..] {
            let dx = a[0] - b[0];
            let dy = a[1] - b[1];
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < radius {
                queue.push(
                    0.0,
                    DrawCommand::StrokeLine {
                        from: *a,
                        to: *b,
                        width,
                        color: Color::from_rgb(*color, (1.0 - distance / radius) * 0.35),
                    },
                );
            }
        }
    }
}

fn particle_field(field: &Field, queue: &mut DepthQueue) {
    let entities = field.entities();
    if field.params().alternate {
        let points: Vec<_> = entities
            .iter()
            .take(LINK_CANDIDATES)
            .map(|e| ([e.position.x, e.position.y], field.color_of(e)))
            .collect();
        proximity_links(&points, field.config().link_radius, 0.6, queue);
    }
    for entity in entities {
        let center = [entity.position.x, entity.position.y];
        queue.push(0.0, entity_dot(field, entity, center, entity.visual.radius));
    }
}

fn waves(field: &Field, queue: &mut DepthQueue) {
    let bounds = field.bounds();
    let time = field.time().phase();
    let coefficients = field.coefficients();
    let samples = (bounds.width / WAVE_SAMPLE_SPACING).ceil().max(1.0) as usize + 1;
    for band in 0..WAVE_BANDS {
        let points: Vec<[f32; 2]> = (0..samples)
            .map(|i| {
                let x = (i as f32 * WAVE_SAMPLE_SPACING).min(bounds.width);
                [x, forces::wave_height(x, &bounds, time, coefficients, band)]
            })
            .collect();
        let rgb = palette_color(field, band as usize);
        if field.params().alternate {
            let mirrored = points
                .iter()
                .map(|[x, y]| [*x, bounds.height - y])
                .collect();
            queue.push(
                0.0,
                DrawCommand::StrokePolyline {
                    points: mirrored,
                    width: 1.0,
                    color: Color::from_rgb(rgb, 0.25),
                    closed: false,
                },
            );
        }
        queue.push(
            0.0,
            DrawCommand::StrokePolyline {
                points,
                width: 1.5,
                color: Color::from_rgb(rgb, 0.55),
                closed: false,
            },
        );
    }
    for entity in field.entities() {
        let center = [entity.position.x, entity.position.y];
        queue.push(0.0, entity_dot(field, entity, center, entity.visual.radius));
    }
}

/// Camera state shared by the perspective views for one frame.
struct Stage {
    projector: Projector,
    rotation: Rotation,
    size: (f32, f32),
    /// Model units per surface pixel so the `z = 0` plane maps 1:1.
    unit: f32,
}

impl Stage {
    fn project(&self, offset: [f32; 3]) -> Projection {
        let model = offset.map(|v| v * self.unit);
        self.projector.project(model, &self.rotation, self.size)
    }

    /// Entity position relative to the centre of `bounds`.
    fn offset(entity: &Entity, bounds: &Bounds) -> [f32; 3] {
        let center = bounds.center();
        [
            entity.position.x - center.x,
            entity.position.y - center.y,
            entity.position.z,
        ]
    }

    fn dot(&self, field: &Field, entity: &Entity, offset: [f32; 3], queue: &mut DepthQueue) {
        let projection = self.project(offset);
        if !projection.visible {
            return;
        }
        let radius = projection.scaled(entity.visual.radius * self.unit);
        queue.push(
            projection.depth,
            entity_dot(field, entity, [projection.x, projection.y], radius),
        );
    }

    fn line(&self, from: [f32; 3], to: [f32; 3], width: f32, color: Color, queue: &mut DepthQueue) {
        let (a, b) = (self.project(from), self.project(to));
        if !(a.visible && b.visible) {
            return;
        }
        queue.push(
            (a.depth + b.depth) * 0.5,
            DrawCommand::StrokeLine {
                from: [a.x, a.y],
                to: [b.x, b.y],
                width,
                color,
            },
        );
    }

    /// Polyline drawn only when every vertex is in front of the camera.
    fn polyline(
        &self,
        points: impl IntoIterator<Item = [f32; 3]>,
        closed: bool,
        width: f32,
        color: Color,
        queue: &mut DepthQueue,
    ) {
        let mut projected = Vec::new();
        let mut depth = 0.0;
        for point in points {
            let projection = self.project(point);
            if !projection.visible {
                return;
            }
            depth += projection.depth;
            projected.push([projection.x, projection.y]);
        }
        if projected.len() < 2 {
            return;
        }
        depth /= projected.len() as f32;
        queue.push(
            depth,
            DrawCommand::StrokePolyline {
                points: projected,
                width,
                color,
                closed,
            },
        );
    }
}

fn torus(stage: &Stage, field: &Field, queue: &mut DepthQueue) {
    let bounds = field.bounds();
    let extent = bounds.width.min(bounds.height);
    let major = extent * 0.28;
    let minor = extent * 0.1;
    let wire = Color::from_rgb(palette_color(field, 0), 0.22);
    let point = |u: f32, v: f32| {
        let ring = major + minor * v.cos();
        [ring * u.cos(), minor * v.sin(), ring * u.sin()]
    };
    for i in 0..TORUS_RINGS {
        let u = i as f32 / TORUS_RINGS as f32 * TAU;
        let points = (0..TORUS_SEGMENTS).map(|j| point(u, j as f32 / TORUS_SEGMENTS as f32 * TAU));
        stage.polyline(points, true, 0.8, wire, queue);
    }
    for j in 0..TORUS_TUBES {
        let v = j as f32 / TORUS_TUBES as f32 * TAU;
        let points = (0..TORUS_SEGMENTS * 2)
            .map(|i| point(i as f32 / (TORUS_SEGMENTS * 2) as f32 * TAU, v));
        stage.polyline(points, true, 0.8, wire, queue);
    }
    for entity in field.entities() {
        let offset = Stage::offset(entity, &bounds).map(|v| v * 0.8);
        stage.dot(field, entity, offset, queue);
    }
}

fn radar(stage: &Stage, field: &Field, queue: &mut DepthQueue) {
    let bounds = field.bounds();
    let max_radius = bounds.width.min(bounds.height) * 0.45;
    let ring_rgb = palette_color(field, 0);
    for k in 1..=RADAR_RINGS {
        let radius = max_radius * k as f32 / RADAR_RINGS as f32;
        let points = (0..RADAR_SEGMENTS).map(|i| {
            let angle = i as f32 / RADAR_SEGMENTS as f32 * TAU;
            [radius * angle.cos(), radius * angle.sin(), 0.0]
        });
        stage.polyline(points, true, 1.0, Color::from_rgb(ring_rgb, 0.3), queue);
    }
    if field.params().alternate {
        let cross = Color::from_rgb(ring_rgb, 0.2);
        stage.line([-max_radius, 0.0, 0.0], [max_radius, 0.0, 0.0], 0.8, cross, queue);
        stage.line([0.0, -max_radius, 0.0], [0.0, max_radius, 0.0], 0.8, cross, queue);
    }

    let sweep = radar_sweep_angle(field.time().value());
    let sweep_rgb = palette_color(field, 1);
    for k in 0..RADAR_TRAIL {
        let angle = sweep - k as f32 * 0.07;
        let alpha = 0.6 * (1.0 - k as f32 / RADAR_TRAIL as f32);
        let tip = [max_radius * angle.cos(), max_radius * angle.sin(), 0.0];
        stage.line([0.0; 3], tip, 1.5, Color::from_rgb(sweep_rgb, alpha), queue);
    }

    // Blips keep their bearing; range is normalised so every entity lands on
    // the scope.
    let center = bounds.center();
    let reach = (center.x * center.x + center.y * center.y).sqrt().max(1.0);
    for entity in field.entities() {
        let [dx, dy, _] = Stage::offset(entity, &bounds);
        let bearing = dy.atan2(dx);
        let range = (dx * dx + dy * dy).sqrt() / reach * max_radius;
        let behind = (sweep - bearing).rem_euclid(TAU);
        let boost = (1.0 - behind / TAU).powi(6);
        let offset = [range * bearing.cos(), range * bearing.sin(), 0.0];
        let projection = stage.project(offset);
        if !projection.visible {
            continue;
        }
        let glow = entity.glow(field.coefficients().max_speed) * GLOW_SPREAD + boost * 2.0;
        queue.push(
            projection.depth,
            DrawCommand::FillCircle {
                center: [projection.x, projection.y],
                radius: projection.scaled(entity.visual.radius * stage.unit * (1.0 + boost)),
                color: Color::from_rgb(field.color_of(entity), 0.4 + 0.6 * boost),
                glow,
            },
        );
    }
}

fn lattice(stage: &Stage, field: &Field, queue: &mut DepthQueue) {
    let bounds = field.bounds();
    let spacing = bounds.width.min(bounds.height) * 0.28;
    let half_x = bounds.width * 0.45;
    let half_z = bounds.height * 0.45;
    let plate = Color::from_rgb(palette_color(field, 0), 0.15);
    let layer_height =
        |layer: usize| (layer as f32 - (LATTICE_LAYERS as f32 - 1.0) * 0.5) * spacing;

    for layer in 0..LATTICE_LAYERS {
        let y = layer_height(layer);
        let corners = [
            [-half_x, y, -half_z],
            [half_x, y, -half_z],
            [half_x, y, half_z],
            [-half_x, y, half_z],
        ];
        stage.polyline(corners, true, 0.8, plate, queue);
    }

    // Surface y becomes depth inside the layer plane.
    let mut layers: Vec<Vec<Node<'_>>> = vec![Vec::new(); LATTICE_LAYERS];
    for (index, entity) in field.entities().iter().enumerate() {
        let layer = index % LATTICE_LAYERS;
        let [dx, dy, dz] = Stage::offset(entity, &bounds);
        let node = [dx * 0.9, layer_height(layer) + dz * 0.08, dy * 0.9];
        if layers[layer].len() < LINK_CANDIDATES {
            layers[layer].push((node, entity));
        }
        stage.dot(field, entity, node, queue);
    }

    let radius = field.config().link_radius;
    if radius <= 0.0 {
        return;
    }
    for nodes in &layers {
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                link_nodes(stage, field, a, b, radius, queue);
            }
        }
    }
    if field.params().alternate {
        for pair in layers.windows(2) {
            for a in &pair[0] {
                let nearest = pair[1].iter().min_by(|x, y| {
                    planar_distance(a.0, x.0).total_cmp(&planar_distance(a.0, y.0))
                });
                if let Some(b) = nearest {
                    link_nodes(stage, field, a, b, radius * 1.5, queue);
                }
            }
        }
    }
}

type Node<'a> = ([f32; 3], &'a Entity);

fn link_nodes(
    stage: &Stage,
    field: &Field,
    a: &Node<'_>,
    b: &Node<'_>,
    reach: f32,
    queue: &mut DepthQueue,
) {
    let distance = planar_distance(a.0, b.0);
    if distance >= reach {
        return;
    }
    let energy = (a.1.activation.unwrap_or(0.5) + b.1.activation.unwrap_or(0.5)) * 0.5;
    let alpha = (1.0 - distance / reach) * (0.2 + 0.5 * energy);
    stage.line(a.0, b.0, 0.7, Color::from_rgb(field.color_of(a.1), alpha), queue);
}

fn planar_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dz = a[2] - b[2];
    (dx * dx + dz * dz).sqrt()
}

/// Current bearing of the radar sweep in `[0, TAU)`.
#[must_use]
pub fn radar_sweep_angle(time: f64) -> f32 {
    fold_angle(RADAR_SWEEP_RATE, time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;
    use arkhe_core::{DomainParams, FieldMode};
    use std::f32::consts::PI;

    fn sized_field(view: ViewKind, count: usize, size: SurfaceSize) -> Field {
        let config = EngineConfig::builder(view)
            .entities(count)
            .seed(99)
            .build()
            .expect("config");
        let mut field = Field::new(config).expect("field");
        field.resize(size.as_bounds());
        field.step();
        field
    }

    fn surface(size: SurfaceSize) -> RecordingSurface {
        let mut surface = RecordingSurface::new(size.width, size.height);
        surface.resize_backing(size);
        surface
    }

    #[test]
    fn particle_field_draws_one_dot_per_entity() {
        let size = SurfaceSize::new(400, 300);
        let field = sized_field(ViewKind::ParticleField, 25, size);
        let mut painter = ScenePainter::new(field.config());
        let mut surface = surface(size);
        let issued = painter.paint(&field, &mut surface);
        assert_eq!(issued, surface.commands().len());
        let dots = surface.count_where(|c| matches!(c, DrawCommand::FillCircle { .. }));
        assert_eq!(dots, 25);
        assert!(matches!(surface.commands()[0], DrawCommand::Clear { .. }));
    }

    #[test]
    fn trails_fade_after_first_frame() {
        let size = SurfaceSize::new(200, 120);
        let field = sized_field(ViewKind::Waves, 10, size);
        let mut painter = ScenePainter::new(field.config());
        let mut surface = surface(size);
        painter.paint(&field, &mut surface);
        surface.take_commands();
        painter.paint(&field, &mut surface);
        assert!(matches!(surface.commands()[0], DrawCommand::Fade { .. }));
        let bands = surface.count_where(|c| matches!(c, DrawCommand::StrokePolyline { .. }));
        assert_eq!(bands, WAVE_BANDS as usize);
    }

    #[test]
    fn alternate_flag_adds_links() {
        let size = SurfaceSize::new(200, 200);
        let mut field = sized_field(ViewKind::ParticleField, 60, size);
        let mut painter = ScenePainter::new(field.config());
        let mut plain = surface(size);
        painter.paint(&field, &mut plain);

        field.set_params(DomainParams {
            alternate: true,
            mode: Some(FieldMode::Ambient),
            ..DomainParams::default()
        });
        let mut linked = surface(size);
        painter.paint(&field, &mut linked);
        let lines = |s: &RecordingSurface| {
            s.count_where(|c| matches!(c, DrawCommand::StrokeLine { .. }))
        };
        assert_eq!(lines(&plain), 0);
        assert!(lines(&linked) > 0);
    }

    #[test]
    fn perspective_views_emit_finite_geometry() {
        let size = SurfaceSize::new(640, 480);
        for view in [ViewKind::Torus, ViewKind::Radar, ViewKind::Lattice] {
            let field = sized_field(view, 40, size);
            let mut painter = ScenePainter::new(field.config());
            let mut surface = surface(size);
            assert!(painter.paint(&field, &mut surface) > 3, "{view:?} drew nothing");
            for command in surface.commands() {
                if let DrawCommand::FillCircle { center, radius, glow, .. } = command {
                    assert!(center.iter().all(|v| v.is_finite()));
                    assert!(radius.is_finite() && *radius >= 0.0);
                    assert!(glow.is_finite() && *glow >= 0.0);
                }
            }
        }
    }

    #[test]
    fn empty_backing_draws_nothing() {
        let size = SurfaceSize::new(100, 100);
        let field = sized_field(ViewKind::Torus, 5, size);
        let mut painter = ScenePainter::new(field.config());
        let mut surface = RecordingSurface::new(100, 100);
        assert_eq!(painter.paint(&field, &mut surface), 0);
        assert!(surface.commands().is_empty());
    }

    #[test]
    fn sweep_angle_wraps() {
        assert!((radar_sweep_angle(0.0)).abs() < 1e-6);
        let angle = radar_sweep_angle(100.0);
        assert!((0.0..TAU).contains(&angle));
        let half_turn = std::f64::consts::PI / f64::from(RADAR_SWEEP_RATE);
        assert!((radar_sweep_angle(half_turn) - PI).abs() < 1e-4);
        let late = radar_sweep_angle(1.0e7);
        let next = radar_sweep_angle(1.0e7 + 1.0 / 60.0);
        assert!(((next - late).rem_euclid(TAU) - RADAR_SWEEP_RATE / 60.0).abs() < 1e-3);
    }
}
