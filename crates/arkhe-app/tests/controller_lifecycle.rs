use std::cell::RefCell;
use std::rc::Rc;

use arkhe_app::{AnimationController, LoopState, ManualScheduler};
use arkhe_core::{Bounds, DomainParams, EngineConfig, FieldMode, ViewKind};
use arkhe_render::{DrawCommand, DrawingSurface, RecordingSurface, SurfaceSize};

fn config(view: ViewKind, entities: usize) -> EngineConfig {
    EngineConfig::builder(view)
        .entities(entities)
        .seed(0x5EED)
        .build()
        .expect("config")
}

fn attach(
    width: u32,
    height: u32,
    config: EngineConfig,
) -> (Rc<RefCell<RecordingSurface>>, Rc<ManualScheduler>, AnimationController) {
    let surface = Rc::new(RefCell::new(RecordingSurface::new(width, height)));
    let scheduler = Rc::new(ManualScheduler::new());
    let controller =
        AnimationController::attach(&surface, config, DomainParams::default(), &scheduler)
            .expect("attach");
    (surface, scheduler, controller)
}

fn assert_in_bounds(controller: &AnimationController, bounds: Bounds) {
    controller
        .with_field(|field| {
            assert_eq!(field.bounds(), bounds);
            for entity in field.entities() {
                assert!(entity.position.is_finite(), "{:?}", entity.position);
                assert!(
                    bounds.contains(&entity.position),
                    "{:?} outside {bounds:?}",
                    entity.position
                );
            }
        })
        .expect("field available between frames");
}

#[test]
fn entities_stay_finite_and_in_bounds_over_many_frames() {
    let (_surface, scheduler, controller) = attach(400, 300, config(ViewKind::ParticleField, 200));
    assert_eq!(scheduler.run_frames(100), 100);

    assert_eq!(controller.with_field(|f| f.entity_count()), Some(200));
    assert_in_bounds(&controller, Bounds::new(400.0, 300.0));
    assert_eq!(controller.stats().frames_rendered, 100);
}

#[test]
fn resize_redistributes_entities_into_new_bounds() {
    let (surface, scheduler, controller) = attach(400, 300, config(ViewKind::ParticleField, 200));
    scheduler.run_frames(20);
    surface.borrow_mut().set_display_size(800, 600);
    scheduler.run_frame();

    assert_in_bounds(&controller, Bounds::new(800.0, 600.0));
    assert_eq!(surface.borrow().backing_size(), SurfaceSize::new(800, 600));
    let spread = controller
        .with_field(|field| {
            field
                .entities()
                .iter()
                .filter(|e| e.position.x >= 400.0 || e.position.y >= 300.0)
                .count()
        })
        .expect("field");
    assert!(spread > 0, "no entity reached the enlarged area");
    let stats = controller.stats();
    assert_eq!(stats.resizes, 2);
    assert_eq!(stats.reseeds, 2);
}

#[test]
fn detach_before_first_frame_draws_nothing() {
    let (surface, scheduler, controller) = attach(400, 300, config(ViewKind::Torus, 50));
    assert_eq!(controller.state(), LoopState::Scheduled);
    controller.detach();

    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.run_frames(5), 0);
    assert!(surface.borrow().commands().is_empty());
    assert_eq!(controller.state(), LoopState::Cancelled);
}

#[test]
fn detach_is_idempotent() {
    let (_surface, scheduler, controller) = attach(120, 90, config(ViewKind::Waves, 20));
    scheduler.run_frames(3);
    controller.detach();
    controller.detach();
    drop(controller);
    assert_eq!(scheduler.run_frames(3), 0);
}

#[test]
fn parameter_updates_never_reseed() {
    let (_surface, scheduler, controller) = attach(300, 200, config(ViewKind::ParticleField, 40));
    scheduler.run_frame();
    let reseeds = controller.stats().reseeds;

    for step in 0..10 {
        controller.update_params(DomainParams {
            coherence: step as f32 / 10.0,
            fluctuation: 0.9,
            mode: Some(FieldMode::Scatter),
            alternate: step % 2 == 0,
        });
        scheduler.run_frame();
    }
    assert_eq!(controller.stats().reseeds, reseeds);
    assert_eq!(
        controller.with_field(|field| field.coefficients().mode),
        Some(FieldMode::Scatter)
    );
}

#[test]
fn preset_mode_survives_default_params_and_follows_reconfigure() {
    let (_surface, scheduler, controller) = attach(240, 160, config(ViewKind::Waves, 30));
    let mode = || controller.with_field(|field| field.coefficients().mode);
    assert_eq!(mode(), Some(FieldMode::Resonance));
    scheduler.run_frame();
    assert_eq!(mode(), Some(FieldMode::Resonance));

    let mut vortex = config(ViewKind::Waves, 30);
    vortex.mode = FieldMode::Vortex;
    assert!(!controller.reconfigure(vortex).expect("reconfigure"));
    scheduler.run_frame();
    assert_eq!(mode(), Some(FieldMode::Vortex));

    controller.update_params(DomainParams::default().with_mode(FieldMode::Converge));
    scheduler.run_frame();
    assert_eq!(mode(), Some(FieldMode::Converge));
}

#[test]
fn dropped_surface_turns_frames_into_noops() {
    let (surface, scheduler, controller) = attach(200, 200, config(ViewKind::Radar, 10));
    scheduler.run_frames(2);
    drop(surface);
    scheduler.run_frames(4);

    let stats = controller.stats();
    assert_eq!(stats.frames_rendered, 2);
    assert_eq!(stats.frames_skipped, 4);
}

#[test]
fn zero_area_surface_is_a_degenerate_frame() {
    let (surface, scheduler, controller) = attach(0, 150, config(ViewKind::ParticleField, 10));
    scheduler.run_frames(3);
    assert!(surface.borrow().commands().is_empty());
    assert_eq!(controller.stats().degenerate_frames, 3);
    assert_eq!(controller.with_field(|f| f.time().value()), Some(0.0));

    surface.borrow_mut().set_display_size(200, 150);
    scheduler.run_frame();
    assert_eq!(controller.stats().frames_rendered, 1);
    assert_eq!(controller.with_field(|f| f.entity_count()), Some(10));
}

#[test]
fn controllers_keep_independent_clocks() {
    let scheduler = Rc::new(ManualScheduler::new());
    let first_surface = Rc::new(RefCell::new(RecordingSurface::new(100, 100)));
    let second_surface = Rc::new(RefCell::new(RecordingSurface::new(100, 100)));
    let first = AnimationController::attach(
        &first_surface,
        config(ViewKind::Torus, 10),
        DomainParams::default(),
        &scheduler,
    )
    .expect("first");
    scheduler.run_frames(5);
    let second = AnimationController::attach(
        &second_surface,
        config(ViewKind::Torus, 10),
        DomainParams::default(),
        &scheduler,
    )
    .expect("second");
    scheduler.run_frames(5);

    let first_time = first.with_field(|f| f.time().value()).expect("first");
    let second_time = second.with_field(|f| f.time().value()).expect("second");
    assert!(first_time > second_time);
    assert_eq!(first.stats().frames_rendered, 10);
    assert_eq!(second.stats().frames_rendered, 5);
}

/// Surface that runs a hook on every submitted command.
struct HookSurface {
    inner: RecordingSurface,
    hook: Box<dyn FnMut()>,
}

impl DrawingSurface for HookSurface {
    fn display_size(&self) -> SurfaceSize {
        self.inner.display_size()
    }

    fn backing_size(&self) -> SurfaceSize {
        self.inner.backing_size()
    }

    fn resize_backing(&mut self, size: SurfaceSize) {
        self.inner.resize_backing(size);
    }

    fn submit(&mut self, command: DrawCommand) {
        (self.hook)();
        self.inner.submit(command);
    }
}

#[test]
fn detach_during_frame_stops_rescheduling() {
    let slot: Rc<RefCell<Option<AnimationController>>> = Rc::new(RefCell::new(None));
    let hook_slot = Rc::clone(&slot);
    let surface = Rc::new(RefCell::new(HookSurface {
        inner: RecordingSurface::new(160, 120),
        hook: Box::new(move || {
            if let Some(controller) = hook_slot.borrow().as_ref() {
                controller.detach();
            }
        }),
    }));
    let scheduler = Rc::new(ManualScheduler::new());
    let controller = AnimationController::attach(
        &surface,
        config(ViewKind::ParticleField, 15),
        DomainParams::default(),
        &scheduler,
    )
    .expect("attach");
    *slot.borrow_mut() = Some(controller);

    assert_eq!(scheduler.run_frame(), 1);
    assert_eq!(scheduler.pending(), 0);
    let guard = slot.borrow();
    let controller = guard.as_ref().expect("controller");
    assert!(controller.is_detached());
    assert_eq!(controller.state(), LoopState::Cancelled);
    assert_eq!(controller.stats().frames_rendered, 1);
    drop(guard);
    assert_eq!(scheduler.run_frames(3), 0);
}

#[test]
fn reconfigure_after_detach_is_rejected() {
    let (_surface, _scheduler, controller) = attach(50, 50, config(ViewKind::Lattice, 9));
    controller.detach();
    assert!(controller.reconfigure(config(ViewKind::Lattice, 9)).is_err());
}

#[test]
fn detach_while_inspecting_field_cancels_and_releases_surface() {
    let (surface, scheduler, controller) = attach(80, 60, config(ViewKind::Waves, 12));
    scheduler.run_frame();
    assert_eq!(Rc::weak_count(&surface), 1);

    let entities = controller.with_field(|field| {
        controller.detach();
        field.entity_count()
    });
    assert_eq!(entities, Some(12));
    assert_eq!(controller.state(), LoopState::Cancelled);
    assert_eq!(Rc::weak_count(&surface), 0, "surface reference must be released");
    assert_eq!(scheduler.run_frames(3), 0);
}
