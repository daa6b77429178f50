//! Animation loop controller: one per drawing surface.
//!
//! The controller owns its field, clock, and painter. It holds only weak
//! references to the surface and the scheduler, so a host dropping either
//! turns subsequent frames into no-ops instead of keeping them alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use arkhe_core::{DomainParams, EngineConfig, EngineError, Field};
use arkhe_render::{DrawingSurface, ScenePainter};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::scheduler::{FrameRequestId, FrameScheduler};

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("controller has been detached")]
    Detached,
    /// Raised when called re-entrantly from inside a frame.
    #[error("controller is rendering a frame")]
    Busy,
}

/// Where the frame loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Not waiting on the scheduler (scheduler gone).
    Idle,
    /// A frame request is pending.
    Scheduled,
    Rendering,
    /// Detached; no further frames will run.
    Cancelled,
}

/// Running counters for one controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub frames_rendered: u64,
    /// Frames where the surface was gone or already borrowed.
    pub frames_skipped: u64,
    /// Frames where the surface had zero area.
    pub degenerate_frames: u64,
    /// Backing-buffer reallocations.
    pub resizes: u64,
    pub reseeds: u64,
    pub draw_commands: u64,
}

enum FrameOutcome {
    Rendered { commands: usize, resized: bool },
    SurfaceUnavailable,
    Degenerate,
}

/// State readable and writable while a frame is running.
struct Shared {
    state: Cell<LoopState>,
    disposed: Cell<bool>,
    pending: Cell<Option<FrameRequestId>>,
    params: Cell<DomainParams>,
    stats: Cell<FrameStats>,
}

/// State only touched by the frame itself or between frames.
struct LoopCore {
    field: Field,
    painter: ScenePainter,
    /// Cleared on detach.
    surface: Option<Weak<RefCell<dyn DrawingSurface>>>,
}

impl LoopCore {
    fn frame(&mut self, params: DomainParams) -> FrameOutcome {
        let Some(handle) = self.surface.as_ref().and_then(Weak::upgrade) else {
            return FrameOutcome::SurfaceUnavailable;
        };
        let Ok(mut surface) = handle.try_borrow_mut() else {
            return FrameOutcome::SurfaceUnavailable;
        };

        self.field.set_params(params);
        let display = surface.display_size();
        if display.is_empty() {
            return FrameOutcome::Degenerate;
        }

        let resized = surface.backing_size() != display;
        if resized {
            surface.resize_backing(display);
            self.painter.invalidate();
        }
        let bounds = display.as_bounds();
        if self.field.bounds() != bounds {
            self.field.resize(bounds);
        }

        self.field.step();
        let commands = self.painter.paint(&self.field, &mut *surface);
        FrameOutcome::Rendered { commands, resized }
    }
}

/// Drives one surface's continuous animation.
pub struct AnimationController {
    shared: Rc<Shared>,
    core: Rc<RefCell<LoopCore>>,
    scheduler: Weak<dyn FrameScheduler>,
}

impl fmt::Debug for AnimationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationController")
            .field("state", &self.shared.state.get())
            .field("stats", &self.shared.stats.get())
            .finish()
    }
}

impl AnimationController {
    /// Validate `config`, bind to `surface`, and schedule the first frame.
    pub fn attach<S, F>(
        surface: &Rc<RefCell<S>>,
        config: EngineConfig,
        params: DomainParams,
        scheduler: &Rc<F>,
    ) -> Result<Self, ControllerError>
    where
        S: DrawingSurface + 'static,
        F: FrameScheduler + 'static,
    {
        let view = config.view;
        let entities = config.entity_count;
        let painter = ScenePainter::new(&config);
        let field = Field::new(config)?;

        let surface: Rc<RefCell<dyn DrawingSurface>> = surface.clone();
        let scheduler: Rc<dyn FrameScheduler> = scheduler.clone();
        let controller = Self {
            shared: Rc::new(Shared {
                state: Cell::new(LoopState::Idle),
                disposed: Cell::new(false),
                pending: Cell::new(None),
                params: Cell::new(params.sanitized()),
                stats: Cell::new(FrameStats::default()),
            }),
            core: Rc::new(RefCell::new(LoopCore {
                field,
                painter,
                surface: Some(Rc::downgrade(&surface)),
            })),
            scheduler: Rc::downgrade(&scheduler),
        };
        schedule_next(&controller.shared, &controller.core, &controller.scheduler);
        info!(view = view.as_str(), entities, "Animation controller attached");
        Ok(controller)
    }

    /// Replace the domain snapshot read at the top of the next frame.
    /// Entities are never reseeded by this path.
    pub fn update_params(&self, params: DomainParams) {
        if self.shared.disposed.get() {
            trace!("Ignoring parameter update on detached controller");
            return;
        }
        self.shared.params.set(params.sanitized());
    }

    /// Apply a new configuration. Returns whether entities were reseeded.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<bool, ControllerError> {
        if self.shared.disposed.get() {
            return Err(ControllerError::Detached);
        }
        let mut guard = self
            .core
            .try_borrow_mut()
            .map_err(|_| ControllerError::Busy)?;
        let core = &mut *guard;
        let reseeded = core.field.reconfigure(config)?;
        core.painter.reconfigure(core.field.config());
        let mut stats = self.shared.stats.get();
        stats.reseeds = core.field.reseeds();
        self.shared.stats.set(stats);
        debug!(reseeded, "Controller reconfigured");
        Ok(reseeded)
    }

    /// Stop the loop and release the surface. Idempotent, and callable from
    /// inside a frame or a [`Self::with_field`] closure; a running frame
    /// finishes drawing but does not reschedule.
    pub fn detach(&self) {
        if self.shared.disposed.replace(true) {
            return;
        }
        if let Some(id) = self.shared.pending.take()
            && let Some(scheduler) = self.scheduler.upgrade()
        {
            scheduler.cancel_frame(id);
        }
        self.shared.state.set(LoopState::Cancelled);
        self.release_surface();
        let stats = self.shared.stats.get();
        info!(
            frames = stats.frames_rendered,
            skipped = stats.frames_skipped,
            "Animation controller detached"
        );
    }

    #[must_use]
    pub fn state(&self) -> LoopState {
        self.shared.state.get()
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.shared.disposed.get()
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.shared.stats.get()
    }

    /// The snapshot the next frame will apply.
    #[must_use]
    pub fn params(&self) -> DomainParams {
        self.shared.params.get()
    }

    /// Read-only access to the field between frames. `None` while a frame is
    /// running.
    pub fn with_field<R>(&self, inspect: impl FnOnce(&Field) -> R) -> Option<R> {
        let result = self.core.try_borrow().ok().map(|core| inspect(&core.field));
        if self.shared.disposed.get() {
            self.release_surface();
        }
        result
    }

    /// Drop the surface reference unless the core is borrowed; whoever holds
    /// the borrow releases it afterwards.
    fn release_surface(&self) {
        if let Ok(mut core) = self.core.try_borrow_mut() {
            core.surface = None;
        }
    }
}

impl Drop for AnimationController {
    fn drop(&mut self) {
        self.detach();
    }
}

fn schedule_next(
    shared: &Rc<Shared>,
    core: &Rc<RefCell<LoopCore>>,
    scheduler: &Weak<dyn FrameScheduler>,
) {
    let Some(handle) = scheduler.upgrade() else {
        shared.state.set(LoopState::Idle);
        return;
    };
    let callback = {
        let shared = Rc::downgrade(shared);
        let core = Rc::downgrade(core);
        let scheduler = scheduler.clone();
        Box::new(move || {
            if let (Some(shared), Some(core)) = (shared.upgrade(), core.upgrade()) {
                run_frame(&shared, &core, &scheduler);
            }
        })
    };
    let id = handle.request_frame(callback);
    shared.pending.set(Some(id));
    shared.state.set(LoopState::Scheduled);
}

fn run_frame(
    shared: &Rc<Shared>,
    core: &Rc<RefCell<LoopCore>>,
    scheduler: &Weak<dyn FrameScheduler>,
) {
    shared.pending.set(None);
    if shared.disposed.get() {
        shared.state.set(LoopState::Cancelled);
        return;
    }

    shared.state.set(LoopState::Rendering);
    let outcome = match core.try_borrow_mut() {
        Ok(mut core) => core.frame(shared.params.get()),
        Err(_) => FrameOutcome::SurfaceUnavailable,
    };

    let mut stats = shared.stats.get();
    match outcome {
        FrameOutcome::Rendered { commands, resized } => {
            stats.frames_rendered += 1;
            stats.draw_commands += commands as u64;
            if resized {
                stats.resizes += 1;
            }
        }
        FrameOutcome::SurfaceUnavailable => {
            stats.frames_skipped += 1;
            trace!("Surface unavailable; skipping frame");
        }
        FrameOutcome::Degenerate => {
            stats.degenerate_frames += 1;
            trace!("Surface has zero area; skipping frame");
        }
    }
    if let Ok(core) = core.try_borrow() {
        stats.reseeds = core.field.reseeds();
    }
    shared.stats.set(stats);

    if shared.disposed.get() {
        // Detached mid-frame: release what the deferred detach could not.
        if let Ok(mut core) = core.try_borrow_mut() {
            core.surface = None;
        }
        shared.state.set(LoopState::Cancelled);
        return;
    }
    schedule_next(shared, core, scheduler);
}
