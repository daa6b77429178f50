//! Multi-panel dashboard host driving several controllers from one
//! cooperative scheduler.

use std::cell::RefCell;
use std::rc::Rc;

use arkhe_core::{DomainParams, EngineConfig, FieldMode, ViewKind};
use arkhe_render::{DrawingSurface, RasterSurface, SurfaceSize};
use serde::Serialize;
use slotmap::{Key, SlotMap, new_key_type};
use thiserror::Error;
use tracing::{debug, info};

use crate::controller::{AnimationController, ControllerError, FrameStats, LoopState};
use crate::scheduler::ManualScheduler;

new_key_type! {
    /// Generational handle for a mounted panel.
    pub struct PanelId;
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("panel {0:?} is not mounted")]
    UnknownPanel(PanelId),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("failed to encode panel snapshot: {0}")]
    Snapshot(#[from] image::ImageError),
}

#[derive(Debug)]
struct Panel {
    surface: Rc<RefCell<RasterSurface>>,
    controller: AnimationController,
    config: EngineConfig,
}

impl Panel {
    fn attach(
        config: EngineConfig,
        size: SurfaceSize,
        params: DomainParams,
        scheduler: &Rc<ManualScheduler>,
    ) -> Result<Self, HostError> {
        let surface = Rc::new(RefCell::new(RasterSurface::new(size.width, size.height)));
        let controller =
            AnimationController::attach(&surface, config.clone(), params, scheduler)?;
        Ok(Self {
            surface,
            controller,
            config,
        })
    }
}

/// Per-panel entry in a [`DashboardReport`].
#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    pub panel: u64,
    pub view: ViewKind,
    pub width: u32,
    pub height: u32,
    pub entities: usize,
    /// Force model the field is running.
    pub mode: FieldMode,
    pub time: f64,
    pub state: LoopState,
    pub stats: FrameStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub ticks: u64,
    pub panels: Vec<PanelReport>,
}

/// Owns the panels' surfaces and controllers.
#[derive(Debug, Default)]
pub struct Dashboard {
    scheduler: Rc<ManualScheduler>,
    panels: SlotMap<PanelId, Panel>,
    ticks: u64,
}

impl Dashboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a surface of `width`x`height` and start animating it.
    pub fn mount(
        &mut self,
        config: EngineConfig,
        width: u32,
        height: u32,
        params: DomainParams,
    ) -> Result<PanelId, HostError> {
        let view = config.view;
        let size = SurfaceSize::new(width, height);
        let panel = Panel::attach(config, size, params, &self.scheduler)?;
        let id = self.panels.insert(panel);
        info!(panel = ?id, view = view.as_str(), width, height, "Mounted panel");
        Ok(id)
    }

    pub fn update_params(&self, id: PanelId, params: DomainParams) -> Result<(), HostError> {
        self.panel(id)?.controller.update_params(params);
        Ok(())
    }

    /// Lay the panel out at a new size. The controller picks the change up on
    /// its next frame.
    pub fn resize(&self, id: PanelId, width: u32, height: u32) -> Result<(), HostError> {
        let panel = self.panel(id)?;
        panel.surface.borrow_mut().set_display_size(width, height);
        debug!(panel = ?id, width, height, "Resized panel");
        Ok(())
    }

    /// Swap the panel onto a fresh surface. The old controller is detached and
    /// a new one attached with the same configuration and parameters.
    pub fn replace_surface(
        &mut self,
        id: PanelId,
        width: u32,
        height: u32,
    ) -> Result<(), HostError> {
        let scheduler = Rc::clone(&self.scheduler);
        let panel = self.panels.get_mut(id).ok_or(HostError::UnknownPanel(id))?;
        let params = panel.controller.params();
        panel.controller.detach();
        *panel = Panel::attach(
            panel.config.clone(),
            SurfaceSize::new(width, height),
            params,
            &scheduler,
        )?;
        info!(panel = ?id, width, height, "Replaced panel surface");
        Ok(())
    }

    /// Returns whether the change reseeded the panel's entities.
    pub fn reconfigure(&mut self, id: PanelId, config: EngineConfig) -> Result<bool, HostError> {
        let panel = self.panels.get_mut(id).ok_or(HostError::UnknownPanel(id))?;
        let reseeded = panel.controller.reconfigure(config.clone())?;
        panel.config = config;
        Ok(reseeded)
    }

    /// Detach and drop the panel, returning its final counters.
    pub fn unmount(&mut self, id: PanelId) -> Result<FrameStats, HostError> {
        let panel = self.panels.remove(id).ok_or(HostError::UnknownPanel(id))?;
        panel.controller.detach();
        let stats = panel.controller.stats();
        info!(panel = ?id, frames = stats.frames_rendered, "Unmounted panel");
        Ok(stats)
    }

    /// Run one host frame. Returns the number of controller frames run.
    pub fn tick(&mut self) -> usize {
        self.ticks += 1;
        self.scheduler.run_frame()
    }

    pub fn run(&mut self, frames: usize) -> usize {
        (0..frames).map(|_| self.tick()).sum()
    }

    /// PNG encoding of the panel's current backing buffer.
    pub fn snapshot_png(&self, id: PanelId) -> Result<Vec<u8>, HostError> {
        Ok(self.panel(id)?.surface.borrow().to_png()?)
    }

    #[must_use]
    pub fn report(&self) -> DashboardReport {
        let panels = self
            .panels
            .iter()
            .map(|(id, panel)| {
                let (entities, mode, time) = panel
                    .controller
                    .with_field(|field| {
                        (
                            field.entity_count(),
                            field.coefficients().mode,
                            field.time().value(),
                        )
                    })
                    .unwrap_or_default();
                let size = panel.surface.borrow().display_size();
                PanelReport {
                    panel: id.data().as_ffi(),
                    view: panel.config.view,
                    width: size.width,
                    height: size.height,
                    entities,
                    mode,
                    time,
                    state: panel.controller.state(),
                    stats: panel.controller.stats(),
                }
            })
            .collect();
        DashboardReport {
            ticks: self.ticks,
            panels,
        }
    }

    pub fn panel_ids(&self) -> impl Iterator<Item = PanelId> + '_ {
        self.panels.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: PanelId) -> bool {
        self.panels.contains_key(id)
    }

    #[must_use]
    pub fn controller(&self, id: PanelId) -> Option<&AnimationController> {
        self.panels.get(id).map(|panel| &panel.controller)
    }

    #[must_use]
    pub fn scheduler(&self) -> &Rc<ManualScheduler> {
        &self.scheduler
    }

    fn panel(&self, id: PanelId) -> Result<&Panel, HostError> {
        self.panels.get(id).ok_or(HostError::UnknownPanel(id))
    }
}
