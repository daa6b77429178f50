//! Frame loop plumbing for Arkhe(N) panels: scheduling, the per-surface
//! animation controller, and a multi-panel dashboard host.

pub mod controller;
pub mod host;
pub mod scheduler;

pub use controller::{AnimationController, ControllerError, FrameStats, LoopState};
pub use host::{Dashboard, DashboardReport, HostError, PanelId, PanelReport};
pub use scheduler::{FrameCallback, FrameRequestId, FrameScheduler, ManualScheduler};
