//! Engine systems driven by the stage: frame loop, renderer lifetime,
//! transform gizmo and snapping

mod event_loop;
mod renderer;
mod snap;
mod transform_controls;

pub use event_loop::{EventLoop, FrameGovernor, FrameOutcome, GovernorDecision, LoopId};
pub use renderer::renderer_effect;
pub use snap::SnapSystem;
pub use transform_controls::{
    Axis, Gizmo, TransformControls, TransformControlsEvent, TransformPhase,
};
