//! Stage-wide reactive state
//!
//! One table of cells per [`Stage`](crate::stage::Stage), created in
//! `Stage::new` and disposed in `Stage::shutdown`. Effects read these cells
//! like any other dependency.

use serde::{Deserialize, Serialize};
use stagecraft_core::{ReactiveGraph, Signal};

use crate::config::StageConfig;
use crate::render::RendererHandle;
use crate::scene::NodeId;

/// Active editor tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditorMode {
    #[default]
    Select,
    Translate,
    Rotate,
    Scale,
    /// Path editing drags points like translation
    Path,
}

impl EditorMode {
    /// Gizmo mode for this tool, if it shows one
    pub fn gizmo_mode(&self) -> Option<GizmoMode> {
        match self {
            EditorMode::Select => None,
            EditorMode::Translate | EditorMode::Path => Some(GizmoMode::Translate),
            EditorMode::Rotate => Some(GizmoMode::Rotate),
            EditorMode::Scale => Some(GizmoMode::Scale),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GizmoMode {
    Translate,
    Rotate,
    Scale,
}

/// Frame the gizmo axes are expressed in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformSpace {
    #[default]
    World,
    Local,
}

/// Cells shared by the engine systems
#[derive(Clone, Copy, Debug)]
pub struct StageState {
    /// Current native renderer
    pub renderer: Signal<Option<RendererHandle>>,
    /// Resolution multiplier applied when rendering
    pub pixel_ratio: Signal<f32>,
    pub paused: Signal<bool>,
    pub transparent_background: Signal<bool>,
    /// Whether a physics backend is installed
    pub physics_ready: Signal<bool>,
    pub selection_target: Signal<Option<NodeId>>,
    pub editor_mode: Signal<EditorMode>,
    pub transform_space: Signal<TransformSpace>,
    /// Gizmo step for translate/rotate/scale
    pub transform_snap: Signal<Option<f32>>,
    /// Raycast snapping while dragging
    pub snapping: Signal<bool>,
    /// True between drag start and drag end
    pub dragging: Signal<bool>,
}

impl StageState {
    pub fn new(graph: &mut ReactiveGraph, config: &StageConfig) -> Self {
        Self {
            renderer: graph.create_signal(None),
            pixel_ratio: graph.create_signal(config.renderer.initial_pixel_ratio),
            paused: graph.create_signal(false),
            transparent_background: graph.create_signal(config.renderer.transparent_background),
            physics_ready: graph.create_signal(false),
            selection_target: graph.create_signal(None),
            editor_mode: graph.create_signal(EditorMode::default()),
            transform_space: graph.create_signal(TransformSpace::default()),
            transform_snap: graph.create_signal(None),
            snapping: graph.create_signal(false),
            dragging: graph.create_signal(false),
        }
    }

    /// Remove every cell from the graph
    pub fn dispose(self, graph: &mut ReactiveGraph) {
        graph.dispose_signal(self.renderer);
        graph.dispose_signal(self.pixel_ratio);
        graph.dispose_signal(self.paused);
        graph.dispose_signal(self.transparent_background);
        graph.dispose_signal(self.physics_ready);
        graph.dispose_signal(self.selection_target);
        graph.dispose_signal(self.editor_mode);
        graph.dispose_signal(self.transform_space);
        graph.dispose_signal(self.transform_snap);
        graph.dispose_signal(self.snapping);
        graph.dispose_signal(self.dragging);
    }
}
