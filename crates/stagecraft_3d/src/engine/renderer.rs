//! Native renderer lifetime

use stagecraft_core::{Effect, ReactiveGraph};

use crate::error::Result;
use crate::render::RendererConfig;
use crate::state::StageState;
use crate::world::SharedWorld;

/// Create the renderer, recreating it whenever the background flag changes
pub fn renderer_effect(
    graph: &mut ReactiveGraph,
    world: SharedWorld,
    state: StageState,
    shadows: bool,
) -> Result<Effect> {
    let effect = graph.create_effect_labeled("renderer", move |cx| {
        let alpha = cx.get(state.transparent_background).unwrap_or(false);
        let config = RendererConfig { alpha, shadows };

        let handle = world.borrow_mut().renderer_mut().create_renderer(&config)?;
        tracing::debug!(?handle, alpha, shadows, "renderer created");
        cx.set(state.renderer, Some(handle));

        let world = world.clone();
        cx.on_cleanup(move |graph| {
            graph.set(state.renderer, None);
            world.borrow_mut().renderer_mut().dispose_renderer(handle)?;
            Ok(())
        });
        Ok(())
    })?;
    Ok(effect)
}
