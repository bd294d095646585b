//! Pooled materials on scene nodes
//!
//! Setting any texture or color parameter rewrites one cell; the material
//! effect re-runs once per tick no matter how many parameters changed,
//! releasing the previous pooled material before acquiring the new one.

use serde::Serialize;
use stagecraft_core::{Effect, ReactiveGraph, Signal};

use crate::error::{Result, StageError};
use crate::render::MaterialHandle;
use crate::scene::NodeId;
use crate::world::SharedWorld;

/// Material parameters; equal parameters share one pooled material
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MaterialParams {
    pub color: Option<String>,
    pub opacity: Option<f32>,
    /// Image path, video path or video element selector
    pub texture: Option<String>,
    pub alpha_map: Option<String>,
    pub texture_repeat: Option<[f32; 2]>,
    pub texture_flip_y: Option<bool>,
    /// Degrees
    pub texture_rotation: Option<f32>,
}

/// Material binding for one node
pub struct TexturedMaterial {
    node: NodeId,
    world: SharedWorld,
    params: Signal<MaterialParams>,
    material: Signal<Option<MaterialHandle>>,
    effect: Effect,
}

impl TexturedMaterial {
    pub fn new(graph: &mut ReactiveGraph, world: SharedWorld, node: NodeId) -> Result<Self> {
        Self::with_params(graph, world, node, MaterialParams::default())
    }

    pub fn with_params(
        graph: &mut ReactiveGraph,
        world: SharedWorld,
        node: NodeId,
        params: MaterialParams,
    ) -> Result<Self> {
        if !world.borrow().scene.contains(node) {
            return Err(StageError::UnknownNode(node));
        }

        let params = graph.create_signal(params);
        let material = graph.create_signal(None);

        let effect_world = world.clone();
        let effect = graph.create_effect_labeled("material", move |cx| {
            let Some(current) = cx.get(params) else {
                return Ok(());
            };

            let (signature, pooled) = effect_world.borrow_mut().acquire_material(&current)?;
            if let Some(node) = effect_world.borrow_mut().scene.get_mut(node) {
                node.material = Some(pooled.handle);
            }
            cx.set(material, Some(pooled.handle));

            let world = effect_world.clone();
            cx.on_cleanup(move |graph| {
                graph.set(material, None);
                let mut w = world.borrow_mut();
                if let Some(node) = w.scene.get_mut(node) {
                    if node.material == Some(pooled.handle) {
                        node.material = None;
                    }
                }
                w.release_material(&signature)?;
                Ok(())
            });
            Ok(())
        })?;

        Ok(Self {
            node,
            world,
            params,
            material,
            effect,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Current native material
    pub fn material(&self, graph: &ReactiveGraph) -> Option<MaterialHandle> {
        graph.get_untracked(self.material).flatten()
    }

    pub fn params(&self, graph: &ReactiveGraph) -> MaterialParams {
        graph.get_untracked(self.params).unwrap_or_default()
    }

    /// Replace all parameters at once
    pub fn set_params(&self, graph: &mut ReactiveGraph, params: MaterialParams) {
        graph.set(self.params, params);
    }

    pub fn set_color(&self, graph: &mut ReactiveGraph, color: Option<String>) {
        self.edit(graph, |p| p.color = color);
    }

    pub fn set_opacity(&self, graph: &mut ReactiveGraph, opacity: Option<f32>) {
        self.edit(graph, |p| p.opacity = opacity);
    }

    pub fn set_texture(&self, graph: &mut ReactiveGraph, texture: Option<String>) {
        self.edit(graph, |p| p.texture = texture);
    }

    pub fn set_alpha_map(&self, graph: &mut ReactiveGraph, alpha_map: Option<String>) {
        self.edit(graph, |p| p.alpha_map = alpha_map);
    }

    pub fn set_texture_repeat(&self, graph: &mut ReactiveGraph, repeat: Option<[f32; 2]>) {
        self.edit(graph, |p| p.texture_repeat = repeat);
    }

    pub fn set_texture_flip_y(&self, graph: &mut ReactiveGraph, flip_y: Option<bool>) {
        self.edit(graph, |p| p.texture_flip_y = flip_y);
    }

    pub fn set_texture_rotation(&self, graph: &mut ReactiveGraph, degrees: Option<f32>) {
        self.edit(graph, |p| p.texture_rotation = degrees);
    }

    fn edit(&self, graph: &mut ReactiveGraph, apply: impl FnOnce(&mut MaterialParams)) {
        graph.update(self.params, |mut params| {
            apply(&mut params);
            params
        });
    }

    /// Release the pooled material
    pub fn dispose(self, graph: &mut ReactiveGraph) -> Result<()> {
        graph.dispose_effect(self.effect)?;
        graph.dispose_signal(self.params);
        graph.dispose_signal(self.material);
        tracing::trace!(
            node = ?self.node,
            pooled = self.world.borrow().material_pool().len(),
            "material disposed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessRenderer;
    use crate::world::World;

    fn setup() -> (ReactiveGraph, SharedWorld) {
        (
            ReactiveGraph::new(),
            World::new(Box::new(HeadlessRenderer::new())).shared(),
        )
    }

    fn textures(world: &SharedWorld) -> usize {
        world.borrow().renderer().stats().textures
    }

    #[test]
    fn test_parameter_burst_rebuilds_once() {
        let (mut graph, world) = setup();
        let node = world.borrow_mut().scene.insert("floor");
        let material = TexturedMaterial::new(&mut graph, world.clone(), node).unwrap();
        let first = material.material(&graph).unwrap();

        material.set_texture(&mut graph, Some("maps/tiles.png".into()));
        material.set_texture_repeat(&mut graph, Some([4.0, 4.0]));
        material.set_texture_rotation(&mut graph, Some(90.0));
        let report = graph.tick().unwrap();

        assert_eq!(report.effects_run, 1);
        assert_eq!(textures(&world), 1);
        let current = material.material(&graph).unwrap();
        assert_ne!(current, first);
        assert_eq!(world.borrow().scene.get(node).unwrap().material, Some(current));

        let w = world.borrow();
        let renderer = w.renderer_as::<HeadlessRenderer>().unwrap();
        let desc = renderer.material(current).unwrap();
        let texture = renderer.texture(desc.map.unwrap()).unwrap();
        assert_eq!(texture.repeat, Some([4.0, 4.0]));
        assert_eq!(texture.rotation, Some(90.0));
        assert!(renderer.material(first).is_none());
    }

    #[test]
    fn test_two_nodes_share_texture_until_both_release() {
        let (mut graph, world) = setup();
        let a = world.borrow_mut().scene.insert("a");
        let b = world.borrow_mut().scene.insert("b");
        let params = |color: &str| MaterialParams {
            color: Some(color.into()),
            texture: Some("maps/wood.jpg".into()),
            ..Default::default()
        };

        let mat_a = TexturedMaterial::with_params(&mut graph, world.clone(), a, params("#aa0000")).unwrap();
        let mat_b = TexturedMaterial::with_params(&mut graph, world.clone(), b, params("#00aa00")).unwrap();
        assert_eq!(textures(&world), 1);

        mat_a.dispose(&mut graph).unwrap();
        assert_eq!(textures(&world), 1);
        assert_eq!(world.borrow().scene.get(a).unwrap().material, None);

        mat_b.dispose(&mut graph).unwrap();
        assert_eq!(textures(&world), 0);
        assert_eq!(world.borrow().renderer().stats().materials, 0);
    }

    #[test]
    fn test_opacity_below_one_is_transparent() {
        let (mut graph, world) = setup();
        let node = world.borrow_mut().scene.insert("glass");
        let material = TexturedMaterial::new(&mut graph, world.clone(), node).unwrap();

        material.set_opacity(&mut graph, Some(0.4));
        graph.tick().unwrap();

        let handle = material.material(&graph).unwrap();
        let w = world.borrow();
        let desc = w.renderer_as::<HeadlessRenderer>().unwrap().material(handle).unwrap();
        assert!(desc.transparent);
    }

    #[test]
    fn test_invalid_color_surfaces_from_tick() {
        let (mut graph, world) = setup();
        let node = world.borrow_mut().scene.insert("box");
        let material = TexturedMaterial::new(&mut graph, world.clone(), node).unwrap();

        material.set_color(&mut graph, Some("chartreuse-ish".into()));
        assert!(graph.tick().is_err());
        assert_eq!(material.material(&graph), None);
        assert_eq!(world.borrow().renderer().stats().materials, 0);
    }
}
