//! Everything the reactive layer mutates
//!
//! The [`World`] holds the scene graph, the native collaborators and the
//! shared resource pools. Effects reach it through a [`SharedWorld`] and keep
//! each borrow to a single statement or block; a cleanup or commit never runs
//! while another borrow is alive because the graph drives them between
//! statements.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use stagecraft_core::{signature_of, Release, ResourceKind, ResourcePool};
use std::cell::RefCell;
use std::rc::Rc;

use crate::display::{BodyBinding, MaterialParams, PhysicsMode};
use crate::engine::Gizmo;
use crate::error::{Result, StageError};
use crate::physics::PhysicsBackend;
use crate::render::{
    MaterialDesc, MaterialHandle, RenderBackend, RendererHandle, TextureDesc, TextureHandle,
    TextureSource,
};
use crate::scene::{NodeId, SceneGraph};

/// Pool namespace for textures
pub const TEXTURE: ResourceKind = ResourceKind::new("texture");
/// Pool namespace for materials
pub const MATERIAL: ResourceKind = ResourceKind::new("material");

/// World handle shared by effects, cleanups and commits
pub type SharedWorld = Rc<RefCell<World>>;

/// A pooled material and the texture signatures it holds
#[derive(Clone, Debug)]
pub struct PooledMaterial {
    pub handle: MaterialHandle,
    textures: SmallVec<[String; 2]>,
}

impl PooledMaterial {
    /// Texture signatures this material keeps alive
    pub fn texture_signatures(&self) -> &[String] {
        &self.textures
    }
}

pub struct World {
    pub scene: SceneGraph,
    physics: Option<Box<dyn PhysicsBackend>>,
    renderer: Box<dyn RenderBackend>,
    textures: ResourcePool<TextureHandle>,
    materials: ResourcePool<PooledMaterial>,
    bodies: FxHashMap<NodeId, BodyBinding>,
    /// Joint holds per body: count and the mode before the first hold
    holds: FxHashMap<NodeId, (usize, PhysicsMode)>,
    pub(crate) editor_plane: Option<NodeId>,
    pub(crate) gizmo: Option<Gizmo>,
}

impl World {
    pub fn new(renderer: Box<dyn RenderBackend>) -> Self {
        Self {
            scene: SceneGraph::new(),
            physics: None,
            renderer,
            textures: ResourcePool::new(),
            materials: ResourcePool::new(),
            bodies: FxHashMap::default(),
            holds: FxHashMap::default(),
            editor_plane: None,
            gizmo: None,
        }
    }

    pub fn shared(self) -> SharedWorld {
        Rc::new(RefCell::new(self))
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    pub fn physics(&self) -> Option<&dyn PhysicsBackend> {
        self.physics.as_deref()
    }

    pub fn physics_mut(&mut self) -> Option<&mut (dyn PhysicsBackend + 'static)> {
        self.physics.as_deref_mut()
    }

    /// Installed physics backend, or [`StageError::PhysicsUnavailable`]
    pub fn require_physics(&mut self) -> Result<&mut (dyn PhysicsBackend + 'static)> {
        self.physics_mut().ok_or(StageError::PhysicsUnavailable)
    }

    /// Swap the physics backend, returning the previous one
    pub fn set_physics(
        &mut self,
        backend: Option<Box<dyn PhysicsBackend>>,
    ) -> Option<Box<dyn PhysicsBackend>> {
        std::mem::replace(&mut self.physics, backend)
    }

    pub fn renderer(&self) -> &dyn RenderBackend {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> &mut dyn RenderBackend {
        self.renderer.as_mut()
    }

    /// Downcast the physics backend
    pub fn physics_as<T: 'static>(&self) -> Option<&T> {
        self.physics.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Downcast the render backend
    pub fn renderer_as<T: 'static>(&self) -> Option<&T> {
        self.renderer.as_any().downcast_ref::<T>()
    }

    /// Draw the scene with a renderer created by this world's backend
    pub fn render(&mut self, renderer: RendererHandle, pixel_ratio: f32) -> Result<()> {
        self.renderer.render(renderer, &self.scene, pixel_ratio)?;
        Ok(())
    }

    // =========================================================================
    // Physics bodies
    // =========================================================================

    pub(crate) fn register_body(&mut self, node: NodeId, binding: BodyBinding) {
        self.bodies.insert(node, binding);
    }

    pub(crate) fn unregister_body(&mut self, node: NodeId) -> Option<BodyBinding> {
        self.holds.remove(&node);
        self.bodies.remove(&node)
    }

    /// Record a joint's hold on a body whose mode is currently `mode`
    ///
    /// Returns true for the first hold; only that one remembers the mode.
    pub(crate) fn hold_body(&mut self, node: NodeId, mode: PhysicsMode) -> bool {
        let entry = self.holds.entry(node).or_insert((0, mode));
        entry.0 += 1;
        entry.0 == 1
    }

    /// Drop a joint's hold; the last release returns the mode to restore
    pub(crate) fn release_body(&mut self, node: NodeId) -> Option<PhysicsMode> {
        let entry = self.holds.get_mut(&node)?;
        entry.0 -= 1;
        if entry.0 > 0 {
            return None;
        }
        self.holds.remove(&node).map(|(_, prior)| prior)
    }

    /// Number of joints holding `node`
    pub fn body_holds(&self, node: NodeId) -> usize {
        self.holds.get(&node).map_or(0, |(count, _)| *count)
    }

    /// Physics cells of the object that owns `node`
    pub fn body(&self, node: NodeId) -> Option<BodyBinding> {
        self.bodies.get(&node).copied()
    }

    /// Node of the editor's ground plane
    pub fn editor_plane(&self) -> Option<NodeId> {
        self.editor_plane
    }

    /// Current transform gizmo attachment
    pub fn gizmo(&self) -> Option<&Gizmo> {
        self.gizmo.as_ref()
    }

    // =========================================================================
    // Pooled resources
    // =========================================================================

    /// Acquire a shared texture; returns its pool signature and handle
    pub fn acquire_texture(&mut self, desc: &TextureDesc) -> Result<(String, TextureHandle)> {
        let signature = signature_of(desc)?;
        let renderer = &mut self.renderer;
        let handle = self
            .textures
            .acquire(TEXTURE, &signature, || renderer.create_texture(desc))?;
        Ok((signature, handle))
    }

    /// Release a texture acquired with [`World::acquire_texture`]
    pub fn release_texture(&mut self, signature: &str) -> Result<Release> {
        let mut disposed = None;
        let release = self
            .textures
            .release(TEXTURE, signature, |handle| disposed = Some(handle))?;
        if let Some(handle) = disposed {
            self.renderer.dispose_texture(handle)?;
        }
        Ok(release)
    }

    /// Acquire a shared material; returns its pool signature and entry
    ///
    /// A new material acquires its textures from the texture pool. Texture
    /// references that cannot be classified are skipped with a warning.
    pub fn acquire_material(&mut self, params: &MaterialParams) -> Result<(String, PooledMaterial)> {
        let signature = signature_of(params)?;
        if let Some(existing) = self.materials.peek(MATERIAL, &signature).cloned() {
            let pooled = self
                .materials
                .acquire(MATERIAL, &signature, || Ok::<_, StageError>(existing))?;
            return Ok((signature, pooled));
        }

        let mut held: SmallVec<[String; 2]> = SmallVec::new();
        let created = self.create_material(params, &mut held);
        let material = match created {
            Ok(handle) => PooledMaterial {
                handle,
                textures: held,
            },
            Err(e) => {
                for texture in &held {
                    self.release_texture(texture)?;
                }
                return Err(e);
            }
        };

        let pooled = self
            .materials
            .acquire(MATERIAL, &signature, || Ok::<_, StageError>(material))?;
        Ok((signature, pooled))
    }

    fn create_material(
        &mut self,
        params: &MaterialParams,
        held: &mut SmallVec<[String; 2]>,
    ) -> Result<MaterialHandle> {
        let map = match params.texture.as_deref() {
            Some(source) => self.texture_for(source, params, held)?,
            None => None,
        };
        let alpha_map = match params.alpha_map.as_deref() {
            Some(source) => self.texture_for(source, params, held)?,
            None => None,
        };

        let desc = MaterialDesc {
            color: params.color.clone(),
            opacity: params.opacity,
            transparent: params.opacity.is_some_and(|o| o < 1.0),
            map,
            alpha_map,
        };
        Ok(self.renderer.create_material(&desc)?)
    }

    fn texture_for(
        &mut self,
        source: &str,
        params: &MaterialParams,
        held: &mut SmallVec<[String; 2]>,
    ) -> Result<Option<TextureHandle>> {
        let Some(source) = TextureSource::classify(source) else {
            tracing::warn!(source, "unsupported texture source, material has no map");
            return Ok(None);
        };

        let desc = TextureDesc {
            source,
            repeat: params.texture_repeat,
            flip_y: params.texture_flip_y,
            rotation: params.texture_rotation,
        };
        let (signature, handle) = self.acquire_texture(&desc)?;
        held.push(signature);
        Ok(Some(handle))
    }

    /// Release a material acquired with [`World::acquire_material`]
    ///
    /// Disposing the material also releases the textures it held. Every
    /// texture is released even when a step fails; the first error is
    /// returned.
    pub fn release_material(&mut self, signature: &str) -> Result<Release> {
        let mut disposed = None;
        let release = self
            .materials
            .release(MATERIAL, signature, |material| disposed = Some(material))?;

        if let Some(material) = disposed {
            let mut first_err = self
                .renderer
                .dispose_material(material.handle)
                .err()
                .map(StageError::from);
            for texture in &material.textures {
                if let Err(err) = self.release_texture(texture) {
                    first_err.get_or_insert(err);
                }
            }
            if let Some(err) = first_err {
                tracing::error!(signature, error = %err, "material release failed");
                return Err(err);
            }
        }
        Ok(release)
    }

    pub fn texture_refs(&self, signature: &str) -> usize {
        self.textures.ref_count(TEXTURE, signature)
    }

    pub fn material_refs(&self, signature: &str) -> usize {
        self.materials.ref_count(MATERIAL, signature)
    }

    pub fn texture_pool(&self) -> &ResourcePool<TextureHandle> {
        &self.textures
    }

    pub fn material_pool(&self) -> &ResourcePool<PooledMaterial> {
        &self.materials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HeadlessRenderer, RenderBackend};

    fn world() -> World {
        World::new(Box::new(HeadlessRenderer::new()))
    }

    fn textured(color: &str) -> MaterialParams {
        MaterialParams {
            color: Some(color.into()),
            texture: Some("maps/grid.png".into()),
            texture_repeat: Some([2.0, 2.0]),
            ..Default::default()
        }
    }

    #[test]
    fn test_materials_share_textures() {
        let mut world = world();

        let (red, red_mat) = world.acquire_material(&textured("#ff0000")).unwrap();
        let (blue, blue_mat) = world.acquire_material(&textured("#0000ff")).unwrap();
        assert_ne!(red_mat.handle, blue_mat.handle);

        let texture = &red_mat.texture_signatures()[0];
        assert_eq!(blue_mat.texture_signatures()[0], *texture);
        assert_eq!(world.texture_refs(texture), 2);

        world.release_material(&red).unwrap();
        assert_eq!(world.texture_refs(texture), 1);

        world.release_material(&blue).unwrap();
        assert_eq!(world.texture_refs(texture), 0);
        let renderer = world.renderer_as::<HeadlessRenderer>().unwrap();
        assert_eq!(renderer.stats().textures, 0);
        assert_eq!(renderer.stats().materials, 0);
    }

    #[test]
    fn test_equal_params_share_material() {
        let mut world = world();

        let (sig_a, a) = world.acquire_material(&textured("#00ff00")).unwrap();
        let (sig_b, b) = world.acquire_material(&textured("#00ff00")).unwrap();
        assert_eq!(sig_a, sig_b);
        assert_eq!(a.handle, b.handle);
        assert_eq!(world.material_refs(&sig_a), 2);
        assert_eq!(world.texture_refs(&a.texture_signatures()[0]), 1);

        assert_eq!(world.release_material(&sig_a).unwrap(), Release::Retained(1));
        assert_eq!(world.release_material(&sig_b).unwrap(), Release::Disposed);
        assert!(world.release_material(&sig_b).is_err());
    }

    #[test]
    fn test_unknown_texture_source_yields_plain_material() {
        let mut world = world();
        let params = MaterialParams {
            texture: Some("notes.txt".into()),
            ..Default::default()
        };

        let (_, material) = world.acquire_material(&params).unwrap();
        assert!(material.texture_signatures().is_empty());
        assert!(world.texture_pool().is_empty());
    }

    #[test]
    fn test_material_dispose_error_still_releases_textures() {
        let mut world = world();
        let (signature, material) = world.acquire_material(&textured("#ffffff")).unwrap();
        let texture = material.texture_signatures()[0].clone();
        world.renderer_mut().dispose_material(material.handle).unwrap();

        let err = world.release_material(&signature).unwrap_err();
        assert!(matches!(err, StageError::Render(_)));
        assert_eq!(world.texture_refs(&texture), 0);
        assert!(world.texture_pool().is_empty());
        assert_eq!(world.renderer().stats().textures, 0);
    }

    #[test]
    fn test_body_holds_remember_first_mode() {
        let mut world = world();
        let node = world.scene.insert("endpoint");

        assert!(world.hold_body(node, PhysicsMode::Off));
        assert!(!world.hold_body(node, PhysicsMode::Dynamic));
        assert_eq!(world.body_holds(node), 2);

        assert_eq!(world.release_body(node), None);
        assert_eq!(world.release_body(node), Some(PhysicsMode::Off));
        assert_eq!(world.body_holds(node), 0);
        assert_eq!(world.release_body(node), None);
    }

    #[test]
    fn test_failed_material_releases_its_textures() {
        let mut world = world();
        let params = MaterialParams {
            color: Some("not a color".into()),
            texture: Some("maps/grid.png".into()),
            ..Default::default()
        };

        assert!(world.acquire_material(&params).is_err());
        assert!(world.texture_pool().is_empty());
        assert!(world.material_pool().is_empty());
        assert_eq!(world.renderer().stats().textures, 0);
    }
}
