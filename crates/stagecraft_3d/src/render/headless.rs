//! Bookkeeping render backend

use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;

use super::{
    MaterialDesc, MaterialHandle, RenderBackend, RenderError, RenderStats, RendererConfig,
    RendererHandle, TextureDesc, TextureHandle,
};
use crate::scene::SceneGraph;

/// Render backend that validates parameters and tracks live objects
pub struct HeadlessRenderer {
    renderers: FxHashMap<u64, RendererConfig>,
    textures: FxHashMap<u64, TextureDesc>,
    materials: FxHashMap<u64, MaterialDesc>,
    next_handle: u64,
    frames: u64,
    last_pixel_ratio: Option<f32>,
    last_visible_nodes: usize,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self {
            renderers: FxHashMap::default(),
            textures: FxHashMap::default(),
            materials: FxHashMap::default(),
            next_handle: 1,
            frames: 0,
            last_pixel_ratio: None,
            last_visible_nodes: 0,
        }
    }

    pub fn renderer(&self, handle: RendererHandle) -> Option<&RendererConfig> {
        self.renderers.get(&handle.0)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(&handle.0)
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&MaterialDesc> {
        self.materials.get(&handle.0)
    }

    /// Pixel ratio of the last rendered frame
    pub fn last_pixel_ratio(&self) -> Option<f32> {
        self.last_pixel_ratio
    }

    /// Number of visible nodes drawn in the last frame
    pub fn last_visible_nodes(&self) -> usize {
        self.last_visible_nodes
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(parameter: &'static str, value: impl ToString) -> RenderError {
    RenderError::InvalidParameter {
        parameter,
        value: value.to_string(),
    }
}

fn validate_color(color: &str) -> Result<(), RenderError> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    let valid = matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(invalid("color", color))
    }
}

impl RenderBackend for HeadlessRenderer {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_renderer(&mut self, config: &RendererConfig) -> Result<RendererHandle, RenderError> {
        let id = self.allocate();
        self.renderers.insert(id, *config);
        Ok(RendererHandle(id))
    }

    fn dispose_renderer(&mut self, renderer: RendererHandle) -> Result<(), RenderError> {
        self.renderers
            .remove(&renderer.0)
            .map(|_| ())
            .ok_or(RenderError::UnknownRenderer(renderer))
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, RenderError> {
        if let Some([x, y]) = desc.repeat {
            if !(x > 0.0 && y > 0.0) {
                return Err(invalid("texture repeat", format!("{x},{y}")));
            }
        }
        if let Some(rotation) = desc.rotation {
            if !rotation.is_finite() {
                return Err(invalid("texture rotation", rotation));
            }
        }

        let id = self.allocate();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn dispose_texture(&mut self, texture: TextureHandle) -> Result<(), RenderError> {
        self.textures
            .remove(&texture.0)
            .map(|_| ())
            .ok_or(RenderError::UnknownTexture(texture))
    }

    fn create_material(&mut self, desc: &MaterialDesc) -> Result<MaterialHandle, RenderError> {
        if let Some(color) = &desc.color {
            validate_color(color)?;
        }
        if let Some(opacity) = desc.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(invalid("opacity", opacity));
            }
        }
        for map in [desc.map, desc.alpha_map].into_iter().flatten() {
            if !self.textures.contains_key(&map.0) {
                return Err(RenderError::UnknownTexture(map));
            }
        }

        let id = self.allocate();
        self.materials.insert(id, desc.clone());
        Ok(MaterialHandle(id))
    }

    fn dispose_material(&mut self, material: MaterialHandle) -> Result<(), RenderError> {
        self.materials
            .remove(&material.0)
            .map(|_| ())
            .ok_or(RenderError::UnknownMaterial(material))
    }

    fn render(
        &mut self,
        renderer: RendererHandle,
        scene: &SceneGraph,
        pixel_ratio: f32,
    ) -> Result<(), RenderError> {
        if !self.renderers.contains_key(&renderer.0) {
            return Err(RenderError::UnknownRenderer(renderer));
        }
        if !(pixel_ratio > 0.0) {
            return Err(invalid("pixel ratio", pixel_ratio));
        }

        let hidden: FxHashSet<_> = scene
            .iter()
            .filter(|(_, node)| !node.visible)
            .map(|(id, _)| id)
            .collect();
        self.last_visible_nodes = scene
            .iter()
            .filter(|(id, _)| !scene.self_and_ancestors(*id).any(|a| hidden.contains(&a)))
            .count();
        self.last_pixel_ratio = Some(pixel_ratio);
        self.frames += 1;
        Ok(())
    }

    fn stats(&self) -> RenderStats {
        RenderStats {
            renderers: self.renderers.len(),
            textures: self.textures.len(),
            materials: self.materials.len(),
            frames: self.frames,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
