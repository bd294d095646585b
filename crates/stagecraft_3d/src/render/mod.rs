//! Renderer collaborator interface
//!
//! Renderers, textures and materials are native objects owned by an external
//! graphics backend. The stage creates and disposes them through
//! [`RenderBackend`] and keeps only handles.

mod headless;

pub use headless::HeadlessRenderer;

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use thiserror::Error;

use crate::scene::SceneGraph;

/// Handle to a native renderer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RendererHandle(pub(crate) u64);

/// Handle to a native texture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a native material
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub(crate) u64);

/// Renderer creation options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Transparent clear color
    pub alpha: bool,
    pub shadows: bool,
}

/// Where texture pixels come from
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureSource {
    Image(String),
    Video(String),
}

impl TextureSource {
    /// Classify a texture reference
    ///
    /// Element selectors (`#id`, `.class`) refer to a video element. Files
    /// are classified by extension; anything else yields `None`.
    pub fn classify(source: &str) -> Option<Self> {
        if source.starts_with('#') || source.starts_with('.') {
            return Some(Self::Video(source.to_string()));
        }

        let ext = Path::new(source)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "tga" | "ktx2" | "avif" => {
                Some(Self::Image(source.to_string()))
            }
            "mp4" | "webm" | "ogv" | "mov" | "m4v" | "mkv" => Some(Self::Video(source.to_string())),
            _ => None,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TextureSource::Image(p) | TextureSource::Video(p) => p,
        }
    }
}

/// Texture creation parameters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TextureDesc {
    pub source: TextureSource,
    /// UV repeat along x and y
    pub repeat: Option<[f32; 2]>,
    pub flip_y: Option<bool>,
    /// Rotation in degrees
    pub rotation: Option<f32>,
}

/// Material creation parameters
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDesc {
    /// CSS-style color (`#rrggbb`)
    pub color: Option<String>,
    pub opacity: Option<f32>,
    pub transparent: bool,
    pub map: Option<TextureHandle>,
    pub alpha_map: Option<TextureHandle>,
}

/// Live object counts reported by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub renderers: usize,
    pub textures: usize,
    pub materials: usize,
    pub frames: u64,
}

/// Errors reported by a render backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("renderer {0:?} does not exist")]
    UnknownRenderer(RendererHandle),

    #[error("texture {0:?} does not exist")]
    UnknownTexture(TextureHandle),

    #[error("material {0:?} does not exist")]
    UnknownMaterial(MaterialHandle),

    #[error("invalid {parameter}: {value}")]
    InvalidParameter { parameter: &'static str, value: String },
}

/// Render backend trait
///
/// Implement this trait to connect a graphics backend.
pub trait RenderBackend {
    /// Backend name
    fn name(&self) -> &'static str;

    fn create_renderer(&mut self, config: &RendererConfig) -> Result<RendererHandle, RenderError>;

    fn dispose_renderer(&mut self, renderer: RendererHandle) -> Result<(), RenderError>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, RenderError>;

    fn dispose_texture(&mut self, texture: TextureHandle) -> Result<(), RenderError>;

    fn create_material(&mut self, desc: &MaterialDesc) -> Result<MaterialHandle, RenderError>;

    fn dispose_material(&mut self, material: MaterialHandle) -> Result<(), RenderError>;

    /// Draw one frame of the scene
    fn render(
        &mut self,
        renderer: RendererHandle,
        scene: &SceneGraph,
        pixel_ratio: f32,
    ) -> Result<(), RenderError>;

    fn stats(&self) -> RenderStats;

    /// Access the concrete backend
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_texture_source() {
        assert_eq!(
            TextureSource::classify("maps/grid.PNG"),
            Some(TextureSource::Image("maps/grid.PNG".into()))
        );
        assert_eq!(
            TextureSource::classify("clips/intro.mp4"),
            Some(TextureSource::Video("clips/intro.mp4".into()))
        );
        assert_eq!(
            TextureSource::classify("#player"),
            Some(TextureSource::Video("#player".into()))
        );
        assert_eq!(TextureSource::classify("notes.txt"), None);
        assert_eq!(TextureSource::classify("no-extension"), None);
    }
}
