//! Stage configuration
//!
//! Every field has a default, so an empty `stage.toml` is valid:
//!
//! ```toml
//! [governor]
//! window = 60
//! min_fps = 25.0
//! scale_factor = 0.75
//!
//! [renderer]
//! transparent_background = true
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stage config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Stage configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StageConfig {
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub event_loop: EventLoopConfig,
    #[serde(default)]
    pub reactive: ReactiveConfig,
    #[serde(default)]
    pub snap: SnapConfig,
    #[serde(default)]
    pub renderer: RendererSettings,
}

/// Frame-rate governor settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GovernorConfig {
    /// Samples collected before a decision
    #[serde(default = "default_window")]
    pub window: usize,
    /// Median fps below which resolution is reduced
    #[serde(default = "default_min_fps")]
    pub min_fps: f32,
    /// Multiplier applied to the pixel ratio on a slow window
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_fps: default_min_fps(),
            scale_factor: default_scale_factor(),
        }
    }
}

fn default_window() -> usize {
    60
}

fn default_min_fps() -> f32 {
    25.0
}

fn default_scale_factor() -> f32 {
    0.75
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventLoopConfig {
    /// Rate loop callbacks are throttled to on faster displays
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
        }
    }
}

fn default_target_fps() -> f32 {
    60.0
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReactiveConfig {
    /// Passes a tick may take before it reports a feedback loop
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
        }
    }
}

fn default_max_passes() -> usize {
    stagecraft_core::DEFAULT_MAX_PASSES
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SnapConfig {
    /// Hits farther than this do not snap
    #[serde(default = "default_snap_distance")]
    pub max_distance: f32,
    /// Offset of the snap anchors from the target's center, per axis
    #[serde(default = "default_anchor_offset")]
    pub anchor_offset: f32,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            max_distance: default_snap_distance(),
            anchor_offset: default_anchor_offset(),
        }
    }
}

fn default_snap_distance() -> f32 {
    0.7
}

fn default_anchor_offset() -> f32 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RendererSettings {
    #[serde(default)]
    pub transparent_background: bool,
    #[serde(default = "default_true")]
    pub shadows: bool,
    #[serde(default = "default_pixel_ratio")]
    pub initial_pixel_ratio: f32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            transparent_background: false,
            shadows: true,
            initial_pixel_ratio: default_pixel_ratio(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pixel_ratio() -> f32 {
    1.0
}

impl StageConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: StageConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_governor(mut self, governor: GovernorConfig) -> Self {
        self.governor = governor;
        self
    }

    pub fn with_target_fps(mut self, fps: f32) -> Self {
        self.event_loop.target_fps = fps;
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.reactive.max_passes = passes;
        self
    }

    pub fn with_snap(mut self, snap: SnapConfig) -> Self {
        self.snap = snap;
        self
    }

    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.renderer.transparent_background = transparent;
        self
    }

    pub fn with_shadows(mut self, shadows: bool) -> Self {
        self.renderer.shadows = shadows;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.governor.window == 0 {
            return Err(ConfigError::Invalid {
                field: "governor.window",
                reason: "must be at least 1".into(),
            });
        }
        if !(self.governor.scale_factor > 0.0 && self.governor.scale_factor <= 1.0) {
            return Err(ConfigError::Invalid {
                field: "governor.scale_factor",
                reason: format!("{} is outside (0, 1]", self.governor.scale_factor),
            });
        }
        if !(self.event_loop.target_fps > 0.0) {
            return Err(ConfigError::Invalid {
                field: "event_loop.target_fps",
                reason: "must be positive".into(),
            });
        }
        if !(self.renderer.initial_pixel_ratio > 0.0) {
            return Err(ConfigError::Invalid {
                field: "renderer.initial_pixel_ratio",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}
