//! Viewer configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ViewerError;

/// How pages get rendered after a document is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Render pages only when they become visible (plus neighbor prefetch).
    #[default]
    Lazy,
    /// Render every page in the background right after opening.
    Eager,
}

/// Tunables for page rendering and region capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Fixed internal render scale for page rasters (1.0 = 72 DPI).
    pub render_scale: f32,
    /// Minimum width and height of a drag, in device-independent pixels.
    pub drag_threshold: f64,
    /// Pages measuring less than this on screen are placeholders.
    pub placeholder_height: f64,
    /// Pages on either side of a visible page to prefetch.
    pub prefetch_radius: u32,
    pub load_policy: LoadPolicy,
    /// Upper bound for the surface rasterizer fallback.
    pub fallback_timeout_ms: u64,
    /// Gap between the selection box and the action menu.
    pub action_menu_offset: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.5,
            drag_threshold: 10.0,
            placeholder_height: 100.0,
            prefetch_radius: 1,
            load_policy: LoadPolicy::Lazy,
            fallback_timeout_ms: 10_000,
            action_menu_offset: 10.0,
        }
    }
}

impl ViewerConfig {
    /// Load a configuration from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ViewerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ViewerError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ViewerError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ViewerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(ViewerError::ConfigError(format!(
                "render_scale must be positive, got {}",
                self.render_scale
            )));
        }
        if !(self.drag_threshold.is_finite() && self.drag_threshold > 0.0) {
            return Err(ViewerError::ConfigError(format!(
                "drag_threshold must be positive, got {}",
                self.drag_threshold
            )));
        }
        if !(self.placeholder_height.is_finite() && self.placeholder_height >= 0.0) {
            return Err(ViewerError::ConfigError(format!(
                "placeholder_height must not be negative, got {}",
                self.placeholder_height
            )));
        }
        Ok(())
    }
}
