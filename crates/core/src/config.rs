//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty or missing file is valid:
//!
//! ```toml
//! [window]
//! width = 1600
//! height = 900
//!
//! [graphics]
//! validation = true
//! shader_dir = "shaders"
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [scene]
//! texture = "assets/crate.png"
//! fov_y_degrees = 60.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub scene: SceneConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "forge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Request the Khronos validation layer.
    pub validation: bool,
    /// Directory holding compiled `<name>.vert.spv` / `<name>.frag.spv` pairs.
    pub shader_dir: PathBuf,
    pub clear_color: [f32; 4],
    /// Overrides the default tracing filter when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            log_filter: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Texture for the demo quad; a generated checkerboard is used when absent.
    pub texture: Option<PathBuf>,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            texture: None,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.scene.fov_y_degrees, 45.0);
        assert!(config.scene.texture.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [window]
            width = 800

            [graphics]
            validation = false
            clear_color = [0.1, 0.2, 0.3, 1.0]

            [scene]
            texture = "assets/checker.png"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert!(!config.graphics.validation);
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(
            config.scene.texture.as_deref(),
            Some(Path::new("assets/checker.png"))
        );
        assert_eq!(config.scene.far, 1000.0);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let result = EngineConfig::from_toml_str("[window]\nwidth = \"wide\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = EngineConfig::load(Path::new("does/not/exist/forge.toml")).unwrap();
        assert_eq!(config.window.title, "forge");
    }
}
