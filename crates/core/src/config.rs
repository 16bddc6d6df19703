//! Engine configuration.
//!
//! Configuration is read from a TOML file (`vge.toml` by default). Every
//! field has a default, so a missing file or a partial file is valid:
//!
//! ```toml
//! [window]
//! title = "Test Window"
//! width = 1280
//!
//! [render]
//! prefer_mailbox = false
//! model_transfer = "dynamic_uniform"
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default configuration file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vge.toml";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Window settings.
    pub window: WindowConfig,
    /// Renderer settings.
    pub render: RenderConfig,
    /// Asset locations.
    pub assets: AssetConfig,
}

/// Window settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Base window title; the demo appends the measured FPS.
    pub title: String,
    /// Initial inner width in pixels.
    pub width: u32,
    /// Initial inner height in pixels.
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Test Window".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// How per-mesh model matrices reach the vertex shader.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelTransfer {
    /// One `mat4` push constant per draw.
    #[default]
    PushConstant,
    /// One aligned slot per mesh in a dynamic uniform buffer.
    DynamicUniform,
}

impl ModelTransfer {
    /// Vertex shader whose model-matrix interface matches this transfer.
    pub fn default_vertex_shader(self) -> &'static str {
        match self {
            Self::PushConstant => "shader.vert.spv",
            Self::DynamicUniform => "shader_dynamic.vert.spv",
        }
    }
}

/// Renderer settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Enable `VK_LAYER_KHRONOS_validation` when it is installed.
    pub enable_validation: bool,
    /// Use MAILBOX presentation when the surface offers it.
    pub prefer_mailbox: bool,
    /// Fall back to the first enumerated GPU when none passes the suitability check.
    pub allow_device_fallback: bool,
    /// Color attachment clear value (RGBA).
    pub clear_color: [f32; 4],
    /// Model matrix transfer strategy.
    pub model_transfer: ModelTransfer,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            prefer_mailbox: true,
            allow_device_fallback: false,
            clear_color: [0.6, 0.65, 0.4, 1.0],
            model_transfer: ModelTransfer::PushConstant,
        }
    }
}

/// Asset locations.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory containing compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Directory containing textures.
    pub texture_dir: PathBuf,
    /// Vertex shader file name inside `shader_dir`. When unset, the shader
    /// matching `render.model_transfer` is used.
    pub vertex_shader: Option<String>,
    /// Fragment shader file name inside `shader_dir`.
    pub fragment_shader: String,
    /// Texture applied to the demo meshes.
    pub texture: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            texture_dir: PathBuf::from("textures"),
            vertex_shader: None,
            fragment_shader: "shader.frag.spv".to_string(),
            texture: "wall_brick_plain.tga".to_string(),
        }
    }
}

impl AssetConfig {
    /// Full path of the vertex shader used with `transfer`.
    pub fn vertex_shader_path(&self, transfer: ModelTransfer) -> PathBuf {
        let name = self
            .vertex_shader
            .as_deref()
            .unwrap_or_else(|| transfer.default_vertex_shader());
        self.shader_dir.join(name)
    }

    /// Full path of the fragment shader.
    pub fn fragment_shader_path(&self) -> PathBuf {
        self.shader_dir.join(&self.fragment_shader)
    }

    /// Full path of a texture file name.
    pub fn texture_path(&self, name: &str) -> PathBuf {
        self.texture_dir.join(name)
    }
}

impl EngineConfig {
    /// Full path of the vertex shader for the configured model transfer.
    pub fn vertex_shader_path(&self) -> PathBuf {
        self.assets.vertex_shader_path(self.render.model_transfer)
    }

    /// Parses a configuration from TOML text.
    ///
    /// `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid for this schema.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Loads the configuration at `path`.
    ///
    /// A missing file yields the defaults; any other IO failure or a parse
    /// failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] or [`Error::Config`].
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text, path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("", Path::new("vge.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.render.model_transfer, ModelTransfer::PushConstant);
        assert!(!config.render.allow_device_fallback);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let text = r#"
            [window]
            width = 1280

            [render]
            prefer_mailbox = false
            model_transfer = "dynamic_uniform"
        "#;
        let config = EngineConfig::from_toml_str(text, Path::new("vge.toml")).unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Test Window");
        assert!(!config.render.prefer_mailbox);
        assert_eq!(config.render.model_transfer, ModelTransfer::DynamicUniform);
        assert_eq!(config.render.clear_color, [0.6, 0.65, 0.4, 1.0]);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let err = EngineConfig::from_toml_str("[window]\nwidth = \"wide\"", Path::new("bad.toml"))
            .unwrap_err();
        match err {
            Error::Config { path, .. } => assert_eq!(path, PathBuf::from("bad.toml")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("vge-config-that-does-not-exist.toml");
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_asset_paths() {
        let assets = AssetConfig::default();
        assert_eq!(
            assets.vertex_shader_path(ModelTransfer::PushConstant),
            PathBuf::from("shaders").join("shader.vert.spv")
        );
        assert_eq!(
            assets.texture_path("wall.png"),
            PathBuf::from("textures").join("wall.png")
        );
    }

    #[test]
    fn test_bundled_config_parses() {
        let text = include_str!("../../../vge.toml");
        let config = EngineConfig::from_toml_str(text, Path::new(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.assets, AssetConfig::default());
        assert_eq!(config.render.model_transfer, ModelTransfer::PushConstant);
    }

    #[test]
    fn test_dynamic_transfer_selects_matching_vertex_shader() {
        let text = "[render]\nmodel_transfer = \"dynamic_uniform\"";
        let config = EngineConfig::from_toml_str(text, Path::new("vge.toml")).unwrap();
        assert_eq!(
            config.vertex_shader_path(),
            PathBuf::from("shaders").join("shader_dynamic.vert.spv")
        );

        let config = EngineConfig::default();
        assert_eq!(
            config.vertex_shader_path(),
            PathBuf::from("shaders").join("shader.vert.spv")
        );
    }

    #[test]
    fn test_explicit_vertex_shader_overrides_transfer_default() {
        let text = r#"
            [render]
            model_transfer = "dynamic_uniform"

            [assets]
            vertex_shader = "custom.vert.spv"
        "#;
        let config = EngineConfig::from_toml_str(text, Path::new("vge.toml")).unwrap();
        assert_eq!(
            config.vertex_shader_path(),
            PathBuf::from("shaders").join("custom.vert.spv")
        );
    }
}
