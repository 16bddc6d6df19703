//! Renderer error types.

use ash::vk;
use thiserror::Error;

use vge_resources::ResourceError;
use vge_rhi::RhiError;

/// Errors raised while building or driving the renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Failure inside a Vulkan wrapper
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Texture file could not be loaded
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window or surface failure reported by the platform layer
    #[error(transparent)]
    Platform(#[from] vge_core::Error),

    /// Raw Vulkan failure outside a wrapper
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No more texture descriptor sets can be registered
    #[error("Texture limit reached: at most {limit} textures can be registered")]
    TextureLimit {
        /// Registry capacity.
        limit: usize,
    },

    /// A mesh referenced a texture that was never registered
    #[error("Texture index {index} out of range ({count} registered)")]
    UnknownTexture {
        /// Requested texture index.
        index: usize,
        /// Number of registered textures.
        count: usize,
    },

    /// No more meshes can be added
    #[error("Mesh limit reached: at most {limit} meshes can be added")]
    MeshLimit {
        /// Maximum mesh count.
        limit: usize,
    },

    /// Mesh data that cannot be drawn
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_limit_message() {
        let err = RendererError::TextureLimit { limit: 20 };
        assert_eq!(
            err.to_string(),
            "Texture limit reached: at most 20 textures can be registered"
        );
    }

    #[test]
    fn test_vulkan_result_converts() {
        let err: RendererError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RendererError::Vulkan(_)));
    }

    #[test]
    fn test_rhi_error_is_transparent() {
        let err: RendererError = RhiError::NoSuitableGpu.into();
        assert_eq!(err.to_string(), RhiError::NoSuitableGpu.to_string());
    }
}
