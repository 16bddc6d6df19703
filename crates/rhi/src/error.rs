//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    /// The instance reports zero physical devices
    #[error("No Vulkan-capable GPU found")]
    NoVulkanDevice,

    /// No physical device passed the suitability check
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required instance layer or extension is not available
    #[error("Missing required extension: {0}")]
    MissingExtension(String),

    /// No memory type satisfies both the type mask and the property flags
    #[error("No memory type matches bits {type_bits:#b} with properties {required:?}")]
    NoSuitableMemoryType {
        /// Allowed memory type bits from the resource requirements.
        type_bits: u32,
        /// Requested property flags.
        required: vk::MemoryPropertyFlags,
    },

    /// None of the candidate formats supports the requested features
    #[error("No supported format among {0:?}")]
    NoSupportedFormat(Vec<vk::Format>),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
