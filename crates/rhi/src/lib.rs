//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides RAII wrappers over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation and physical device selection
//! - Logical device, queues and the GPU memory allocator
//! - Swapchain negotiation and recreation
//! - Staging uploads into device-local buffers and images
//! - Render pass, framebuffers, pipeline and shaders
//! - Descriptor sets, samplers and synchronization primitives
//!
//! Every wrapper holds an `Arc<Device>` and destroys its handle on drop, so
//! the logical device always outlives the objects created from it.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
