//! Frame lifecycle and rendering for the vge renderer.
//!
//! This crate owns everything between the RHI wrappers and the application:
//! - Frame slots, the image guard and the per-frame submit/present protocol
//! - Staged mesh and texture uploads
//! - Per-swapchain-image view/projection uniforms
//! - The texture descriptor registry
//! - Model transform delivery (push constants or a dynamic uniform buffer)
//! - Command recording and the owning [`Renderer`]

mod error;

pub mod frame;
pub mod frame_manager;
pub mod mesh;
pub mod model_strategy;
pub mod renderer;
pub mod textures;
pub mod ubo;
pub mod uniforms;

pub use error::{RendererError, RendererResult};
pub use frame::{FrameCursor, FrameState};
pub use mesh::Mesh;
pub use renderer::Renderer;
pub use vge_rhi::vertex::Vertex;

/// Maximum number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on meshes and textures, and therefore on sampler descriptor
/// sets and dynamic model slots.
pub const MAX_OBJECTS: usize = 20;
