//! Platform abstraction layer for the vge renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Raw window handles and instance extensions for Vulkan surface creation

mod window;

pub use window::{Surface, Window, aspect_ratio, fps_title};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
