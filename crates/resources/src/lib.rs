//! Resource loading.
//!
//! This crate decodes external assets into plain CPU-side data the renderer
//! can upload:
//! - Image files (PNG, TGA) into tightly packed RGBA8 pixels

mod error;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use texture::{TextureData, load_texture};
