//! Core utilities for the vge renderer.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing and FPS measurement
//! - Configuration loading

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{AssetConfig, EngineConfig, ModelTransfer, RenderConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FpsCounter, Timer};
