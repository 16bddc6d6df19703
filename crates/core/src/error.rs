//! Error types shared by the vge crates.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for engine-level failures that are not Vulkan specific.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Presentation surface could not be created
    #[error("Surface error: {0}")]
    Surface(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error in '{path}': {message}")]
    Config {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
