//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The file exists but could not be decoded as an image.
    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        /// Path to the file that failed to decode.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The decoded image has a zero-sized dimension.
    #[error("Image '{0}' is empty")]
    EmptyImage(PathBuf),

    /// Pixel buffer length does not match the stated dimensions.
    #[error("Pixel data is {actual} bytes, expected {expected} for {width}x{height} RGBA8")]
    SizeMismatch {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// `width * height * 4`.
        expected: usize,
        /// Length of the supplied buffer.
        actual: usize,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
