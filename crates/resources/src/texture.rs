//! Texture decoding.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! # fn example() -> Result<(), vge_resources::ResourceError> {
//! let texture = vge_resources::load_texture(Path::new("textures/wall_brick_plain.tga"))?;
//! assert_eq!(texture.pixels.len(), texture.byte_size());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Decoded image as tightly packed RGBA8 rows, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 4` bytes.
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps already decoded RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::SizeMismatch`] if `pixels` is not exactly
    /// `width * height * 4` bytes long.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        let expected = rgba8_len(width, height);
        if pixels.len() != expected {
            return Err(ResourceError::SizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Size of the pixel data in bytes: `width * height * 4`.
    #[inline]
    pub fn byte_size(&self) -> usize {
        rgba8_len(self.width, self.height)
    }
}

fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

/// Loads an image file and converts it to RGBA8.
///
/// The format is detected from the file contents, so any format enabled in
/// the `image` dependency (PNG, TGA) is accepted. Images without an alpha
/// channel get an opaque one.
///
/// # Errors
///
/// Returns [`ResourceError::FileNotFound`] if `path` does not exist,
/// [`ResourceError::Decode`] if decoding fails, and
/// [`ResourceError::EmptyImage`] for a zero-sized image.
pub fn load_texture(path: &Path) -> ResourceResult<TextureData> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }

    let decoded = image::ImageReader::open(path)
        .map_err(|e| ResourceError::Decode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?
        .with_guessed_format()
        .map_err(|e| ResourceError::Decode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?
        .decode()
        .map_err(|source| ResourceError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ResourceError::EmptyImage(path.to_path_buf()));
    }

    debug!("Decoded texture {:?}: {}x{}", path, width, height);

    TextureData::from_rgba8(width, height, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        let texture = TextureData::from_rgba8(3, 2, vec![0; 24]).unwrap();
        assert_eq!(texture.byte_size(), 24);
    }

    #[test]
    fn test_from_rgba8_rejects_wrong_length() {
        let err = TextureData::from_rgba8(2, 2, vec![0; 15]).unwrap_err();
        match err {
            ResourceError::SizeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 15);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_texture(Path::new("definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }
}
