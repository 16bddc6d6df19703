//! Integration tests for texture decoding.

use std::fs;
use std::path::PathBuf;

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use vge_resources::{ResourceError, load_texture};

/// Per-test scratch directory under the system temp dir.
fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vge-resources-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).expect("Failed to create fixture directory");
    dir
}

#[test]
fn test_load_png_keeps_pixels_and_dimensions() {
    let dir = fixture_dir("png");
    let path = dir.join("checker.png");

    let image = RgbaImage::from_fn(4, 2, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 128])
        }
    });
    image.save(&path).expect("Failed to write PNG fixture");

    let texture = load_texture(&path).expect("Failed to load PNG fixture");

    assert_eq!(texture.width, 4);
    assert_eq!(texture.height, 2);
    assert_eq!(texture.byte_size(), 4 * 2 * 4);
    assert_eq!(texture.pixels.len(), texture.byte_size());
    assert_eq!(&texture.pixels[0..4], &[255, 0, 0, 255]);
    assert_eq!(&texture.pixels[4..8], &[0, 0, 255, 128]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_load_rgb_tga_gets_opaque_alpha() {
    let dir = fixture_dir("tga");
    let path = dir.join("wall.tga");

    let image = RgbImage::from_pixel(3, 3, Rgb([10, 20, 30]));
    image
        .save_with_format(&path, ImageFormat::Tga)
        .expect("Failed to write TGA fixture");

    let texture = load_texture(&path).expect("Failed to load TGA fixture");

    assert_eq!((texture.width, texture.height), (3, 3));
    assert_eq!(texture.pixels.len(), 3 * 3 * 4);
    assert!(
        texture
            .pixels
            .chunks_exact(4)
            .all(|texel| texel == [10, 20, 30, 255])
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_load_garbage_reports_decode_error() {
    let dir = fixture_dir("garbage");
    let path = dir.join("not_an_image.png");
    fs::write(&path, b"this is not an image").expect("Failed to write fixture");

    let err = load_texture(&path).unwrap_err();
    assert!(matches!(err, ResourceError::Decode { .. }), "got {err:?}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_load_missing_file_reports_path() {
    let path = std::env::temp_dir().join("vge-resources-missing.png");
    let err = load_texture(&path).unwrap_err();
    match err {
        ResourceError::FileNotFound(reported) => assert_eq!(reported, path),
        other => panic!("unexpected error: {other:?}"),
    }
}
