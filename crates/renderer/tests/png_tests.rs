//! Tests for PNG encoding of color-mapped tiles.
//!
//! Covers the automatic indexed/RGBA selection and checks that every
//! encoded tile decodes back to the exact input pixels.

use renderer::png::{encode_png, encode_png_rgba, extract_palette};
use renderer::{colorize, ColorRampRegistry, ValueRange, TRANSPARENT};
use test_utils::{create_palette_pixels, create_test_rgba_pixels, create_wave_grid};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

fn decode(png: &[u8]) -> (u32, u32, Vec<u8>) {
    let image = image::load_from_memory(png).unwrap().to_rgba8();
    let (width, height) = image.dimensions();
    (width, height, image.into_raw())
}

/// Color type byte of the IHDR chunk.
fn color_type(png: &[u8]) -> u8 {
    png[25]
}

// ============================================================================
// Format selection tests
// ============================================================================

#[test]
fn test_few_colors_use_palette() {
    let pixels = create_palette_pixels(16, 16, 20);
    let png = encode_png(&pixels, 16, 16).unwrap();
    assert_eq!(&png[0..8], &PNG_SIGNATURE);
    assert_eq!(color_type(&png), 3);
    assert_eq!(decode(&png), (16, 16, pixels));
}

#[test]
fn test_many_colors_fall_back_to_rgba() {
    let pixels = create_test_rgba_pixels(64, 64);
    assert!(extract_palette(&pixels).is_none());

    let png = encode_png(&pixels, 64, 64).unwrap();
    assert_eq!(color_type(&png), 6);
    assert_eq!(decode(&png), (64, 64, pixels));
}

#[test]
fn test_indexed_smaller_for_weather_like_tiles() {
    let pixels = create_palette_pixels(256, 256, 40);
    let indexed = encode_png(&pixels, 256, 256).unwrap();
    let rgba = encode_png_rgba(&pixels, 256, 256).unwrap();
    assert!(
        indexed.len() < rgba.len(),
        "Indexed PNG ({} bytes) should be smaller than RGBA ({} bytes)",
        indexed.len(),
        rgba.len()
    );
}

// ============================================================================
// Color-mapped tile tests
// ============================================================================

#[test]
fn test_color_mapped_tile_round_trips() {
    let registry = ColorRampRegistry::with_builtins(64);
    let ramp = registry.get("viridis").unwrap();
    let mut values = create_wave_grid(256, 256);
    values[0] = f32::NAN;

    let pixels = colorize(&values, None, 256, ValueRange::new(-1.0, 1.0), &ramp);
    let png = encode_png(&pixels, 256, 256).unwrap();
    // ramp LUT plus the transparent color fits a palette
    assert_eq!(color_type(&png), 3);

    let (_, _, decoded) = decode(&png);
    assert_eq!(&decoded[0..4], &TRANSPARENT);
    assert_eq!(decoded, pixels);
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_single_pixel() {
    let png = encode_png(&[10, 20, 30, 255], 1, 1).unwrap();
    assert_eq!(decode(&png), (1, 1, vec![10, 20, 30, 255]));
}

#[test]
fn test_all_transparent() {
    let pixels = vec![0u8; 32 * 32 * 4];
    let png = encode_png(&pixels, 32, 32).unwrap();
    let (_, _, decoded) = decode(&png);
    assert!(decoded.chunks_exact(4).all(|px| px == TRANSPARENT));
}

#[test]
fn test_palette_limit_is_256_colors() {
    let pixels: Vec<u8> = (0..256u32).flat_map(|i| [i as u8, i as u8, i as u8, 255]).collect();
    let png = encode_png(&pixels, 16, 16).unwrap();
    assert_eq!(color_type(&png), 3);

    let mut over_limit = pixels;
    over_limit.extend_from_slice(&[1, 2, 3, 255]);
    over_limit.extend_from_slice(&[1, 2, 3, 255]);
    over_limit.extend_from_slice(&[4, 5, 6, 255]);
    over_limit.extend_from_slice(&[1, 2, 3, 255]);
    let png = encode_png(&over_limit, 65, 4).unwrap();
    assert_eq!(color_type(&png), 6);
}
