//! Output image formats for encoded tiles.

use crate::png::encode_png;
use crate::{RenderError, RenderResult};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JPEG quality used for lossy tiles.
pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    /// Lossless, keeps transparency
    Png,
    /// Lossy, alpha channel dropped
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    /// Detect the format of encoded bytes from their magic number.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }
}

impl FromStr for ImageFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "png" | "image/png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" => Ok(ImageFormat::Jpeg),
            _ => Err(RenderError::UnsupportedImageFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => f.write_str("PNG"),
            ImageFormat::Jpeg => f.write_str("JPEG"),
        }
    }
}

/// Encode an RGBA buffer into `format`.
pub fn encode_rgba(
    pixels: &[u8],
    width: usize,
    height: usize,
    format: ImageFormat,
) -> RenderResult<Bytes> {
    match format {
        ImageFormat::Png => encode_png(pixels, width, height).map(Bytes::from),
        ImageFormat::Jpeg => encode_jpeg(pixels, width, height).map(Bytes::from),
    }
}

fn encode_jpeg(pixels: &[u8], width: usize, height: usize) -> RenderResult<Vec<u8>> {
    let expected = width * height * 4;
    if pixels.len() != expected {
        return Err(RenderError::BufferSize {
            expected,
            actual: pixels.len(),
            width,
            height,
        });
    }

    let rgb: Vec<u8> = pixels
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(&rgb, width as u32, height as u32, ColorType::Rgb8)
        .map_err(|e| RenderError::Encode(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}
