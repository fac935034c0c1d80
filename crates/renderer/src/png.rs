//! PNG encoding for RGBA tiles.
//!
//! Two output layouts:
//! - **Indexed (color type 3)** when the tile has at most 256 distinct RGBA
//!   values. Color-mapped tiles almost always qualify since the ramp LUT
//!   holds at most 256 entries plus the transparent color.
//! - **RGBA (color type 6)** otherwise.

use crate::{RenderError, RenderResult};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096; // 64x64 or larger

/// Palette plus one index per pixel.
pub struct IndexedPixels {
    pub palette: Vec<[u8; 4]>,
    pub indices: Vec<u8>,
}

/// Encode RGBA pixels, choosing indexed output when the colors fit.
pub fn encode_png(pixels: &[u8], width: usize, height: usize) -> RenderResult<Vec<u8>> {
    check_buffer(pixels, width, height)?;
    match extract_palette(pixels) {
        Some(indexed) => encode_png_indexed(width, height, &indexed.palette, &indexed.indices),
        None => encode_png_rgba(pixels, width, height),
    }
}

/// Encode RGBA pixels as a color type 6 PNG.
pub fn encode_png_rgba(pixels: &[u8], width: usize, height: usize) -> RenderResult<Vec<u8>> {
    check_buffer(pixels, width, height)?;
    let mut writer = PngWriter::new(width, height, 6);
    writer.image_data(&scanlines(pixels, width * 4, height))?;
    Ok(writer.finish())
}

/// Encode a palette image as a color type 3 PNG.
///
/// A tRNS chunk is written only when some palette entry is not opaque.
pub fn encode_png_indexed(
    width: usize,
    height: usize,
    palette: &[[u8; 4]],
    indices: &[u8],
) -> RenderResult<Vec<u8>> {
    if indices.len() != width * height {
        return Err(RenderError::BufferSize {
            expected: width * height,
            actual: indices.len(),
            width,
            height,
        });
    }
    if palette.is_empty() || palette.len() > MAX_PALETTE_SIZE {
        return Err(RenderError::Encode(format!(
            "palette size {} outside 1..={}",
            palette.len(),
            MAX_PALETTE_SIZE
        )));
    }

    let mut writer = PngWriter::new(width, height, 3);
    let plte: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    writer.chunk(b"PLTE", &plte);
    if palette.iter().any(|c| c[3] < 255) {
        let trns: Vec<u8> = palette.iter().map(|c| c[3]).collect();
        writer.chunk(b"tRNS", &trns);
    }
    writer.image_data(&scanlines(indices, width, height))?;
    Ok(writer.finish())
}

/// Build a palette for `pixels`, or `None` if there are more than 256 colors.
pub fn extract_palette(pixels: &[u8]) -> Option<IndexedPixels> {
    if pixels.len() / 4 >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    }
}

#[inline(always)]
fn pack(px: &[u8]) -> u32 {
    u32::from_le_bytes([px[0], px[1], px[2], px[3]])
}

fn extract_palette_sequential(pixels: &[u8]) -> Option<IndexedPixels> {
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let key = pack(px);
        let index = match lookup.get(&key) {
            Some(&index) => index,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let index = palette.len() as u8;
                palette.push([px[0], px[1], px[2], px[3]]);
                lookup.insert(key, index);
                index
            }
        };
        indices.push(index);
    }

    Some(IndexedPixels { palette, indices })
}

/// Two parallel passes: collect distinct colors per chunk, then map pixels
/// to indices once the merged palette is known to fit.
fn extract_palette_parallel(pixels: &[u8]) -> Option<IndexedPixels> {
    let chunk_pixels = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let per_chunk: Vec<Option<Vec<u32>>> = pixels
        .par_chunks(chunk_pixels * 4)
        .map(|chunk| {
            let mut seen: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for px in chunk.chunks_exact(4) {
                seen.insert(pack(px), ());
                if seen.len() > MAX_PALETTE_SIZE {
                    return None;
                }
            }
            Some(seen.into_keys().collect())
        })
        .collect();

    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    for colors in per_chunk {
        for key in colors? {
            if lookup.contains_key(&key) {
                continue;
            }
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            lookup.insert(key, palette.len() as u8);
            palette.push(key.to_le_bytes());
        }
    }

    let indices: Vec<u8> = pixels
        .par_chunks_exact(4)
        .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
        .collect();

    Some(IndexedPixels { palette, indices })
}

fn check_buffer(pixels: &[u8], width: usize, height: usize) -> RenderResult<()> {
    let expected = width * height * 4;
    if pixels.len() != expected {
        return Err(RenderError::BufferSize {
            expected,
            actual: pixels.len(),
            width,
            height,
        });
    }
    Ok(())
}

/// Prefix every row with filter type 0 (none).
fn scanlines(data: &[u8], row_bytes: usize, height: usize) -> Vec<u8> {
    let mut raw = Vec::with_capacity(height * (row_bytes + 1));
    for row in data.chunks_exact(row_bytes.max(1)).take(height) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    raw
}

/// Incremental PNG chunk writer.
struct PngWriter {
    out: Vec<u8>,
}

impl PngWriter {
    fn new(width: usize, height: usize, color_type: u8) -> Self {
        let mut writer = Self {
            out: PNG_SIGNATURE.to_vec(),
        };
        let mut ihdr = Vec::with_capacity(13);
        ihdr.extend_from_slice(&(width as u32).to_be_bytes());
        ihdr.extend_from_slice(&(height as u32).to_be_bytes());
        ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]); // depth, type, compression, filter, interlace
        writer.chunk(b"IHDR", &ihdr);
        writer
    }

    fn chunk(&mut self, kind: &[u8; 4], data: &[u8]) {
        self.out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.out.extend_from_slice(kind);
        self.out.extend_from_slice(data);
        let mut crc = crc32fast::Hasher::new();
        crc.update(kind);
        crc.update(data);
        self.out.extend_from_slice(&crc.finalize().to_be_bytes());
    }

    fn image_data(&mut self, raw: &[u8]) -> RenderResult<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(raw)
            .and_then(|_| encoder.finish())
            .map(|idat| self.chunk(b"IDAT", &idat))
            .map_err(|e| RenderError::Encode(format!("IDAT compression failed: {}", e)))
    }

    fn finish(mut self) -> Vec<u8> {
        self.chunk(b"IEND", &[]);
        self.out
    }
}
