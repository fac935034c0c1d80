//! Tile rendering: color ramps, scalar-to-RGBA mapping and image encoding.
//!
//! - [`colormap`]: named ramps quantized to lookup tables, plus a registry
//! - [`colorize`]: clip, normalize and map a scalar tile to RGBA
//! - [`png`]: PNG encoder with indexed/RGBA auto-selection
//! - [`encode`]: output format selection (PNG, JPEG)

pub mod colorize;
pub mod colormap;
pub mod encode;
pub mod error;
pub mod png;

pub use colorize::{colorize, ValueRange, TRANSPARENT};
pub use colormap::{hex_to_rgb, ColorRamp, ColorRampFile, ColorRampRegistry, DEFAULT_NUM_COLORS};
pub use encode::{encode_rgba, ImageFormat};
pub use error::{RenderError, RenderResult};
