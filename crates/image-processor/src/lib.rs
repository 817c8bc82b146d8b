//! Image processing pipeline for narrow thermal printers.
//!
//! Turns an RGBA raster into a 1-bit bitmap sized for the printer:
//! geometric normalization (rotate, autoscale, pad), dithering with one of
//! four algorithms, and MSB-first row packing.

pub mod bitmap;
pub mod dither;
pub mod geometry;
pub mod raster;
pub mod resize;
pub mod rotate;
pub mod settings;
pub mod summary;
pub mod text;

// Re-exports for convenience
pub use bitmap::{MonochromeBitmap, PackedRaster, pack, unpack};
pub use dither::dither;
pub use geometry::normalize;
pub use raster::{PixelFormat, RasterImage};
pub use settings::{DitherMethod, ProcessingSettings, Rotation, SettingsStore, SettingsUpdate};
pub use summary::ImageSummary;

/// Standard thermal printer paper width in pixels.
pub const PAPER_WIDTH: u32 = 384;

/// Tallest image [`normalize`] will produce, padding included.
///
/// Matches the 16-bit row count printers put in their print request.
pub const MAX_ROWS: u32 = u16::MAX as u32;

/// Errors produced by the image pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported setting {name}: {reason}")]
    UnsupportedSetting { name: &'static str, reason: String },

    #[error("Bitmap invariant violated: {0}")]
    InvalidBitmap(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Font error: {0}")]
    Font(String),
}

impl ImageError {
    pub(crate) fn unsupported(name: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedSetting {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type alias for image pipeline operations.
pub type Result<T> = std::result::Result<T, ImageError>;
