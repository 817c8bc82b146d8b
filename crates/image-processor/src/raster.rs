//! Flat pixel buffers handed between pipeline stages.
//!
//! A [`RasterImage`] is indexed `(y * width + x) * channels`. Stages never
//! mutate their input; each returns a fresh image.

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::{ImageError, Result};

/// Sample layout of a [`RasterImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One luminance byte per pixel.
    Gray,
    /// Four bytes per pixel: red, green, blue, alpha.
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgba => 4,
        }
    }
}

/// An immutable pixel buffer with known dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap a pixel buffer, checking `pixels.len() == width * height * channels`.
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidImage(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.channels()))
            .ok_or_else(|| ImageError::InvalidImage("dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(ImageError::InvalidImage(format!(
                "expected {expected} bytes for {width}x{height} {format:?}, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Convenience constructor for a grayscale buffer.
    pub fn from_gray(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Gray, pixels)
    }

    /// Convenience constructor for an RGBA buffer.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgba, pixels)
    }

    /// A uniformly filled grayscale image.
    pub fn filled_gray(width: u32, height: u32, value: u8) -> Result<Self> {
        Self::from_gray(width, height, vec![value; width as usize * height as usize])
    }

    /// Build from a decoded image, keeping grayscale sources single-channel.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let (width, height) = (img.width(), img.height());
        match img {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(width, height, gray.as_raw().clone()),
            other => Self::from_rgba(width, height, other.to_rgba8().into_raw()),
        }
    }

    /// Decode an encoded image (PNG, JPEG, GIF, BMP, WebP...) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
        debug!(width = img.width(), height = img.height(), "Decoded image");
        Self::from_dynamic(&img)
    }

    /// Open and decode an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| ImageError::Decode(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            width = img.width(),
            height = img.height(),
            "Opened image"
        );
        Self::from_dynamic(&img)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Raw samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels();
        let idx = (y as usize * self.width as usize + x as usize) * c;
        &self.pixels[idx..idx + c]
    }

    /// Perceptual luminance of every pixel (0.299 R + 0.587 G + 0.114 B),
    /// with alpha composited over white.
    pub fn luminance(&self) -> Vec<f32> {
        match self.format {
            PixelFormat::Gray => self.pixels.iter().map(|&v| f32::from(v)).collect(),
            PixelFormat::Rgba => self.pixels.chunks_exact(4).map(rgba_luminance).collect(),
        }
    }

    /// A white sample in this image's format.
    pub(crate) fn white(&self) -> &'static [u8] {
        match self.format {
            PixelFormat::Gray => &[255],
            PixelFormat::Rgba => &[255, 255, 255, 255],
        }
    }
}

fn rgba_luminance(px: &[u8]) -> f32 {
    let alpha = f32::from(px[3]) / 255.0;
    let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
    lum * alpha + 255.0 * (1.0 - alpha)
}
