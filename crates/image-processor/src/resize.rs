//! Aspect-preserving resize to the printable width.
//!
//! Resampling uses Lanczos3 from the `image` crate; the target height is
//! computed here with integer round-half-up so it is reproducible.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use tracing::debug;

use crate::raster::{PixelFormat, RasterImage};
use crate::{ImageError, Result};

/// Height after scaling `orig_w x orig_h` to `width`, rounded half up, at least 1.
///
/// Fails when the result does not fit in `u32`.
pub fn scaled_height(orig_w: u32, orig_h: u32, width: u32) -> Result<u32> {
    if orig_w == 0 {
        return Err(ImageError::InvalidImage("zero-width image".into()));
    }
    let num = 2 * u64::from(orig_h) * u64::from(width) + u64::from(orig_w);
    let den = 2 * u64::from(orig_w);
    let height = u32::try_from(num / den).map_err(|_| {
        ImageError::InvalidImage(format!(
            "scaling {orig_w}x{orig_h} to width {width} overflows the height"
        ))
    })?;
    Ok(height.max(1))
}

/// Resize an image to a target width while maintaining aspect ratio.
///
/// Returns the original image unchanged if it already matches the target width.
pub fn resize_to_width(img: &RasterImage, width: u32) -> Result<RasterImage> {
    let (orig_w, orig_h) = img.dimensions();
    if width == 0 {
        return Err(ImageError::unsupported("width", "target width must be non-zero"));
    }

    if orig_w == width {
        debug!(width, "Image already at target width, skipping resize");
        return Ok(img.clone());
    }

    let new_height = scaled_height(orig_w, orig_h, width)?;

    debug!(
        orig_w,
        orig_h,
        new_width = width,
        new_height,
        "Resizing image to target width"
    );

    match img.format() {
        PixelFormat::Gray => {
            let src = GrayImage::from_raw(orig_w, orig_h, img.pixels().to_vec())
                .ok_or_else(|| ImageError::InvalidImage("gray buffer size mismatch".into()))?;
            let out = imageops::resize(&src, width, new_height, FilterType::Lanczos3);
            RasterImage::from_gray(width, new_height, out.into_raw())
        }
        PixelFormat::Rgba => {
            let src = RgbaImage::from_raw(orig_w, orig_h, img.pixels().to_vec())
                .ok_or_else(|| ImageError::InvalidImage("rgba buffer size mismatch".into()))?;
            let out = imageops::resize(&src, width, new_height, FilterType::Lanczos3);
            RasterImage::from_rgba(width, new_height, out.into_raw())
        }
    }
}
