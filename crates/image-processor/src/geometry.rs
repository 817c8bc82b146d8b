//! Geometric normalization to the printer's fixed line width.
//!
//! Order: rotate, then fit the content into `width - 2 * padding`
//! (autoscale or center-crop), then place it on a white canvas that is
//! exactly `settings.width` wide with `padding` rows above and below.

use tracing::debug;

use crate::raster::RasterImage;
use crate::resize::{resize_to_width, scaled_height};
use crate::rotate::rotate;
use crate::settings::ProcessingSettings;
use crate::{ImageError, MAX_ROWS, Result};

/// Height [`normalize`] will produce for a `width x height` source,
/// computed without touching any pixels.
pub fn output_height(width: u32, height: u32, settings: &ProcessingSettings) -> Result<u32> {
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidImage("zero-area image".into()));
    }
    let (w, h) = if settings.rotation.quarter_turns() % 2 == 1 {
        (height, width)
    } else {
        (width, height)
    };
    let content = if settings.autoscale {
        scaled_height(w, h, settings.content_width())?
    } else {
        h
    };
    content
        .checked_add(settings.padding.saturating_mul(2))
        .ok_or_else(|| ImageError::InvalidImage("padded height overflows".into()))
}

/// Rotate, scale and pad `image` for printing.
///
/// The result is always `settings.width` pixels wide and at most
/// [`MAX_ROWS`] tall; taller results are rejected before any resampling.
pub fn normalize(image: &RasterImage, settings: &ProcessingSettings) -> Result<RasterImage> {
    settings.validate()?;
    let rows = output_height(image.width(), image.height(), settings)?;
    if rows > MAX_ROWS {
        return Err(ImageError::InvalidImage(format!(
            "{rows} rows exceed the {MAX_ROWS} row limit"
        )));
    }

    let rotated = rotate(image, settings.rotation)?;
    let content_width = settings.content_width();

    let content = if settings.autoscale {
        resize_to_width(&rotated, content_width)?
    } else if rotated.width() > content_width {
        crop_center(&rotated, content_width)?
    } else {
        rotated
    };

    let out = pad(&content, settings.width, settings.padding)?;
    debug!(
        src_w = image.width(),
        src_h = image.height(),
        out_w = out.width(),
        out_h = out.height(),
        "Image normalized"
    );
    Ok(out)
}

/// Keep the horizontally centered `width` columns.
pub fn crop_center(img: &RasterImage, width: u32) -> Result<RasterImage> {
    if width >= img.width() {
        return Ok(img.clone());
    }
    let c = img.channels();
    let src_w = img.width() as usize;
    let left = (img.width() - width) as usize / 2;
    let row_len = width as usize * c;

    let mut out = Vec::with_capacity(row_len * img.height() as usize);
    for row in img.pixels().chunks_exact(src_w * c) {
        out.extend_from_slice(&row[left * c..left * c + row_len]);
    }
    debug!(from = img.width(), to = width, "Cropped image to printable width");
    RasterImage::new(width, img.height(), img.format(), out)
}

/// Place `content` on a white canvas `canvas_width` wide.
///
/// The content is centered inside the area left of the horizontal padding
/// and `padding` white rows are added above and below.
pub fn pad(content: &RasterImage, canvas_width: u32, padding: u32) -> Result<RasterImage> {
    let area = canvas_width.saturating_sub(padding * 2);
    if content.width() > area {
        return Err(ImageError::InvalidImage(format!(
            "content width {} exceeds printable area {area}",
            content.width()
        )));
    }

    let c = content.channels();
    let out_w = canvas_width as usize;
    let out_h = (content.height() + padding * 2) as usize;
    let white = content.white();
    let mut out: Vec<u8> = white.iter().copied().cycle().take(out_w * out_h * c).collect();

    let left = padding as usize + (area - content.width()) as usize / 2;
    let top = padding as usize;
    let row_len = content.width() as usize * c;
    for (y, row) in content.pixels().chunks_exact(row_len).enumerate() {
        let start = ((top + y) * out_w + left) * c;
        out[start..start + row_len].copy_from_slice(row);
    }

    RasterImage::new(canvas_width, out_h as u32, content.format(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Rotation;

    fn gray(width: u32, height: u32, value: u8) -> RasterImage {
        RasterImage::filled_gray(width, height, value).unwrap()
    }

    #[test]
    fn test_autoscale_fills_width() {
        let img = gray(800, 400, 0);
        let out = normalize(&img, &ProcessingSettings::default()).unwrap();
        assert_eq!(out.dimensions(), (384, 192));
    }

    #[test]
    fn test_padding_is_inside_width_and_adds_height() {
        let img = gray(100, 50, 0);
        let settings = ProcessingSettings::default().with_padding(10);
        let out = normalize(&img, &settings).unwrap();
        // content scaled to 364 wide: 50 * 364 / 100 = 182
        assert_eq!(out.dimensions(), (384, 182 + 20));
        assert_eq!(out.pixel(0, 0), &[255]);
        assert_eq!(out.pixel(9, 50), &[255]);
        assert_eq!(out.pixel(383, 50), &[255]);
        assert_eq!(out.pixel(200, 9), &[255]);
        assert_eq!(out.pixel(200, 201), &[255]);
        assert_eq!(out.pixel(200, 100), &[0]);
    }

    #[test]
    fn test_no_autoscale_crops_wide_image() {
        let mut px = vec![255u8; 500 * 2];
        // mark the column that should land at the left edge after a centered crop
        px[58] = 0;
        px[500 + 58] = 0;
        let img = RasterImage::from_gray(500, 2, px).unwrap();
        let settings = ProcessingSettings::default().with_autoscale(false);
        let out = normalize(&img, &settings).unwrap();
        assert_eq!(out.dimensions(), (384, 2));
        assert_eq!(out.pixel(0, 0), &[0]);
        assert_eq!(out.pixel(1, 0), &[255]);
    }

    #[test]
    fn test_no_autoscale_centers_narrow_image() {
        let img = gray(100, 3, 0);
        let settings = ProcessingSettings::default().with_autoscale(false);
        let out = normalize(&img, &settings).unwrap();
        assert_eq!(out.dimensions(), (384, 3));
        assert_eq!(out.pixel(141, 1), &[255]);
        assert_eq!(out.pixel(142, 1), &[0]);
        assert_eq!(out.pixel(241, 1), &[0]);
        assert_eq!(out.pixel(242, 1), &[255]);
    }

    #[test]
    fn test_rotation_applied_before_scaling() {
        let img = gray(384, 100, 0);
        let settings = ProcessingSettings::default()
            .with_rotation(Rotation::Deg90)
            .with_autoscale(false);
        let out = normalize(&img, &settings).unwrap();
        // rotated content is 100x384, centered on a 384-wide line
        assert_eq!(out.dimensions(), (384, 384));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let img = gray(10, 10, 0);
        let settings = ProcessingSettings::default().with_width(500);
        assert!(matches!(
            normalize(&img, &settings),
            Err(ImageError::UnsupportedSetting { name: "width", .. })
        ));
    }

    #[test]
    fn test_output_height_matches_normalize() {
        let img = gray(100, 50, 0);
        let settings = ProcessingSettings::default().with_padding(10);
        let out = normalize(&img, &settings).unwrap();
        assert_eq!(output_height(100, 50, &settings).unwrap(), out.height());

        let rotated = ProcessingSettings::default()
            .with_rotation(Rotation::Deg90)
            .with_autoscale(false);
        assert_eq!(output_height(384, 100, &rotated).unwrap(), 384);
    }

    #[test]
    fn test_tall_autoscale_rejected_before_resize() {
        // 1 px wide, scaled to 384 wide: 200_000 * 384 rows
        let img = gray(1, 200_000, 0);
        let err = normalize(&img, &ProcessingSettings::default()).unwrap_err();
        assert!(matches!(err, ImageError::InvalidImage(ref msg) if msg.contains("row limit")));

        let huge = ProcessingSettings::default();
        assert!(output_height(1, 20_000_000, &huge).is_err());
    }

    #[test]
    fn test_max_rows_is_accepted() {
        let settings = ProcessingSettings::default().with_autoscale(false);
        assert_eq!(output_height(10, MAX_ROWS, &settings).unwrap(), MAX_ROWS);
        let padded = settings.with_padding(1);
        assert!(output_height(10, MAX_ROWS, &padded).unwrap() > MAX_ROWS);
    }

    #[test]
    fn test_rgba_padding_is_opaque_white() {
        let img = RasterImage::from_rgba(2, 1, vec![0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        let out = pad(&img, 8, 1).unwrap();
        assert_eq!(out.dimensions(), (8, 3));
        assert_eq!(out.pixel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(out.pixel(3, 1), &[0, 0, 0, 255]);
    }
}
