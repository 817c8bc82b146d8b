//! Lossless quarter-turn rotation by index remapping.

use tracing::debug;

use crate::raster::RasterImage;
use crate::settings::Rotation;
use crate::Result;

/// Rotate an image clockwise by `rotation`.
///
/// Every output pixel is copied from exactly one input pixel, so four
/// quarter turns reproduce the original buffer byte-for-byte.
pub fn rotate(img: &RasterImage, rotation: Rotation) -> Result<RasterImage> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if rotation == Rotation::Deg0 {
        return Ok(img.clone());
    }
    debug!(w, h, degrees = rotation.degrees(), "Rotating image");

    let c = img.channels();
    let src = img.pixels();
    let mut dst = vec![0u8; src.len()];
    let (out_w, out_h) = match rotation {
        Rotation::Deg90 | Rotation::Deg270 => (h, w),
        _ => (w, h),
    };

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::Deg0 => (x, y),
                Rotation::Deg90 => (h - 1 - y, x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (y, w - 1 - x),
            };
            let s = (y * w + x) * c;
            let d = (dy * out_w + dx) * c;
            dst[d..d + c].copy_from_slice(&src[s..s + c]);
        }
    }

    RasterImage::new(out_w as u32, out_h as u32, img.format(), dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a test image with unique pixel values at corners.
    /// Top-left=10, Top-right=20, Bottom-left=30, Bottom-right=40
    fn create_corner_image(width: u32, height: u32) -> RasterImage {
        let mut px = vec![128u8; (width * height) as usize];
        let w = width as usize;
        let h = height as usize;
        px[0] = 10;
        px[w - 1] = 20;
        px[(h - 1) * w] = 30;
        px[h * w - 1] = 40;
        RasterImage::from_gray(width, height, px).unwrap()
    }

    fn value(img: &RasterImage, x: u32, y: u32) -> u8 {
        img.pixel(x, y)[0]
    }

    #[test]
    fn test_rotate_180_corner_values() {
        let img = create_corner_image(4, 4);
        let rotated = rotate(&img, Rotation::Deg180).unwrap();

        assert_eq!(rotated.dimensions(), (4, 4));
        assert_eq!(value(&rotated, 0, 0), 40);
        assert_eq!(value(&rotated, 3, 0), 30);
        assert_eq!(value(&rotated, 0, 3), 20);
        assert_eq!(value(&rotated, 3, 3), 10);
    }

    #[test]
    fn test_rotate_90_corner_values() {
        let img = create_corner_image(6, 3);
        let result = rotate(&img, Rotation::Deg90).unwrap();

        assert_eq!(result.dimensions(), (3, 6));
        assert_eq!(value(&result, 2, 0), 10);
        assert_eq!(value(&result, 2, 5), 20);
        assert_eq!(value(&result, 0, 0), 30);
        assert_eq!(value(&result, 0, 5), 40);
    }

    #[test]
    fn test_rotate_270_is_inverse_of_90() {
        let img = create_corner_image(5, 7);
        let there = rotate(&img, Rotation::Deg90).unwrap();
        let back = rotate(&there, Rotation::Deg270).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn test_four_quarter_turns_is_identity() {
        let px: Vec<u8> = (0..(5 * 3 * 4)).map(|v| v as u8).collect();
        let img = RasterImage::from_rgba(5, 3, px).unwrap();

        let mut current = img.clone();
        for _ in 0..4 {
            current = rotate(&current, Rotation::Deg90).unwrap();
        }
        assert_eq!(current, img);

        let mut current = img.clone();
        for _ in 0..4 {
            current = rotate(&current, Rotation::Deg270).unwrap();
        }
        assert_eq!(current, img);
    }

    #[test]
    fn test_printer_width_image_rotated_90() {
        let img = RasterImage::filled_gray(384, 100, 200).unwrap();
        let rotated = rotate(&img, Rotation::Deg90).unwrap();
        assert_eq!(rotated.dimensions(), (100, 384));
    }

    #[test]
    fn test_rotate_0_is_copy() {
        let img = create_corner_image(3, 2);
        assert_eq!(rotate(&img, Rotation::Deg0).unwrap(), img);
    }
}
