//! Dithering algorithms for converting grayscale images to black-and-white.
//!
//! All four methods work on perceptual luminance (0-255) and return a
//! [`MonochromeBitmap`] where `true` means "print a dot". `invert` flips the
//! final decision, never the luminance.
//!
//! Threshold and Halftone have no cross-pixel dependency and run row-parallel
//! with rayon. Floyd-Steinberg and Atkinson diffuse error into later rows and
//! are strictly sequential, row-major, left to right.

use rayon::prelude::*;
use tracing::debug;

use crate::bitmap::MonochromeBitmap;
use crate::raster::RasterImage;
use crate::settings::{DitherMethod, ProcessingSettings};

/// 4x4 clustered-dot halftone order. Cell `(x mod 4, y mod 4)` prints when
/// the pixel is darker than `16 * m + 8`.
#[rustfmt::skip]
pub const HALFTONE4: [[u8; 4]; 4] = [
    [12,  5,  6, 13],
    [ 4,  0,  1,  7],
    [11,  3,  2,  8],
    [15, 10,  9, 14],
];

/// Convert an image to a 1-bit bitmap using `settings.dither_method`.
pub fn dither(image: &RasterImage, settings: &ProcessingSettings) -> MonochromeBitmap {
    let (width, height) = image.dimensions();
    debug!(
        width,
        height,
        method = %settings.dither_method,
        threshold = settings.threshold,
        invert = settings.invert,
        "Dithering image"
    );

    let luminance = image.luminance();
    let threshold = f32::from(settings.threshold);
    let w = width as usize;

    let mut bits = match settings.dither_method {
        DitherMethod::Threshold => threshold_bits(&luminance, w, threshold),
        DitherMethod::Halftone => halftone_bits(&luminance, w, settings.threshold),
        DitherMethod::FloydSteinberg | DitherMethod::Atkinson => {
            let (bits, budget) = diffuse_bits(settings.dither_method, luminance, w, threshold);
            debug!(
                produced = budget.produced,
                diffused = budget.diffused,
                dropped = budget.dropped,
                "Error diffusion finished"
            );
            bits
        }
    };

    if settings.invert {
        bits.iter_mut().for_each(|b| *b = !*b);
    }

    MonochromeBitmap::from_bits_unchecked(width, height, bits)
}

/// Black where luminance is below the threshold.
fn threshold_bits(luminance: &[f32], width: usize, threshold: f32) -> Vec<bool> {
    luminance
        .par_chunks(width)
        .flat_map_iter(|row| row.iter().map(move |&l| l < threshold))
        .collect()
}

/// Diffusion kernel as `(dx, dy, weight)` taps.
type Kernel = &'static [(isize, usize, f32)];

/// Floyd-Steinberg error distribution pattern:
/// - Right:        7/16
/// - Bottom-left:  3/16
/// - Bottom:       5/16
/// - Bottom-right: 1/16
const FLOYD_STEINBERG: Kernel = &[
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

/// Atkinson: 1/8 of the error to six neighbors, the remaining 2/8 is dropped.
const ATKINSON: Kernel = &[
    (1, 0, 1.0 / 8.0),
    (2, 0, 1.0 / 8.0),
    (-1, 1, 1.0 / 8.0),
    (0, 1, 1.0 / 8.0),
    (1, 1, 1.0 / 8.0),
    (0, 2, 1.0 / 8.0),
];

/// Where the quantization error of one diffusion pass went.
///
/// `produced - diffused - dropped` is what fell off the right and bottom edges.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorBudget {
    /// Sum of `old - new` over every pixel.
    pub produced: f64,
    /// Error added to neighbors inside the image.
    pub diffused: f64,
    /// Error the kernel never hands out (weights summing below 1).
    pub dropped: f64,
}

/// Run Floyd-Steinberg or Atkinson over a luminance buffer.
pub fn diffuse_bits(
    method: DitherMethod,
    mut buffer: Vec<f32>,
    width: usize,
    threshold: f32,
) -> (Vec<bool>, ErrorBudget) {
    let kernel = match method {
        DitherMethod::Atkinson => ATKINSON,
        _ => FLOYD_STEINBERG,
    };
    diffuse(&mut buffer, width, threshold, kernel)
}

/// Shared error-diffusion loop. Neighbors outside the image are skipped.
fn diffuse(buffer: &mut [f32], width: usize, threshold: f32, taps: Kernel) -> (Vec<bool>, ErrorBudget) {
    let height = buffer.len() / width;
    let mut bits = vec![false; buffer.len()];
    let kept: f32 = taps.iter().map(|&(_, _, w)| w).sum();
    let mut budget = ErrorBudget::default();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let old = buffer[idx];
            let black = old < threshold;
            let new = if black { 0.0 } else { 255.0 };
            let error = old - new;
            bits[idx] = black;
            budget.produced += f64::from(error);
            budget.dropped += f64::from(error * (1.0 - kept));

            for &(dx, dy, weight) in taps {
                let nx = x as isize + dx;
                let ny = y + dy;
                if nx < 0 || nx as usize >= width || ny >= height {
                    continue;
                }
                let share = error * weight;
                buffer[ny * width + nx as usize] += share;
                budget.diffused += f64::from(share);
            }
        }
    }

    (bits, budget)
}

/// Ordered dithering against the tiled [`HALFTONE4`] matrix, biased by
/// `threshold - 128`.
fn halftone_bits(luminance: &[f32], width: usize, threshold: u8) -> Vec<bool> {
    let bias = i32::from(threshold) - 128;
    luminance
        .par_chunks(width)
        .enumerate()
        .flat_map_iter(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, &l)| l < halftone_cell_threshold(x, y, bias))
        })
        .collect()
}

/// Threshold of the matrix cell covering `(x, y)`.
#[inline]
pub fn halftone_cell_threshold(x: usize, y: usize, bias: i32) -> f32 {
    let m = i32::from(HALFTONE4[y & 3][x & 3]);
    (16 * m + 8 + bias) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ProcessingSettings;

    /// Create a small test image with a gradient pattern.
    fn create_gradient_image(width: u32, height: u32) -> RasterImage {
        let px = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y) * 255 / (width + height - 2)) as u8))
            .collect();
        RasterImage::from_gray(width, height, px).unwrap()
    }

    fn settings(method: DitherMethod) -> ProcessingSettings {
        ProcessingSettings::default().with_dither_method(method)
    }

    fn black_count(bmp: &MonochromeBitmap) -> usize {
        bmp.bits().iter().filter(|&&b| b).count()
    }

    #[test]
    fn test_all_white_threshold_is_blank() {
        let img = RasterImage::from_rgba(4, 4, vec![255; 64]).unwrap();
        let bmp = dither(&img, &settings(DitherMethod::Threshold));
        assert_eq!(bmp.dimensions(), (4, 4));
        assert!(bmp.bits().iter().all(|&b| !b));
    }

    #[test]
    fn test_threshold_two_pixels() {
        let img = RasterImage::from_gray(2, 1, vec![10, 250]).unwrap();
        let bmp = dither(&img, &settings(DitherMethod::Threshold).with_threshold(128));
        assert_eq!(bmp.bits(), &[true, false]);
    }

    #[test]
    fn test_threshold_boundary() {
        let img = RasterImage::from_gray(4, 1, vec![0, 127, 128, 255]).unwrap();
        let bmp = dither(&img, &settings(DitherMethod::Threshold));
        assert_eq!(bmp.bits(), &[true, true, false, false]);
    }

    #[test]
    fn test_threshold_is_monotonic() {
        let img = create_gradient_image(16, 16);
        let mut previous = vec![false; 256];
        for t in 0..=255u8 {
            let bmp = dither(&img, &settings(DitherMethod::Threshold).with_threshold(t));
            for (i, (&now, &before)) in bmp.bits().iter().zip(&previous).enumerate() {
                assert!(now || !before, "pixel {i} turned white when threshold rose to {t}");
            }
            previous = bmp.bits().to_vec();
        }
    }

    #[test]
    fn test_invert_flips_decision() {
        let img = RasterImage::from_gray(2, 1, vec![10, 250]).unwrap();
        let bmp = dither(
            &img,
            &settings(DitherMethod::Threshold).with_invert(true),
        );
        assert_eq!(bmp.bits(), &[false, true]);

        for method in DitherMethod::ALL {
            let img = create_gradient_image(12, 9);
            let plain = dither(&img, &settings(method));
            let inverted = dither(&img, &settings(method).with_invert(true));
            for (a, b) in plain.bits().iter().zip(inverted.bits()) {
                assert_ne!(a, b, "{method} invert must flip every bit");
            }
        }
    }

    #[test]
    fn test_solid_inputs_for_all_methods() {
        for method in DitherMethod::ALL {
            let white = RasterImage::filled_gray(9, 7, 255).unwrap();
            let black = RasterImage::filled_gray(9, 7, 0).unwrap();
            assert_eq!(black_count(&dither(&white, &settings(method))), 0, "{method}");
            assert_eq!(black_count(&dither(&black, &settings(method))), 63, "{method}");
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let img = create_gradient_image(37, 23);
        for method in DitherMethod::ALL {
            let a = dither(&img, &settings(method));
            let b = dither(&img, &settings(method));
            assert_eq!(a, b, "{method}");
        }
    }

    #[test]
    fn test_floyd_steinberg_conserves_tone() {
        let (w, h) = (64usize, 48usize);
        for gray in [30u8, 100, 128, 200, 240] {
            let img = RasterImage::filled_gray(w as u32, h as u32, gray).unwrap();
            let bmp = dither(&img, &settings(DitherMethod::FloydSteinberg));
            let input: f32 = f32::from(gray) * (w * h) as f32;
            let output: f32 = bmp.bits().iter().map(|&b| if b { 0.0 } else { 255.0 }).sum();
            // only error pushed past the right and bottom edges is lost
            let leak_bound = 255.0 * (w + h) as f32;
            assert!(
                (input - output).abs() <= leak_bound,
                "gray {gray}: input {input} output {output}"
            );
        }
    }

    #[test]
    fn test_floyd_steinberg_known_3x3() {
        let img = RasterImage::from_gray(3, 3, vec![100, 150, 200, 50, 127, 250, 0, 80, 160])
            .unwrap();
        let bmp = dither(&img, &settings(DitherMethod::FloydSteinberg));

        // 100 < 128 -> black, error 100; 150 + 43.75 -> white
        assert!(bmp.get(0, 0));
        assert!(!bmp.get(1, 0));
        assert!(!bmp.get(2, 0));
        assert!(bmp.get(0, 2));
    }

    #[test]
    fn test_atkinson_discards_quarter_of_error() {
        // Atkinson spreads only 6/8 of the error, so light areas wash out
        // to white where Floyd-Steinberg still places sparse dots.
        let img = RasterImage::filled_gray(64, 64, 230).unwrap();
        let fs = black_count(&dither(&img, &settings(DitherMethod::FloydSteinberg)));
        let atk = black_count(&dither(&img, &settings(DitherMethod::Atkinson)));
        assert!(fs > 0);
        assert!(atk < fs, "atkinson {atk} should print fewer dots than fs {fs}");
    }

    /// Input tone minus printed tone, in luminance units.
    fn tone_gap(gray: u8, bits: &[bool]) -> f64 {
        let input = f64::from(gray) * bits.len() as f64;
        let output: f64 = bits.iter().map(|&b| if b { 0.0 } else { 255.0 }).sum();
        input - output
    }

    #[test]
    fn test_atkinson_tone_loss_is_the_dropped_quarter() {
        let (w, h) = (64usize, 48usize);
        for gray in [30u8, 100, 128, 200, 240] {
            let (bits, budget) =
                diffuse_bits(DitherMethod::Atkinson, vec![f32::from(gray); w * h], w, 128.0);
            let gap = tone_gap(gray, &bits);

            // every unit of tone lost is error that was not handed to a neighbor
            let undelivered = budget.produced - budget.diffused;
            assert!((gap - undelivered).abs() < 1.0, "gray {gray}: gap {gap} vs {undelivered}");

            // the kernel drops exactly 2/8 of all error
            let quarter = budget.produced / 4.0;
            assert!((budget.dropped - quarter).abs() < 1e-3 * budget.produced.abs().max(1.0));

            // what remains is bounded by error leaving the right and bottom edges
            let edge_pixels = (3 * h + 2 * w) as f64;
            let edge_leak = 255.0 * 0.75 * edge_pixels;
            assert!(
                (gap - quarter).abs() <= edge_leak,
                "gray {gray}: gap {gap} quarter {quarter}"
            );
        }
    }

    #[test]
    fn test_floyd_steinberg_drops_nothing() {
        let (w, h) = (32usize, 32usize);
        let (bits, budget) =
            diffuse_bits(DitherMethod::FloydSteinberg, vec![90.0; w * h], w, 128.0);
        assert!(budget.dropped.abs() < 1e-3);
        let gap = tone_gap(90, &bits);
        assert!((gap - (budget.produced - budget.diffused)).abs() < 1.0);
    }

    #[test]
    fn test_atkinson_mid_gray_density() {
        let img = RasterImage::filled_gray(32, 32, 128).unwrap();
        let count = black_count(&dither(&img, &settings(DitherMethod::Atkinson)));
        assert!(count > 300 && count < 724, "got {count}");
    }

    #[test]
    fn test_halftone_tiles_without_seams() {
        for gray in [20u8, 90, 128, 170, 230] {
            let img = RasterImage::filled_gray(18, 13, gray).unwrap();
            let bmp = dither(&img, &settings(DitherMethod::Halftone));
            for y in 0..13u32 {
                for x in 0..18u32 {
                    assert_eq!(
                        bmp.get(x, y),
                        bmp.get(x % 4, y % 4),
                        "gray {gray} at ({x}, {y})"
                    );
                    let expected = f32::from(gray) < halftone_cell_threshold(x as usize, y as usize, 0);
                    assert_eq!(bmp.get(x, y), expected);
                }
            }
        }
    }

    #[test]
    fn test_halftone_matrix_is_permutation() {
        let mut seen = [false; 16];
        for row in &HALFTONE4 {
            for &v in row {
                assert!(!seen[v as usize], "duplicate {v}");
                seen[v as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_halftone_threshold_biases_density() {
        let img = RasterImage::filled_gray(16, 16, 128).unwrap();
        let dark = black_count(&dither(&img, &settings(DitherMethod::Halftone).with_threshold(200)));
        let mid = black_count(&dither(&img, &settings(DitherMethod::Halftone)));
        let light = black_count(&dither(&img, &settings(DitherMethod::Halftone).with_threshold(60)));
        assert!(dark > mid && mid > light, "{dark} {mid} {light}");
    }
}
