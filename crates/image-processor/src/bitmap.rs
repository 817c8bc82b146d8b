//! 1-bit bitmaps and their packed row form.
//!
//! Packing is MSB-first: pixel `x` of a row lands in byte `x / 8` at bit
//! `7 - (x % 8)`. A set bit means "burn a dot". Trailing bits of the last
//! byte in each row are always zero.

use image::GrayImage;

use crate::{ImageError, Result};

/// A black-and-white image where `true` means the printer burns a dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonochromeBitmap {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl MonochromeBitmap {
    pub fn new(width: u32, height: u32, bits: Vec<bool>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidBitmap(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if bits.len() != width as usize * height as usize {
            return Err(ImageError::InvalidBitmap(format!(
                "expected {} bits for {width}x{height}, got {}",
                width as usize * height as usize,
                bits.len()
            )));
        }
        Ok(Self::from_bits_unchecked(width, height, bits))
    }

    /// Build from a buffer the caller already sized as `width * height`.
    pub(crate) fn from_bits_unchecked(width: u32, height: u32, bits: Vec<bool>) -> Self {
        debug_assert_eq!(bits.len(), width as usize * height as usize);
        Self { width, height, bits }
    }

    /// An all-white bitmap.
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        Self::new(width, height, vec![false; width as usize * height as usize])
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

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Number of dots that will be burned.
    pub fn black_pixels(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Render as a grayscale image (black dots on white) for previews.
    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.get(x, y) { 0 } else { 255 }])
        })
    }
}

/// Row-packed bitmap ready for framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRaster {
    width: u32,
    height: u32,
    row_bytes: usize,
    data: Vec<u8>,
}

impl PackedRaster {
    /// Wrap packed rows, checking `data.len() == ceil(width / 8) * height`.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidBitmap(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let row_bytes = row_bytes(width);
        if data.len() != row_bytes * height as usize {
            return Err(ImageError::InvalidBitmap(format!(
                "expected {} packed bytes, got {}",
                row_bytes * height as usize,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            row_bytes,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per packed row, `ceil(width / 8)`.
    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Iterate over packed rows, top to bottom.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.row_bytes)
    }
}

/// Bytes needed for one packed row of `width` pixels.
pub fn row_bytes(width: u32) -> usize {
    (width as usize).div_ceil(8)
}

/// Pack a bitmap MSB-first, one byte-aligned row at a time.
pub fn pack(bitmap: &MonochromeBitmap) -> Result<PackedRaster> {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidBitmap("zero-area bitmap".into()));
    }
    let stride = row_bytes(width);
    let mut data = vec![0u8; stride * height as usize];

    for (row, out) in bitmap
        .bits()
        .chunks_exact(width as usize)
        .zip(data.chunks_exact_mut(stride))
    {
        pack_row(row, out);
    }

    PackedRaster::new(width, height, data)
}

fn pack_row(row: &[bool], out: &mut [u8]) {
    for (x, _) in row.iter().enumerate().filter(|&(_, &black)| black) {
        out[x / 8] |= 0x80 >> (x % 8);
    }
}

/// Expand a packed raster back into a bitmap. Padding bits are ignored.
pub fn unpack(raster: &PackedRaster) -> MonochromeBitmap {
    let width = raster.width() as usize;
    let bits = raster
        .rows()
        .flat_map(|row| (0..width).map(move |x| row[x / 8] & (0x80 >> (x % 8)) != 0))
        .collect();
    MonochromeBitmap::from_bits_unchecked(raster.width(), raster.height(), bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap(width: u32, height: u32, bits: &[u8]) -> MonochromeBitmap {
        MonochromeBitmap::new(width, height, bits.iter().map(|&b| b == 1).collect()).unwrap()
    }

    #[test]
    fn test_pack_msb_first() {
        let bmp = bitmap(8, 1, &[1, 0, 1, 0, 0, 0, 0, 0]);
        let packed = pack(&bmp).unwrap();
        assert_eq!(packed.data(), &[0xA0]);
        assert_eq!(packed.row_bytes(), 1);
    }

    #[test]
    fn test_pack_ten_pixel_row_pads_with_zero() {
        let bmp = bitmap(10, 1, &[1; 10]);
        let packed = pack(&bmp).unwrap();
        assert_eq!(packed.row_bytes(), 2);
        assert_eq!(packed.data(), &[0xFF, 0xC0]);
    }

    #[test]
    fn test_padding_does_not_leak_between_rows() {
        let bmp = bitmap(3, 2, &[0, 0, 1, 1, 0, 0]);
        let packed = pack(&bmp).unwrap();
        assert_eq!(packed.data(), &[0x20, 0x80]);
        assert_eq!(packed.rows().count(), 2);
    }

    #[test]
    fn test_full_paper_width_row() {
        let bmp = MonochromeBitmap::new(384, 2, vec![true; 768]).unwrap();
        let packed = pack(&bmp).unwrap();
        assert_eq!(packed.row_bytes(), 48);
        assert_eq!(packed.data().len(), 96);
        assert!(packed.data().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_unpack_recovers_bitmap() {
        let bits: Vec<bool> = (0..13 * 5).map(|i| i % 3 == 0 || i % 7 == 0).collect();
        let bmp = MonochromeBitmap::new(13, 5, bits).unwrap();
        assert_eq!(unpack(&pack(&bmp).unwrap()), bmp);
    }

    #[test]
    fn test_unpack_ignores_padding_bits() {
        let raster = PackedRaster::new(4, 1, vec![0x9F]).unwrap();
        let bmp = unpack(&raster);
        assert_eq!(bmp.bits(), &[true, false, false, true]);
    }

    #[test]
    fn test_invalid_dimensions_rejected() {
        assert!(matches!(
            MonochromeBitmap::new(0, 3, vec![]),
            Err(ImageError::InvalidBitmap(_))
        ));
        assert!(matches!(
            MonochromeBitmap::new(2, 2, vec![true; 3]),
            Err(ImageError::InvalidBitmap(_))
        ));
        assert!(matches!(
            PackedRaster::new(9, 1, vec![0]),
            Err(ImageError::InvalidBitmap(_))
        ));
    }

    #[test]
    fn test_preview_colors() {
        let bmp = bitmap(2, 1, &[1, 0]);
        let img = bmp.to_gray_image();
        assert_eq!(img.get_pixel(0, 0).0, [0]);
        assert_eq!(img.get_pixel(1, 0).0, [255]);
    }
}
