//! Read-only description of a processed image for display.

use serde::Serialize;

use crate::raster::RasterImage;
use crate::settings::{DitherMethod, ProcessingSettings};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSummary {
    pub original_width: u32,
    pub original_height: u32,
    pub processed_width: u32,
    pub processed_height: u32,
    /// Source width over height, two decimals.
    pub aspect_ratio: String,
    pub dither_method: DitherMethod,
    pub threshold: u8,
    pub invert: bool,
    /// Clockwise degrees.
    pub rotation: u32,
}

impl ImageSummary {
    pub fn new(
        original: &RasterImage,
        processed: (u32, u32),
        settings: &ProcessingSettings,
    ) -> Self {
        let (ow, oh) = original.dimensions();
        Self {
            original_width: ow,
            original_height: oh,
            processed_width: processed.0,
            processed_height: processed.1,
            aspect_ratio: format!("{:.2}", f64::from(ow) / f64::from(oh)),
            dither_method: settings.dither_method,
            threshold: settings.threshold,
            invert: settings.invert,
            rotation: settings.rotation.degrees(),
        }
    }
}
