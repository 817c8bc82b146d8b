//! End-to-end print pipeline.
//!
//! normalize -> dither -> pack -> frame -> chunk runs synchronously and
//! produces a [`PrintJob`]; only the transfer itself is async.

use image_processor::geometry::output_height;
use image_processor::{
    ImageSummary, MonochromeBitmap, ProcessingSettings, RasterImage, dither, normalize, pack,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::frame::{PrinterFrame, TransferChunk, chunk_frame};
use crate::options::TransferOptions;
use crate::protocol::PrinterProfile;
use crate::transfer::{TransferController, TransferReport};
use crate::transport::Transport;
use crate::{CatPrinterError, Result};

/// Everything needed to print (or preview) one image.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub bitmap: MonochromeBitmap,
    pub frame: PrinterFrame,
    pub chunks: Vec<TransferChunk>,
    pub summary: ImageSummary,
}

/// Normalize and dither an image without framing it.
pub fn render_bitmap(
    image: &RasterImage,
    settings: &ProcessingSettings,
) -> Result<(MonochromeBitmap, ImageSummary)> {
    let normalized = normalize(image, settings)?;
    let bitmap = dither(&normalized, settings);
    let summary = ImageSummary::new(image, bitmap.dimensions(), settings);
    Ok((bitmap, summary))
}

/// Run every CPU stage for `image` and cut the result into chunks for `profile`.
pub fn prepare_job(
    image: &RasterImage,
    settings: &ProcessingSettings,
    profile: &dyn PrinterProfile,
) -> Result<PrintJob> {
    if settings.width > profile.dots_per_line() {
        return Err(CatPrinterError::InvalidFrame(format!(
            "width {} exceeds the {} dots of {}",
            settings.width,
            profile.dots_per_line(),
            profile.name()
        )));
    }

    settings.validate()?;
    let rows = output_height(image.width(), image.height(), settings)?;
    if rows > profile.max_rows() {
        return Err(CatPrinterError::InvalidFrame(format!(
            "{rows} rows exceed the {} row limit of {}",
            profile.max_rows(),
            profile.name()
        )));
    }

    let (bitmap, summary) = render_bitmap(image, settings)?;
    let packed = pack(&bitmap)?;
    let frame = PrinterFrame::build(&packed, profile)?;
    let chunks = chunk_frame(&frame, profile.max_chunk_bytes())?;

    info!(
        width = summary.processed_width,
        height = summary.processed_height,
        method = %settings.dither_method,
        chunks = chunks.len(),
        "Print job prepared"
    );

    Ok(PrintJob {
        bitmap,
        frame,
        chunks,
        summary,
    })
}

/// Send a prepared job.
pub async fn print<T: Transport>(
    controller: &TransferController<T>,
    job: &PrintJob,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<TransferReport> {
    controller.send(&job.chunks, options, cancel).await
}
