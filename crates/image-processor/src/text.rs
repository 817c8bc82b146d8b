//! Plain text rasterization for printing notes and labels.
//!
//! Text is wrapped on spaces to the printable width, drawn black on white
//! and returned as a [`RasterImage`] that goes through the normal pipeline.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{GrayImage, Luma};
use imageproc::drawing::draw_text_mut;
use serde::Serialize;
use tracing::debug;

use crate::raster::RasterImage;
use crate::{ImageError, PAPER_WIDTH, Result};

/// Default font size in pixels.
pub const DEFAULT_FONT_SIZE: f32 = 24.0;

/// Line advance as a multiple of the font size.
pub const LINE_SPACING: f32 = 1.3;

/// White margin around the text block.
pub const TEXT_PADDING: u32 = 10;

/// Layout parameters for [`render_text`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    pub width: u32,
    pub padding: u32,
    pub font_size: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            width: PAPER_WIDTH,
            padding: TEXT_PADDING,
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl TextLayout {
    pub fn max_line_width(&self) -> u32 {
        self.width.saturating_sub(self.padding * 2)
    }

    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_SPACING
    }

    /// Canvas height for `lines` lines of text.
    pub fn canvas_height(&self, lines: usize) -> u32 {
        (lines as f32 * self.line_height()) as u32 + self.padding * 2
    }
}

/// Counts shown next to a text preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSummary {
    pub total_lines: usize,
    pub print_height: u32,
    pub characters: usize,
}

/// A TrueType/OpenType font loaded from memory.
pub struct TextFont {
    font: FontVec,
}

impl TextFont {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| ImageError::Font(e.to_string()))?;
        Ok(Self { font })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ImageError::Font(format!("{}: {e}", path.display())))?;
        Self::from_bytes(bytes)
    }

    /// Measure the pixel width of a string at the given scale.
    pub fn measure(&self, scale: PxScale, text: &str) -> u32 {
        let scaled = self.font.as_scaled(scale);
        let mut width = 0.0f32;
        let mut prev: Option<ab_glyph::GlyphId> = None;

        for ch in text.chars() {
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                width += scaled.kern(prev, glyph_id);
            }
            width += scaled.h_advance(glyph_id);
            prev = Some(glyph_id);
        }

        width.ceil() as u32
    }
}

/// Wrap text to fit within `max_width` pixels.
///
/// Explicit newlines always break. Within a line, words are separated by
/// single spaces and a word moves to the next line when appending it would
/// overflow, unless it is the first word of its source line. Over-long words
/// are kept whole.
pub fn wrap_text(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();

    for raw in text.split('\n') {
        let mut current = String::new();
        for (i, word) in raw.split(' ').enumerate() {
            let candidate = format!("{current}{word} ");
            if i > 0 && measure(&candidate) > max_width {
                lines.push(current.trim().to_string());
                current = format!("{word} ");
            } else {
                current = candidate;
            }
        }
        lines.push(current.trim().to_string());
    }

    lines
}

/// Render `text` black on white, `layout.width` pixels wide.
pub fn render_text(text: &str, font: &TextFont, layout: &TextLayout) -> Result<(RasterImage, TextSummary)> {
    if layout.max_line_width() == 0 {
        return Err(ImageError::unsupported(
            "padding",
            format!("padding {} leaves no room on a {} px line", layout.padding, layout.width),
        ));
    }
    let scale = PxScale::from(layout.font_size);
    let lines = wrap_text(text, layout.max_line_width(), |s| font.measure(scale, s));
    let height = layout.canvas_height(lines.len());

    let mut canvas = GrayImage::from_pixel(layout.width, height, Luma([255]));
    for (i, line) in lines.iter().enumerate() {
        let y = layout.padding as f32 + i as f32 * layout.line_height();
        draw_text_mut(
            &mut canvas,
            Luma([0]),
            layout.padding as i32,
            y as i32,
            scale,
            &font.font,
            line,
        );
    }

    let summary = TextSummary {
        total_lines: lines.len(),
        print_height: height,
        characters: text.chars().count(),
    };
    debug!(lines = summary.total_lines, height, "Rendered text");

    let image = RasterImage::from_gray(layout.width, height, canvas.into_raw())?;
    Ok((image, summary))
}
