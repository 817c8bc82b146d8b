//! Processing settings shared by the geometry and dither stages.
//!
//! Settings are plain values: every stage receives a snapshot, and updates
//! go through [`SettingsStore`] which hands out a new snapshot each time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ImageError, PAPER_WIDTH, Result};

/// Maximum white margin in pixels.
pub const MAX_PADDING: u32 = 100;

/// Default binarization threshold.
pub const DEFAULT_THRESHOLD: u8 = 128;

/// Dithering algorithm applied after geometric normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DitherMethod {
    Threshold,
    #[default]
    FloydSteinberg,
    Atkinson,
    Halftone,
}

impl DitherMethod {
    pub const ALL: [DitherMethod; 4] = [
        Self::Threshold,
        Self::FloydSteinberg,
        Self::Atkinson,
        Self::Halftone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Threshold => "threshold",
            Self::FloydSteinberg => "floydSteinberg",
            Self::Atkinson => "atkinson",
            Self::Halftone => "halftone",
        }
    }
}

impl fmt::Display for DitherMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DitherMethod {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "threshold" => Ok(Self::Threshold),
            "floydsteinberg" | "fs" => Ok(Self::FloydSteinberg),
            "atkinson" => Ok(Self::Atkinson),
            "halftone" | "ordered" => Ok(Self::Halftone),
            _ => Err(ImageError::unsupported(
                "ditherMethod",
                format!("unknown method '{s}'"),
            )),
        }
    }
}

/// Clockwise rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Reduce any degree value modulo 360. Negative values wrap
    /// (`-90` is `270`); values that are not a multiple of 90 are rejected.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(ImageError::unsupported(
                "rotation",
                format!("{degrees} is not a multiple of 90"),
            ));
        }
        Ok(match degrees.rem_euclid(360) {
            0 => Self::Deg0,
            90 => Self::Deg90,
            180 => Self::Deg180,
            _ => Self::Deg270,
        })
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Quarter turns clockwise (0..=3).
    pub fn quarter_turns(self) -> u32 {
        self.degrees() / 90
    }

    /// Add a signed delta in degrees.
    pub fn rotated_by(self, delta: i32) -> Result<Self> {
        Self::from_degrees(self.degrees() as i32 + delta)
    }

    /// One step counter-clockwise.
    pub fn rotated_left(self) -> Self {
        Self::from_turns(self.quarter_turns() + 3)
    }

    /// One step clockwise.
    pub fn rotated_right(self) -> Self {
        Self::from_turns(self.quarter_turns() + 1)
    }

    fn from_turns(turns: u32) -> Self {
        match turns % 4 {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }
}

impl Serialize for Rotation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.degrees())
    }
}

impl<'de> Deserialize<'de> for Rotation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let degrees = i32::deserialize(deserializer)?;
        Self::from_degrees(degrees).map_err(serde::de::Error::custom)
    }
}

/// Parameters for one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingSettings {
    pub dither_method: DitherMethod,
    /// Luminance below this prints black (0-255).
    pub threshold: u8,
    /// Flip the final black/white decision.
    pub invert: bool,
    /// Output width in pixels (1..=384).
    pub width: u32,
    /// Scale the content to fill the printable width.
    pub autoscale: bool,
    /// White margin on every side, in pixels (0..=100).
    pub padding: u32,
    pub rotation: Rotation,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            dither_method: DitherMethod::FloydSteinberg,
            threshold: DEFAULT_THRESHOLD,
            invert: false,
            width: PAPER_WIDTH,
            autoscale: true,
            padding: 0,
            rotation: Rotation::Deg0,
        }
    }
}

impl ProcessingSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-check ranges. Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.width > PAPER_WIDTH {
            return Err(ImageError::unsupported(
                "width",
                format!("must be between 1 and {PAPER_WIDTH}, got {}", self.width),
            ));
        }
        if self.padding > MAX_PADDING {
            return Err(ImageError::unsupported(
                "padding",
                format!("must be between 0 and {MAX_PADDING}, got {}", self.padding),
            ));
        }
        if self.padding * 2 >= self.width {
            return Err(ImageError::unsupported(
                "padding",
                format!(
                    "padding {} leaves no printable area in width {}",
                    self.padding, self.width
                ),
            ));
        }
        Ok(())
    }

    /// Width left for image content once horizontal padding is taken.
    pub fn content_width(&self) -> u32 {
        self.width.saturating_sub(self.padding * 2)
    }

    pub fn with_dither_method(mut self, method: DitherMethod) -> Self {
        self.dither_method = method;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = width;
        self
    }

    pub fn with_autoscale(mut self, autoscale: bool) -> Self {
        self.autoscale = autoscale;
        self
    }

    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsUpdate {
    pub dither_method: Option<DitherMethod>,
    pub threshold: Option<u8>,
    pub invert: Option<bool>,
    pub width: Option<u32>,
    pub autoscale: Option<bool>,
    pub padding: Option<u32>,
    pub rotation: Option<Rotation>,
}

impl SettingsUpdate {
    /// Apply on top of `base`, validating the result.
    pub fn apply_to(&self, base: ProcessingSettings) -> Result<ProcessingSettings> {
        let next = ProcessingSettings {
            dither_method: self.dither_method.unwrap_or(base.dither_method),
            threshold: self.threshold.unwrap_or(base.threshold),
            invert: self.invert.unwrap_or(base.invert),
            width: self.width.unwrap_or(base.width),
            autoscale: self.autoscale.unwrap_or(base.autoscale),
            padding: self.padding.unwrap_or(base.padding),
            rotation: self.rotation.unwrap_or(base.rotation),
        };
        next.validate()?;
        Ok(next)
    }
}

/// Owner of the current settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    current: ProcessingSettings,
}

impl SettingsStore {
    pub fn new(initial: ProcessingSettings) -> Result<Self> {
        initial.validate()?;
        Ok(Self { current: initial })
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> ProcessingSettings {
        self.current
    }

    /// Merge a partial update. On error the stored settings are unchanged.
    pub fn update(&mut self, update: &SettingsUpdate) -> Result<ProcessingSettings> {
        let next = update.apply_to(self.current)?;
        tracing::debug!(?next, "Processing settings updated");
        self.current = next;
        Ok(next)
    }

    /// Restore defaults and return them.
    pub fn reset(&mut self) -> ProcessingSettings {
        self.current = ProcessingSettings::default();
        self.current
    }
}
