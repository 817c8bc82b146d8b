//! Printer protocol profiles.
//!
//! A profile owns everything model-specific: BLE UUIDs, line width, bit
//! order, transport limits and the control packets that wrap a raster job.
//! Framing and transfer code only talk to the [`PrinterProfile`] trait.

pub mod mxw01;

use std::time::Duration;

pub use mxw01::{Mxw01Opcodes, Mxw01Protocol};

use crate::Result;

/// Order of pixels inside each payload byte as the firmware reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Leftmost pixel in bit 7.
    #[default]
    MsbFirst,
    /// Leftmost pixel in bit 0.
    LsbFirst,
}

/// Trait defining the interface for printer protocol implementations.
pub trait PrinterProfile: Send + Sync {
    /// Human-readable protocol name (e.g. "MXW01").
    fn name(&self) -> &str;

    /// BLE service UUID used to discover the printer.
    fn service_uuid(&self) -> uuid::Uuid;

    /// Characteristic for control packets (header, trailer, queries).
    fn control_characteristic(&self) -> uuid::Uuid;

    /// Characteristic for raster payload.
    fn data_characteristic(&self) -> uuid::Uuid;

    /// Characteristic the printer answers on.
    fn notify_characteristic(&self) -> uuid::Uuid;

    /// Printable dots per line.
    fn dots_per_line(&self) -> u32 {
        crate::PRINT_WIDTH
    }

    /// Most raster rows one print request can announce.
    fn max_rows(&self) -> u32 {
        u32::MAX
    }

    fn bit_order(&self) -> BitOrder {
        BitOrder::MsbFirst
    }

    /// Largest single write the transport accepts.
    fn max_chunk_bytes(&self) -> usize;

    /// Pause the firmware needs between raster writes.
    fn chunk_delay(&self) -> Duration;

    /// Control packets sent before the raster payload.
    fn build_header(&self, row_bytes: usize, rows: u32) -> Result<Vec<Vec<u8>>>;

    /// Control packets sent after the raster payload.
    fn build_trailer(&self) -> Vec<Vec<u8>>;

    fn build_battery_request(&self) -> Vec<u8>;

    /// Battery percent from a notification, `None` if it is not a battery reply.
    fn parse_battery_response(&self, bytes: &[u8]) -> Option<u8>;
}

/// Look up a built-in profile by name (case-insensitive).
pub fn profile_by_name(name: &str) -> Option<Box<dyn PrinterProfile>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "mxw01" => Some(Box::new(Mxw01Protocol::new())),
        _ => None,
    }
}
