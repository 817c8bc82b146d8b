//! Cat printer control library for the MXW01 series.
//!
//! Turns packed rasters into printer command frames, splits them into
//! transport-sized chunks and drives the transfer over any [`Transport`],
//! with a btleplug-backed BLE transport and a battery monitor on top.

pub mod battery;
pub mod ble;
pub mod frame;
pub mod options;
pub mod pipeline;
pub mod protocol;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use battery::{BatteryLevel, BatteryMonitor};
pub use ble::BleTransport;
pub use frame::{Channel, PrinterFrame, TransferChunk, chunk_frame};
pub use options::TransferOptions;
pub use pipeline::{PrintJob, prepare_job};
pub use protocol::{BitOrder, Mxw01Protocol, PrinterProfile};
pub use transfer::{ConnectionState, TransferController, TransferReport, TransferState};
pub use transport::{Transport, TransportError};

use image_processor::ImageError;

/// Print width in pixels (standard for MXW01 series thermal printers).
pub const PRINT_WIDTH: u32 = 384;

/// Errors that can occur during printer operations.
#[derive(Debug, thiserror::Error)]
pub enum CatPrinterError {
    #[error("Not connected to any printer")]
    NotConnected,

    #[error("Transfer interrupted after {sent} of {total} chunks: {reason}")]
    TransferInterrupted {
        sent: usize,
        total: usize,
        reason: String,
    },

    #[error("{0} timed out")]
    TimeoutExceeded(String),

    #[error("Transfer cancelled after {sent} of {total} chunks")]
    Cancelled { sent: usize, total: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Printer not found during BLE scan")]
    PrinterNotFound,

    #[error("Missing characteristic {0} on connected device")]
    MissingCharacteristic(uuid::Uuid),

    #[error("BLE connection error: {0}")]
    BleConnection(String),

    #[error("BLE scan error: {0}")]
    BleScan(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type alias for catprinter operations.
pub type Result<T> = std::result::Result<T, CatPrinterError>;
