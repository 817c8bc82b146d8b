//! The byte channel to a printer.
//!
//! The core never discovers or pairs devices; it only uses an already
//! connected [`Transport`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::frame::TransferChunk;

/// Errors a transport reports for a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,

    #[error("{0}")]
    Failed(String),
}

/// An established connection that can carry chunks and answer battery queries.
#[async_trait]
pub trait Transport: Send {
    /// Write one chunk. Returns once the write is confirmed.
    async fn send_chunk(&mut self, chunk: &TransferChunk) -> Result<(), TransportError>;

    /// Ask the printer for its battery level in percent.
    async fn query_battery(&mut self) -> Result<u8, TransportError>;

    fn is_connected(&self) -> bool;

    /// Cancelled as soon as the link drops, including drops noticed
    /// outside of any request.
    fn link_lost(&self) -> CancellationToken;
}
