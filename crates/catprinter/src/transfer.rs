//! Ordered, acknowledgment-gated chunk transmission.
//!
//! The controller owns the transport behind an async mutex: a print job
//! holds it from the first chunk to the last, so a battery query issued
//! mid-job waits instead of interleaving with raster data. Failures are
//! reported once and never retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::TransferChunk;
use crate::options::TransferOptions;
use crate::transport::{Transport, TransportError};
use crate::{CatPrinterError, Result};

/// Default timeout for a battery request/response exchange.
pub const DEFAULT_BATTERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Progress of the current (or last) transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Sending { seq: u32, total: usize },
    Acked { seq: u32 },
    Failed,
    Disconnected,
}

/// What the controller knows about the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_known_battery_percent: Option<u8>,
}

/// Summary of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub chunks_sent: usize,
    pub bytes_sent: usize,
    pub elapsed: Duration,
}

/// Serializes all access to one transport.
pub struct TransferController<T> {
    transport: Arc<Mutex<T>>,
    state: Arc<watch::Sender<TransferState>>,
    connection: Arc<watch::Sender<ConnectionState>>,
    link: CancellationToken,
    battery_timeout: Duration,
}

impl<T> Clone for TransferController<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
            connection: Arc::clone(&self.connection),
            link: self.link.clone(),
            battery_timeout: self.battery_timeout,
        }
    }
}

impl<T: Transport> TransferController<T> {
    pub fn new(transport: T) -> Self {
        let connection = ConnectionState {
            connected: transport.is_connected(),
            last_known_battery_percent: None,
        };
        Self {
            link: transport.link_lost(),
            transport: Arc::new(Mutex::new(transport)),
            state: Arc::new(watch::channel(TransferState::Idle).0),
            connection: Arc::new(watch::channel(connection).0),
            battery_timeout: DEFAULT_BATTERY_TIMEOUT,
        }
    }

    pub fn with_battery_timeout(mut self, timeout: Duration) -> Self {
        self.battery_timeout = timeout;
        self
    }

    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransferState> {
        self.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.sync_link();
        *self.connection.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.sync_link();
        self.connection.borrow().connected
    }

    /// Resolves once the link is down, whether the transport reported the
    /// drop on its own or a request failed with a disconnect.
    pub async fn disconnected(&self) {
        let mut connection = self.connection.subscribe();
        tokio::select! {
            _ = self.link.cancelled() => {
                warn!("Transport reported link loss");
                self.set_connected(false);
            }
            _ = connection.wait_for(|c| !c.connected) => {}
        }
    }

    /// Take the transport back once every other handle is gone.
    ///
    /// Returns `Err(self)` while clones (e.g. a battery monitor) still exist.
    pub fn try_into_transport(self) -> std::result::Result<T, Self> {
        let Self {
            transport,
            state,
            connection,
            link,
            battery_timeout,
        } = self;
        match Arc::try_unwrap(transport) {
            Ok(mutex) => Ok(mutex.into_inner()),
            Err(transport) => Err(Self {
                transport,
                state,
                connection,
                link,
                battery_timeout,
            }),
        }
    }

    fn sync_link(&self) {
        if self.link.is_cancelled() {
            self.set_connected(false);
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connection.send_if_modified(|c| {
            let changed = c.connected != connected;
            c.connected = connected;
            changed
        });
    }

    fn set_state(&self, state: TransferState) {
        self.state.send_replace(state);
    }

    /// Send `chunks` in order, waiting for each write to be confirmed.
    ///
    /// Stops at the first failure: a disconnect or write error yields
    /// `TransferInterrupted` with the number of chunks already acknowledged.
    /// Cancellation is checked between chunks, never during a write.
    pub async fn send(
        &self,
        chunks: &[TransferChunk],
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<TransferReport> {
        let mut transport = self.transport.lock().await;
        if !transport.is_connected() {
            self.set_connected(false);
            self.set_state(TransferState::Disconnected);
            return Err(CatPrinterError::NotConnected);
        }
        self.set_connected(true);

        let total = chunks.len();
        let started = Instant::now();
        let mut sent = 0usize;
        let mut bytes_sent = 0usize;
        info!(chunks = total, "Starting transfer");

        let run = self.send_all(&mut *transport, chunks, options, cancel, &mut sent, &mut bytes_sent);
        let outcome = match options.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    self.set_state(TransferState::Failed);
                    Err(CatPrinterError::TimeoutExceeded(format!(
                        "print job ({limit:?} limit)"
                    )))
                }
            },
            None => run.await,
        };

        match outcome {
            Ok(()) => {
                self.set_state(TransferState::Idle);
                let report = TransferReport {
                    chunks_sent: sent,
                    bytes_sent,
                    elapsed: started.elapsed(),
                };
                info!(
                    chunks = report.chunks_sent,
                    bytes = report.bytes_sent,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Transfer complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(sent, total, error = %e, "Transfer aborted");
                Err(e)
            }
        }
    }

    async fn send_all(
        &self,
        transport: &mut T,
        chunks: &[TransferChunk],
        options: &TransferOptions,
        cancel: &CancellationToken,
        sent: &mut usize,
        bytes_sent: &mut usize,
    ) -> Result<()> {
        let total = chunks.len();

        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                self.set_state(TransferState::Failed);
                return Err(CatPrinterError::Cancelled { sent: *sent, total });
            }

            let seq = chunk.sequence_index;
            self.set_state(TransferState::Sending { seq, total });

            let write = tokio::time::timeout(options.ack_timeout, transport.send_chunk(chunk));
            match write.await {
                Ok(Ok(())) => {
                    *sent += 1;
                    *bytes_sent += chunk.bytes.len();
                    self.set_state(TransferState::Acked { seq });
                    debug!(seq, len = chunk.bytes.len(), "Chunk acknowledged");
                }
                Ok(Err(TransportError::Disconnected)) => {
                    self.set_connected(false);
                    self.set_state(TransferState::Disconnected);
                    return Err(CatPrinterError::TransferInterrupted {
                        sent: *sent,
                        total,
                        reason: TransportError::Disconnected.to_string(),
                    });
                }
                Ok(Err(TransportError::Failed(reason))) => {
                    self.set_state(TransferState::Failed);
                    return Err(CatPrinterError::TransferInterrupted {
                        sent: *sent,
                        total,
                        reason,
                    });
                }
                Err(_) => {
                    self.set_state(TransferState::Failed);
                    return Err(CatPrinterError::TimeoutExceeded(format!(
                        "acknowledgment of chunk {seq}"
                    )));
                }
            }

            let last = i + 1 == total;
            if !last && !options.chunk_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(options.chunk_delay) => {}
                }
            }
        }

        Ok(())
    }

    /// Ask the printer for its battery level.
    ///
    /// Waits for any running transfer to finish first. On success the value
    /// becomes the last known level; on failure the previous value is kept.
    pub async fn query_battery(&self) -> Result<u8> {
        let mut transport = self.transport.lock().await;
        if !transport.is_connected() {
            self.set_connected(false);
            return Err(CatPrinterError::NotConnected);
        }

        match tokio::time::timeout(self.battery_timeout, transport.query_battery()).await {
            Ok(Ok(percent)) => {
                self.connection.send_modify(|c| {
                    c.connected = true;
                    c.last_known_battery_percent = Some(percent);
                });
                debug!(percent, "Battery level updated");
                Ok(percent)
            }
            Ok(Err(TransportError::Disconnected)) => {
                self.set_connected(false);
                Err(CatPrinterError::NotConnected)
            }
            Ok(Err(TransportError::Failed(reason))) => {
                Err(CatPrinterError::Protocol(format!("battery query failed: {reason}")))
            }
            Err(_) => Err(CatPrinterError::TimeoutExceeded("battery query".into())),
        }
    }

    /// Battery level for display: a fresh reading when possible, otherwise
    /// the last known value.
    pub async fn battery_or_last_known(&self) -> Option<u8> {
        match self.query_battery().await {
            Ok(percent) => Some(percent),
            Err(e) => {
                warn!(error = %e, "Battery query failed, using last known level");
                self.connection_state().last_known_battery_percent
            }
        }
    }
}
