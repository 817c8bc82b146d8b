//! Transfer pacing and timeout options.
//!
//! Printer-specific defaults come from the [`PrinterProfile`]; these options
//! let the caller override them per job.

use std::time::Duration;

use crate::protocol::PrinterProfile;

/// Default per-chunk acknowledgment timeout.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default whole-job timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration options for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Pause after each acknowledged data chunk.
    pub chunk_delay: Duration,

    /// Longest wait for a single chunk write to be confirmed.
    pub ack_timeout: Duration,

    /// Upper bound for the whole job, `None` for no limit.
    pub job_timeout: Option<Duration>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_delay: Duration::ZERO,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
        }
    }
}

impl TransferOptions {
    /// Create options with default timeouts and no pacing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with the profile's inter-chunk delay.
    pub fn for_profile(profile: &dyn PrinterProfile) -> Self {
        Self::default().with_chunk_delay(profile.chunk_delay())
    }

    /// Builder: set inter-chunk delay.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Builder: set per-chunk acknowledgment timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Builder: set or clear the whole-job timeout.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Mxw01Protocol;

    #[test]
    fn test_default_options() {
        let opts = TransferOptions::default();
        assert_eq!(opts.chunk_delay, Duration::ZERO);
        assert_eq!(opts.ack_timeout, Duration::from_secs(5));
        assert_eq!(opts.job_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_builder_chain() {
        let opts = TransferOptions::new()
            .with_chunk_delay(Duration::from_millis(30))
            .with_ack_timeout(Duration::from_millis(500))
            .with_job_timeout(None);

        assert_eq!(opts.chunk_delay, Duration::from_millis(30));
        assert_eq!(opts.ack_timeout, Duration::from_millis(500));
        assert_eq!(opts.job_timeout, None);
    }

    #[test]
    fn test_profile_delay() {
        let profile = Mxw01Protocol::new().with_chunk_delay(Duration::from_millis(7));
        let opts = TransferOptions::for_profile(&profile);
        assert_eq!(opts.chunk_delay, Duration::from_millis(7));
    }
}
