//! Runtime configuration loaded from the environment (and an optional `.env`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use catprinter::battery::DEFAULT_INTERVAL;
use catprinter::ble::DEFAULT_SCAN_TIMEOUT;
use catprinter::options::{DEFAULT_ACK_TIMEOUT, DEFAULT_JOB_TIMEOUT};
use catprinter::protocol::{Mxw01Opcodes, Mxw01Protocol, PrinterProfile, profile_by_name};
use catprinter::TransferOptions;
use serde::Serialize;

use crate::validation::validate_setting;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// MAC, platform UUID or advertised name. Empty picks the first printer found.
    pub printer_address: String,
    pub profile: String,
    pub intensity: Option<u8>,
    pub chunk_size: Option<usize>,
    pub chunk_delay_ms: Option<u64>,
    pub ack_timeout_ms: u64,
    pub job_timeout_secs: u64,
    pub battery_interval_secs: u64,
    pub scan_timeout_secs: u64,
    #[serde(skip)]
    pub opcodes: Option<Mxw01Opcodes>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printer_address: String::new(),
            profile: "mxw01".into(),
            intensity: None,
            chunk_size: None,
            chunk_delay_ms: None,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
            battery_interval_secs: DEFAULT_INTERVAL.as_secs(),
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT.as_secs(),
            opcodes: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read `CATPRINT_*` variables.
    pub fn load() -> anyhow::Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or empty keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| -> anyhow::Result<Option<String>> {
            let Some(value) = lookup(key).map(|v| v.trim().to_string()) else {
                return Ok(None);
            };
            if value.is_empty() {
                return Ok(None);
            }
            if let Err(reason) = validate_setting(key, &value) {
                bail!("{key}: {reason}");
            }
            Ok(Some(value))
        };
        let number = |key: &str| -> anyhow::Result<Option<u64>> {
            get(key)?
                .map(|v| v.parse::<u64>().with_context(|| format!("{key}: not a number")))
                .transpose()
        };

        let defaults = Self::default();
        let opcodes = get("CATPRINT_OPCODES")?
            .map(|json| serde_json::from_str(&json).context("CATPRINT_OPCODES"))
            .transpose()?;

        Ok(Self {
            printer_address: get("CATPRINT_PRINTER_ADDRESS")?.unwrap_or_default(),
            profile: get("CATPRINT_PROFILE")?.unwrap_or(defaults.profile),
            intensity: number("CATPRINT_INTENSITY")?.map(|v| v as u8),
            chunk_size: number("CATPRINT_CHUNK_SIZE")?.map(|v| v as usize),
            chunk_delay_ms: number("CATPRINT_CHUNK_DELAY_MS")?,
            ack_timeout_ms: number("CATPRINT_ACK_TIMEOUT_MS")?.unwrap_or(defaults.ack_timeout_ms),
            job_timeout_secs: number("CATPRINT_JOB_TIMEOUT_SECS")?
                .unwrap_or(defaults.job_timeout_secs),
            battery_interval_secs: number("CATPRINT_BATTERY_INTERVAL_SECS")?
                .unwrap_or(defaults.battery_interval_secs),
            scan_timeout_secs: number("CATPRINT_SCAN_TIMEOUT_SECS")?
                .unwrap_or(defaults.scan_timeout_secs),
            opcodes,
        })
    }

    /// The printer profile with any configured overrides applied.
    pub fn profile(&self) -> anyhow::Result<Arc<dyn PrinterProfile>> {
        if profile_by_name(&self.profile).is_none() {
            bail!("unknown printer profile '{}'", self.profile);
        }

        let mut mxw01 = Mxw01Protocol::new();
        if let Some(opcodes) = self.opcodes {
            mxw01 = mxw01.with_opcodes(opcodes);
        }
        if let Some(intensity) = self.intensity {
            mxw01 = mxw01.with_intensity(intensity);
        }
        if let Some(size) = self.chunk_size {
            mxw01 = mxw01.with_chunk_bytes(size);
        }
        if let Some(ms) = self.chunk_delay_ms {
            mxw01 = mxw01.with_chunk_delay(Duration::from_millis(ms));
        }
        Ok(Arc::new(mxw01))
    }

    pub fn transfer_options(&self, profile: &dyn PrinterProfile) -> TransferOptions {
        let job_timeout = (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs));
        TransferOptions::for_profile(profile)
            .with_ack_timeout(Duration::from_millis(self.ack_timeout_ms))
            .with_job_timeout(job_timeout)
    }

    pub fn battery_interval(&self) -> Duration {
        Duration::from_secs(self.battery_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// Load .env from the first candidate path that exists.
fn load_dotenv() {
    let candidates = [".env", "../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::debug!("Loaded .env from: {path}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.ack_timeout_ms, 5000);
        assert_eq!(config.job_timeout_secs, 120);
        assert_eq!(config.battery_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_values_are_read_and_trimmed() {
        let config = load(&[
            ("CATPRINT_PRINTER_ADDRESS", " AA:BB:CC:DD:EE:FF "),
            ("CATPRINT_CHUNK_SIZE", "120"),
            ("CATPRINT_CHUNK_DELAY_MS", "40"),
            ("CATPRINT_JOB_TIMEOUT_SECS", ""),
        ])
        .unwrap();
        assert_eq!(config.printer_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(config.chunk_size, Some(120));
        assert_eq!(config.job_timeout_secs, 120);

        let profile = config.profile().unwrap();
        assert_eq!(profile.max_chunk_bytes(), 120);
        assert_eq!(profile.chunk_delay(), Duration::from_millis(40));
    }

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = load(&[("CATPRINT_BATTERY_INTERVAL_SECS", "2")]).unwrap_err();
        assert!(err.to_string().starts_with("CATPRINT_BATTERY_INTERVAL_SECS"));

        let err = load(&[("CATPRINT_PROFILE", "gb01")]).unwrap_err();
        assert!(err.to_string().contains("gb01"));
    }

    #[test]
    fn test_opcode_override_reaches_the_profile() {
        let config = load(&[("CATPRINT_OPCODES", r#"{"flush": 170}"#)]).unwrap();
        assert_eq!(config.opcodes.map(|o| o.flush), Some(170));
        let trailer = config.profile().unwrap().build_trailer();
        assert_eq!(trailer[0][2], 170);
    }

    #[test]
    fn test_zero_job_timeout_disables_limit() {
        let config = load(&[("CATPRINT_JOB_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(config.job_timeout_secs, 0);
        let profile = config.profile().unwrap();
        assert_eq!(config.transfer_options(profile.as_ref()).job_timeout, None);

        let config = load(&[("CATPRINT_JOB_TIMEOUT_SECS", "45")]).unwrap();
        let profile = config.profile().unwrap();
        assert_eq!(
            config.transfer_options(profile.as_ref()).job_timeout,
            Some(Duration::from_secs(45))
        );
    }
}
