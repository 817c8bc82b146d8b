//! Setting value validation.

use std::sync::LazyLock;

use regex::Regex;

static RE_MAC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Fa-f]{2}[:\-]){5}([0-9A-Fa-f]{2})$").unwrap());
static RE_UUID_NO_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]{32}$").unwrap());
static RE_UUID_HYPHEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}$")
        .unwrap()
});
static RE_DEVICE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _\-]{0,31}$").unwrap());

/// Validate a setting value. Returns `Ok(())` if valid, or an error message.
pub fn validate_setting(key: &str, value: &str) -> Result<(), String> {
    match key {
        "CATPRINT_PRINTER_ADDRESS" => {
            if !value.is_empty()
                && !RE_MAC.is_match(value)
                && !RE_UUID_NO_HYPHEN.is_match(value)
                && !RE_UUID_HYPHEN.is_match(value)
                && !RE_DEVICE_NAME.is_match(value)
            {
                return Err("invalid address (expected MAC, UUID or device name)".into());
            }
        }
        "CATPRINT_PROFILE" => {
            if catprinter::protocol::profile_by_name(value).is_none() {
                return Err(format!("unknown printer profile '{value}'"));
            }
        }
        "CATPRINT_OPCODES" => {
            serde_json::from_str::<catprinter::protocol::Mxw01Opcodes>(value)
                .map_err(|e| format!("invalid opcode JSON: {e}"))?;
        }
        "CATPRINT_INTENSITY" => validate_int_range(value, 0, 255)?,
        "CATPRINT_CHUNK_SIZE" => validate_int_range(value, 20, 512)?,
        "CATPRINT_CHUNK_DELAY_MS" => validate_int_range(value, 0, 1000)?,
        "CATPRINT_ACK_TIMEOUT_MS" => validate_int_range(value, 100, 60_000)?,
        // 0 disables the job limit
        "CATPRINT_JOB_TIMEOUT_SECS" => validate_int_range(value, 0, 3600)?,
        "CATPRINT_BATTERY_INTERVAL_SECS" => validate_int_range(value, 10, 3600)?,
        "CATPRINT_SCAN_TIMEOUT_SECS" => validate_int_range(value, 1, 120)?,
        _ => {}
    }
    Ok(())
}

fn validate_int_range(value: &str, min: i64, max: i64) -> Result<(), String> {
    let v: i64 = value.parse().map_err(|_| "must be an integer")?;
    if v < min || v > max {
        return Err(format!("must be between {min} and {max}"));
    }
    Ok(())
}
