//! MXW01 series printer protocol implementation.
//!
//! Control packet layout:
//! `0x22 0x21 cmd 0x00 len_lo len_hi payload.. crc8(payload) 0xFF`.
//! Characteristics: AE01 (control), AE02 (notify), AE03 (raster data).

use std::time::Duration;

use serde::Deserialize;

use super::PrinterProfile;
use crate::{CatPrinterError, Result};

/// MXW01 magic bytes.
const MAGIC: [u8; 2] = [0x22, 0x21];

/// Trailing byte of every control packet.
const TERMINATOR: u8 = 0xFF;

/// BLE service UUID for MXW01 printers.
const SERVICE_UUID: uuid::Uuid = uuid::Uuid::from_u128(0x0000_ae30_0000_1000_8000_00805f9b34fb);

/// Control characteristic (AE01) - used for commands.
const CHAR_CONTROL: uuid::Uuid = uuid::Uuid::from_u128(0x0000_ae01_0000_1000_8000_00805f9b34fb);

/// Notify characteristic (AE02) - used for device responses.
const CHAR_NOTIFY: uuid::Uuid = uuid::Uuid::from_u128(0x0000_ae02_0000_1000_8000_00805f9b34fb);

/// Data characteristic (AE03) - used for bulk data transfer.
const CHAR_DATA: uuid::Uuid = uuid::Uuid::from_u128(0x0000_ae03_0000_1000_8000_00805f9b34fb);

/// Raster payload bytes per write (185 MTU minus ATT header, rounded down).
const DEFAULT_CHUNK_BYTES: usize = 180;

const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(20);

/// Default print darkness.
pub const DEFAULT_INTENSITY: u8 = 0x5D;

/// CRC8 lookup table (polynomial 0x07).
#[rustfmt::skip]
const CRC8_TABLE: [u8; 256] = [
    0,   7,  14,   9,  28,  27,  18,  21,  56,  63,  54,  49,  36,  35,  42,  45,
  112, 119, 126, 121, 108, 107,  98, 101,  72,  79,  70,  65,  84,  83,  90,  93,
  224, 231, 238, 233, 252, 251, 242, 245, 216, 223, 214, 209, 196, 195, 202, 205,
  144, 151, 158, 153, 140, 139, 130, 133, 168, 175, 166, 161, 180, 179, 186, 189,
  199, 192, 201, 206, 219, 220, 213, 210, 255, 248, 241, 246, 227, 228, 237, 234,
  183, 176, 185, 190, 171, 172, 165, 162, 143, 136, 129, 134, 147, 148, 157, 154,
   39,  32,  41,  46,  59,  60,  53,  50,  31,  24,  17,  22,   3,   4,  13,  10,
   87,  80,  89,  94,  75,  76,  69,  66, 111, 104,  97, 102, 115, 116, 125, 122,
  137, 142, 135, 128, 149, 146, 155, 156, 177, 182, 191, 184, 173, 170, 163, 164,
  249, 254, 247, 240, 229, 226, 235, 236, 193, 198, 207, 200, 221, 218, 211, 212,
  105, 110, 103,  96, 117, 114, 123, 124,  81,  86,  95,  88,  77,  74,  67,  68,
   25,  30,  23,  16,   5,   2,  11,  12,  33,  38,  47,  40,  61,  58,  51,  52,
   78,  73,  64,  71,  82,  85,  92,  91, 118, 113, 120, 127, 106, 109, 100,  99,
   62,  57,  48,  55,  34,  37,  44,  43,   6,   1,   8,  15,  26,  29,  20,  19,
  174, 169, 160, 167, 178, 181, 188, 187, 150, 145, 152, 159, 138, 141, 132, 131,
  222, 217, 208, 215, 194, 197, 204, 203, 230, 225, 232, 239, 250, 253, 244, 243,
];

/// Compute CRC8 checksum over a byte slice.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

/// Build a control packet for `cmd` with `payload`.
pub fn build_control_packet(cmd: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u16;
    let mut buf = Vec::with_capacity(8 + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.push(cmd);
    buf.push(0x00);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    buf.push(crc8(payload));
    buf.push(TERMINATOR);
    buf
}

/// A decoded control packet from the notify characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification<'a> {
    pub command: u8,
    pub payload: &'a [u8],
}

/// Parse a notification, checking magic, length and checksum.
pub fn parse_notification(bytes: &[u8]) -> Option<Notification<'_>> {
    if bytes.len() < 8 || bytes[..2] != MAGIC {
        return None;
    }
    let len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let payload = bytes.get(6..6 + len)?;
    let crc = *bytes.get(6 + len)?;
    if crc != crc8(payload) {
        return None;
    }
    Some(Notification {
        command: bytes[2],
        payload,
    })
}

/// Command ids, overridable for firmware variants.
///
/// Unknown keys are rejected so a misspelled override fails loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Mxw01Opcodes {
    pub set_intensity: u8,
    pub print_request: u8,
    pub flush: u8,
    pub battery: u8,
    /// Second byte of the print request payload.
    pub print_request_marker: u8,
    /// Print mode byte; 0 is 1 bit per pixel.
    pub print_mode: u8,
}

impl Default for Mxw01Opcodes {
    fn default() -> Self {
        Self {
            set_intensity: 0xA2,
            print_request: 0xA9,
            flush: 0xAD,
            battery: 0xAB,
            print_request_marker: 0x30,
            print_mode: 0x00,
        }
    }
}

/// MXW01 series protocol implementation.
#[derive(Debug, Clone)]
pub struct Mxw01Protocol {
    opcodes: Mxw01Opcodes,
    intensity: u8,
    chunk_bytes: usize,
    chunk_delay: Duration,
}

impl Default for Mxw01Protocol {
    fn default() -> Self {
        Self {
            opcodes: Mxw01Opcodes::default(),
            intensity: DEFAULT_INTENSITY,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            chunk_delay: DEFAULT_CHUNK_DELAY,
        }
    }
}

impl Mxw01Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opcodes(mut self, opcodes: Mxw01Opcodes) -> Self {
        self.opcodes = opcodes;
        self
    }

    pub fn with_intensity(mut self, intensity: u8) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn opcodes(&self) -> &Mxw01Opcodes {
        &self.opcodes
    }
}

impl PrinterProfile for Mxw01Protocol {
    fn name(&self) -> &str {
        "MXW01"
    }

    fn service_uuid(&self) -> uuid::Uuid {
        SERVICE_UUID
    }

    fn control_characteristic(&self) -> uuid::Uuid {
        CHAR_CONTROL
    }

    fn data_characteristic(&self) -> uuid::Uuid {
        CHAR_DATA
    }

    fn notify_characteristic(&self) -> uuid::Uuid {
        CHAR_NOTIFY
    }

    fn max_rows(&self) -> u32 {
        u32::from(u16::MAX)
    }

    fn max_chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    fn chunk_delay(&self) -> Duration {
        self.chunk_delay
    }

    fn build_header(&self, row_bytes: usize, rows: u32) -> Result<Vec<Vec<u8>>> {
        let line_bytes = (self.dots_per_line() / 8) as usize;
        if row_bytes != line_bytes {
            return Err(CatPrinterError::InvalidFrame(format!(
                "MXW01 rows must be {line_bytes} bytes, got {row_bytes}"
            )));
        }
        let rows = u16::try_from(rows).map_err(|_| {
            CatPrinterError::InvalidFrame(format!("{rows} rows exceed the print request limit"))
        })?;

        let [lo, hi] = rows.to_le_bytes();
        let op = &self.opcodes;
        Ok(vec![
            build_control_packet(op.set_intensity, &[self.intensity]),
            build_control_packet(
                op.print_request,
                &[lo, hi, op.print_request_marker, op.print_mode],
            ),
        ])
    }

    fn build_trailer(&self) -> Vec<Vec<u8>> {
        vec![build_control_packet(self.opcodes.flush, &[0x00])]
    }

    fn build_battery_request(&self) -> Vec<u8> {
        build_control_packet(self.opcodes.battery, &[0x00])
    }

    fn parse_battery_response(&self, bytes: &[u8]) -> Option<u8> {
        let notification = parse_notification(bytes)?;
        if notification.command != self.opcodes.battery {
            return None;
        }
        notification.payload.first().map(|&pct| pct.min(100))
    }
}
