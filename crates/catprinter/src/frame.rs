//! Command framing and chunking.
//!
//! A [`PrinterFrame`] is the complete byte image of one print job:
//! header control packets, full-width raster rows, trailer control packets.
//! [`chunk_frame`] cuts it into ordered [`TransferChunk`]s whose
//! concatenation is exactly [`PrinterFrame::to_bytes`].

use image_processor::PackedRaster;
use tracing::debug;

use crate::protocol::{BitOrder, PrinterProfile};
use crate::{CatPrinterError, Result};

/// Which characteristic a chunk is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Control,
    Data,
}

/// One print job in the printer's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterFrame {
    header: Vec<Vec<u8>>,
    payload: Vec<u8>,
    trailer: Vec<Vec<u8>>,
    row_bytes: usize,
    rows: u32,
}

impl PrinterFrame {
    /// Frame a packed raster for `profile`.
    ///
    /// Rows narrower than the printer line are padded on the right with
    /// no-print bytes; wider rows are rejected.
    pub fn build(raster: &PackedRaster, profile: &dyn PrinterProfile) -> Result<Self> {
        let dots = profile.dots_per_line();
        if raster.width() > dots {
            return Err(CatPrinterError::InvalidFrame(format!(
                "raster is {} dots wide, {} prints at most {dots}",
                raster.width(),
                profile.name()
            )));
        }

        let row_bytes = dots.div_ceil(8) as usize;
        let rows = raster.height();
        let mut payload = Vec::with_capacity(row_bytes * rows as usize);
        for row in raster.rows() {
            let start = payload.len();
            payload.extend_from_slice(row);
            payload.resize(start + row_bytes, 0);
        }
        if profile.bit_order() == BitOrder::LsbFirst {
            payload.iter_mut().for_each(|b| *b = b.reverse_bits());
        }

        let header = profile.build_header(row_bytes, rows)?;
        let trailer = profile.build_trailer();

        debug!(
            printer = profile.name(),
            row_bytes,
            rows,
            payload_bytes = payload.len(),
            "Built printer frame"
        );

        Ok(Self {
            header,
            payload,
            trailer,
            row_bytes,
            rows,
        })
    }

    pub fn header(&self) -> &[Vec<u8>] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn trailer(&self) -> &[Vec<u8>] {
        &self.trailer
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total bytes on the wire.
    pub fn len(&self) -> usize {
        self.header.iter().map(Vec::len).sum::<usize>()
            + self.payload.len()
            + self.trailer.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Header, payload and trailer concatenated.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for packet in &self.header {
            out.extend_from_slice(packet);
        }
        out.extend_from_slice(&self.payload);
        for packet in &self.trailer {
            out.extend_from_slice(packet);
        }
        out
    }
}

/// A bounded slice of a frame, sent as one transport write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferChunk {
    pub sequence_index: u32,
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

/// Split a frame into transport-sized chunks.
///
/// Each control packet is its own chunk. Payload chunks carry as many whole
/// rows as fit in `max_chunk_bytes`; a row longer than that is split into
/// consecutive pieces.
pub fn chunk_frame(frame: &PrinterFrame, max_chunk_bytes: usize) -> Result<Vec<TransferChunk>> {
    if max_chunk_bytes == 0 {
        return Err(CatPrinterError::InvalidFrame(
            "chunk size must be non-zero".into(),
        ));
    }

    let mut pieces: Vec<(Channel, &[u8])> = Vec::new();
    for packet in &frame.header {
        pieces.push((Channel::Control, control_piece(packet, max_chunk_bytes)?));
    }

    let rows_per_chunk = max_chunk_bytes / frame.row_bytes;
    if rows_per_chunk > 0 {
        for piece in frame.payload.chunks(rows_per_chunk * frame.row_bytes) {
            pieces.push((Channel::Data, piece));
        }
    } else {
        for row in frame.payload.chunks(frame.row_bytes) {
            for piece in row.chunks(max_chunk_bytes) {
                pieces.push((Channel::Data, piece));
            }
        }
    }

    for packet in &frame.trailer {
        pieces.push((Channel::Control, control_piece(packet, max_chunk_bytes)?));
    }

    let chunks: Vec<TransferChunk> = pieces
        .into_iter()
        .enumerate()
        .map(|(i, (channel, bytes))| TransferChunk {
            sequence_index: i as u32,
            channel,
            bytes: bytes.to_vec(),
        })
        .collect();

    debug!(
        chunks = chunks.len(),
        max_chunk_bytes,
        rows_per_chunk,
        "Split frame into chunks"
    );
    Ok(chunks)
}

fn control_piece(packet: &[u8], max_chunk_bytes: usize) -> Result<&[u8]> {
    if packet.len() > max_chunk_bytes {
        return Err(CatPrinterError::InvalidFrame(format!(
            "control packet of {} bytes does not fit a {max_chunk_bytes}-byte chunk",
            packet.len()
        )));
    }
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image_processor::{MonochromeBitmap, pack};

    use super::*;
    use crate::protocol::Mxw01Protocol;

    fn raster(width: u32, height: u32) -> PackedRaster {
        let bits = (0..width * height).map(|i| i % 3 == 0).collect();
        pack(&MonochromeBitmap::new(width, height, bits).unwrap()).unwrap()
    }

    /// MXW01 framing with the payload bit order flipped.
    struct LsbProfile(Mxw01Protocol);

    impl PrinterProfile for LsbProfile {
        fn name(&self) -> &str {
            "LSB"
        }
        fn service_uuid(&self) -> uuid::Uuid {
            self.0.service_uuid()
        }
        fn control_characteristic(&self) -> uuid::Uuid {
            self.0.control_characteristic()
        }
        fn data_characteristic(&self) -> uuid::Uuid {
            self.0.data_characteristic()
        }
        fn notify_characteristic(&self) -> uuid::Uuid {
            self.0.notify_characteristic()
        }
        fn bit_order(&self) -> BitOrder {
            BitOrder::LsbFirst
        }
        fn max_chunk_bytes(&self) -> usize {
            self.0.max_chunk_bytes()
        }
        fn chunk_delay(&self) -> Duration {
            Duration::ZERO
        }
        fn build_header(&self, row_bytes: usize, rows: u32) -> Result<Vec<Vec<u8>>> {
            self.0.build_header(row_bytes, rows)
        }
        fn build_trailer(&self) -> Vec<Vec<u8>> {
            self.0.build_trailer()
        }
        fn build_battery_request(&self) -> Vec<u8> {
            self.0.build_battery_request()
        }
        fn parse_battery_response(&self, bytes: &[u8]) -> Option<u8> {
            self.0.parse_battery_response(bytes)
        }
    }

    #[test]
    fn test_narrow_rows_padded_to_line_width() {
        let packed = raster(10, 3);
        let frame = PrinterFrame::build(&packed, &Mxw01Protocol::new()).unwrap();
        assert_eq!(frame.row_bytes(), 48);
        assert_eq!(frame.rows(), 3);
        assert_eq!(frame.payload().len(), 48 * 3);
        for (row, src) in frame.payload().chunks(48).zip(packed.rows()) {
            assert_eq!(&row[..2], src);
            assert!(row[2..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_too_wide_raster_rejected() {
        let packed = raster(392, 1);
        assert!(matches!(
            PrinterFrame::build(&packed, &Mxw01Protocol::new()),
            Err(CatPrinterError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_lsb_profile_reverses_bits() {
        let bmp = MonochromeBitmap::new(8, 1, vec![true, false, false, false, false, false, false, false])
            .unwrap();
        let packed = pack(&bmp).unwrap();
        let frame = PrinterFrame::build(&packed, &LsbProfile(Mxw01Protocol::new())).unwrap();
        assert_eq!(frame.payload()[0], 0x01);
    }

    #[test]
    fn test_chunks_reassemble_exact_frame() {
        let frame = PrinterFrame::build(&raster(384, 17), &Mxw01Protocol::new()).unwrap();
        for max in [20, 48, 100, 180, 512] {
            let chunks = chunk_frame(&frame, max).unwrap();
            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.bytes.iter().copied()).collect();
            assert_eq!(joined, frame.to_bytes(), "max chunk {max}");
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.sequence_index, i as u32);
                assert!(chunk.bytes.len() <= max);
                assert!(!chunk.bytes.is_empty());
            }
        }
    }

    #[test]
    fn test_payload_chunks_hold_whole_rows() {
        let frame = PrinterFrame::build(&raster(384, 10), &Mxw01Protocol::new()).unwrap();
        let chunks = chunk_frame(&frame, 180).unwrap();

        assert_eq!(chunks[0].channel, Channel::Control);
        assert_eq!(chunks[1].channel, Channel::Control);
        assert_eq!(chunks.last().map(|c| c.channel), Some(Channel::Control));

        let data: Vec<_> = chunks.iter().filter(|c| c.channel == Channel::Data).collect();
        // 180 / 48 = 3 rows per chunk -> 3 + 3 + 3 + 1
        assert_eq!(data.len(), 4);
        for chunk in &data {
            assert_eq!(chunk.bytes.len() % 48, 0);
        }
    }

    #[test]
    fn test_oversized_rows_are_split() {
        let frame = PrinterFrame::build(&raster(384, 2), &Mxw01Protocol::new()).unwrap();
        let chunks = chunk_frame(&frame, 20).unwrap();
        let sizes: Vec<usize> = chunks
            .iter()
            .filter(|c| c.channel == Channel::Data)
            .map(|c| c.bytes.len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 8, 20, 20, 8]);
    }

    #[test]
    fn test_header_precedes_payload() {
        let frame = PrinterFrame::build(&raster(384, 4), &Mxw01Protocol::new()).unwrap();
        let chunks = chunk_frame(&frame, 180).unwrap();
        let first_data = chunks.iter().position(|c| c.channel == Channel::Data).unwrap();
        let header_bytes: Vec<u8> = chunks[..first_data]
            .iter()
            .flat_map(|c| c.bytes.iter().copied())
            .collect();
        assert_eq!(header_bytes, frame.header().concat());
    }

    #[test]
    fn test_invalid_chunk_limits() {
        let frame = PrinterFrame::build(&raster(384, 1), &Mxw01Protocol::new()).unwrap();
        assert!(matches!(
            chunk_frame(&frame, 0),
            Err(CatPrinterError::InvalidFrame(_))
        ));
        // control packets are 9 to 12 bytes and are never split
        assert!(matches!(
            chunk_frame(&frame, 8),
            Err(CatPrinterError::InvalidFrame(_))
        ));
    }
}
