//! PDU buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine over the BER framing of each APDU:
//! - `WaitingForHeader`: need the identifier and length octets
//! - `WaitingForContent`: definite length known, need N total bytes
//! - `ScanningIndefinite`: indefinite length, need the closing end-of-contents.
//!   The scan resumes where the previous push stopped, so a long PDU arriving
//!   in small reads is walked once.
//!
//! # Example
//!
//! ```
//! use z3950_client::protocol::PduBuffer;
//!
//! let mut buffer = PduBuffer::new();
//!
//! // An empty initResponse ([21] constructed) split across two reads
//! assert!(buffer.push(&[0xB5]).unwrap().is_empty());
//! let pdus = buffer.push(&[0x00]).unwrap();
//! assert_eq!(pdus.len(), 1);
//! assert_eq!(&pdus[0][..], &[0xB5, 0x00]);
//! ```

use bytes::{Bytes, BytesMut};

use super::ber::{Header, Length, MAX_NESTING};
use crate::error::{Result, Z3950Error};

/// Default maximum size of one PDU (64 MiB).
pub const DEFAULT_MAX_PDU_SIZE: usize = 64 * 1024 * 1024;

/// State machine for PDU framing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for complete identifier and length octets.
    WaitingForHeader,
    /// Length known, waiting for `total` buffered bytes.
    WaitingForContent { total: usize },
    /// Indefinite length, waiting for the matching end-of-contents.
    /// `pos` is the next unscanned TLV, `open` the unclosed containers.
    ScanningIndefinite { pos: usize, open: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete PDUs.
///
/// Uses a state machine to handle partial reads efficiently.
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
#[derive(Debug)]
pub struct PduBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed PDU size.
    max_pdu_size: usize,
}

impl PduBuffer {
    /// Create a new PDU buffer with default settings.
    ///
    /// Default capacity: 64KB, max PDU: 64MB.
    pub fn new() -> Self {
        Self::with_capacity_and_max_pdu(64 * 1024, DEFAULT_MAX_PDU_SIZE)
    }

    /// Create a new PDU buffer with custom max PDU size.
    pub fn with_max_pdu(max_pdu_size: usize) -> Self {
        Self::with_capacity_and_max_pdu(64 * 1024, max_pdu_size)
    }

    /// Create a new PDU buffer with custom capacity and max PDU size.
    pub fn with_capacity_and_max_pdu(capacity: usize, max_pdu_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
            max_pdu_size,
        }
    }

    /// Push data into the buffer and extract all complete PDUs.
    ///
    /// Returns a vector of complete encoded PDUs (may be empty if still
    /// waiting for data). Partial data stays buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`Z3950Error::Decode`] if the framing is invalid or a PDU
    /// exceeds the maximum size. The stream is then out of sync.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut pdus = Vec::new();
        while let Some(pdu) = self.try_extract_one()? {
            pdus.push(pdu);
        }
        Ok(pdus)
    }

    /// Append data to the buffer without extracting PDUs.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract at most one complete PDU from what is already buffered.
    pub fn next_pdu(&mut self) -> Result<Option<Bytes>> {
        self.try_extract_one()
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForHeader => {
                let Some(header) = Header::decode(&self.buffer)? else {
                    return Ok(None);
                };
                self.state = match header.length {
                    Length::Definite(len) => {
                        let total = header.header_len.saturating_add(len);
                        self.check_size(total)?;
                        State::WaitingForContent { total }
                    }
                    Length::Indefinite => State::ScanningIndefinite {
                        pos: header.header_len,
                        open: 1,
                    },
                };
                self.try_extract_one()
            }

            State::WaitingForContent { total } => {
                if self.buffer.len() < total {
                    return Ok(None);
                }
                self.state = State::WaitingForHeader;
                Ok(Some(self.buffer.split_to(total).freeze()))
            }

            State::ScanningIndefinite { pos, open } => match self.scan_indefinite(pos, open)? {
                Some(total) => {
                    self.check_size(total)?;
                    self.state = State::WaitingForHeader;
                    Ok(Some(self.buffer.split_to(total).freeze()))
                }
                None => {
                    self.check_size(self.buffer.len())?;
                    Ok(None)
                }
            },
        }
    }

    /// Walk TLVs from `pos` until every open container is closed.
    ///
    /// Returns the PDU length once complete. Otherwise the progress is kept
    /// in the state for the next call.
    fn scan_indefinite(&mut self, mut pos: usize, mut open: usize) -> Result<Option<usize>> {
        while open > 0 {
            let rest = &self.buffer[pos..];
            if rest.len() < 2 {
                break;
            }
            if rest[0] == 0 && rest[1] == 0 {
                pos += 2;
                open -= 1;
                continue;
            }
            let Some(header) = Header::decode(rest)? else {
                break;
            };
            match header.length {
                Length::Definite(len) => {
                    let total = header.header_len.saturating_add(len);
                    self.check_size(pos.saturating_add(total))?;
                    if rest.len() < total {
                        break;
                    }
                    pos += total;
                }
                Length::Indefinite => {
                    if open >= MAX_NESTING {
                        return Err(Z3950Error::Decode(
                            "indefinite-length nesting too deep".to_string(),
                        ));
                    }
                    pos += header.header_len;
                    open += 1;
                }
            }
        }
        if open == 0 {
            return Ok(Some(pos));
        }
        self.state = State::ScanningIndefinite { pos, open };
        Ok(None)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_pdu_size {
            return Err(Z3950Error::Decode(format!(
                "PDU size {} exceeds maximum {}",
                size, self.max_pdu_size
            )));
        }
        Ok(())
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForContent { .. } => "WaitingForContent",
            State::ScanningIndefinite { .. } => "ScanningIndefinite",
        }
    }

    #[cfg(test)]
    fn scan_progress(&self) -> Option<(usize, usize)> {
        match self.state {
            State::ScanningIndefinite { pos, open } => Some((pos, open)),
            _ => None,
        }
    }
}

impl Default for PduBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ber::{BerWriter, Tag};

    /// A constructed context-tagged PDU wrapping one OCTET STRING.
    fn make_pdu(tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut w = BerWriter::new();
        w.constructed(Tag::context(tag), |w| {
            w.octets(Tag::universal(4), payload);
            Ok(())
        })
        .unwrap();
        w.into_bytes().to_vec()
    }

    #[test]
    fn test_single_complete_pdu() {
        let mut buffer = PduBuffer::new();
        let pdu = make_pdu(21, b"hello");

        let pdus = buffer.push(&pdu).unwrap();

        assert_eq!(pdus.len(), 1);
        assert_eq!(&pdus[0][..], &pdu[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_pdus_in_one_push() {
        let mut buffer = PduBuffer::new();
        let mut combined = make_pdu(21, b"first");
        combined.extend(make_pdu(23, b"second"));
        combined.extend(make_pdu(25, b"third"));

        let pdus = buffer.push(&combined).unwrap();

        assert_eq!(pdus.len(), 3);
        assert_eq!(pdus[0][0], 0xB5);
        assert_eq!(pdus[1][0], 0xB7);
        assert_eq!(pdus[2][0], 0xB9);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = PduBuffer::new();
        let payload = vec![0x55; 200];
        let pdu = make_pdu(23, &payload);

        // Identifier plus the first length octet of a long-form length
        let pdus = buffer.push(&pdu[..2]).unwrap();
        assert!(pdus.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let pdus = buffer.push(&pdu[2..]).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(pdus[0].len(), pdu.len());
    }

    #[test]
    fn test_fragmented_content() {
        let mut buffer = PduBuffer::new();
        let pdu = make_pdu(25, b"this is a longer payload that will be fragmented");

        let pdus = buffer.push(&pdu[..12]).unwrap();
        assert!(pdus.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForContent");

        let pdus = buffer.push(&pdu[12..]).unwrap();
        assert_eq!(pdus.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_byte_push() {
        let mut buffer = PduBuffer::new();
        assert!(buffer.push(&[]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = PduBuffer::new();
        let pdu = make_pdu(21, b"hi");

        let mut all = Vec::new();
        for byte in &pdu {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], &pdu[..]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = PduBuffer::new();
        let first = make_pdu(21, b"first");
        let second = make_pdu(23, b"second");

        let mut data = first.clone();
        data.extend_from_slice(&second[..3]);

        let pdus = buffer.push(&data).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(&pdus[0][..], &first[..]);

        let pdus = buffer.push(&second[3..]).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(&pdus[0][..], &second[..]);
    }

    #[test]
    fn test_next_pdu_extracts_one_at_a_time() {
        let mut buffer = PduBuffer::new();
        let mut data = make_pdu(21, b"a");
        data.extend(make_pdu(23, b"b"));
        buffer.extend(&data);

        assert_eq!(buffer.next_pdu().unwrap().unwrap()[0], 0xB5);
        assert_eq!(buffer.next_pdu().unwrap().unwrap()[0], 0xB7);
        assert!(buffer.next_pdu().unwrap().is_none());
    }

    #[test]
    fn test_indefinite_length_pdu() {
        let mut buffer = PduBuffer::new();
        // [21] indefinite { OCTET STRING "ab" } EOC
        let pdu = [0xB5, 0x80, 0x04, 0x02, b'a', b'b', 0x00, 0x00];

        let pdus = buffer.push(&pdu[..5]).unwrap();
        assert!(pdus.is_empty());
        assert_eq!(buffer.state_name(), "ScanningIndefinite");

        let pdus = buffer.push(&pdu[5..]).unwrap();
        assert_eq!(pdus.len(), 1);
        assert_eq!(&pdus[0][..], &pdu[..]);
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_indefinite_scan_resumes_where_it_stopped() {
        let mut buffer = PduBuffer::new();
        // [23] indefinite { INTEGER 5, [28] indefinite { OCTET STRING "xyz" } EOC } EOC
        let pdu = [
            0xB7, 0x80, 0x02, 0x01, 0x05, 0xBC, 0x80, 0x04, 0x03, b'x', b'y', b'z', 0x00, 0x00,
            0x00, 0x00,
        ];

        assert!(buffer.push(&pdu[..9]).unwrap().is_empty());
        // INTEGER and the nested header are behind us; the OCTET STRING is not
        assert_eq!(buffer.scan_progress(), Some((7, 2)));

        assert!(buffer.push(&pdu[9..14]).unwrap().is_empty());
        assert_eq!(buffer.scan_progress(), Some((14, 1)));

        let mut pdus = Vec::new();
        for byte in &pdu[14..] {
            pdus.extend(buffer.push(&[*byte]).unwrap());
        }
        assert_eq!(pdus.len(), 1);
        assert_eq!(&pdus[0][..], &pdu[..]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_indefinite_nesting_is_bounded() {
        let mut buffer = PduBuffer::new();
        let mut data = vec![0xB5, 0x80];
        for _ in 0..MAX_NESTING {
            data.extend_from_slice(&[0xA0, 0x80]);
        }

        let err = buffer.push(&data).unwrap_err();
        assert!(err.to_string().contains("nesting too deep"));
    }

    #[test]
    fn test_max_pdu_validation() {
        let mut buffer = PduBuffer::with_max_pdu(100);
        let pdu = make_pdu(21, &[0u8; 500]);

        let result = buffer.push(&pdu[..4]);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = PduBuffer::new();
        let pdu = make_pdu(21, b"test");
        buffer.push(&pdu[..3]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForContent");

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForHeader");
        assert!(buffer.is_empty());
    }
}
