use crate::error::{GatewayError, Result};
use serde::Deserialize;

/// Start-of-text control code.
pub const STX: u8 = 0x02;
/// End-of-text control code.
pub const ETX: u8 = 0x03;

/// Single-byte markers delimiting a frame.
///
/// Both ends agree on these out of band; they are configuration, not
/// negotiated on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ControlCodes {
    pub start: u8,
    pub end: u8,
}

impl Default for ControlCodes {
    fn default() -> Self {
        Self {
            start: STX,
            end: ETX,
        }
    }
}

/// XOR parity over every byte of `bytes`.
pub fn calculate_lrc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |lrc, b| lrc ^ b)
}

/// Returns true when the last byte of `frame` equals the parity of everything before it.
pub fn check_lrc(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((lrc, body)) if !body.is_empty() => calculate_lrc(body) == *lrc,
        _ => false,
    }
}

/// Encodes and decodes `[START][payload][END][LRC]` frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    codes: ControlCodes,
}

impl FrameCodec {
    pub fn new(codes: ControlCodes) -> Self {
        Self { codes }
    }

    pub fn codes(&self) -> ControlCodes {
        self.codes
    }

    /// Wraps `payload` in markers and appends the LRC byte.
    ///
    /// The payload must not contain either marker, otherwise the receiver
    /// would split the frame early.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if let Some(pos) = payload
            .iter()
            .position(|b| *b == self.codes.start || *b == self.codes.end)
        {
            return Err(GatewayError::Framing(format!(
                "payload contains a control code at offset {}",
                pos
            )));
        }

        let mut frame = Vec::with_capacity(payload.len() + 3);
        frame.push(self.codes.start);
        frame.extend_from_slice(payload);
        frame.push(self.codes.end);
        frame.push(calculate_lrc(&frame));
        Ok(frame)
    }

    /// Validates a complete frame and returns its payload.
    ///
    /// Structural problems are reported as [`GatewayError::Framing`]; the
    /// caller must discard the buffer rather than resynchronize inside it.
    /// A well-formed frame whose parity does not match is a
    /// [`GatewayError::Checksum`].
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let mut reader = FrameReader::new(bytes);
        match reader.read_code() {
            Some(code) if code == self.codes.start => {}
            Some(code) => {
                return Err(GatewayError::Framing(format!(
                    "expected start marker {:#04x}, found {:#04x}",
                    self.codes.start, code
                )));
            }
            None => return Err(GatewayError::Framing("empty frame".to_string())),
        }

        let payload = reader
            .read_until(self.codes.end, false)
            .map_err(|_| GatewayError::Framing("end marker not found".to_string()))?;
        if payload.contains(&self.codes.start) {
            return Err(GatewayError::Framing(
                "start marker repeated before end marker".to_string(),
            ));
        }

        let actual = reader
            .read_code()
            .ok_or_else(|| GatewayError::Framing("missing checksum byte".to_string()))?;
        if reader.remaining() > 0 {
            return Err(GatewayError::Framing(format!(
                "{} trailing bytes after checksum",
                reader.remaining()
            )));
        }

        // START + payload + END
        let expected = calculate_lrc(&bytes[..payload.len() + 2]);
        if expected != actual {
            return Err(GatewayError::Checksum { expected, actual });
        }

        Ok(payload)
    }

    /// Number of bytes of a complete frame at the front of `buf`, if one has
    /// fully arrived.
    pub fn complete_len(&self, buf: &[u8]) -> Option<usize> {
        buf.iter()
            .skip(1)
            .position(|b| *b == self.codes.end)
            .map(|end| end + 3)
            .filter(|len| *len <= buf.len())
    }
}

/// Cursor over a received byte buffer.
#[derive(Debug)]
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads one byte.
    pub fn read_code(&mut self) -> Option<u8> {
        let code = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(code)
    }

    /// Reads exactly `len` bytes.
    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(GatewayError::Encoding(format!(
                "needed {} bytes at offset {}, only {} left",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Scans forward to `marker`.
    ///
    /// With `inclusive == false` the marker is left out of the returned slice,
    /// but the cursor still moves past it.
    pub fn read_until(&mut self, marker: u8, inclusive: bool) -> Result<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let idx = rest.iter().position(|b| *b == marker).ok_or_else(|| {
            GatewayError::Framing(format!("marker {:#04x} not found", marker))
        })?;
        self.pos += idx + 1;
        if inclusive {
            Ok(&rest[..=idx])
        } else {
            Ok(&rest[..idx])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let codec = FrameCodec::default();
        let frame = codec.encode(b"AB").unwrap();
        assert_eq!(frame, vec![STX, b'A', b'B', ETX, STX ^ b'A' ^ b'B' ^ ETX]);
        assert!(check_lrc(&frame));
    }

    #[test]
    fn test_decode_roundtrip() {
        let codec = FrameCodec::default();
        let frame = codec.encode(b"1200000123").unwrap();
        assert_eq!(codec.decode(&frame).unwrap(), b"1200000123");
    }

    #[test]
    fn test_empty_payload() {
        let codec = FrameCodec::default();
        let frame = codec.encode(b"").unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(codec.decode(&frame).unwrap(), b"");
    }

    #[test]
    fn test_checksum_mismatch() {
        let codec = FrameCodec::default();
        let mut frame = codec.encode(b"payload").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(matches!(
            codec.decode(&frame),
            Err(GatewayError::Checksum { .. })
        ));
    }

    #[test]
    fn test_corrupted_payload_is_checksum_error() {
        let codec = FrameCodec::default();
        let mut frame = codec.encode(b"payload").unwrap();
        frame[2] = b'X';
        assert!(matches!(
            codec.decode(&frame),
            Err(GatewayError::Checksum { .. })
        ));
    }

    #[test]
    fn test_framing_errors() {
        let codec = FrameCodec::default();
        assert!(matches!(codec.decode(&[]), Err(GatewayError::Framing(_))));
        assert!(matches!(
            codec.decode(b"A\x03\x42"),
            Err(GatewayError::Framing(_))
        ));
        // no end marker
        assert!(matches!(
            codec.decode(&[STX, b'A', b'B']),
            Err(GatewayError::Framing(_))
        ));
        // no checksum
        assert!(matches!(
            codec.decode(&[STX, b'A', ETX]),
            Err(GatewayError::Framing(_))
        ));

        let mut frame = codec.encode(b"AB").unwrap();
        frame.push(0x00);
        assert!(matches!(codec.decode(&frame), Err(GatewayError::Framing(_))));
    }

    #[test]
    fn test_encode_rejects_markers_in_payload() {
        let codec = FrameCodec::default();
        assert!(matches!(
            codec.encode(&[b'A', ETX, b'B']),
            Err(GatewayError::Framing(_))
        ));
    }

    #[test]
    fn test_custom_control_codes() {
        let codec = FrameCodec::new(ControlCodes {
            start: 0x7B,
            end: 0x7D,
        });
        let frame = codec.encode(b"abc").unwrap();
        assert_eq!(frame[0], 0x7B);
        assert_eq!(codec.decode(&frame).unwrap(), b"abc");
        assert!(FrameCodec::default().decode(&frame).is_err());
    }

    #[test]
    fn test_read_until_exclusive_advances_past_marker() {
        let data = [STX, b'h', b'i', ETX, 0x55];
        let mut reader = FrameReader::new(&data);
        assert_eq!(reader.read_code(), Some(STX));
        assert_eq!(reader.read_until(ETX, false).unwrap(), b"hi");
        assert_eq!(reader.read_code(), Some(0x55));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_until_inclusive() {
        let data = [b'h', b'i', ETX, 0x55];
        let mut reader = FrameReader::new(&data);
        assert_eq!(reader.read_until(ETX, true).unwrap(), &[b'h', b'i', ETX]);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_complete_len() {
        let codec = FrameCodec::default();
        let frame = codec.encode(b"xyz").unwrap();
        assert_eq!(codec.complete_len(&frame[..4]), None);
        assert_eq!(codec.complete_len(&frame[..frame.len() - 1]), None);
        assert_eq!(codec.complete_len(&frame), Some(frame.len()));
    }
}
