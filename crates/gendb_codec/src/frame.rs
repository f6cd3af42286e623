//! Checksummed frames for append-only logs.
//!
//! Frame layout (all integers little-endian):
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | payload length (4) | payload | CRC32 (4) |
//! ```
//!
//! The CRC covers everything before it. Frames are self-delimiting, so a log
//! is simply a concatenation of frames; readers stop at the first frame that
//! fails verification.

use crate::error::{CodecError, CodecResult};

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const FRAME_HEADER_LEN: usize = 11;

/// Size of the trailing checksum.
pub const FRAME_CRC_LEN: usize = 4;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Application-defined frame kind.
    pub kind: u8,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Total size of the frame including header and checksum.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload_len as usize + FRAME_CRC_LEN
    }
}

/// Builds a complete frame around `payload`.
///
/// # Errors
///
/// Returns an error if the payload exceeds the 4 GiB length field.
pub fn encode_frame(magic: [u8; 4], kind: u8, payload: &[u8]) -> CodecResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| CodecError::encoding("frame payload too large"))?;

    let mut data = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + FRAME_CRC_LEN);
    data.extend_from_slice(&magic);
    data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    data.push(kind);
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(payload);

    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Parses the fixed-size header at the start of `bytes`.
///
/// # Errors
///
/// Returns an error if fewer than [`FRAME_HEADER_LEN`] bytes are given, or if
/// magic or version do not match.
pub fn decode_frame_header(magic: [u8; 4], bytes: &[u8]) -> CodecResult<FrameHeader> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: FRAME_HEADER_LEN,
            available: bytes.len(),
        });
    }
    if bytes[0..4] != magic {
        return Err(CodecError::InvalidMagic {
            found: bytes[0..4].to_vec(),
        });
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    Ok(FrameHeader {
        kind: bytes[6],
        payload_len: u32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]),
    })
}

/// Verifies a complete frame and returns its kind and payload.
///
/// # Errors
///
/// Returns an error if the frame is truncated or its checksum does not match.
pub fn decode_frame(magic: [u8; 4], bytes: &[u8]) -> CodecResult<(u8, &[u8])> {
    let header = decode_frame_header(magic, bytes)?;
    let total = header.frame_len();
    if bytes.len() < total {
        return Err(CodecError::Truncated {
            needed: total,
            available: bytes.len(),
        });
    }

    let crc_offset = total - FRAME_CRC_LEN;
    let expected = u32::from_le_bytes([
        bytes[crc_offset],
        bytes[crc_offset + 1],
        bytes[crc_offset + 2],
        bytes[crc_offset + 3],
    ]);
    let actual = compute_crc32(&bytes[..crc_offset]);
    if expected != actual {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }

    Ok((header.kind, &bytes[FRAME_HEADER_LEN..crc_offset]))
}

/// Computes the CRC32 (IEEE) checksum of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = *b"TEST";

    #[test]
    fn crc_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn frame_round_trip() {
        let frame = encode_frame(MAGIC, 2, b"payload").unwrap();
        let header = decode_frame_header(MAGIC, &frame).unwrap();
        assert_eq!(header.kind, 2);
        assert_eq!(header.frame_len(), frame.len());

        let (kind, payload) = decode_frame(MAGIC, &frame).unwrap();
        assert_eq!(kind, 2);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn detects_corruption() {
        let mut frame = encode_frame(MAGIC, 1, b"abc").unwrap();
        frame[FRAME_HEADER_LEN] ^= 0xFF;
        assert!(matches!(
            decode_frame(MAGIC, &frame),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn detects_torn_write() {
        let frame = encode_frame(MAGIC, 1, b"abcdef").unwrap();
        assert!(matches!(
            decode_frame(MAGIC, &frame[..frame.len() - 2]),
            Err(CodecError::Truncated { .. })
        ));
        assert!(matches!(
            decode_frame(*b"ELSE", &frame),
            Err(CodecError::InvalidMagic { .. })
        ));
    }
}
