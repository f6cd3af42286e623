//! Versioned record envelope.
//!
//! Every object blob stored in a table is wrapped in a fixed header so the
//! schema version of the tuple travels with the tuple itself:
//!
//! ```text
//! | magic "GDBR" (4) | envelope version (1) | object type key (1) | schema version (2, LE) | CBOR tuple |
//! ```

use crate::cbor::{from_cbor, to_cbor};
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Magic bytes identifying a record blob.
pub const RECORD_MAGIC: [u8; 4] = *b"GDBR";

/// Current envelope layout version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Size of the envelope header in bytes.
pub const HEADER_LEN: usize = 8;

/// Header fields carried in front of every record blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Object type key of the record.
    pub object_type: u8,
    /// Schema version the tuple is shaped for.
    pub schema_version: u16,
}

impl RecordHeader {
    /// Creates a header.
    #[must_use]
    pub const fn new(object_type: u8, schema_version: u16) -> Self {
        Self {
            object_type,
            schema_version,
        }
    }
}

/// Wraps an encoded tuple in a record envelope.
///
/// # Errors
///
/// Returns an error if the tuple cannot be encoded.
pub fn encode_record(header: RecordHeader, tuple: &Value) -> CodecResult<Vec<u8>> {
    let payload = to_cbor(tuple)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.push(ENVELOPE_VERSION);
    buf.push(header.object_type);
    buf.extend_from_slice(&header.schema_version.to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Reads only the header of a record blob.
///
/// # Errors
///
/// Returns an error if the blob is truncated, has the wrong magic, or uses an
/// unknown envelope version.
pub fn peek_header(blob: &[u8]) -> CodecResult<RecordHeader> {
    if blob.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: HEADER_LEN,
            available: blob.len(),
        });
    }
    if blob[0..4] != RECORD_MAGIC {
        return Err(CodecError::InvalidMagic {
            found: blob[0..4].to_vec(),
        });
    }
    if blob[4] != ENVELOPE_VERSION {
        return Err(CodecError::UnsupportedVersion {
            version: u16::from(blob[4]),
        });
    }
    Ok(RecordHeader {
        object_type: blob[5],
        schema_version: u16::from_le_bytes([blob[6], blob[7]]),
    })
}

/// Unwraps a record blob into its header and tuple.
///
/// # Errors
///
/// Returns an error if the header is invalid or the payload is not valid CBOR.
pub fn decode_record(blob: &[u8]) -> CodecResult<(RecordHeader, Value)> {
    let header = peek_header(blob)?;
    let tuple = from_cbor(&blob[HEADER_LEN..])?;
    Ok((header, tuple))
}
