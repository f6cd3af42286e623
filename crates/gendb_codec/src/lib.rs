//! # gendb Codec
//!
//! Serialization primitives shared by the gendb storage and core crates.
//!
//! - [`Value`]: the dynamic value model for positional record tuples
//! - [`to_cbor`] / [`from_cbor`]: CBOR encoding of values
//! - [`encode_record`] / [`decode_record`]: the versioned envelope wrapped
//!   around every stored object blob
//! - [`encode_frame`] / [`decode_frame`]: CRC32-checked frames for
//!   append-only logs
//!
//! ## Usage
//!
//! ```
//! use gendb_codec::{decode_record, encode_record, RecordHeader, Value};
//!
//! let tuple = Value::tuple(["h1", "I0001"]);
//! let blob = encode_record(RecordHeader::new(0, 20), &tuple).unwrap();
//! let (header, decoded) = decode_record(&blob).unwrap();
//! assert_eq!(header.schema_version, 20);
//! assert_eq!(decoded, tuple);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod envelope;
mod error;
mod frame;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use envelope::{
    decode_record, encode_record, peek_header, RecordHeader, ENVELOPE_VERSION, HEADER_LEN,
    RECORD_MAGIC,
};
pub use error::{CodecError, CodecResult};
pub use frame::{
    compute_crc32, decode_frame, decode_frame_header, encode_frame, FrameHeader, FRAME_CRC_LEN,
    FRAME_HEADER_LEN, FRAME_VERSION,
};
pub use value::Value;
