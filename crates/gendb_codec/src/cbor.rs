//! CBOR encoding of [`Value`] trees.
//!
//! Encoding goes through [`ciborium::Value`]; only the subset of CBOR that
//! the record model can express is accepted on decode. Maps, tags and floats
//! are rejected rather than coerced so a foreign blob never decodes into a
//! plausible-looking record.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::io::Cursor;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn to_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&to_ciborium(value), &mut buf)
        .map_err(|e| CodecError::encoding(e.to_string()))?;
    Ok(buf)
}

/// Decodes CBOR bytes into a value.
///
/// The input must contain exactly one CBOR item.
///
/// # Errors
///
/// Returns an error for malformed CBOR, trailing bytes, or items outside the
/// record value model.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut cursor = Cursor::new(bytes);
    let item: ciborium::Value = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| CodecError::decoding(e.to_string()))?;
    let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
    if consumed != bytes.len() {
        return Err(CodecError::decoding(format!(
            "{} trailing bytes after CBOR item",
            bytes.len().saturating_sub(consumed)
        )));
    }
    from_ciborium(item)
}

fn to_ciborium(value: &Value) -> ciborium::Value {
    match value {
        Value::Null => ciborium::Value::Null,
        Value::Bool(b) => ciborium::Value::Bool(*b),
        Value::Integer(n) => ciborium::Value::Integer((*n).into()),
        Value::Text(s) => ciborium::Value::Text(s.clone()),
        Value::Bytes(b) => ciborium::Value::Bytes(b.clone()),
        Value::Array(items) => ciborium::Value::Array(items.iter().map(to_ciborium).collect()),
    }
}

fn from_ciborium(item: ciborium::Value) -> CodecResult<Value> {
    match item {
        ciborium::Value::Null => Ok(Value::Null),
        ciborium::Value::Bool(b) => Ok(Value::Bool(b)),
        ciborium::Value::Integer(i) => i64::try_from(i)
            .map(Value::Integer)
            .map_err(|_| CodecError::IntegerOverflow),
        ciborium::Value::Text(s) => Ok(Value::Text(s)),
        ciborium::Value::Bytes(b) => Ok(Value::Bytes(b)),
        ciborium::Value::Array(items) => items
            .into_iter()
            .map(from_ciborium)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        ciborium::Value::Float(_) => Err(CodecError::unsupported("float")),
        ciborium::Value::Map(_) => Err(CodecError::unsupported("map")),
        ciborium::Value::Tag(tag, _) => Err(CodecError::unsupported(format!("tag {tag}"))),
        #[allow(unreachable_patterns)]
        _ => Err(CodecError::unsupported("unknown")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nested_tuple_round_trip() {
        let value = Value::tuple(vec![
            Value::from("h1"),
            Value::from("I0001"),
            Value::Integer(-3),
            Value::Array(vec![Value::Bool(false), Value::Null]),
            Value::Bytes(vec![0, 255]),
        ]);
        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor(&bytes).unwrap(), value);
    }

    #[test]
    fn rejects_maps_and_floats() {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&ciborium::Value::Float(1.5), &mut buf).unwrap();
        assert_eq!(
            from_cbor(&buf),
            Err(CodecError::unsupported("float"))
        );

        let mut buf = Vec::new();
        let map = ciborium::Value::Map(vec![(
            ciborium::Value::Text("k".into()),
            ciborium::Value::Null,
        )]);
        ciborium::ser::into_writer(&map, &mut buf).unwrap();
        assert!(matches!(
            from_cbor(&buf),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = to_cbor(&Value::Integer(1)).unwrap();
        bytes.push(0x00);
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::DecodingFailed { .. })
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            ".{0,12}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            proptest::collection::vec(inner, 0..6).prop_map(Value::Array)
        })
    }

    proptest! {
        #[test]
        fn any_value_survives_encoding(value in arb_value()) {
            let bytes = to_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }
    }
}
