//! Record codec: raw tuples, shapes and typed field conversion.
//!
//! A stored object is a positional tuple wrapped in a versioned envelope.
//! [`RawRecord`] is the untyped view used by the upgrade chain; typed
//! objects convert to and from it through [`TupleValue`] and [`FieldReader`].

mod shape;

pub use shape::{current_shape, same_layout, shape_for, Field, FieldKind, Shape};

use crate::error::{StoreError, StoreResult};
use crate::types::{Handle, ObjectType};
use gendb_codec::{decode_record, encode_record, RecordHeader, Value};

/// A positional record at a specific schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Type of the object.
    pub object_type: ObjectType,
    /// Schema version the fields are shaped for.
    pub version: u16,
    /// Positional fields.
    pub fields: Vec<Value>,
}

impl RawRecord {
    /// Creates a record without validating it.
    #[must_use]
    pub fn new(object_type: ObjectType, version: u16, fields: Vec<Value>) -> Self {
        Self {
            object_type,
            version,
            fields,
        }
    }

    /// Decodes a stored blob.
    ///
    /// Missing trailing fields are filled with their kind's empty default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the envelope names another type,
    /// the version has no shape for this type, the field count is outside
    /// the shape's window, or a field has the wrong kind.
    pub fn from_blob(object_type: ObjectType, handle: &Handle, blob: &[u8]) -> StoreResult<Self> {
        let (header, tuple) =
            decode_record(blob).map_err(|e| StoreError::decode(object_type, handle, e.to_string()))?;
        if header.object_type != object_type.key() {
            return Err(StoreError::decode(
                object_type,
                handle,
                format!("blob is tagged as object type {}", header.object_type),
            ));
        }
        let fields = match tuple {
            Value::Array(fields) => fields,
            other => {
                return Err(StoreError::decode(
                    object_type,
                    handle,
                    format!("expected a tuple, found {}", other.kind_name()),
                ))
            }
        };
        let mut record = Self::new(object_type, header.schema_version, fields);
        record.normalize(handle)?;
        Ok(record)
    }

    /// Checks the record against its shape and pads missing trailing fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] on any mismatch.
    pub fn normalize(&mut self, handle: &Handle) -> StoreResult<()> {
        let shape = self.shape().ok_or_else(|| {
            StoreError::decode(
                self.object_type,
                handle,
                format!("no {} layout for schema version {}", self.object_type, self.version),
            )
        })?;
        if !shape.accepts_len(self.fields.len()) {
            return Err(StoreError::decode(
                self.object_type,
                handle,
                format!(
                    "{} fields do not match {} ({}..={} fields)",
                    self.fields.len(),
                    shape.id,
                    shape.required(),
                    shape.fields.len()
                ),
            ));
        }
        for (field, value) in shape.fields.iter().zip(&self.fields) {
            if !field.kind.accepts(value) {
                return Err(StoreError::decode(
                    self.object_type,
                    handle,
                    format!("{}.{} cannot hold {}", shape.id, field.name, value.kind_name()),
                ));
            }
        }
        for field in &shape.fields[self.fields.len()..] {
            self.fields.push(field.kind.default_value());
        }
        Ok(())
    }

    /// Encodes the record into a stored blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the record does not fit its shape.
    pub fn to_blob(&self) -> StoreResult<Vec<u8>> {
        let mut checked = self.clone();
        checked.normalize(&self.handle())?;
        let header = RecordHeader::new(self.object_type.key(), self.version);
        Ok(encode_record(header, &Value::Array(checked.fields))?)
    }

    /// Shape for this record's type and version.
    #[must_use]
    pub fn shape(&self) -> Option<&'static Shape> {
        shape_for(self.object_type, self.version)
    }

    /// Handle stored in field zero.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.fields
            .first()
            .and_then(Value::as_text)
            .map(Handle::new)
            .unwrap_or_else(|| Handle::new(""))
    }

    /// Field called `name` under this record's shape.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.shape()?.index_of(name)?;
        self.fields.get(idx)
    }

    /// Mutable access to the field called `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let idx = self.shape()?.index_of(name)?;
        self.fields.get_mut(idx)
    }
}

/// Conversion between typed values and tuple fields.
pub trait TupleValue: Sized {
    /// Converts to a tuple field.
    fn to_value(&self) -> Value;

    /// Converts from a tuple field.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch.
    fn from_value(value: Value) -> Result<Self, String>;
}

impl TupleValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl TupleValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(format!("expected text, found {}", other.kind_name())),
        }
    }
}

impl TupleValue for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        value
            .as_integer()
            .ok_or_else(|| format!("expected integer, found {}", value.kind_name()))
    }
}

impl TupleValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        value
            .as_bool()
            .ok_or_else(|| format!("expected bool, found {}", value.kind_name()))
    }
}

impl TupleValue for Handle {
    fn to_value(&self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Result<Self, String> {
        String::from_value(value).map(Handle::new)
    }
}

/// Optional handles are stored as null when absent.
impl TupleValue for Option<Handle> {
    fn to_value(&self) -> Value {
        match self {
            Some(h) => Value::from(h),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) if s.is_empty() => Ok(None),
            other => Handle::from_value(other).map(Some),
        }
    }
}

impl<T: TupleValue> TupleValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(TupleValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(format!("expected list, found {}", other.kind_name())),
        }
    }
}

/// Sequential reader over the fields of a tuple.
pub struct FieldReader {
    fields: std::vec::IntoIter<Value>,
    position: usize,
}

impl FieldReader {
    /// Reads the elements of an array value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not an array of exactly `len` items.
    pub fn tuple(value: Value, len: usize) -> Result<Self, String> {
        match value {
            Value::Array(items) if items.len() == len => Ok(Self::new(items)),
            Value::Array(items) => Err(format!("expected {len} fields, found {}", items.len())),
            other => Err(format!("expected tuple, found {}", other.kind_name())),
        }
    }

    /// Reads the given fields in order.
    #[must_use]
    pub fn new(fields: Vec<Value>) -> Self {
        Self {
            fields: fields.into_iter(),
            position: 0,
        }
    }

    /// Reads the next field as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the field position on mismatch or exhaustion.
    pub fn read<T: TupleValue>(&mut self) -> Result<T, String> {
        let position = self.position;
        self.position += 1;
        let value = self
            .fields
            .next()
            .ok_or_else(|| format!("missing field {position}"))?;
        T::from_value(value).map_err(|e| format!("field {position}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_fields(handle: &str) -> Vec<Value> {
        vec![
            Value::from(handle),
            Value::from("N0001"),
            Value::from("text"),
            Value::Integer(0),
            Value::tuple([Value::Integer(1), Value::from("")]),
            Value::Integer(100),
            Value::empty_list(),
            Value::Bool(false),
        ]
    }

    #[test]
    fn blob_round_trip() {
        let record = RawRecord::new(ObjectType::Note, 20, note_fields("n1"));
        let blob = record.to_blob().unwrap();
        let decoded = RawRecord::from_blob(ObjectType::Note, &Handle::new("n1"), &blob).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.get("change"), Some(&Value::Integer(100)));
    }

    #[test]
    fn short_tuple_is_padded() {
        let mut fields = note_fields("n1");
        fields.pop();
        let blob = encode_record(RecordHeader::new(8, 20), &Value::Array(fields)).unwrap();
        let decoded = RawRecord::from_blob(ObjectType::Note, &Handle::new("n1"), &blob).unwrap();
        assert_eq!(decoded.fields.len(), 8);
        assert_eq!(decoded.fields[7], Value::Bool(false));
    }

    #[test]
    fn unknown_length_fails_loudly() {
        let mut fields = note_fields("n1");
        fields.push(Value::Null);
        let blob = encode_record(RecordHeader::new(8, 20), &Value::Array(fields)).unwrap();
        let err = RawRecord::from_blob(ObjectType::Note, &Handle::new("n1"), &blob).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));

        let blob = encode_record(RecordHeader::new(8, 20), &Value::tuple(["n1", "N1"])).unwrap();
        assert!(RawRecord::from_blob(ObjectType::Note, &Handle::new("n1"), &blob).is_err());
    }

    #[test]
    fn wrong_type_or_version_fails() {
        let record = RawRecord::new(ObjectType::Note, 20, note_fields("n1"));
        let blob = record.to_blob().unwrap();
        assert!(RawRecord::from_blob(ObjectType::Person, &Handle::new("n1"), &blob).is_err());

        let blob = encode_record(RecordHeader::new(8, 3), &Value::Array(note_fields("n1"))).unwrap();
        assert!(RawRecord::from_blob(ObjectType::Note, &Handle::new("n1"), &blob).is_err());
    }

    #[test]
    fn wrong_kind_fails() {
        let mut fields = note_fields("n1");
        fields[5] = Value::from("yesterday");
        let record = RawRecord::new(ObjectType::Note, 20, fields);
        assert!(record.to_blob().is_err());
    }

    #[test]
    fn field_reader() {
        let value = Value::tuple([Value::Bool(true), Value::from("h1")]);
        let mut reader = FieldReader::tuple(value, 2).unwrap();
        assert!(reader.read::<bool>().unwrap());
        assert_eq!(reader.read::<Handle>().unwrap(), Handle::new("h1"));
        assert!(reader.read::<Value>().is_err());

        assert!(FieldReader::tuple(Value::tuple([1i64]), 2).is_err());
        assert_eq!(Option::<Handle>::from_value(Value::Null).unwrap(), None);
    }
}
