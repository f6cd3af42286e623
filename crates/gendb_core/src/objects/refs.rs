//! Secondary records that point at other primary objects.

use crate::codec::{FieldReader, TupleValue};
use crate::types::Handle;
use gendb_codec::Value;

/// An enumerated type with an escape hatch for custom values.
///
/// Stored as `(code, custom text)`; the text is only meaningful when the
/// code is [`CodedType::CUSTOM`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodedType {
    /// Numeric code.
    pub code: i64,
    /// Custom text.
    pub custom: String,
}

impl CodedType {
    /// Code marking a user-defined value.
    pub const CUSTOM: i64 = -1;

    /// Standard value `code`.
    #[must_use]
    pub fn new(code: i64) -> Self {
        Self {
            code,
            custom: String::new(),
        }
    }

    /// User-defined value `text`.
    pub fn custom(text: impl Into<String>) -> Self {
        Self {
            code: Self::CUSTOM,
            custom: text.into(),
        }
    }
}

impl TupleValue for CodedType {
    fn to_value(&self) -> Value {
        Value::Array(vec![self.code.to_value(), self.custom.to_value()])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 2)?;
        Ok(Self {
            code: r.read()?,
            custom: r.read()?,
        })
    }
}

/// Reference from a person or family to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRef {
    /// Privacy flag.
    pub private: bool,
    /// Citations supporting this participation.
    pub citation_list: Vec<Handle>,
    /// Notes about this participation.
    pub note_list: Vec<Handle>,
    /// Attributes of this participation.
    pub attribute_list: Vec<Attribute>,
    /// Referenced event.
    pub event: Handle,
    /// Role in the event.
    pub role: CodedType,
}

impl EventRef {
    /// Field count of the current layout.
    pub const LEN: usize = 6;

    /// References `event` with the primary role.
    #[must_use]
    pub fn new(event: Handle) -> Self {
        Self {
            event,
            role: CodedType::new(1),
            ..Self::default()
        }
    }
}

impl TupleValue for EventRef {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.private.to_value(),
            self.citation_list.to_value(),
            self.note_list.to_value(),
            self.attribute_list.to_value(),
            self.event.to_value(),
            self.role.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, Self::LEN)?;
        Ok(Self {
            private: r.read()?,
            citation_list: r.read()?,
            note_list: r.read()?,
            attribute_list: r.read()?,
            event: r.read()?,
            role: r.read()?,
        })
    }
}

/// Reference to a media object, optionally to a region of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaRef {
    /// Privacy flag.
    pub private: bool,
    /// Notes about this use of the media.
    pub note_list: Vec<Handle>,
    /// Referenced media object.
    pub media: Handle,
    /// Region as `(x1, y1, x2, y2)` percentages, or null for the whole.
    pub rect: Value,
}

impl TupleValue for MediaRef {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.private.to_value(),
            self.note_list.to_value(),
            self.media.to_value(),
            self.rect.clone(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 4)?;
        Ok(Self {
            private: r.read()?,
            note_list: r.read()?,
            media: r.read()?,
            rect: r.read()?,
        })
    }
}

/// Reference from a family to a child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildRef {
    /// Privacy flag.
    pub private: bool,
    /// Notes about the relationship.
    pub note_list: Vec<Handle>,
    /// The child.
    pub child: Handle,
    /// Relationship to the father.
    pub father_relation: CodedType,
    /// Relationship to the mother.
    pub mother_relation: CodedType,
}

impl TupleValue for ChildRef {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.private.to_value(),
            self.note_list.to_value(),
            self.child.to_value(),
            self.father_relation.to_value(),
            self.mother_relation.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 5)?;
        Ok(Self {
            private: r.read()?,
            note_list: r.read()?,
            child: r.read()?,
            father_relation: r.read()?,
            mother_relation: r.read()?,
        })
    }
}

/// Reference from a source to the repository holding it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoRef {
    /// Notes about the holding.
    pub note_list: Vec<Handle>,
    /// The repository.
    pub repository: Handle,
    /// Shelf mark.
    pub call_number: String,
    /// Medium the source is held on.
    pub media_type: CodedType,
    /// Privacy flag.
    pub private: bool,
}

impl TupleValue for RepoRef {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.note_list.to_value(),
            self.repository.to_value(),
            self.call_number.to_value(),
            self.media_type.to_value(),
            self.private.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 5)?;
        Ok(Self {
            note_list: r.read()?,
            repository: r.read()?,
            call_number: r.read()?,
            media_type: r.read()?,
            private: r.read()?,
        })
    }
}

/// Link from a place to an enclosing place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceRef {
    /// Enclosing place.
    pub place: Handle,
    /// Period the enclosure applies to, or null.
    pub date: Value,
}

impl PlaceRef {
    /// Undated link to `place`.
    #[must_use]
    pub fn new(place: Handle) -> Self {
        Self {
            place,
            date: Value::Null,
        }
    }
}

impl TupleValue for PlaceRef {
    fn to_value(&self) -> Value {
        Value::Array(vec![self.place.to_value(), self.date.clone()])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 2)?;
        Ok(Self {
            place: r.read()?,
            date: r.read()?,
        })
    }
}

/// A name of a place, optionally dated and tagged with a language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceName {
    /// The name.
    pub value: String,
    /// Period the name was used, or null.
    pub date: Value,
    /// Language code, or empty.
    pub lang: String,
}

impl PlaceName {
    /// Undated name without a language.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            date: Value::Null,
            lang: String::new(),
        }
    }
}

impl TupleValue for PlaceName {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.value.to_value(),
            self.date.clone(),
            self.lang.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 3)?;
        Ok(Self {
            value: r.read()?,
            date: r.read()?,
            lang: r.read()?,
        })
    }
}

/// Typed key/value pair attached to an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribute {
    /// Privacy flag.
    pub private: bool,
    /// Attribute type: a name or a `(code, custom text)` pair.
    pub attribute_type: Value,
    /// Attribute value.
    pub value: String,
}

impl Attribute {
    /// Public attribute with a textual type.
    pub fn new(attribute_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            private: false,
            attribute_type: Value::Text(attribute_type.into()),
            value: value.into(),
        }
    }
}

impl TupleValue for Attribute {
    fn to_value(&self) -> Value {
        Value::Array(vec![
            self.private.to_value(),
            self.attribute_type.clone(),
            self.value.to_value(),
        ])
    }

    fn from_value(value: Value) -> Result<Self, String> {
        let mut r = FieldReader::tuple(value, 3)?;
        Ok(Self {
            private: r.read()?,
            attribute_type: r.read()?,
            value: r.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ref_layout() {
        let r = EventRef::new(Handle::new("e1"));
        let value = r.to_value();
        assert_eq!(value.as_array().unwrap().len(), EventRef::LEN);
        assert_eq!(value.as_array().unwrap()[4], Value::from("e1"));
        assert_eq!(EventRef::from_value(value).unwrap(), r);
    }

    #[test]
    fn old_event_ref_is_rejected() {
        let old = Value::tuple([
            Value::Bool(false),
            Value::empty_list(),
            Value::empty_list(),
            Value::from("e1"),
            CodedType::new(1).to_value(),
        ]);
        assert!(EventRef::from_value(old).is_err());
    }

    #[test]
    fn attribute_accepts_coded_type() {
        let value = Value::tuple([
            Value::Bool(true),
            Value::tuple([Value::Integer(3), Value::from("")]),
            Value::from("blue"),
        ]);
        let attr = Attribute::from_value(value).unwrap();
        assert!(attr.private);
        assert_eq!(attr.value, "blue");
    }
}
