use super::{primary_accessors, PrimaryObject};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// A named, colored label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `T0001`.
    pub gramps_id: String,
    /// Label text, unique among tags.
    pub name: String,
    /// Display color as `#rrggbb`, or empty.
    pub color: String,
    /// Sort position; lower sorts first.
    pub priority: i64,
    /// Last-modified timestamp.
    pub change: i64,
}

impl PrimaryObject for Tag {
    const OBJECT_TYPE: ObjectType = ObjectType::Tag;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.name.to_value(),
            self.color.to_value(),
            self.priority.to_value(),
            self.change.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            name: r.read()?,
            color: r.read()?,
            priority: r.read()?,
            change: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        Vec::new()
    }
}
