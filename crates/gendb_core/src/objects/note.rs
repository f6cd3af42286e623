use super::{primary_accessors, CodedType, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// Free text attached to other objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Note {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `N0001`.
    pub gramps_id: String,
    /// Note body.
    pub text: String,
    /// 0 for flowed text, 1 for preformatted.
    pub format: i64,
    /// General, research, transcript, ...
    pub note_type: CodedType,
    /// Last-modified timestamp.
    pub change: i64,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Note {
    const OBJECT_TYPE: ObjectType = ObjectType::Note;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.text.to_value(),
            self.format.to_value(),
            self.note_type.to_value(),
            self.change.to_value(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            text: r.read()?,
            format: r.read()?,
            note_type: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default().add_all(&self.tag_list).finish()
    }
}
