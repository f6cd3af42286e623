use super::{primary_accessors, CodedType, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// An archive or library holding sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `R0001`.
    pub gramps_id: String,
    /// Library, archive, web site, ...
    pub repo_type: CodedType,
    /// Name.
    pub name: String,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Postal addresses.
    pub address_list: Vec<Value>,
    /// Web links.
    pub urls: Vec<Value>,
    /// Last-modified timestamp.
    pub change: i64,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Repository {
    const OBJECT_TYPE: ObjectType = ObjectType::Repository;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.repo_type.to_value(),
            self.name.to_value(),
            self.note_list.to_value(),
            self.address_list.to_value(),
            self.urls.to_value(),
            self.change.to_value(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            repo_type: r.read()?,
            name: r.read()?,
            note_list: r.read()?,
            address_list: r.read()?,
            urls: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default()
            .add_all(&self.note_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
