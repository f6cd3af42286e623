use super::{primary_accessors, Attribute, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// An external file (image, document, recording) referenced by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Media {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `O0001`.
    pub gramps_id: String,
    /// File path, absolute or relative to the tree's media base path.
    pub path: String,
    /// MIME type.
    pub mime: String,
    /// Description.
    pub desc: String,
    /// Hex SHA-256 of the file contents, or empty if unknown.
    pub checksum: String,
    /// Free-form attributes.
    pub attribute_list: Vec<Attribute>,
    /// Supporting citations.
    pub citation_list: Vec<Handle>,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Last-modified timestamp.
    pub change: i64,
    /// Date tuple, or null.
    pub date: Value,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Media {
    const OBJECT_TYPE: ObjectType = ObjectType::Media;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.path.to_value(),
            self.mime.to_value(),
            self.desc.to_value(),
            self.checksum.to_value(),
            self.attribute_list.to_value(),
            self.citation_list.to_value(),
            self.note_list.to_value(),
            self.change.to_value(),
            self.date.clone(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            path: r.read()?,
            mime: r.read()?,
            desc: r.read()?,
            checksum: r.read()?,
            attribute_list: r.read()?,
            citation_list: r.read()?,
            note_list: r.read()?,
            change: r.read()?,
            date: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default()
            .add_all(&self.citation_list)
            .add_all(&self.note_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
