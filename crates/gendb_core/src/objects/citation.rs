use super::{primary_accessors, Attribute, MediaRef, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// A specific reference into a source (page, entry, confidence).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citation {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `C0001`.
    pub gramps_id: String,
    /// Date tuple, or null.
    pub date: Value,
    /// Volume/page within the source.
    pub page: String,
    /// Confidence level, 0 (very low) to 4 (very high).
    pub confidence: i64,
    /// Cited source. Stored as an empty string when unset.
    pub source_handle: Option<Handle>,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
    /// Citation attributes.
    pub attribute_list: Vec<Attribute>,
    /// Last-modified timestamp.
    pub change: i64,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Citation {
    const OBJECT_TYPE: ObjectType = ObjectType::Citation;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        let source = self
            .source_handle
            .as_ref()
            .map_or_else(|| Value::from(""), |h| h.to_value());
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.date.clone(),
            self.page.to_value(),
            self.confidence.to_value(),
            source,
            self.note_list.to_value(),
            self.media_list.to_value(),
            self.attribute_list.to_value(),
            self.change.to_value(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            date: r.read()?,
            page: r.read()?,
            confidence: r.read()?,
            source_handle: r.read()?,
            note_list: r.read()?,
            media_list: r.read()?,
            attribute_list: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default()
            .add_all(self.source_handle.iter())
            .add_all(&self.note_list)
            .add_media_refs(&self.media_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
