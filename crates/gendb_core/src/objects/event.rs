use super::{primary_accessors, Attribute, CodedType, MediaRef, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// Something that happened at a time and place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `E0001`.
    pub gramps_id: String,
    /// Birth, death, marriage, ...
    pub event_type: CodedType,
    /// Date tuple, or null.
    pub date: Value,
    /// Free-text description.
    pub description: String,
    /// Where it happened. Stored as an empty string when unknown.
    pub place: Option<Handle>,
    /// Supporting citations.
    pub citation_list: Vec<Handle>,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
    /// Free-form attributes.
    pub attribute_list: Vec<Attribute>,
    /// Last-modified timestamp.
    pub change: i64,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Event {
    const OBJECT_TYPE: ObjectType = ObjectType::Event;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        let place = self
            .place
            .as_ref()
            .map_or_else(|| Value::from(""), |h| h.to_value());
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.event_type.to_value(),
            self.date.clone(),
            self.description.to_value(),
            place,
            self.citation_list.to_value(),
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
            event_type: r.read()?,
            date: r.read()?,
            description: r.read()?,
            place: r.read()?,
            citation_list: r.read()?,
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
            .add_all(self.place.iter())
            .add_all(&self.citation_list)
            .add_all(&self.note_list)
            .add_media_refs(&self.media_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
