use super::{primary_accessors, Attribute, ChildRef, CodedType, EventRef, MediaRef, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// A couple and their children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Family {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `F0001`.
    pub gramps_id: String,
    /// Father, if known.
    pub father_handle: Option<Handle>,
    /// Mother, if known.
    pub mother_handle: Option<Handle>,
    /// Children with their relationships.
    pub child_ref_list: Vec<ChildRef>,
    /// Relationship type (married, unmarried, ...).
    pub family_type: CodedType,
    /// Family events.
    pub event_ref_list: Vec<EventRef>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
    /// Free-form attributes.
    pub attribute_list: Vec<Attribute>,
    /// Supporting citations.
    pub citation_list: Vec<Handle>,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Last-modified timestamp.
    pub change: i64,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Family {
    const OBJECT_TYPE: ObjectType = ObjectType::Family;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.father_handle.to_value(),
            self.mother_handle.to_value(),
            self.child_ref_list.to_value(),
            self.family_type.to_value(),
            self.event_ref_list.to_value(),
            self.media_list.to_value(),
            self.attribute_list.to_value(),
            self.citation_list.to_value(),
            self.note_list.to_value(),
            self.change.to_value(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            father_handle: r.read()?,
            mother_handle: r.read()?,
            child_ref_list: r.read()?,
            family_type: r.read()?,
            event_ref_list: r.read()?,
            media_list: r.read()?,
            attribute_list: r.read()?,
            citation_list: r.read()?,
            note_list: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        let mut refs = RefCollector::default();
        refs.add_all(self.father_handle.iter())
            .add_all(self.mother_handle.iter());
        for child in &self.child_ref_list {
            refs.add(&child.child).add_all(&child.note_list);
        }
        refs.add_event_refs(&self.event_ref_list)
            .add_media_refs(&self.media_list)
            .add_all(&self.citation_list)
            .add_all(&self.note_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
