use super::{primary_accessors, Attribute, EventRef, MediaRef, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// Biological sex as recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Gender {
    /// Female.
    Female,
    /// Male.
    Male,
    /// Not known.
    #[default]
    Unknown,
}

impl TupleValue for Gender {
    fn to_value(&self) -> Value {
        Value::Integer(match self {
            Gender::Female => 0,
            Gender::Male => 1,
            Gender::Unknown => 2,
        })
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match i64::from_value(value)? {
            0 => Ok(Gender::Female),
            1 => Ok(Gender::Male),
            2 => Ok(Gender::Unknown),
            n => Err(format!("unknown gender code {n}")),
        }
    }
}

/// A person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `I0001`.
    pub gramps_id: String,
    /// Recorded sex.
    pub gender: Gender,
    /// Name tuple as entered.
    pub primary_name: Vec<Value>,
    /// Other names.
    pub alternate_names: Vec<Value>,
    /// Events the person took part in.
    pub event_ref_list: Vec<EventRef>,
    /// Families in which this person is a parent.
    pub family_list: Vec<Handle>,
    /// Families in which this person is a child.
    pub parent_family_list: Vec<Handle>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
    /// Residential addresses.
    pub address_list: Vec<Value>,
    /// Free-form attributes.
    pub attribute_list: Vec<Attribute>,
    /// Web links.
    pub urls: Vec<Value>,
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

impl PrimaryObject for Person {
    const OBJECT_TYPE: ObjectType = ObjectType::Person;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.gender.to_value(),
            self.primary_name.to_value(),
            self.alternate_names.to_value(),
            self.event_ref_list.to_value(),
            self.family_list.to_value(),
            self.parent_family_list.to_value(),
            self.media_list.to_value(),
            self.address_list.to_value(),
            self.attribute_list.to_value(),
            self.urls.to_value(),
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
            gender: r.read()?,
            primary_name: r.read()?,
            alternate_names: r.read()?,
            event_ref_list: r.read()?,
            family_list: r.read()?,
            parent_family_list: r.read()?,
            media_list: r.read()?,
            address_list: r.read()?,
            attribute_list: r.read()?,
            urls: r.read()?,
            citation_list: r.read()?,
            note_list: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default()
            .add_event_refs(&self.event_ref_list)
            .add_all(&self.family_list)
            .add_all(&self.parent_family_list)
            .add_media_refs(&self.media_list)
            .add_all(&self.citation_list)
            .add_all(&self.note_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
