use super::{primary_accessors, Attribute, MediaRef, PrimaryObject, RefCollector, RepoRef};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// A document or other origin of information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `S0001`.
    pub gramps_id: String,
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Publication information.
    pub pubinfo: String,
    /// Attached notes.
    pub note_list: Vec<Handle>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
    /// Abbreviation.
    pub abbrev: String,
    /// Last-modified timestamp.
    pub change: i64,
    /// Source attributes.
    pub attribute_list: Vec<Attribute>,
    /// Repositories holding this source.
    pub reporef_list: Vec<RepoRef>,
    /// Tags.
    pub tag_list: Vec<Handle>,
    /// Privacy flag.
    pub private: bool,
}

impl PrimaryObject for Source {
    const OBJECT_TYPE: ObjectType = ObjectType::Source;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.title.to_value(),
            self.author.to_value(),
            self.pubinfo.to_value(),
            self.note_list.to_value(),
            self.media_list.to_value(),
            self.abbrev.to_value(),
            self.change.to_value(),
            self.attribute_list.to_value(),
            self.reporef_list.to_value(),
            self.tag_list.to_value(),
            self.private.to_value(),
        ]
    }

    fn from_fields(r: &mut FieldReader) -> Result<Self, String> {
        Ok(Self {
            handle: r.read()?,
            gramps_id: r.read()?,
            title: r.read()?,
            author: r.read()?,
            pubinfo: r.read()?,
            note_list: r.read()?,
            media_list: r.read()?,
            abbrev: r.read()?,
            change: r.read()?,
            attribute_list: r.read()?,
            reporef_list: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        let mut refs = RefCollector::default();
        refs.add_all(&self.note_list).add_media_refs(&self.media_list);
        for r in &self.reporef_list {
            refs.add(&r.repository).add_all(&r.note_list);
        }
        refs.add_all(&self.tag_list).finish()
    }
}
