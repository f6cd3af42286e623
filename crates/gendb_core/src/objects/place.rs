use super::{primary_accessors, CodedType, MediaRef, PlaceName, PlaceRef, PrimaryObject, RefCollector};
use crate::codec::{FieldReader, TupleValue};
use crate::types::{Handle, ObjectType};
use gendb_codec::Value;

/// A location, placed in a hierarchy through [`PlaceRef`]s to enclosing
/// places.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    /// Immutable identity.
    pub handle: Handle,
    /// Display identifier, e.g. `P0001`.
    pub gramps_id: String,
    /// Full display title.
    pub title: String,
    /// Longitude as entered.
    pub long: String,
    /// Latitude as entered.
    pub lat: String,
    /// Enclosing places.
    pub placeref_list: Vec<PlaceRef>,
    /// Primary name.
    pub name: PlaceName,
    /// Other names.
    pub alt_names: Vec<PlaceName>,
    /// Country, city, parish, ...; custom when the level is unknown.
    pub place_type: CodedType,
    /// Postal or other code.
    pub code: String,
    /// Alternate location tuples.
    pub alt_loc: Vec<Value>,
    /// Web links.
    pub urls: Vec<Value>,
    /// Attached media.
    pub media_list: Vec<MediaRef>,
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

impl Place {
    /// Handles of the directly enclosing places.
    #[must_use]
    pub fn parents(&self) -> Vec<&Handle> {
        self.placeref_list.iter().map(|r| &r.place).collect()
    }
}

impl PrimaryObject for Place {
    const OBJECT_TYPE: ObjectType = ObjectType::Place;

    primary_accessors!();

    fn to_fields(&self) -> Vec<Value> {
        vec![
            self.handle.to_value(),
            self.gramps_id.to_value(),
            self.title.to_value(),
            self.long.to_value(),
            self.lat.to_value(),
            self.placeref_list.to_value(),
            self.name.to_value(),
            self.alt_names.to_value(),
            self.place_type.to_value(),
            self.code.to_value(),
            self.alt_loc.to_value(),
            self.urls.to_value(),
            self.media_list.to_value(),
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
            title: r.read()?,
            long: r.read()?,
            lat: r.read()?,
            placeref_list: r.read()?,
            name: r.read()?,
            alt_names: r.read()?,
            place_type: r.read()?,
            code: r.read()?,
            alt_loc: r.read()?,
            urls: r.read()?,
            media_list: r.read()?,
            citation_list: r.read()?,
            note_list: r.read()?,
            change: r.read()?,
            tag_list: r.read()?,
            private: r.read()?,
        })
    }

    fn referenced_handles(&self) -> Vec<Handle> {
        RefCollector::default()
            .add_all(self.placeref_list.iter().map(|r| &r.place))
            .add_media_refs(&self.media_list)
            .add_all(&self.citation_list)
            .add_all(&self.note_list)
            .add_all(&self.tag_list)
            .finish()
    }
}
