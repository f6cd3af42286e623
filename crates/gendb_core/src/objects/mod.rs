//! Typed primary objects.
//!
//! Each type converts to and from its current positional layout. Older
//! layouts are only reachable through [`RawRecord`] and the upgrade chain.

mod citation;
mod event;
mod family;
mod media;
mod note;
mod person;
mod place;
mod refs;
mod repository;
mod source;
mod tag;

pub use citation::Citation;
pub use event::Event;
pub use family::Family;
pub use media::Media;
pub use note::Note;
pub use person::{Gender, Person};
pub use place::Place;
pub use refs::{Attribute, ChildRef, CodedType, EventRef, MediaRef, PlaceName, PlaceRef, RepoRef};
pub use repository::Repository;
pub use source::Source;
pub use tag::Tag;

use crate::codec::{same_layout, FieldReader, RawRecord};
use crate::error::{StoreError, StoreResult};
use crate::types::{Handle, ObjectType, CURRENT_SCHEMA_VERSION};
use gendb_codec::Value;
use std::fmt;

/// A genealogical entity stored in its own table.
pub trait PrimaryObject: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Table this type lives in.
    const OBJECT_TYPE: ObjectType;

    /// Immutable identity.
    fn handle(&self) -> &Handle;

    /// Human-facing identifier.
    fn gramps_id(&self) -> &str;

    /// Replaces the human-facing identifier.
    fn set_gramps_id(&mut self, gramps_id: String);

    /// Last-modified timestamp (seconds since the epoch).
    fn change(&self) -> i64;

    /// Sets the last-modified timestamp.
    fn set_change(&mut self, change: i64);

    /// Current positional layout of this object.
    fn to_fields(&self) -> Vec<Value>;

    /// Reads an object from its current positional layout.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatching field.
    fn from_fields(reader: &mut FieldReader) -> Result<Self, String>;

    /// Handles of every object this one points at.
    fn referenced_handles(&self) -> Vec<Handle>;

    /// Raw record at the current schema version.
    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::OBJECT_TYPE, CURRENT_SCHEMA_VERSION, self.to_fields())
    }

    /// Reads a typed object from a raw record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the record has another type, is
    /// shaped for a layout other than the current one, or a field fails to
    /// convert.
    fn from_raw(raw: RawRecord) -> StoreResult<Self> {
        let handle = raw.handle();
        if raw.object_type != Self::OBJECT_TYPE {
            return Err(StoreError::decode(
                Self::OBJECT_TYPE,
                &handle,
                format!("record belongs to {}", raw.object_type),
            ));
        }
        if !same_layout(Self::OBJECT_TYPE, raw.version, CURRENT_SCHEMA_VERSION) {
            return Err(StoreError::decode(
                Self::OBJECT_TYPE,
                &handle,
                format!(
                    "schema version {} is not readable as {CURRENT_SCHEMA_VERSION}",
                    raw.version
                ),
            ));
        }
        let mut reader = FieldReader::new(raw.fields);
        Self::from_fields(&mut reader).map_err(|m| StoreError::decode(Self::OBJECT_TYPE, &handle, m))
    }
}

/// Generates the identity accessors shared by every primary object.
macro_rules! primary_accessors {
    () => {
        fn handle(&self) -> &$crate::types::Handle {
            &self.handle
        }

        fn gramps_id(&self) -> &str {
            &self.gramps_id
        }

        fn set_gramps_id(&mut self, gramps_id: String) {
            self.gramps_id = gramps_id;
        }

        fn change(&self) -> i64 {
            self.change
        }

        fn set_change(&mut self, change: i64) {
            self.change = change;
        }
    };
}
pub(crate) use primary_accessors;

/// Handles referenced by a current-layout raw record of any type.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if the record is not readable as its
/// typed object.
pub fn referenced_handles(raw: RawRecord) -> StoreResult<Vec<Handle>> {
    Ok(match raw.object_type {
        ObjectType::Person => Person::from_raw(raw)?.referenced_handles(),
        ObjectType::Family => Family::from_raw(raw)?.referenced_handles(),
        ObjectType::Event => Event::from_raw(raw)?.referenced_handles(),
        ObjectType::Place => Place::from_raw(raw)?.referenced_handles(),
        ObjectType::Media => Media::from_raw(raw)?.referenced_handles(),
        ObjectType::Repository => Repository::from_raw(raw)?.referenced_handles(),
        ObjectType::Note => Note::from_raw(raw)?.referenced_handles(),
        ObjectType::Source => Source::from_raw(raw)?.referenced_handles(),
        ObjectType::Citation => Citation::from_raw(raw)?.referenced_handles(),
        ObjectType::Tag => Tag::from_raw(raw)?.referenced_handles(),
    })
}

/// Accumulates referenced handles, skipping empty placeholders.
#[derive(Default)]
pub(crate) struct RefCollector(Vec<Handle>);

impl RefCollector {
    pub(crate) fn add(&mut self, handle: &Handle) -> &mut Self {
        if !handle.is_empty() {
            self.0.push(handle.clone());
        }
        self
    }

    pub(crate) fn add_all<'a>(&mut self, handles: impl IntoIterator<Item = &'a Handle>) -> &mut Self {
        for handle in handles {
            self.add(handle);
        }
        self
    }

    pub(crate) fn add_event_refs(&mut self, refs: &[EventRef]) -> &mut Self {
        for r in refs {
            self.add(&r.event).add_all(&r.citation_list).add_all(&r.note_list);
        }
        self
    }

    pub(crate) fn add_media_refs(&mut self, refs: &[MediaRef]) -> &mut Self {
        for r in refs {
            self.add(&r.media).add_all(&r.note_list);
        }
        self
    }

    pub(crate) fn finish(&mut self) -> Vec<Handle> {
        let mut handles = std::mem::take(&mut self.0);
        handles.sort();
        handles.dedup();
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TupleValue;

    fn sample_person() -> Person {
        Person {
            handle: Handle::new("h1"),
            gramps_id: "I0001".into(),
            gender: Gender::Female,
            primary_name: vec![Value::from("Ada"), Value::from("Lovelace")],
            event_ref_list: vec![EventRef::new(Handle::new("e1"))],
            family_list: vec![Handle::new("f1")],
            note_list: vec![Handle::new("n1"), Handle::new("n1")],
            change: 1_700_000_000,
            ..Person::default()
        }
    }

    #[test]
    fn person_round_trip_through_blob() {
        let person = sample_person();
        let blob = person.to_raw().to_blob().unwrap();
        let raw = RawRecord::from_blob(ObjectType::Person, person.handle(), &blob).unwrap();
        assert_eq!(Person::from_raw(raw).unwrap(), person);
    }

    #[test]
    fn every_type_matches_its_shape() {
        let h = Handle::new("x1");
        let raws = vec![
            Person { handle: h.clone(), ..Person::default() }.to_raw(),
            Family { handle: h.clone(), ..Family::default() }.to_raw(),
            Event { handle: h.clone(), ..Event::default() }.to_raw(),
            Place { handle: h.clone(), ..Place::default() }.to_raw(),
            Media { handle: h.clone(), ..Media::default() }.to_raw(),
            Repository { handle: h.clone(), ..Repository::default() }.to_raw(),
            Note { handle: h.clone(), ..Note::default() }.to_raw(),
            Source { handle: h.clone(), ..Source::default() }.to_raw(),
            Citation { handle: h.clone(), ..Citation::default() }.to_raw(),
            Tag { handle: h.clone(), ..Tag::default() }.to_raw(),
        ];
        for raw in raws {
            let shape = raw.shape().unwrap();
            assert_eq!(raw.fields.len(), shape.fields.len(), "{}", shape.id);
            let blob = raw.to_blob().unwrap();
            let back = RawRecord::from_blob(raw.object_type, &h, &blob).unwrap();
            assert_eq!(back, raw);
            referenced_handles(back).unwrap();
        }
    }

    #[test]
    fn old_layout_is_not_typed() {
        let mut raw = sample_person().to_raw();
        raw.version = 19;
        assert!(matches!(Person::from_raw(raw), Err(StoreError::Decode { .. })));

        // Note layouts have not changed since 15.
        let mut raw = Note { handle: Handle::new("n1"), ..Note::default() }.to_raw();
        raw.version = 15;
        assert!(Note::from_raw(raw).is_ok());
    }

    #[test]
    fn references_are_deduplicated() {
        let refs = sample_person().referenced_handles();
        assert_eq!(
            refs,
            vec![Handle::new("e1"), Handle::new("f1"), Handle::new("n1")]
        );
    }

    #[test]
    fn gender_codes() {
        assert_eq!(Gender::Male.to_value(), Value::Integer(1));
        assert_eq!(Gender::from_value(Value::Integer(0)).unwrap(), Gender::Female);
        assert!(Gender::from_value(Value::Integer(7)).is_err());
    }
}
