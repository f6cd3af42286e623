//! Core type definitions.

use std::fmt;

/// Oldest schema version the upgrade chain can start from.
pub const MIN_SCHEMA_VERSION: u16 = 14;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u16 = 20;

/// Opaque, immutable identifier of a primary object.
///
/// Handles are assigned once at creation and are the only identifier used
/// for storage keys and cross-object references.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Handle(String);

impl Handle {
    /// Generates a fresh random handle.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing handle string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the empty placeholder handle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Handle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<Handle> for gendb_codec::Value {
    fn from(h: Handle) -> Self {
        gendb_codec::Value::Text(h.0)
    }
}

impl From<&Handle> for gendb_codec::Value {
    fn from(h: &Handle) -> Self {
        gendb_codec::Value::Text(h.0.clone())
    }
}

/// The ten primary object types and their fixed keys.
///
/// Key 7 is reserved for the reference map and never names an object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[repr(u8)]
pub enum ObjectType {
    /// A person.
    Person = 0,
    /// A family (couple and children).
    Family = 1,
    /// A source document.
    Source = 2,
    /// An event.
    Event = 3,
    /// A media object.
    Media = 4,
    /// A place.
    Place = 5,
    /// A repository holding sources.
    Repository = 6,
    /// A note.
    Note = 8,
    /// A tag.
    Tag = 9,
    /// A citation of a source.
    Citation = 10,
}

impl ObjectType {
    /// Every object type, ordered by key.
    pub const ALL: [ObjectType; 10] = [
        ObjectType::Person,
        ObjectType::Family,
        ObjectType::Source,
        ObjectType::Event,
        ObjectType::Media,
        ObjectType::Place,
        ObjectType::Repository,
        ObjectType::Note,
        ObjectType::Tag,
        ObjectType::Citation,
    ];

    /// Integer key of this type.
    #[must_use]
    pub const fn key(self) -> u8 {
        self as u8
    }

    /// Resolves an integer key.
    #[must_use]
    pub fn from_key(key: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Storage table name.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            ObjectType::Person => "person",
            ObjectType::Family => "family",
            ObjectType::Source => "source",
            ObjectType::Event => "event",
            ObjectType::Media => "media",
            ObjectType::Place => "place",
            ObjectType::Repository => "repository",
            ObjectType::Note => "note",
            ObjectType::Tag => "tag",
            ObjectType::Citation => "citation",
        }
    }

    /// Class name, as used in signal names and messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ObjectType::Person => "Person",
            ObjectType::Family => "Family",
            ObjectType::Source => "Source",
            ObjectType::Event => "Event",
            ObjectType::Media => "Media",
            ObjectType::Place => "Place",
            ObjectType::Repository => "Repository",
            ObjectType::Note => "Note",
            ObjectType::Tag => "Tag",
            ObjectType::Citation => "Citation",
        }
    }

    /// Label used for object counts in summaries.
    #[must_use]
    pub const fn count_label(self) -> &'static str {
        match self {
            ObjectType::Person => "Number of people",
            ObjectType::Family => "Number of families",
            ObjectType::Source => "Number of sources",
            ObjectType::Event => "Number of events",
            ObjectType::Media => "Number of media",
            ObjectType::Place => "Number of places",
            ObjectType::Repository => "Number of repositories",
            ObjectType::Note => "Number of notes",
            ObjectType::Tag => "Number of tags",
            ObjectType::Citation => "Number of citations",
        }
    }

    /// printf-style template for new gramps IDs.
    #[must_use]
    pub const fn id_prefix(self) -> &'static str {
        match self {
            ObjectType::Person => "I",
            ObjectType::Family => "F",
            ObjectType::Source => "S",
            ObjectType::Event => "E",
            ObjectType::Media => "O",
            ObjectType::Place => "P",
            ObjectType::Repository => "R",
            ObjectType::Note => "N",
            ObjectType::Tag => "T",
            ObjectType::Citation => "C",
        }
    }

    /// Formats the gramps ID with sequence number `n`, e.g. `I0042`.
    #[must_use]
    pub fn format_gramps_id(self, n: u64) -> String {
        format!("{}{n:04}", self.id_prefix())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of mutation recorded in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[repr(u8)]
pub enum TxnOp {
    /// New object.
    Add = 0,
    /// Removed object.
    Delete = 1,
    /// Changed object.
    Update = 2,
}

impl TxnOp {
    /// Converts a byte to an operation.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Add),
            1 => Some(Self::Delete),
            2 => Some(Self::Update),
            _ => None,
        }
    }

    /// Converts the operation to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Signal suffix, as in `person-add`.
    #[must_use]
    pub const fn signal_suffix(self) -> &'static str {
        match self {
            TxnOp::Add => "add",
            TxnOp::Delete => "delete",
            TxnOp::Update => "update",
        }
    }
}

/// Position of an entry in the undo journal.
///
/// Record numbers start at zero, increase by one per entry and are never
/// reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordNumber(pub u64);

impl RecordNumber {
    /// Creates a record number.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec:{}", self.0)
    }
}

/// Current time as seconds since the Unix epoch.
#[must_use]
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_are_fixed() {
        assert_eq!(ObjectType::Person.key(), 0);
        assert_eq!(ObjectType::Repository.key(), 6);
        assert_eq!(ObjectType::Note.key(), 8);
        assert_eq!(ObjectType::Citation.key(), 10);
        assert_eq!(ObjectType::from_key(7), None);
        for t in ObjectType::ALL {
            assert_eq!(ObjectType::from_key(t.key()), Some(t));
        }
    }

    #[test]
    fn handles_are_unique() {
        let a = Handle::generate();
        let b = Handle::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn gramps_id_format() {
        assert_eq!(ObjectType::Person.format_gramps_id(1), "I0001");
        assert_eq!(ObjectType::Media.format_gramps_id(12345), "O12345");
    }

    #[test]
    fn op_bytes() {
        for op in [TxnOp::Add, TxnOp::Delete, TxnOp::Update] {
            assert_eq!(TxnOp::from_byte(op.as_byte()), Some(op));
        }
        assert_eq!(TxnOp::from_byte(3), None);
    }
}
