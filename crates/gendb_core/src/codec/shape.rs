//! Static table of record shapes.
//!
//! Every `(object type, schema version)` pair resolves to exactly one
//! [`Shape`]: an ordered list of named, kinded fields. Consecutive versions
//! that share a layout share the same entry, so two versions are
//! layout-compatible iff they resolve to the same [`Shape::id`].

use crate::types::ObjectType;
use gendb_codec::Value;

/// Kind of a positional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string; default `""`.
    Text,
    /// Integer; default `0`.
    Int,
    /// Boolean; default `false`.
    Bool,
    /// Array (list or nested tuple); default `[]`.
    List,
    /// Anything, including null; default null.
    Any,
}

impl FieldKind {
    /// Value used for a missing trailing field.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::Text => Value::Text(String::new()),
            FieldKind::Int => Value::Integer(0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::List => Value::empty_list(),
            FieldKind::Any => Value::Null,
        }
    }

    /// Whether `value` is acceptable for this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::Any, _)
                | (FieldKind::Text, Value::Text(_))
                | (FieldKind::Int, Value::Integer(_))
                | (FieldKind::Bool, Value::Bool(_))
                | (FieldKind::List, Value::Array(_))
        )
    }
}

/// One named field of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name.
    pub name: &'static str,
    /// Field kind.
    pub kind: FieldKind,
}

const fn text(name: &'static str) -> Field {
    Field { name, kind: FieldKind::Text }
}
const fn int(name: &'static str) -> Field {
    Field { name, kind: FieldKind::Int }
}
const fn boolean(name: &'static str) -> Field {
    Field { name, kind: FieldKind::Bool }
}
const fn list(name: &'static str) -> Field {
    Field { name, kind: FieldKind::List }
}
const fn any(name: &'static str) -> Field {
    Field { name, kind: FieldKind::Any }
}

/// Positional layout of one object type over a range of versions.
#[derive(Debug, PartialEq, Eq)]
pub struct Shape {
    /// Stable identifier, e.g. `person.v16`.
    pub id: &'static str,
    /// Ordered fields.
    pub fields: &'static [Field],
}

impl Shape {
    /// Number of leading fields a stored tuple must carry.
    ///
    /// Only the last field (the privacy flag on most types) may be omitted.
    #[must_use]
    pub fn required(&self) -> usize {
        self.fields.len() - 1
    }

    /// Position of the field called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Whether a tuple of `len` fields fits this shape.
    #[must_use]
    pub fn accepts_len(&self, len: usize) -> bool {
        (self.required()..=self.fields.len()).contains(&len)
    }
}

// Person

static PERSON_V14: Shape = Shape {
    id: "person.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        int("gender"),
        list("primary_name"),
        list("alternate_names"),
        list("event_ref_list"),
        list("family_list"),
        list("parent_family_list"),
        list("media_list"),
        list("address_list"),
        list("attribute_list"),
        list("urls"),
        list("source_list"),
        list("note_list"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static PERSON_V15: Shape = Shape {
    id: "person.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        int("gender"),
        list("primary_name"),
        list("alternate_names"),
        list("event_ref_list"),
        list("family_list"),
        list("parent_family_list"),
        list("media_list"),
        list("address_list"),
        list("attribute_list"),
        list("urls"),
        list("source_list"),
        list("note_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

const PERSON_CITED: &[Field] = &[
    text("handle"),
    text("gramps_id"),
    int("gender"),
    list("primary_name"),
    list("alternate_names"),
    list("event_ref_list"),
    list("family_list"),
    list("parent_family_list"),
    list("media_list"),
    list("address_list"),
    list("attribute_list"),
    list("urls"),
    list("citation_list"),
    list("note_list"),
    int("change"),
    list("tag_list"),
    boolean("private"),
];

static PERSON_V16: Shape = Shape {
    id: "person.v16",
    fields: PERSON_CITED,
};

// Same fields as v16; event references carry a citation list.
static PERSON_V20: Shape = Shape {
    id: "person.v20",
    fields: PERSON_CITED,
};

// Family

static FAMILY_V14: Shape = Shape {
    id: "family.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        any("father_handle"),
        any("mother_handle"),
        list("child_ref_list"),
        list("family_type"),
        list("event_ref_list"),
        list("media_list"),
        list("attribute_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static FAMILY_V15: Shape = Shape {
    id: "family.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        any("father_handle"),
        any("mother_handle"),
        list("child_ref_list"),
        list("family_type"),
        list("event_ref_list"),
        list("media_list"),
        list("attribute_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

const FAMILY_CITED: &[Field] = &[
    text("handle"),
    text("gramps_id"),
    any("father_handle"),
    any("mother_handle"),
    list("child_ref_list"),
    list("family_type"),
    list("event_ref_list"),
    list("media_list"),
    list("attribute_list"),
    list("citation_list"),
    list("note_list"),
    int("change"),
    list("tag_list"),
    boolean("private"),
];

static FAMILY_V16: Shape = Shape {
    id: "family.v16",
    fields: FAMILY_CITED,
};

static FAMILY_V20: Shape = Shape {
    id: "family.v20",
    fields: FAMILY_CITED,
};

// Event

static EVENT_V14: Shape = Shape {
    id: "event.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("event_type"),
        any("date"),
        text("description"),
        text("place"),
        list("source_list"),
        list("note_list"),
        list("media_list"),
        list("attribute_list"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static EVENT_V15: Shape = Shape {
    id: "event.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("event_type"),
        any("date"),
        text("description"),
        text("place"),
        list("source_list"),
        list("note_list"),
        list("media_list"),
        list("attribute_list"),
        int("change"),
        boolean("private"),
    ],
};

static EVENT_V16: Shape = Shape {
    id: "event.v16",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("event_type"),
        any("date"),
        text("description"),
        text("place"),
        list("citation_list"),
        list("note_list"),
        list("media_list"),
        list("attribute_list"),
        int("change"),
        boolean("private"),
    ],
};

static EVENT_V17: Shape = Shape {
    id: "event.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("event_type"),
        any("date"),
        text("description"),
        text("place"),
        list("citation_list"),
        list("note_list"),
        list("media_list"),
        list("attribute_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Place

static PLACE_V14: Shape = Shape {
    id: "place.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("long"),
        text("lat"),
        any("main_loc"),
        list("alt_loc"),
        list("urls"),
        list("media_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static PLACE_V15: Shape = Shape {
    id: "place.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("long"),
        text("lat"),
        any("main_loc"),
        list("alt_loc"),
        list("urls"),
        list("media_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        boolean("private"),
    ],
};

static PLACE_V16: Shape = Shape {
    id: "place.v16",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("long"),
        text("lat"),
        any("main_loc"),
        list("alt_loc"),
        list("urls"),
        list("media_list"),
        list("citation_list"),
        list("note_list"),
        int("change"),
        boolean("private"),
    ],
};

static PLACE_V17: Shape = Shape {
    id: "place.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("long"),
        text("lat"),
        list("placeref_list"),
        text("name"),
        list("alt_names"),
        list("place_type"),
        text("code"),
        list("alt_loc"),
        list("urls"),
        list("media_list"),
        list("citation_list"),
        list("note_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

static PLACE_V18: Shape = Shape {
    id: "place.v18",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("long"),
        text("lat"),
        list("placeref_list"),
        list("name"),
        list("alt_names"),
        list("place_type"),
        text("code"),
        list("alt_loc"),
        list("urls"),
        list("media_list"),
        list("citation_list"),
        list("note_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Media

static MEDIA_V14: Shape = Shape {
    id: "media.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("path"),
        text("mime"),
        text("desc"),
        list("attribute_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        any("date"),
        list("marker"),
        boolean("private"),
    ],
};

static MEDIA_V15: Shape = Shape {
    id: "media.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("path"),
        text("mime"),
        text("desc"),
        list("attribute_list"),
        list("source_list"),
        list("note_list"),
        int("change"),
        any("date"),
        list("tag_list"),
        boolean("private"),
    ],
};

static MEDIA_V16: Shape = Shape {
    id: "media.v16",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("path"),
        text("mime"),
        text("desc"),
        list("attribute_list"),
        list("citation_list"),
        list("note_list"),
        int("change"),
        any("date"),
        list("tag_list"),
        boolean("private"),
    ],
};

static MEDIA_V17: Shape = Shape {
    id: "media.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("path"),
        text("mime"),
        text("desc"),
        text("checksum"),
        list("attribute_list"),
        list("citation_list"),
        list("note_list"),
        int("change"),
        any("date"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Repository

static REPOSITORY_V14: Shape = Shape {
    id: "repository.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("repo_type"),
        text("name"),
        list("note_list"),
        list("address_list"),
        list("urls"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static REPOSITORY_V15: Shape = Shape {
    id: "repository.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("repo_type"),
        text("name"),
        list("note_list"),
        list("address_list"),
        list("urls"),
        int("change"),
        boolean("private"),
    ],
};

static REPOSITORY_V17: Shape = Shape {
    id: "repository.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        list("repo_type"),
        text("name"),
        list("note_list"),
        list("address_list"),
        list("urls"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Note

static NOTE_V14: Shape = Shape {
    id: "note.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("text"),
        int("format"),
        list("note_type"),
        int("change"),
        list("marker"),
        boolean("private"),
    ],
};

static NOTE_V15: Shape = Shape {
    id: "note.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("text"),
        int("format"),
        list("note_type"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Source

static SOURCE_V14: Shape = Shape {
    id: "source.v14",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("author"),
        text("pubinfo"),
        list("note_list"),
        list("media_list"),
        text("abbrev"),
        int("change"),
        list("datamap"),
        list("reporef_list"),
        list("marker"),
        boolean("private"),
    ],
};

static SOURCE_V15: Shape = Shape {
    id: "source.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("author"),
        text("pubinfo"),
        list("note_list"),
        list("media_list"),
        text("abbrev"),
        int("change"),
        list("datamap"),
        list("reporef_list"),
        boolean("private"),
    ],
};

static SOURCE_V17: Shape = Shape {
    id: "source.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("title"),
        text("author"),
        text("pubinfo"),
        list("note_list"),
        list("media_list"),
        text("abbrev"),
        int("change"),
        list("attribute_list"),
        list("reporef_list"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Citation

static CITATION_V16: Shape = Shape {
    id: "citation.v16",
    fields: &[
        text("handle"),
        text("gramps_id"),
        any("date"),
        text("page"),
        int("confidence"),
        text("source_handle"),
        list("note_list"),
        list("media_list"),
        list("datamap"),
        int("change"),
        boolean("private"),
    ],
};

static CITATION_V17: Shape = Shape {
    id: "citation.v17",
    fields: &[
        text("handle"),
        text("gramps_id"),
        any("date"),
        text("page"),
        int("confidence"),
        text("source_handle"),
        list("note_list"),
        list("media_list"),
        list("attribute_list"),
        int("change"),
        list("tag_list"),
        boolean("private"),
    ],
};

// Tag

static TAG_V15: Shape = Shape {
    id: "tag.v15",
    fields: &[
        text("handle"),
        text("gramps_id"),
        text("name"),
        text("color"),
        int("priority"),
        int("change"),
    ],
};

/// One row of the version table: `shape` applies to `first..=last`.
struct Range {
    object_type: ObjectType,
    first: u16,
    last: u16,
    shape: &'static Shape,
}

const fn range(object_type: ObjectType, first: u16, last: u16, shape: &'static Shape) -> Range {
    Range {
        object_type,
        first,
        last,
        shape,
    }
}

static TABLE: &[Range] = &[
    range(ObjectType::Person, 14, 14, &PERSON_V14),
    range(ObjectType::Person, 15, 15, &PERSON_V15),
    range(ObjectType::Person, 16, 19, &PERSON_V16),
    range(ObjectType::Person, 20, 20, &PERSON_V20),
    range(ObjectType::Family, 14, 14, &FAMILY_V14),
    range(ObjectType::Family, 15, 15, &FAMILY_V15),
    range(ObjectType::Family, 16, 19, &FAMILY_V16),
    range(ObjectType::Family, 20, 20, &FAMILY_V20),
    range(ObjectType::Event, 14, 14, &EVENT_V14),
    range(ObjectType::Event, 15, 15, &EVENT_V15),
    range(ObjectType::Event, 16, 16, &EVENT_V16),
    range(ObjectType::Event, 17, 20, &EVENT_V17),
    range(ObjectType::Place, 14, 14, &PLACE_V14),
    range(ObjectType::Place, 15, 15, &PLACE_V15),
    range(ObjectType::Place, 16, 16, &PLACE_V16),
    range(ObjectType::Place, 17, 17, &PLACE_V17),
    range(ObjectType::Place, 18, 20, &PLACE_V18),
    range(ObjectType::Media, 14, 14, &MEDIA_V14),
    range(ObjectType::Media, 15, 15, &MEDIA_V15),
    range(ObjectType::Media, 16, 16, &MEDIA_V16),
    range(ObjectType::Media, 17, 20, &MEDIA_V17),
    range(ObjectType::Repository, 14, 14, &REPOSITORY_V14),
    range(ObjectType::Repository, 15, 16, &REPOSITORY_V15),
    range(ObjectType::Repository, 17, 20, &REPOSITORY_V17),
    range(ObjectType::Note, 14, 14, &NOTE_V14),
    range(ObjectType::Note, 15, 20, &NOTE_V15),
    range(ObjectType::Source, 14, 14, &SOURCE_V14),
    range(ObjectType::Source, 15, 16, &SOURCE_V15),
    range(ObjectType::Source, 17, 20, &SOURCE_V17),
    range(ObjectType::Citation, 16, 16, &CITATION_V16),
    range(ObjectType::Citation, 17, 20, &CITATION_V17),
    range(ObjectType::Tag, 15, 20, &TAG_V15),
];

/// Resolves the shape of `object_type` records at `version`.
///
/// Returns `None` when the type did not exist at that version or the
/// version is outside the supported range.
#[must_use]
pub fn shape_for(object_type: ObjectType, version: u16) -> Option<&'static Shape> {
    TABLE
        .iter()
        .find(|r| r.object_type == object_type && (r.first..=r.last).contains(&version))
        .map(|r| r.shape)
}

/// Shape written by this build.
#[must_use]
pub fn current_shape(object_type: ObjectType) -> &'static Shape {
    match shape_for(object_type, crate::types::CURRENT_SCHEMA_VERSION) {
        Some(shape) => shape,
        None => unreachable!("every object type has a current shape"),
    }
}

/// Whether records of `object_type` at `a` and `b` share a layout.
#[must_use]
pub fn same_layout(object_type: ObjectType, a: u16, b: u16) -> bool {
    match (shape_for(object_type, a), shape_for(object_type, b)) {
        (Some(x), Some(y)) => x.id == y.id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CURRENT_SCHEMA_VERSION, MIN_SCHEMA_VERSION};

    #[test]
    fn every_type_has_a_current_shape() {
        for t in ObjectType::ALL {
            let shape = current_shape(t);
            assert_eq!(shape.fields[0].name, "handle");
            assert_eq!(shape.fields[1].name, "gramps_id");
            assert!(shape.index_of("change").is_some());
        }
    }

    #[test]
    fn ranges_do_not_overlap() {
        for t in ObjectType::ALL {
            for v in MIN_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION {
                let hits = TABLE
                    .iter()
                    .filter(|r| r.object_type == t && (r.first..=r.last).contains(&v))
                    .count();
                assert!(hits <= 1, "{t} v{v} has {hits} shapes");
            }
        }
    }

    #[test]
    fn types_added_later_have_no_old_shape() {
        assert!(shape_for(ObjectType::Citation, 15).is_none());
        assert!(shape_for(ObjectType::Tag, 14).is_none());
        assert!(shape_for(ObjectType::Person, 13).is_none());
        assert!(shape_for(ObjectType::Person, 21).is_none());
    }

    #[test]
    fn layouts_shared_across_versions() {
        assert!(same_layout(ObjectType::Note, 15, 20));
        assert!(same_layout(ObjectType::Person, 16, 19));
        assert!(!same_layout(ObjectType::Person, 19, 20));
    }

    #[test]
    fn length_window() {
        let shape = current_shape(ObjectType::Note);
        assert!(shape.accepts_len(8));
        assert!(shape.accepts_len(7));
        assert!(!shape.accepts_len(6));
        assert!(!shape.accepts_len(9));
    }

    #[test]
    fn kinds() {
        assert!(FieldKind::Text.accepts(&Value::from("x")));
        assert!(!FieldKind::Text.accepts(&Value::Null));
        assert!(FieldKind::Any.accepts(&Value::Null));
        assert_eq!(FieldKind::List.default_value(), Value::empty_list());
    }
}
