//! 15 -> 16: inline source references become citation objects.
//!
//! Every `[date, private, note_list, confidence, source, page]` entry of a
//! primary object's `source_list` is lifted into a new citation, and the
//! field is replaced by the list of citation handles.
//!
//! Secondary tuples carried their own source lists at version 15 and lose
//! them here. Their references become citations too, appended to the owning
//! object's `citation_list` after its own. Repositories have no citation
//! list, so an address of a repository that still cites a source stops the
//! upgrade.

use super::{take, UpgradeContext, UpgradeStep};
use crate::error::StoreResult;
use crate::types::{now_timestamp, Handle, ObjectType};
use gendb_codec::Value;

pub(super) struct SourcesToCitations;

/// A version 15 secondary tuple that may cite sources.
#[derive(Debug, Clone, Copy)]
enum Nested {
    /// `[private, source_list, type, value]`
    Attribute,
    /// `[private, source_list, note_list, media, rect]`
    MediaRef,
    /// `[private, source_list, note_list, child, father_rel, mother_rel]`
    ChildRef,
    /// `[private, source_list, date, location]`
    Address,
    /// `[private, note_list, attribute_list, event, role]`; only its
    /// attributes cite.
    EventRef,
}

impl Nested {
    const fn len(self) -> usize {
        match self {
            Nested::Attribute | Nested::Address => 4,
            Nested::MediaRef | Nested::EventRef => 5,
            Nested::ChildRef => 6,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Nested::Attribute => "attribute",
            Nested::MediaRef => "media reference",
            Nested::ChildRef => "child reference",
            Nested::Address => "address",
            Nested::EventRef => "event reference",
        }
    }
}

/// Where a version 15 object keeps its sources: its own `source_list`
/// index, if any, and its lists of citing secondary tuples.
struct Layout {
    object_type: ObjectType,
    source_list: Option<usize>,
    nested: &'static [(usize, Nested)],
}

const LAYOUTS: [Layout; 6] = [
    Layout {
        object_type: ObjectType::Person,
        source_list: Some(12),
        nested: &[
            (5, Nested::EventRef),
            (8, Nested::MediaRef),
            (9, Nested::Address),
            (10, Nested::Attribute),
        ],
    },
    Layout {
        object_type: ObjectType::Family,
        source_list: Some(9),
        nested: &[
            (4, Nested::ChildRef),
            (6, Nested::EventRef),
            (7, Nested::MediaRef),
            (8, Nested::Attribute),
        ],
    },
    Layout {
        object_type: ObjectType::Event,
        source_list: Some(6),
        nested: &[(8, Nested::MediaRef), (9, Nested::Attribute)],
    },
    Layout {
        object_type: ObjectType::Place,
        source_list: Some(9),
        nested: &[(8, Nested::MediaRef)],
    },
    Layout {
        object_type: ObjectType::Media,
        source_list: Some(6),
        nested: &[(5, Nested::Attribute)],
    },
    Layout {
        object_type: ObjectType::Repository,
        source_list: None,
        nested: &[(5, Nested::Address)],
    },
];

impl UpgradeStep for SourcesToCitations {
    fn version(&self) -> u16 {
        16
    }

    fn name(&self) -> &str {
        "source references to citations"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[
            ObjectType::Person,
            ObjectType::Family,
            ObjectType::Event,
            ObjectType::Place,
            ObjectType::Media,
            ObjectType::Repository,
            ObjectType::Citation,
        ]
    }

    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        let mut lifter = Lifter {
            next_id: ctx.count(ObjectType::Citation)?,
        };
        for layout in &LAYOUTS {
            ctx.for_each_pending(layout.object_type, |ctx, fields| {
                lifter.convert(ctx, layout, fields)
            })?;
        }
        Ok(())
    }
}

struct Lifter {
    next_id: u64,
}

impl Lifter {
    fn convert(
        &mut self,
        ctx: &mut UpgradeContext<'_>,
        layout: &Layout,
        mut fields: Vec<Value>,
    ) -> StoreResult<Vec<Value>> {
        let mut citations = Vec::new();
        if let Some(index) = layout.source_list {
            let refs = ctx.array(take(&mut fields, index), "source_list")?;
            self.lift_all(ctx, refs, &mut citations)?;
        }
        for &(index, nested) in layout.nested {
            let items = ctx.array(take(&mut fields, index), nested.name())?;
            let converted = items
                .into_iter()
                .map(|item| self.strip(ctx, nested, item, &mut citations))
                .collect::<StoreResult<Vec<_>>>()?;
            fields[index] = Value::Array(converted);
        }
        match layout.source_list {
            Some(index) => fields[index] = Value::Array(citations),
            None if !citations.is_empty() => {
                return Err(ctx.fail(format!(
                    "{} {} has addresses citing sources and no citation list",
                    layout.object_type,
                    fields[1].as_text().unwrap_or_default()
                )));
            }
            None => {}
        }
        Ok(fields)
    }

    /// Drops the source list of one secondary tuple, collecting citations
    /// for its references.
    fn strip(
        &mut self,
        ctx: &mut UpgradeContext<'_>,
        nested: Nested,
        item: Value,
        citations: &mut Vec<Value>,
    ) -> StoreResult<Value> {
        let mut parts = ctx.array(item, nested.name())?;
        if parts.len() != nested.len() {
            return Err(ctx.fail(format!(
                "{} has {} fields, expected {}",
                nested.name(),
                parts.len(),
                nested.len()
            )));
        }
        if let Nested::EventRef = nested {
            let attributes = ctx.array(take(&mut parts, 2), "event reference attributes")?;
            parts[2] = Value::Array(
                attributes
                    .into_iter()
                    .map(|a| self.strip(ctx, Nested::Attribute, a, citations))
                    .collect::<StoreResult<_>>()?,
            );
        } else {
            let refs = ctx.array(parts.remove(1), "source_list")?;
            self.lift_all(ctx, refs, citations)?;
        }
        Ok(Value::Array(parts))
    }

    fn lift_all(
        &mut self,
        ctx: &mut UpgradeContext<'_>,
        refs: Vec<Value>,
        citations: &mut Vec<Value>,
    ) -> StoreResult<()> {
        for source_ref in refs {
            citations.push(Value::from(make_citation(ctx, source_ref, self.next_id)?));
            self.next_id += 1;
        }
        Ok(())
    }
}

fn make_citation(ctx: &mut UpgradeContext<'_>, source_ref: Value, n: u64) -> StoreResult<Handle> {
    let parts = ctx.array(source_ref, "source reference")?;
    let Ok([date, private, note_list, confidence, source, page]) = <[Value; 6]>::try_from(parts) else {
        return Err(ctx.fail("source reference is not a 6-field tuple"));
    };
    let handle = Handle::generate();
    ctx.commit(
        ObjectType::Citation,
        vec![
            Value::from(&handle),
            Value::from(ObjectType::Citation.format_gramps_id(n)),
            date,
            page,
            confidence,
            source,
            note_list,
            Value::empty_list(),
            Value::empty_list(),
            Value::Integer(now_timestamp()),
            private,
        ],
    )?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::codec::RawRecord;
    use crate::config::Config;
    use crate::error::StoreError;
    use crate::store::ObjectStore;

    #[test]
    fn each_reference_gets_its_own_citation() {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        let family = vec![
            t("f1"),
            t("F0001"),
            Value::Null,
            Value::Null,
            empty(),
            coded(0),
            empty(),
            empty(),
            empty(),
            list(vec![source_ref("s1", "a"), source_ref("s1", "b")]),
            empty(),
            Value::Integer(1_000),
            empty(),
            Value::Bool(false),
        ];
        store
            .batch_transaction("seed", |s, txn| {
                s.commit_raw(&RawRecord::new(ObjectType::Family, 15, family), txn)
            })
            .unwrap();
        store.set_schema_version(15).unwrap();

        let chain = super::super::UpgradeChain::standard();
        chain.run(&mut store, 15).unwrap();

        assert_eq!(store.get_number_of_citations().unwrap(), 2);
        let family = store.get_family(&Handle::new("f1")).unwrap().unwrap();
        assert_eq!(family.citation_list.len(), 2);
        let pages: Vec<String> = family
            .citation_list
            .iter()
            .map(|h| store.get_citation(h).unwrap().unwrap().page)
            .collect();
        assert_eq!(pages, ["a", "b"]);
    }

    #[test]
    fn nested_references_join_the_owner() {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        let attribute = |page: &str| {
            list(vec![
                Value::Bool(false),
                list(vec![source_ref("s1", page)]),
                t("Nickname"),
                t("Jack"),
            ])
        };
        let child = list(vec![
            Value::Bool(false),
            list(vec![source_ref("s1", "child")]),
            empty(),
            t("p1"),
            coded(1),
            coded(1),
        ]);
        let event = list(vec![
            Value::Bool(false),
            empty(),
            list(vec![attribute("event")]),
            t("e1"),
            coded(1),
        ]);
        let family = vec![
            t("f1"),
            t("F0001"),
            Value::Null,
            Value::Null,
            list(vec![child]),
            coded(0),
            list(vec![event]),
            empty(),
            list(vec![attribute("attr")]),
            list(vec![source_ref("s1", "own")]),
            empty(),
            Value::Integer(1_000),
            empty(),
            Value::Bool(false),
        ];
        store
            .batch_transaction("seed", |s, txn| {
                s.commit_raw(&RawRecord::new(ObjectType::Family, 15, family), txn)
            })
            .unwrap();
        store.set_schema_version(15).unwrap();

        super::super::UpgradeChain::standard().run(&mut store, 15).unwrap();

        let family = store.get_family(&Handle::new("f1")).unwrap().unwrap();
        let pages: Vec<String> = family
            .citation_list
            .iter()
            .map(|h| store.get_citation(h).unwrap().unwrap().page)
            .collect();
        assert_eq!(pages, ["own", "child", "event", "attr"]);
        assert_eq!(family.child_ref_list[0].child, Handle::new("p1"));
        assert_eq!(family.attribute_list[0].value, "Jack");
        assert_eq!(family.event_ref_list[0].attribute_list[0].value, "Jack");
        let ids: Vec<String> = family
            .citation_list
            .iter()
            .map(|h| store.get_citation(h).unwrap().unwrap().gramps_id)
            .collect();
        assert_eq!(ids, ["C0000", "C0001", "C0002", "C0003"]);
    }

    #[test]
    fn cited_repository_address_stops_the_upgrade() {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        let address = list(vec![
            Value::Bool(false),
            list(vec![source_ref("s1", "p. 1")]),
            Value::Null,
            empty(),
        ]);
        let repository = vec![
            t("r1"),
            t("R0001"),
            coded(1),
            t("Archive"),
            empty(),
            list(vec![address]),
            empty(),
            Value::Integer(1_000),
            Value::Bool(false),
        ];
        store
            .batch_transaction("seed", |s, txn| {
                s.commit_raw(&RawRecord::new(ObjectType::Repository, 15, repository), txn)
            })
            .unwrap();
        store.set_schema_version(15).unwrap();

        let err = super::super::UpgradeChain::standard().run(&mut store, 15).unwrap_err();
        assert!(matches!(err, StoreError::UpgradeFailed { version: 16, .. }), "{err}");
        assert_eq!(store.get_number_of_citations().unwrap(), 0);
        assert_eq!(store.schema_version(), 15);
    }
}
