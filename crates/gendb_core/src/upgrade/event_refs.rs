//! 19 -> 20: event references carry their own citations.
//!
//! `[private, note_list, attribute_list, event, role]` becomes
//! `[private, citation_list, note_list, attribute_list, event, role]` in
//! person and family event reference lists.

use super::{insert, take, UpgradeContext, UpgradeStep};
use crate::error::StoreResult;
use crate::types::ObjectType;
use gendb_codec::Value;

pub(super) struct EventRefCitations;

/// Index of `event_ref_list` at version 19.
const EVENT_REF_LISTS: [(ObjectType, usize); 2] = [(ObjectType::Person, 5), (ObjectType::Family, 6)];

impl UpgradeStep for EventRefCitations {
    fn version(&self) -> u16 {
        20
    }

    fn name(&self) -> &str {
        "event reference citations"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[ObjectType::Person, ObjectType::Family]
    }

    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        for (object_type, index) in EVENT_REF_LISTS {
            ctx.for_each_pending(object_type, |ctx, mut f| {
                let refs = ctx.array(take(&mut f, index), "event_ref_list")?;
                let mut converted = Vec::with_capacity(refs.len());
                for event_ref in refs {
                    let mut event_ref = ctx.array(event_ref, "event reference")?;
                    if event_ref.len() != 5 {
                        return Err(ctx.fail(format!(
                            "event reference has {} fields, expected 5",
                            event_ref.len()
                        )));
                    }
                    insert(&mut event_ref, 1, Value::empty_list());
                    converted.push(Value::Array(event_ref));
                }
                f[index] = Value::Array(converted);
                Ok(f)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::super::UpgradeChain;
    use super::*;
    use crate::codec::RawRecord;
    use crate::config::Config;
    use crate::error::StoreError;
    use crate::store::ObjectStore;
    use crate::types::Handle;

    fn v19_person(events: Vec<Value>) -> Vec<Value> {
        person("p1", empty(), Vec::new(), events)
    }

    fn store_with(fields: Vec<Value>) -> ObjectStore {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        store
            .batch_transaction("seed", |s, txn| {
                s.commit_raw(&RawRecord::new(ObjectType::Person, 19, fields), txn)
            })
            .unwrap();
        store.set_schema_version(19).unwrap();
        store
    }

    #[test]
    fn references_gain_an_empty_citation_list() {
        let mut store = store_with(v19_person(vec![event_ref("e1"), event_ref("e2")]));
        UpgradeChain::standard().run(&mut store, 19).unwrap();
        let person = store.get_person(&Handle::new("p1")).unwrap().unwrap();
        let events: Vec<_> = person.event_ref_list.iter().map(|r| r.event.as_str()).collect();
        assert_eq!(events, ["e1", "e2"]);
        assert!(person.event_ref_list.iter().all(|r| r.citation_list.is_empty()));
    }

    #[test]
    fn malformed_reference_is_refused() {
        let mut store = store_with(v19_person(vec![list(vec![t("e1")])]));
        let err = UpgradeChain::standard().run(&mut store, 19).unwrap_err();
        assert!(matches!(err, StoreError::UpgradeFailed { version: 20, .. }), "{err}");
        assert_eq!(store.schema_version(), 19);
    }
}
