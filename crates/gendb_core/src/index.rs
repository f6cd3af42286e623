//! Derived in-memory indexes.
//!
//! Nothing here is persisted. The store keeps both indexes in step with
//! every commit and rebuilds them from storage on open, after upgrades and
//! on [`request_rebuild`](crate::ObjectStore::request_rebuild).

use crate::types::{Handle, ObjectType};
use std::collections::{BTreeSet, HashMap};

/// Who references whom.
///
/// `forward` holds each object's outgoing references, `backward` the
/// inverse. Targets need not exist; dangling references are indexed too.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    forward: HashMap<Handle, (ObjectType, Vec<Handle>)>,
    backward: HashMap<Handle, BTreeSet<(ObjectType, Handle)>>,
}

impl ReferenceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the outgoing references of `handle`.
    pub fn update(&mut self, object_type: ObjectType, handle: &Handle, targets: Vec<Handle>) {
        self.remove(handle);
        for target in &targets {
            self.backward
                .entry(target.clone())
                .or_default()
                .insert((object_type, handle.clone()));
        }
        self.forward.insert(handle.clone(), (object_type, targets));
    }

    /// Forgets the outgoing references of `handle`.
    pub fn remove(&mut self, handle: &Handle) {
        let Some((object_type, targets)) = self.forward.remove(handle) else {
            return;
        };
        for target in targets {
            if let Some(sources) = self.backward.get_mut(&target) {
                sources.remove(&(object_type, handle.clone()));
                if sources.is_empty() {
                    self.backward.remove(&target);
                }
            }
        }
    }

    /// Objects referencing `handle`, ordered by type then handle.
    #[must_use]
    pub fn backlinks(&self, handle: &Handle) -> Vec<(ObjectType, Handle)> {
        self.backward
            .get(handle)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outgoing references of `handle`.
    #[must_use]
    pub fn references(&self, handle: &Handle) -> &[Handle] {
        self.forward.get(handle).map_or(&[], |(_, t)| t.as_slice())
    }

    /// Number of indexed source objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Empties the index.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.backward.clear();
    }
}

/// Per-type lookup from gramps ID to handle, plus ID allocation.
#[derive(Debug, Default)]
pub struct GrampsIdIndex {
    by_id: HashMap<ObjectType, HashMap<String, Handle>>,
    by_handle: HashMap<(ObjectType, Handle), String>,
    counters: HashMap<ObjectType, u64>,
}

impl GrampsIdIndex {
    /// Creates an empty index with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `handle` carries `gramps_id`.
    pub fn set(&mut self, object_type: ObjectType, handle: &Handle, gramps_id: &str) {
        self.remove(object_type, handle);
        if gramps_id.is_empty() {
            return;
        }
        self.by_id
            .entry(object_type)
            .or_default()
            .insert(gramps_id.to_string(), handle.clone());
        self.by_handle
            .insert((object_type, handle.clone()), gramps_id.to_string());
    }

    /// Forgets the ID of `handle`.
    pub fn remove(&mut self, object_type: ObjectType, handle: &Handle) {
        let Some(old) = self.by_handle.remove(&(object_type, handle.clone())) else {
            return;
        };
        if let Some(ids) = self.by_id.get_mut(&object_type) {
            if ids.get(&old) == Some(handle) {
                ids.remove(&old);
            }
        }
    }

    /// Handle carrying `gramps_id`.
    #[must_use]
    pub fn lookup(&self, object_type: ObjectType, gramps_id: &str) -> Option<&Handle> {
        self.by_id.get(&object_type)?.get(gramps_id)
    }

    /// Whether some object of `object_type` carries `gramps_id`.
    #[must_use]
    pub fn contains(&self, object_type: ObjectType, gramps_id: &str) -> bool {
        self.lookup(object_type, gramps_id).is_some()
    }

    /// Allocates the next unused ID, such as `I0003`, and advances the counter.
    pub fn next_id(&mut self, object_type: ObjectType) -> String {
        let counter = self.counters.entry(object_type).or_insert(0);
        loop {
            let candidate = object_type.format_gramps_id(*counter);
            *counter += 1;
            let taken = self
                .by_id
                .get(&object_type)
                .is_some_and(|ids| ids.contains_key(&candidate));
            if !taken {
                return candidate;
            }
        }
    }

    /// Current counter for `object_type`.
    #[must_use]
    pub fn counter(&self, object_type: ObjectType) -> u64 {
        self.counters.get(&object_type).copied().unwrap_or(0)
    }

    /// Restores a persisted counter.
    pub fn set_counter(&mut self, object_type: ObjectType, value: u64) {
        self.counters.insert(object_type, value);
    }

    /// Number of IDs indexed for `object_type`.
    #[must_use]
    pub fn count(&self, object_type: ObjectType) -> usize {
        self.by_id.get(&object_type).map_or(0, HashMap::len)
    }

    /// Empties the lookup tables; counters are kept.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_handle.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(s: &str) -> Handle {
        Handle::new(s)
    }

    #[test]
    fn backlinks_follow_updates() {
        let mut index = ReferenceIndex::new();
        index.update(ObjectType::Family, &h("f1"), vec![h("p1"), h("p2")]);
        index.update(ObjectType::Event, &h("e1"), vec![h("p1")]);
        assert_eq!(
            index.backlinks(&h("p1")),
            vec![(ObjectType::Family, h("f1")), (ObjectType::Event, h("e1"))]
        );

        index.update(ObjectType::Family, &h("f1"), vec![h("p2")]);
        assert_eq!(index.backlinks(&h("p1")), vec![(ObjectType::Event, h("e1"))]);

        index.remove(&h("e1"));
        assert!(index.backlinks(&h("p1")).is_empty());
        assert_eq!(index.references(&h("f1")), &[h("p2")]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn gramps_ids_skip_taken_values() {
        let mut ids = GrampsIdIndex::new();
        ids.set(ObjectType::Person, &h("a"), "I0000");
        ids.set(ObjectType::Person, &h("b"), "I0001");
        assert_eq!(ids.next_id(ObjectType::Person), "I0002");
        assert_eq!(ids.next_id(ObjectType::Person), "I0003");
        assert_eq!(ids.next_id(ObjectType::Family), "F0000");
        assert_eq!(ids.counter(ObjectType::Person), 4);
    }

    #[test]
    fn renumbering_moves_the_lookup() {
        let mut ids = GrampsIdIndex::new();
        ids.set(ObjectType::Note, &h("n"), "N0001");
        ids.set(ObjectType::Note, &h("n"), "N0009");
        assert!(!ids.contains(ObjectType::Note, "N0001"));
        assert_eq!(ids.lookup(ObjectType::Note, "N0009"), Some(&h("n")));
        assert!(!ids.contains(ObjectType::Person, "N0009"));

        ids.remove(ObjectType::Note, &h("n"));
        assert_eq!(ids.count(ObjectType::Note), 0);
    }
}
