//! Schema upgrade chain.
//!
//! Each [`UpgradeStep`] lifts stored records from one schema version to the
//! next. Steps work on raw tuples, since typed objects only understand the
//! current layout. A step runs in one batch transaction and the version bump
//! follows in a second one, so a crash in between re-runs the step on the
//! next open. Records already stamped with the step's version are skipped,
//! which makes that re-run harmless.
//!
//! ## Usage
//!
//! ```ignore
//! let chain = UpgradeChain::standard();
//! let report = chain.run(&mut store, 16)?;
//! assert_eq!(report.to, CURRENT_SCHEMA_VERSION);
//! ```

mod citations;
mod event_refs;
mod hierarchy;
mod markers;
mod place_names;

use crate::codec::{same_layout, RawRecord};
use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;
use crate::txn::DbTxn;
use crate::types::{Handle, ObjectType, CURRENT_SCHEMA_VERSION, MIN_SCHEMA_VERSION};
use gendb_codec::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// One `V-1 -> V` transformation.
pub trait UpgradeStep: Send + Sync {
    /// Version this step produces.
    fn version(&self) -> u16;

    /// Short description, also used as the transaction message.
    fn name(&self) -> &str;

    /// Object types the step reads or writes, for progress counts.
    fn touched(&self) -> &'static [ObjectType];

    /// Rewrites every pending record.
    ///
    /// # Errors
    ///
    /// Returns an error on any tuple the step does not recognise.
    fn run(&self, ctx: &mut UpgradeContext<'_>) -> StoreResult<()>;
}

/// Outcome of one applied step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Version produced.
    pub version: u16,
    /// Step name.
    pub name: String,
    /// Objects of the touched types before the step.
    pub total: u64,
    /// Records written (rewritten or created).
    pub written: u64,
}

/// Outcome of a chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Version before the run.
    pub from: u16,
    /// Version after the run.
    pub to: u16,
    /// Applied steps, in order.
    pub steps: Vec<StepReport>,
}

/// Raw record access handed to a running step.
pub struct UpgradeContext<'a> {
    store: &'a mut ObjectStore,
    txn: &'a mut DbTxn,
    version: u16,
    path: PathBuf,
    written: u64,
}

impl<'a> UpgradeContext<'a> {
    fn new(store: &'a mut ObjectStore, txn: &'a mut DbTxn, version: u16, path: PathBuf) -> Self {
        Self {
            store,
            txn,
            version,
            path,
            written: 0,
        }
    }

    /// Version being produced.
    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Upgrade failure for this step.
    pub fn fail(&self, message: impl Into<String>) -> StoreError {
        StoreError::upgrade_failed(self.version, &self.path, message)
    }

    /// Snapshot of every handle of `object_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn handles(&self, object_type: ObjectType) -> StoreResult<Vec<Handle>> {
        self.store.raw_handles(object_type)
    }

    /// Number of stored objects of `object_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be counted.
    pub fn count(&self, object_type: ObjectType) -> StoreResult<u64> {
        self.store.count(object_type)
    }

    /// Stored record at whatever version it carries.
    ///
    /// # Errors
    ///
    /// Returns an error if the record matches no known shape.
    pub fn get(&self, object_type: ObjectType, handle: &Handle) -> StoreResult<Option<RawRecord>> {
        self.store.get_raw(object_type, handle)
    }

    /// Fields of `handle` if it still needs this step.
    ///
    /// Returns `None` for missing records and records already at this
    /// version. The fields are padded to the full previous-version shape.
    ///
    /// # Errors
    ///
    /// Fails if the record is older than the previous layout.
    pub fn pending(&self, object_type: ObjectType, handle: &Handle) -> StoreResult<Option<Vec<Value>>> {
        let Some(raw) = self.get(object_type, handle)? else {
            return Ok(None);
        };
        if raw.version >= self.version {
            return Ok(None);
        }
        if !same_layout(object_type, raw.version, self.version - 1) {
            return Err(self.fail(format!(
                "{object_type} {handle} is stored at schema version {}, expected {}",
                raw.version,
                self.version - 1
            )));
        }
        Ok(Some(raw.fields))
    }

    /// Writes `fields` as a record of `object_type` at this step's version.
    ///
    /// # Errors
    ///
    /// Fails if the fields do not fit the new layout.
    pub fn commit(&mut self, object_type: ObjectType, fields: Vec<Value>) -> StoreResult<()> {
        let raw = RawRecord::new(object_type, self.version, fields);
        self.store.commit_raw(&raw, self.txn)?;
        self.written += 1;
        Ok(())
    }

    /// Rewrites every pending record of `object_type` through `f`.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f` or the write.
    pub fn for_each_pending<F>(&mut self, object_type: ObjectType, mut f: F) -> StoreResult<u64>
    where
        F: FnMut(&mut Self, Vec<Value>) -> StoreResult<Vec<Value>>,
    {
        let mut rewritten = 0;
        for handle in self.handles(object_type)? {
            if let Some(fields) = self.pending(object_type, &handle)? {
                let fields = f(self, fields)?;
                self.commit(object_type, fields)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    /// Metadata value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata table cannot be read.
    pub fn metadata(&self, key: &str) -> StoreResult<Option<Value>> {
        self.store.get_metadata(key)
    }

    /// Elements of an array value, or a failure naming `what`.
    ///
    /// # Errors
    ///
    /// Fails if `value` is not an array.
    pub fn array(&self, value: Value, what: &str) -> StoreResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(self.fail(format!("{what}: expected a list, found {}", other.kind_name()))),
        }
    }

    /// Text of a string value, or a failure naming `what`.
    ///
    /// # Errors
    ///
    /// Fails if `value` is not text.
    pub fn text(&self, value: &Value, what: &str) -> StoreResult<String> {
        value
            .as_text()
            .map(str::to_string)
            .ok_or_else(|| self.fail(format!("{what}: expected text, found {}", value.kind_name())))
    }
}

/// Moves field `index` out, leaving null behind.
pub(crate) fn take(fields: &mut [Value], index: usize) -> Value {
    fields.get_mut(index).map(std::mem::take).unwrap_or_default()
}

/// Inserts `value` at `index` of a tuple.
pub(crate) fn insert(fields: &mut Vec<Value>, index: usize, value: Value) {
    let index = index.min(fields.len());
    fields.insert(index, value);
}

/// The legacy engine conversion checkpoint. No data changes.
struct EngineCheckpoint;

impl UpgradeStep for EngineCheckpoint {
    fn version(&self) -> u16 {
        19
    }

    fn name(&self) -> &str {
        "engine conversion checkpoint"
    }

    fn touched(&self) -> &'static [ObjectType] {
        &[]
    }

    fn run(&self, _ctx: &mut UpgradeContext<'_>) -> StoreResult<()> {
        Ok(())
    }
}

/// Registered upgrade steps, keyed by the version they produce.
pub struct UpgradeChain {
    steps: BTreeMap<u16, Box<dyn UpgradeStep>>,
}

impl UpgradeChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Every step from the oldest supported version to the current one.
    #[must_use]
    pub fn standard() -> Self {
        let all: [Box<dyn UpgradeStep>; 6] = [
            Box::new(markers::MarkersToTags),
            Box::new(citations::SourcesToCitations),
            Box::new(hierarchy::PlaceHierarchy),
            Box::new(place_names::PlaceNames),
            Box::new(EngineCheckpoint),
            Box::new(event_refs::EventRefCitations),
        ];
        Self {
            steps: all.into_iter().map(|s| (s.version(), s)).collect(),
        }
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// Fails if a step for the same version is already registered.
    pub fn register(&mut self, step: Box<dyn UpgradeStep>) -> StoreResult<()> {
        let version = step.version();
        if self.steps.contains_key(&version) {
            return Err(StoreError::upgrade_failed(
                version,
                PathBuf::new(),
                "step already registered",
            ));
        }
        self.steps.insert(version, step);
        Ok(())
    }

    /// Versions and names of the registered steps.
    #[must_use]
    pub fn list(&self) -> Vec<(u16, String)> {
        self.steps
            .values()
            .map(|s| (s.version(), s.name().to_string()))
            .collect()
    }

    /// Versions a tree at `from` still has to go through.
    #[must_use]
    pub fn pending(&self, from: u16) -> Vec<u16> {
        self.steps
            .range(from.saturating_add(1)..)
            .map(|(v, _)| *v)
            .collect()
    }

    /// Checks that every version after the oldest supported one has a step.
    ///
    /// # Errors
    ///
    /// Names the first missing version.
    pub fn validate(&self) -> StoreResult<()> {
        for version in MIN_SCHEMA_VERSION + 1..=CURRENT_SCHEMA_VERSION {
            if !self.steps.contains_key(&version) {
                return Err(StoreError::upgrade_failed(
                    version,
                    PathBuf::new(),
                    "no upgrade step registered",
                ));
            }
        }
        Ok(())
    }

    /// Upgrades `store` from `from` to the current version, then rebuilds
    /// its derived indexes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaVersion`] for an unsupported starting
    /// version and [`StoreError::UpgradeFailed`] for any failing step. Steps
    /// completed before the failure stay applied.
    pub fn run(&self, store: &mut ObjectStore, from: u16) -> StoreResult<UpgradeReport> {
        let path = store.path().map(Path::to_path_buf).unwrap_or_default();
        if !(MIN_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION).contains(&from) {
            return Err(StoreError::SchemaVersion {
                path,
                found: from,
                min: MIN_SCHEMA_VERSION,
                max: CURRENT_SCHEMA_VERSION,
            });
        }
        let mut report = UpgradeReport {
            from,
            to: from,
            steps: Vec::new(),
        };
        for version in from + 1..=CURRENT_SCHEMA_VERSION {
            let Some(step) = self.steps.get(&version) else {
                return Err(StoreError::upgrade_failed(version, &path, "no upgrade step registered"));
            };
            let total = step
                .touched()
                .iter()
                .map(|t| store.count(*t))
                .sum::<StoreResult<u64>>()?;
            info!(version, step = step.name(), total, "upgrade step start");

            let written = store
                .batch_transaction(step.name(), |s, txn| {
                    let mut ctx = UpgradeContext::new(s, txn, version, path.clone());
                    step.run(&mut ctx)?;
                    Ok(ctx.written())
                })
                .map_err(|e| as_upgrade_failure(e, version, &path))?;
            store
                .set_schema_version(version)
                .map_err(|e| as_upgrade_failure(e, version, &path))?;

            info!(version, written, "upgrade step finished");
            report.to = version;
            report.steps.push(StepReport {
                version,
                name: step.name().to_string(),
                total,
                written,
            });
        }
        store.rebuild_indexes()?;
        Ok(report)
    }
}

impl Default for UpgradeChain {
    fn default() -> Self {
        Self::new()
    }
}

fn as_upgrade_failure(err: StoreError, version: u16, path: &Path) -> StoreError {
    match err {
        StoreError::UpgradeFailed { .. } => err,
        other => StoreError::upgrade_failed(version, path, other.to_string()),
    }
}

/// Runs the standard chain on `store` from version `from`.
///
/// # Errors
///
/// See [`UpgradeChain::run`].
pub fn run_upgrades(store: &mut ObjectStore, from: u16) -> StoreResult<UpgradeReport> {
    UpgradeChain::standard().run(store, from)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built version 14 tuples.

    use gendb_codec::Value;

    pub fn t(s: &str) -> Value {
        Value::from(s)
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    pub fn empty() -> Value {
        Value::empty_list()
    }

    pub fn coded(code: i64) -> Value {
        list(vec![Value::Integer(code), t("")])
    }

    pub fn marker(code: i64, text: &str) -> Value {
        list(vec![Value::Integer(code), t(text)])
    }

    /// `[street, city, county, state, country, postal, phone]`.
    pub fn locbase(city: &str, county: &str, country: &str) -> Value {
        list(vec![t(""), t(city), t(county), t(""), t(country), t("12345"), t("")])
    }

    pub fn source_ref(source: &str, page: &str) -> Value {
        list(vec![
            Value::Null,
            Value::Bool(false),
            empty(),
            Value::Integer(2),
            t(source),
            t(page),
        ])
    }

    pub fn event_ref(event: &str) -> Value {
        list(vec![Value::Bool(false), empty(), empty(), t(event), coded(1)])
    }

    pub fn person(handle: &str, marker_value: Value, sources: Vec<Value>, events: Vec<Value>) -> Vec<Value> {
        let address = list(vec![Value::Bool(false), empty(), Value::Null, locbase("Leeds", "", "UK")]);
        vec![
            t(handle),
            t(&format!("I-{handle}")),
            Value::Integer(1),
            list(vec![t("Smith"), t("John")]),
            empty(),
            list(events),
            empty(),
            empty(),
            empty(),
            list(vec![address]),
            empty(),
            empty(),
            list(sources),
            empty(),
            Value::Integer(1_000),
            marker_value,
            Value::Bool(false),
        ]
    }

    pub fn event(handle: &str) -> Vec<Value> {
        vec![
            t(handle),
            t("E0001"),
            coded(12),
            Value::Null,
            t("Birth of John"),
            t(""),
            empty(),
            empty(),
            empty(),
            empty(),
            Value::Integer(1_000),
            marker(1, ""),
            Value::Bool(false),
        ]
    }

    pub fn place(handle: &str, gramps_id: &str, title: &str, main_loc: Value) -> Vec<Value> {
        vec![
            t(handle),
            t(gramps_id),
            t(title),
            t(""),
            t(""),
            main_loc,
            empty(),
            empty(),
            empty(),
            empty(),
            empty(),
            Value::Integer(1_000),
            marker(-1, ""),
            Value::Bool(false),
        ]
    }

    pub fn source(handle: &str) -> Vec<Value> {
        vec![
            t(handle),
            t("S0001"),
            t("Parish register"),
            t(""),
            t(""),
            empty(),
            empty(),
            t(""),
            Value::Integer(1_000),
            list(vec![list(vec![t("Volume"), t("3")])]),
            empty(),
            marker(-1, ""),
            Value::Bool(false),
        ]
    }

    pub fn media(handle: &str, path: &str) -> Vec<Value> {
        vec![
            t(handle),
            t("O0001"),
            t(path),
            t("image/png"),
            t("Portrait"),
            empty(),
            empty(),
            empty(),
            Value::Integer(1_000),
            Value::Null,
            marker(2, ""),
            Value::Bool(false),
        ]
    }

    pub fn note(handle: &str, marker_value: Value) -> Vec<Value> {
        vec![
            t(handle),
            t("N0001"),
            t("Check the census"),
            Value::Integer(0),
            coded(1),
            Value::Integer(1_000),
            marker_value,
            Value::Bool(false),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::config::Config;
    use crate::objects::{Citation, Media, Note, Person, Place, Source, Tag};
    use crate::store::MEDIA_PATH_KEY;

    fn v14_store() -> ObjectStore {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        let rows = vec![
            (
                ObjectType::Person,
                person(
                    "p1",
                    marker(2, ""),
                    vec![source_ref("s1", "p. 12")],
                    vec![event_ref("e1")],
                ),
            ),
            (ObjectType::Person, person("p2", marker(0, "Research"), Vec::new(), Vec::new())),
            (ObjectType::Event, event("e1")),
            (ObjectType::Source, source("s1")),
            (ObjectType::Note, note("n1", marker(2, ""))),
            (ObjectType::Media, media("m1", "missing/portrait.png")),
            (
                ObjectType::Place,
                place(
                    "pl1",
                    "P0007",
                    "Leeds, Yorkshire, England",
                    list(vec![locbase("Leeds", "Yorkshire", "England"), t("")]),
                ),
            ),
        ];
        store
            .batch_transaction("seed", |s, txn| {
                for (object_type, fields) in rows {
                    s.commit_raw(&RawRecord::new(object_type, 14, fields), txn)?;
                }
                Ok(())
            })
            .unwrap();
        store.set_schema_version(14).unwrap();
        store
    }

    #[test]
    fn standard_chain_is_complete() {
        let chain = UpgradeChain::standard();
        chain.validate().unwrap();
        assert_eq!(chain.pending(17), vec![18, 19, 20]);
        assert_eq!(chain.list().len(), 6);
        assert!(UpgradeChain::new().validate().is_err());

        let mut chain = UpgradeChain::standard();
        assert!(chain.register(Box::new(EngineCheckpoint)).is_err());
    }

    #[test]
    fn full_chain_produces_readable_objects() {
        let mut store = v14_store();
        let report = run_upgrades(&mut store, 14).unwrap();
        assert_eq!(report.to, CURRENT_SCHEMA_VERSION);
        assert_eq!(report.steps.len(), 6);
        assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);

        let p1: Person = store.get_object(&Handle::new("p1")).unwrap().unwrap();
        assert_eq!(p1.tag_list.len(), 1);
        assert_eq!(p1.citation_list.len(), 1);
        assert_eq!(p1.event_ref_list[0].event, Handle::new("e1"));
        assert!(p1.event_ref_list[0].citation_list.is_empty());

        let tag: Tag = store.get_object(&p1.tag_list[0]).unwrap().unwrap();
        assert_eq!(tag.name, "ToDo");
        assert_eq!(tag.priority, 0);
        let note: Note = store.get_object(&Handle::new("n1")).unwrap().unwrap();
        assert_eq!(note.tag_list, p1.tag_list);
        let p2: Person = store.get_object(&Handle::new("p2")).unwrap().unwrap();
        let research: Tag = store.get_object(&p2.tag_list[0]).unwrap().unwrap();
        assert_eq!(research.name, "Research");
        assert_eq!(store.get_number_of_tags().unwrap(), 2);

        let citation: Citation = store.get_object(&p1.citation_list[0]).unwrap().unwrap();
        assert_eq!(citation.page, "p. 12");
        assert_eq!(citation.source_handle, Some(Handle::new("s1")));
        assert_eq!(citation.gramps_id, "C0000");

        let source: Source = store.get_object(&Handle::new("s1")).unwrap().unwrap();
        assert_eq!(source.attribute_list[0].value, "3");

        let media: Media = store.get_object(&Handle::new("m1")).unwrap().unwrap();
        assert_eq!(media.checksum, "");
        assert!(media.tag_list.is_empty());

        let backlinks = store.find_backlink_handles(&Handle::new("e1"));
        assert_eq!(backlinks, vec![(ObjectType::Person, Handle::new("p1"))]);
    }

    #[test]
    fn places_become_a_hierarchy() {
        let mut store = v14_store();
        run_upgrades(&mut store, 14).unwrap();

        let leeds: Place = store.get_object(&Handle::new("pl1")).unwrap().unwrap();
        assert_eq!(leeds.name.value, "Leeds");
        assert_eq!(leeds.place_type.code, 4);
        assert_eq!(leeds.code, "12345");
        assert_eq!(leeds.placeref_list.len(), 1);

        let county: Place = store
            .get_object(&leeds.placeref_list[0].place)
            .unwrap()
            .unwrap();
        assert_eq!(county.name.value, "Yorkshire");
        assert_eq!(county.title, "Yorkshire, England");
        assert_eq!(county.place_type.code, 3);
        assert_eq!(county.gramps_id, "P0009");

        let country: Place = store
            .get_object(&county.placeref_list[0].place)
            .unwrap()
            .unwrap();
        assert_eq!(country.name.value, "England");
        assert_eq!(country.gramps_id, "P0008");
        assert_eq!(country.place_type.code, 1);
        assert!(country.placeref_list.is_empty());
        assert_eq!(store.get_number_of_places().unwrap(), 3);
    }

    #[test]
    fn checksum_uses_media_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("missing")).unwrap();
        std::fs::write(dir.path().join("missing/portrait.png"), b"abc").unwrap();

        let mut store = v14_store();
        store
            .set_metadata(MEDIA_PATH_KEY, &Value::from(&*dir.path().to_string_lossy()))
            .unwrap();
        run_upgrades(&mut store, 14).unwrap();
        let media: Media = store.get_object(&Handle::new("m1")).unwrap().unwrap();
        assert_eq!(
            media.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn rerunning_a_step_changes_nothing() {
        let mut store = v14_store();
        run_upgrades(&mut store, 14).unwrap();
        let citations = store.get_number_of_citations().unwrap();
        let places = store.get_number_of_places().unwrap();
        let tags = store.get_number_of_tags().unwrap();
        let before: Person = store.get_object(&Handle::new("p1")).unwrap().unwrap();

        // A crash before the version bump leaves the older version recorded.
        store.set_schema_version(14).unwrap();
        let report = run_upgrades(&mut store, 14).unwrap();
        assert!(report.steps.iter().all(|s| s.written == 0), "{report:?}");
        assert_eq!(store.get_number_of_citations().unwrap(), citations);
        assert_eq!(store.get_number_of_places().unwrap(), places);
        assert_eq!(store.get_number_of_tags().unwrap(), tags);
        let after: Person = store.get_object(&Handle::new("p1")).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unknown_shape_fails_the_upgrade() {
        let mut store = v14_store();
        let mut bad = person("p3", marker(0, ""), Vec::new(), Vec::new());
        bad[12] = list(vec![list(vec![t("too short")])]);
        store
            .batch_transaction("seed", |s, txn| {
                s.commit_raw(&RawRecord::new(ObjectType::Person, 14, bad), txn)
            })
            .unwrap();
        let err = run_upgrades(&mut store, 14).unwrap_err();
        assert!(matches!(err, StoreError::UpgradeFailed { version: 16, .. }), "{err}");
        // Steps before the failure stay applied.
        assert_eq!(store.schema_version(), 15);
        let raw = store.get_raw(ObjectType::Person, &Handle::new("p1")).unwrap().unwrap();
        assert_eq!(raw.version, 15);
    }

    #[test]
    fn version_outside_range_is_rejected() {
        let mut store = ObjectStore::open_in_memory(&Config::new()).unwrap();
        assert!(matches!(
            run_upgrades(&mut store, 13),
            Err(StoreError::SchemaVersion { found: 13, .. })
        ));
    }
}
