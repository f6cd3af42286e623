//! The object store facade.
//!
//! [`ObjectStore`] owns the write connection of one tree together with its
//! undo journal, derived indexes and signal hub. All mutations run inside a
//! transaction:
//!
//! ```rust,ignore
//! let mut store = ObjectStore::open(path, &config, OpenOptions::new())?;
//! let handle = store.transaction("Add person", |s, txn| {
//!     let mut person = Person::default();
//!     s.add_person(&mut person, txn)?;
//!     Ok(person.handle)
//! })?;
//! store.close()?;
//! ```
//!
//! A transaction that returns an error, or panics, is rolled back before the
//! error leaves [`ObjectStore::transaction`].

use crate::backup::make_zip_backup;
use crate::codec::{same_layout, RawRecord};
use crate::config::{Config, OpenOptions};
use crate::dir::{lock_identity, TreeDir, TreeLock};
use crate::error::{StoreError, StoreResult};
use crate::index::{GrampsIdIndex, ReferenceIndex};
use crate::objects::{
    referenced_handles, Citation, Event, Family, Media, Note, Person, Place, PrimaryObject,
    Repository, Source, Tag,
};
use crate::signals::{txn_signals, Signal, SignalHub};
use crate::txn::DbTxn;
use crate::types::{
    now_timestamp, Handle, ObjectType, TxnOp, CURRENT_SCHEMA_VERSION, MIN_SCHEMA_VERSION,
};
use crate::undo::{TxnRange, UndoEntry, UndoHistory, UndoLog};
use crate::upgrade;
use gendb_codec::{from_cbor, to_cbor, Value};
use gendb_storage::{
    open_backend, BackendConfig, BackendKind, InMemoryBackend, LegacyBackend, ReaderRegistry,
    StorageBackend, StorageError, ThreadReader, SQLITE_FILE,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Table holding `setting -> CBOR value` pairs.
pub const METADATA_TABLE: &str = "metadata";

/// Metadata key of the schema version.
pub const VERSION_KEY: &str = "version";

/// Metadata key of the media base directory.
pub const MEDIA_PATH_KEY: &str = "media-path";

fn counter_key(object_type: ObjectType) -> String {
    format!("{}_id_counter", object_type.table())
}

fn connection_error(path: &Path, err: StorageError) -> StoreError {
    match err {
        StorageError::Connection { message } => StoreError::connection(path, message),
        other => StoreError::Storage(other),
    }
}

/// An open family tree.
pub struct ObjectStore {
    dir: Option<TreeDir>,
    lock: Option<TreeLock>,
    backend: Box<dyn StorageBackend>,
    readers: Option<Arc<ReaderRegistry>>,
    journal: UndoLog,
    history: UndoHistory,
    refs: ReferenceIndex,
    ids: GrampsIdIndex,
    signals: SignalHub,
    txn_active: bool,
    schema_version: u16,
    read_only: bool,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("path", &self.path())
            .field("backend", &self.backend.kind())
            .field("schema_version", &self.schema_version)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl ObjectStore {
    /// Opens the tree at `path`.
    ///
    /// Lock, recovery and upgrade questions come back as
    /// [`StoreError::LockHeld`], [`StoreError::RecoveryRequired`] and
    /// [`StoreError::UpgradeRequired`]; call again with the matching
    /// [`OpenOptions`] flag to proceed. No lock file is left behind when the
    /// open fails. Read-only opens neither check nor take the lock, and do
    /// not ask about recovery. Forcing past a lock removes it even when its
    /// holder is still running.
    ///
    /// # Errors
    ///
    /// Returns the decision errors above, [`StoreError::Connection`] if the
    /// engine cannot be opened, [`StoreError::SchemaVersion`] for versions
    /// outside the supported range, and any upgrade failure.
    pub fn open(path: &Path, config: &Config, options: OpenOptions) -> StoreResult<Self> {
        let dir = TreeDir::open(path)?;
        let kind = dir.backend()?;

        if dir.is_locked() && !options.read_only {
            if !options.force_unlock {
                return Err(StoreError::LockHeld {
                    path: path.to_path_buf(),
                    holder: dir.lock_holder().unwrap_or_default(),
                });
            }
            if dir.lock_is_live() {
                warn!(path = %path.display(), "forcing past a lock held by a running store");
            }
            dir.break_lock()?;
        }
        // a live writer leaves the marker in place until it closes
        if dir.needs_recovery() && !options.allow_recovery && !options.read_only {
            return Err(StoreError::RecoveryRequired {
                path: path.to_path_buf(),
            });
        }
        if kind == BackendKind::Legacy && !options.allow_upgrade {
            return Err(StoreError::UpgradeRequired {
                path: path.to_path_buf(),
                found: dir.schema_version().unwrap_or(MIN_SCHEMA_VERSION),
                current: CURRENT_SCHEMA_VERSION,
                legacy: true,
            });
        }

        let lock = if options.read_only {
            None
        } else {
            Some(dir.acquire_lock(&lock_identity())?)
        };
        match Self::load(dir, kind, config, options) {
            Ok(mut store) => {
                store.lock = lock;
                Ok(store)
            }
            Err(e) => {
                if let Some(lock) = lock {
                    if let Err(release) = lock.release() {
                        warn!(error = %release, "failed to release lock after failed open");
                    }
                }
                Err(e)
            }
        }
    }

    /// Opens a scratch store held in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the tables cannot be created.
    pub fn open_in_memory(config: &Config) -> StoreResult<Self> {
        let mut store = Self::assemble(None, Box::new(InMemoryBackend::new()), config, false)?;
        store.set_metadata(VERSION_KEY, &Value::from(i64::from(CURRENT_SCHEMA_VERSION)))?;
        store.schema_version = CURRENT_SCHEMA_VERSION;
        Ok(store)
    }

    fn load(
        dir: TreeDir,
        mut kind: BackendKind,
        config: &Config,
        options: OpenOptions,
    ) -> StoreResult<Self> {
        let path = dir.path().to_path_buf();
        let recovering = dir.needs_recovery() && !options.read_only;
        let mut backed_up = false;

        if kind == BackendKind::Legacy {
            if options.read_only {
                return Err(StoreError::ReadOnly);
            }
            if config.backup_on_upgrade {
                make_zip_backup(&dir)?;
                backed_up = true;
            }
            kind = convert_legacy(&dir)?;
        }

        let backend = open_backend(
            &BackendConfig::new(kind, &path)
                .wal(config.sqlite_wal)
                .read_only(options.read_only),
        )
        .map_err(|e| connection_error(&path, e))?;
        let mut store = Self::assemble(Some(dir), backend, config, options.read_only)?;

        let found = store.stored_schema_version()?;
        if !(MIN_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION).contains(&found) {
            return Err(StoreError::SchemaVersion {
                path,
                found,
                min: MIN_SCHEMA_VERSION,
                max: CURRENT_SCHEMA_VERSION,
            });
        }
        store.schema_version = found;
        if found < CURRENT_SCHEMA_VERSION {
            if !options.allow_upgrade {
                return Err(StoreError::UpgradeRequired {
                    path,
                    found,
                    current: CURRENT_SCHEMA_VERSION,
                    legacy: false,
                });
            }
            if options.read_only {
                return Err(StoreError::ReadOnly);
            }
            if config.backup_on_upgrade && !backed_up {
                if let Some(dir) = &store.dir {
                    make_zip_backup(dir)?;
                }
            }
            upgrade::run_upgrades(&mut store, found)?;
        }

        if recovering {
            info!(path = %path.display(), "recovering tree after unclean close");
            store.backend.check_integrity()?;
        }
        store.load_counters()?;
        if found == CURRENT_SCHEMA_VERSION {
            // the upgrade chain already rebuilt them
            store.rebuild_indexes()?;
        }

        if !options.read_only {
            if let Some(dir) = &store.dir {
                dir.set_recovery_marker()?;
                if config.disk_undo_log {
                    store.journal = UndoLog::open(dir.path())?;
                }
            }
        }
        if kind == BackendKind::Sqlite && config.sqlite_wal {
            store.readers = Some(Arc::new(ReaderRegistry::new(&path)));
        }
        info!(
            path = %path.display(),
            backend = kind.id(),
            version = store.schema_version,
            read_only = options.read_only,
            "opened family tree"
        );
        Ok(store)
    }

    fn assemble(
        dir: Option<TreeDir>,
        mut backend: Box<dyn StorageBackend>,
        config: &Config,
        read_only: bool,
    ) -> StoreResult<Self> {
        if !read_only {
            for table in ObjectType::ALL
                .iter()
                .map(|t| t.table())
                .chain([METADATA_TABLE])
            {
                if !backend.table_exists(table)? {
                    backend.create_table(table)?;
                }
            }
        }
        Ok(Self {
            dir,
            lock: None,
            backend,
            readers: None,
            journal: UndoLog::in_memory(),
            history: UndoHistory::new(config.undo_history_limit),
            refs: ReferenceIndex::new(),
            ids: GrampsIdIndex::new(),
            signals: SignalHub::new(),
            txn_active: false,
            schema_version: CURRENT_SCHEMA_VERSION,
            read_only,
        })
    }

    /// Schema version from metadata, then `schemaversion.txt`; a tree with
    /// neither and no objects is new and gets the current version.
    fn stored_schema_version(&mut self) -> StoreResult<u16> {
        if let Some(v) = self.get_metadata(VERSION_KEY)?.and_then(|v| v.as_integer()) {
            return Ok(u16::try_from(v).unwrap_or(u16::MAX));
        }
        if let Some(v) = self.dir.as_ref().and_then(TreeDir::schema_version) {
            return Ok(v);
        }
        for object_type in ObjectType::ALL {
            if self.count(object_type)? > 0 {
                return Err(StoreError::SchemaVersion {
                    path: self.path().map(Path::to_path_buf).unwrap_or_default(),
                    found: 0,
                    min: MIN_SCHEMA_VERSION,
                    max: CURRENT_SCHEMA_VERSION,
                });
            }
        }
        if !self.read_only {
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        }
        Ok(CURRENT_SCHEMA_VERSION)
    }

    /// Closes the tree: persists the ID counters, closes readers and the
    /// engine, removes the recovery marker and releases the lock.
    ///
    /// Dropping a store without closing it leaves both the lock file and the
    /// recovery marker in place, as after a crash.
    ///
    /// # Errors
    ///
    /// Returns the first error; the lock is released regardless.
    pub fn close(mut self) -> StoreResult<()> {
        let result = self.shutdown();
        if let Some(lock) = self.lock.take() {
            lock.release()?;
        }
        result
    }

    fn shutdown(&mut self) -> StoreResult<()> {
        if self.txn_active {
            warn!("closing store with an active transaction; rolling back");
            self.backend.rollback()?;
            self.txn_active = false;
        }
        if !self.read_only {
            self.save_counters()?;
            self.journal.sync()?;
        }
        if let Some(readers) = &self.readers {
            readers.close_all()?;
        }
        self.backend.close()?;
        if let Some(dir) = &self.dir {
            if !self.read_only {
                dir.clear_recovery_marker()?;
            }
            info!(path = %dir.path().display(), "closed family tree");
        }
        Ok(())
    }

    /// Tree directory, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TreeDir::path)
    }

    /// Engine holding the data.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Whether the store was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Schema version of the stored data.
    #[must_use]
    pub fn schema_version(&self) -> u16 {
        self.schema_version
    }

    /// Records a new schema version in metadata and `schemaversion.txt`, in
    /// its own physical transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if either write fails.
    pub fn set_schema_version(&mut self, version: u16) -> StoreResult<()> {
        self.set_metadata(VERSION_KEY, &Value::from(i64::from(version)))?;
        if let Some(dir) = &self.dir {
            dir.write_schema_version(version)?;
        }
        self.schema_version = version;
        Ok(())
    }

    /// A fresh, collision-resistant handle.
    #[must_use]
    pub fn create_handle(&self) -> Handle {
        Handle::generate()
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Runs `f` inside a transaction described by `message`.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err` or
    /// panics.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a begin/commit failure.
    pub fn transaction<T, F>(&mut self, message: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self, &mut DbTxn) -> StoreResult<T>,
    {
        self.run_scoped(DbTxn::new(message, false), f)
    }

    /// Like [`transaction`](Self::transaction) but unjournaled and silent.
    ///
    /// A committed batch cannot be undone and clears the undo history.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a begin/commit failure.
    pub fn batch_transaction<T, F>(&mut self, message: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self, &mut DbTxn) -> StoreResult<T>,
    {
        self.run_scoped(DbTxn::new(message, true), f)
    }

    fn run_scoped<T, F>(&mut self, txn: DbTxn, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self, &mut DbTxn) -> StoreResult<T>,
    {
        let mut scope = self.scope(txn)?;
        let result = {
            let (store, txn) = scope.parts();
            f(store, txn)
        };
        match result {
            Ok(value) => {
                scope.commit()?;
                Ok(value)
            }
            Err(e) => {
                scope.abort()?;
                Err(e)
            }
        }
    }

    /// Begins `txn` and returns a guard that aborts it unless committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot begin.
    pub fn scope(&mut self, mut txn: DbTxn) -> StoreResult<TxnScope<'_>> {
        self.begin_txn(&mut txn)?;
        Ok(TxnScope { store: self, txn })
    }

    /// Moves `txn` to active and opens the physical transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransactionActive`] if one is already running,
    /// [`StoreError::ReadOnly`] on a read-only store.
    pub fn begin_txn(&mut self, txn: &mut DbTxn) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if self.txn_active {
            return Err(StoreError::TransactionActive);
        }
        txn.begin()?;
        if let Err(e) = self.backend.begin() {
            txn.mark_aborted();
            return Err(e.into());
        }
        self.txn_active = true;
        debug!(message = txn.message(), batch = txn.is_batch(), "transaction begin");
        Ok(())
    }

    /// Commits `txn`, records it in the undo history and fires its signals.
    ///
    /// On error the transaction is still active and must be aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal or the engine cannot commit.
    pub fn commit_txn(&mut self, txn: &mut DbTxn) -> StoreResult<()> {
        txn.ensure_active()?;
        self.journal.sync()?;
        self.backend.commit()?;
        txn.mark_committed();
        self.txn_active = false;

        if txn.is_batch() {
            self.history.clear();
        } else if let (Some(first), Some(last)) = (txn.first(), txn.last()) {
            self.history.push(TxnRange {
                first,
                last,
                message: txn.message().to_string(),
            });
        }
        self.signals.emit_txn(txn);
        debug!(
            message = txn.message(),
            batch = txn.is_batch(),
            records = txn.len(),
            "transaction commit"
        );
        Ok(())
    }

    /// Rolls back `txn`. Journal records it wrote are never replayed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rollback fails; the transaction is
    /// aborted regardless.
    pub fn abort_txn(&mut self, txn: &mut DbTxn) -> StoreResult<()> {
        txn.ensure_active()?;
        let result = self.backend.rollback();
        txn.mark_aborted();
        self.txn_active = false;
        let touched = txn.touched().to_vec();
        for (object_type, handle) in &touched {
            if let Err(e) = self.reindex(*object_type, handle) {
                warn!(%handle, error = %e, "failed to repair index after abort");
            }
        }
        debug!(message = txn.message(), "transaction abort");
        Ok(result?)
    }

    fn ensure_writable(&self, txn: &DbTxn) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        txn.ensure_active()?;
        if !self.txn_active {
            return Err(StoreError::invalid_transaction(
                "transaction was not begun on this store",
            ));
        }
        Ok(())
    }

    fn write_blob(
        &mut self,
        object_type: ObjectType,
        handle: &Handle,
        blob: Vec<u8>,
        txn: &mut DbTxn,
    ) -> StoreResult<TxnOp> {
        self.ensure_writable(txn)?;
        let table = object_type.table();
        let old = self.backend.get(table, handle.as_str())?;
        let op = if old.is_some() { TxnOp::Update } else { TxnOp::Add };
        self.backend.put(table, handle.as_str(), &blob)?;
        let journal = if txn.is_batch() {
            None
        } else {
            Some(self.journal.append(&UndoEntry {
                object_type,
                op,
                handle: handle.clone(),
                old,
                new: Some(blob.clone()),
            })?)
        };
        txn.record(object_type, op, handle, Some(blob), journal)?;
        Ok(op)
    }

    // ---------------------------------------------------------------------
    // Generic object access
    // ---------------------------------------------------------------------

    /// Reads the object with `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the stored record is unreadable.
    pub fn get_object<T: PrimaryObject>(&self, handle: &Handle) -> StoreResult<Option<T>> {
        match self.get_raw(T::OBJECT_TYPE, handle)? {
            Some(raw) => Ok(Some(T::from_raw(raw)?)),
            None => Ok(None),
        }
    }

    /// Writes `object`, stamping its change time.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is empty, the transaction is not
    /// active, or the write fails.
    pub fn commit_object<T: PrimaryObject>(
        &mut self,
        object: &mut T,
        txn: &mut DbTxn,
    ) -> StoreResult<TxnOp> {
        if object.handle().is_empty() {
            return Err(StoreError::invalid_transaction(format!(
                "cannot commit a {} without a handle",
                T::OBJECT_TYPE
            )));
        }
        object.set_change(now_timestamp());
        let blob = object.to_raw().to_blob()?;
        let handle = object.handle().clone();
        let op = self.write_blob(T::OBJECT_TYPE, &handle, blob, txn)?;
        self.ids.set(T::OBJECT_TYPE, &handle, object.gramps_id());
        self.refs
            .update(T::OBJECT_TYPE, &handle, object.referenced_handles());
        Ok(op)
    }

    /// Assigns a handle and gramps ID where missing, then commits.
    ///
    /// # Errors
    ///
    /// See [`commit_object`](Self::commit_object).
    pub fn add_object<T: PrimaryObject>(
        &mut self,
        object: &mut T,
        txn: &mut DbTxn,
    ) -> StoreResult<Handle> {
        if object.handle().is_empty() {
            let handle = self.create_handle();
            set_handle(object, handle)?;
        }
        if object.gramps_id().is_empty() {
            object.set_gramps_id(self.find_next_gramps_id(T::OBJECT_TYPE));
        }
        self.commit_object(object, txn)?;
        Ok(object.handle().clone())
    }

    /// Deletes the object with `handle`; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or the delete fails.
    pub fn delete_object(
        &mut self,
        object_type: ObjectType,
        handle: &Handle,
        txn: &mut DbTxn,
    ) -> StoreResult<bool> {
        self.ensure_writable(txn)?;
        let table = object_type.table();
        let Some(old) = self.backend.get(table, handle.as_str())? else {
            return Ok(false);
        };
        self.backend.delete(table, handle.as_str())?;
        let journal = if txn.is_batch() {
            None
        } else {
            Some(self.journal.append(&UndoEntry {
                object_type,
                op: TxnOp::Delete,
                handle: handle.clone(),
                old: Some(old),
                new: None,
            })?)
        };
        txn.record(object_type, TxnOp::Delete, handle, None, journal)?;
        self.ids.remove(object_type, handle);
        self.refs.remove(handle);
        Ok(true)
    }

    /// Handles of every object of `object_type`, in key order.
    ///
    /// Each call starts a fresh pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn iter_handles(&self, object_type: ObjectType) -> StoreResult<impl Iterator<Item = Handle>> {
        Ok(self
            .backend
            .keys(object_type.table())?
            .into_iter()
            .map(Handle::new))
    }

    /// Every object of type `T`, in handle order.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read; undecodable records
    /// surface as per-item errors.
    pub fn iter_objects<T: PrimaryObject>(
        &self,
    ) -> StoreResult<impl Iterator<Item = StoreResult<T>>> {
        Ok(self
            .backend
            .scan(T::OBJECT_TYPE.table())?
            .map(|(key, blob)| {
                RawRecord::from_blob(T::OBJECT_TYPE, &Handle::new(key), &blob).and_then(T::from_raw)
            }))
    }

    /// Number of objects of `object_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn count(&self, object_type: ObjectType) -> StoreResult<u64> {
        Ok(self.backend.count(object_type.table())?)
    }

    /// Whether an object of `object_type` with `handle` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn has_handle(&self, object_type: ObjectType, handle: &Handle) -> StoreResult<bool> {
        Ok(self.backend.get(object_type.table(), handle.as_str())?.is_some())
    }

    // ---------------------------------------------------------------------
    // Raw access for the upgrade chain
    // ---------------------------------------------------------------------

    /// Stored record of `handle` at whatever version it was written in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the record matches no known shape.
    pub fn get_raw(&self, object_type: ObjectType, handle: &Handle) -> StoreResult<Option<RawRecord>> {
        match self.backend.get(object_type.table(), handle.as_str())? {
            Some(blob) => Ok(Some(RawRecord::from_blob(object_type, handle, &blob)?)),
            None => Ok(None),
        }
    }

    /// Handles of every stored record of `object_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn raw_handles(&self, object_type: ObjectType) -> StoreResult<Vec<Handle>> {
        Ok(self.iter_handles(object_type)?.collect())
    }

    /// Writes a raw record as-is, checked only against its own version's
    /// shape. Derived indexes are not touched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the record does not fit its shape.
    pub fn commit_raw(&mut self, raw: &RawRecord, txn: &mut DbTxn) -> StoreResult<TxnOp> {
        let blob = raw.to_blob()?;
        self.write_blob(raw.object_type, &raw.handle(), blob, txn)
    }

    // ---------------------------------------------------------------------
    // Metadata
    // ---------------------------------------------------------------------

    /// Value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or the value decoded.
    pub fn get_metadata(&self, key: &str) -> StoreResult<Option<Value>> {
        if !self.backend.table_exists(METADATA_TABLE)? {
            return Ok(None);
        }
        match self.backend.get(METADATA_TABLE, key)? {
            Some(blob) => Ok(Some(from_cbor(&blob)?)),
            None => Ok(None),
        }
    }

    /// Stores `value` under `key`, inside the active transaction if there
    /// is one and in a transaction of its own otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_metadata(&mut self, key: &str, value: &Value) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let blob = to_cbor(value)?;
        if self.txn_active {
            self.backend.put(METADATA_TABLE, key, &blob)?;
            return Ok(());
        }
        self.backend.begin()?;
        if let Err(e) = self.backend.put(METADATA_TABLE, key, &blob) {
            self.backend.rollback()?;
            return Err(e.into());
        }
        self.backend.commit()?;
        Ok(())
    }

    fn load_counters(&mut self) -> StoreResult<()> {
        for object_type in ObjectType::ALL {
            if let Some(n) = self
                .get_metadata(&counter_key(object_type))?
                .and_then(|v| v.as_integer())
            {
                self.ids
                    .set_counter(object_type, u64::try_from(n).unwrap_or_default());
            }
        }
        Ok(())
    }

    fn save_counters(&mut self) -> StoreResult<()> {
        for object_type in ObjectType::ALL {
            let n = i64::try_from(self.ids.counter(object_type)).unwrap_or(i64::MAX);
            self.set_metadata(&counter_key(object_type), &Value::from(n))?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Indexes
    // ---------------------------------------------------------------------

    /// Allocates the next unused gramps ID of `object_type`.
    pub fn find_next_gramps_id(&mut self, object_type: ObjectType) -> String {
        self.ids.next_id(object_type)
    }

    /// Whether an object of `object_type` carries `gramps_id`.
    #[must_use]
    pub fn has_gramps_id(&self, object_type: ObjectType, gramps_id: &str) -> bool {
        self.ids.contains(object_type, gramps_id)
    }

    /// Reads the object of type `T` carrying `gramps_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored record is unreadable.
    pub fn get_from_gramps_id<T: PrimaryObject>(&self, gramps_id: &str) -> StoreResult<Option<T>> {
        match self.ids.lookup(T::OBJECT_TYPE, gramps_id) {
            Some(handle) => self.get_object(&handle.clone()),
            None => Ok(None),
        }
    }

    /// Objects referencing `handle`.
    #[must_use]
    pub fn find_backlink_handles(&self, handle: &Handle) -> Vec<(ObjectType, Handle)> {
        self.refs.backlinks(handle)
    }

    fn reindex(&mut self, object_type: ObjectType, handle: &Handle) -> StoreResult<()> {
        match self.get_raw(object_type, handle)? {
            Some(raw) => self.index_raw(raw),
            None => {
                self.ids.remove(object_type, handle);
                self.refs.remove(handle);
                Ok(())
            }
        }
    }

    fn index_raw(&mut self, raw: RawRecord) -> StoreResult<()> {
        let object_type = raw.object_type;
        let handle = raw.handle();
        if let Some(gramps_id) = raw.fields.get(1).and_then(Value::as_text) {
            self.ids.set(object_type, &handle, gramps_id);
        }
        if same_layout(object_type, raw.version, CURRENT_SCHEMA_VERSION) {
            let targets = referenced_handles(raw)?;
            self.refs.update(object_type, &handle, targets);
        } else {
            self.refs.remove(&handle);
        }
        Ok(())
    }

    /// Rebuilds the reference and gramps-ID indexes from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if any record cannot be read.
    pub fn rebuild_indexes(&mut self) -> StoreResult<()> {
        self.refs.clear();
        self.ids.clear();
        for object_type in ObjectType::ALL {
            let rows = self.backend.scan(object_type.table())?;
            for (key, blob) in rows {
                let raw = RawRecord::from_blob(object_type, &Handle::new(key), &blob)?;
                self.index_raw(raw)?;
            }
        }
        debug!(objects = self.refs.len(), "rebuilt indexes");
        Ok(())
    }

    /// Rebuilds derived indexes and tells observers to rebuild theirs.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails.
    pub fn request_rebuild(&mut self) -> StoreResult<()> {
        self.rebuild_indexes()?;
        self.signals.emit(Signal::Rebuild);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Signals
    // ---------------------------------------------------------------------

    /// Receiver for every future signal.
    pub fn subscribe(&self) -> Receiver<Signal> {
        self.signals.subscribe()
    }

    /// Suppresses change signals, for bulk work.
    pub fn disable_signals(&self) {
        self.signals.disable();
    }

    /// Resumes change signals.
    pub fn enable_signals(&self) {
        self.signals.enable();
    }

    // ---------------------------------------------------------------------
    // Undo / redo
    // ---------------------------------------------------------------------

    /// Reverts the last committed transaction; returns `false` if there is
    /// none.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal or the engine fails; the history is
    /// left unchanged.
    pub fn undo(&mut self) -> StoreResult<bool> {
        self.ensure_idle()?;
        let Some(range) = self.history.pop_undo() else {
            return Ok(false);
        };
        match self.replay(&range, true) {
            Ok(()) => {
                self.history.push_redo(range);
                Ok(true)
            }
            Err(e) => {
                self.history.push_redone(range);
                Err(e)
            }
        }
    }

    /// Replays the last undone transaction; returns `false` if there is
    /// none.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal or the engine fails; the history is
    /// left unchanged.
    pub fn redo(&mut self) -> StoreResult<bool> {
        self.ensure_idle()?;
        let Some(range) = self.history.pop_redo() else {
            return Ok(false);
        };
        match self.replay(&range, false) {
            Ok(()) => {
                self.history.push_redone(range);
                Ok(true)
            }
            Err(e) => {
                self.history.push_redo(range);
                Err(e)
            }
        }
    }

    fn ensure_idle(&self) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if self.txn_active {
            return Err(StoreError::TransactionActive);
        }
        Ok(())
    }

    fn replay(&mut self, range: &TxnRange, undo: bool) -> StoreResult<()> {
        let numbers: Vec<_> = if undo {
            range.backward().collect()
        } else {
            range.forward().collect()
        };
        let entries = numbers
            .into_iter()
            .map(|n| self.journal.read(n))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut txn = DbTxn::new(range.message.clone(), false);
        txn.begin()?;
        self.backend.begin()?;
        let applied = self.apply_entries(&entries, undo, &mut txn);
        let result = match applied {
            Ok(()) => self.backend.commit().map_err(StoreError::from),
            Err(e) => {
                self.backend.rollback()?;
                Err(e)
            }
        };
        let touched = txn.touched().to_vec();
        for (object_type, handle) in &touched {
            self.reindex(*object_type, handle)?;
        }
        result?;
        txn.mark_committed();
        for signal in txn_signals(&txn) {
            self.signals.emit(signal);
        }
        info!(message = %range.message, undo, records = range.len(), "replayed transaction");
        Ok(())
    }

    fn apply_entries(&mut self, entries: &[UndoEntry], undo: bool, txn: &mut DbTxn) -> StoreResult<()> {
        for entry in entries {
            let (data, op) = if undo {
                let op = match entry.op {
                    TxnOp::Add => TxnOp::Delete,
                    TxnOp::Delete => TxnOp::Add,
                    TxnOp::Update => TxnOp::Update,
                };
                (&entry.old, op)
            } else {
                (&entry.new, entry.op)
            };
            let table = entry.object_type.table();
            match data {
                Some(blob) => self.backend.put(table, entry.handle.as_str(), blob)?,
                None => {
                    self.backend.delete(table, entry.handle.as_str())?;
                }
            }
            txn.record(entry.object_type, op, &entry.handle, data.clone(), None)?;
        }
        Ok(())
    }

    /// Number of journal records written this session.
    #[must_use]
    pub fn journal_len(&self) -> u64 {
        self.journal.len()
    }

    /// Number of undoable transactions.
    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    /// Number of redoable transactions.
    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    /// Message of the transaction [`undo`](Self::undo) would revert.
    #[must_use]
    pub fn undo_message(&self) -> Option<&str> {
        self.history.undo_message()
    }

    /// Message of the transaction [`redo`](Self::redo) would replay.
    #[must_use]
    pub fn redo_message(&self) -> Option<&str> {
        self.history.redo_message()
    }

    // ---------------------------------------------------------------------
    // Readers and summary
    // ---------------------------------------------------------------------

    /// Read connection bound to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] unless the tree uses the
    /// embedded engine in WAL mode.
    pub fn reader(&self) -> StoreResult<Arc<ThreadReader>> {
        Ok(self.reader_pool()?.reader()?)
    }

    /// Shared registry that worker threads request their readers from.
    ///
    /// The store itself stays on its owning thread; hand the registry to
    /// workers and call [`ReaderRegistry::reader`] there. Readers still held
    /// when the store closes fail with [`StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] unless the tree uses the
    /// embedded engine in WAL mode.
    pub fn reader_pool(&self) -> StoreResult<Arc<ReaderRegistry>> {
        match &self.readers {
            Some(readers) => Ok(Arc::clone(readers)),
            None => Err(StorageError::Unsupported {
                backend: self.backend.kind().display_name(),
                operation: "thread readers",
            }
            .into()),
        }
    }

    /// Number of open thread readers.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.as_ref().map_or(0, |r| r.len())
    }

    /// Object counts, schema version and backend name.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be counted.
    pub fn get_summary(&self) -> StoreResult<Vec<(String, String)>> {
        let mut summary = Vec::new();
        for object_type in ObjectType::ALL {
            summary.push((
                object_type.count_label().to_string(),
                self.count(object_type)?.to_string(),
            ));
        }
        summary.push(("Schema version".to_string(), self.schema_version.to_string()));
        summary.push((
            "Database".to_string(),
            self.backend.kind().display_name().to_string(),
        ));
        Ok(summary)
    }
}

/// Reads one typed object through a thread reader.
///
/// # Errors
///
/// Returns an error if the read fails or the record is unreadable.
pub fn read_with<T: PrimaryObject>(reader: &ThreadReader, handle: &Handle) -> StoreResult<Option<T>> {
    match reader.get(T::OBJECT_TYPE.table(), handle.as_str())? {
        Some(blob) => Ok(Some(T::from_raw(RawRecord::from_blob(
            T::OBJECT_TYPE,
            handle,
            &blob,
        )?)?)),
        None => Ok(None),
    }
}

fn set_handle<T: PrimaryObject>(object: &mut T, handle: Handle) -> StoreResult<()> {
    let mut raw = object.to_raw();
    match raw.fields.first_mut() {
        Some(field) => *field = Value::from(handle),
        None => return Err(StoreError::invalid_transaction("object has no handle field")),
    }
    *object = T::from_raw(raw)?;
    Ok(())
}

/// Copies a legacy tree into a fresh embedded engine file and points
/// `database.txt` at it.
fn convert_legacy(dir: &TreeDir) -> StoreResult<BackendKind> {
    let path: PathBuf = dir.path().to_path_buf();
    let stale = path.join(SQLITE_FILE);
    if stale.exists() {
        std::fs::remove_file(&stale)?;
    }
    let legacy = LegacyBackend::open(&path).map_err(|e| connection_error(&path, e))?;
    let mut target = open_backend(&BackendConfig::new(BackendKind::Sqlite, &path))
        .map_err(|e| connection_error(&path, e))?;

    target.begin()?;
    let mut rows = 0usize;
    let copied = (|| -> StoreResult<()> {
        for table in legacy.table_names() {
            if !target.table_exists(&table)? {
                target.create_table(&table)?;
            }
            for (key, blob) in legacy.scan(&table)? {
                target.put(&table, &key, &blob)?;
                rows += 1;
            }
        }
        if let Some(version) = dir.schema_version() {
            if !target.table_exists(METADATA_TABLE)? {
                target.create_table(METADATA_TABLE)?;
            }
            target.put(
                METADATA_TABLE,
                VERSION_KEY,
                &to_cbor(&Value::from(i64::from(version)))?,
            )?;
        }
        Ok(())
    })();
    if let Err(e) = copied {
        target.rollback()?;
        return Err(e);
    }
    target.commit()?;
    target.close()?;
    dir.write_backend(BackendKind::Sqlite)?;
    info!(path = %path.display(), rows, "converted legacy tree to the embedded engine");
    Ok(BackendKind::Sqlite)
}

/// Guard over an active transaction; aborts on drop unless committed.
pub struct TxnScope<'s> {
    store: &'s mut ObjectStore,
    txn: DbTxn,
}

impl TxnScope<'_> {
    /// The store and the transaction, for issuing mutations.
    pub fn parts(&mut self) -> (&mut ObjectStore, &mut DbTxn) {
        (&mut *self.store, &mut self.txn)
    }

    /// The transaction.
    #[must_use]
    pub fn txn(&self) -> &DbTxn {
        &self.txn
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns the commit error; the transaction is then aborted on drop.
    pub fn commit(mut self) -> StoreResult<()> {
        self.store.commit_txn(&mut self.txn)
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// Returns the rollback error.
    pub fn abort(mut self) -> StoreResult<()> {
        self.store.abort_txn(&mut self.txn)
    }
}

impl Drop for TxnScope<'_> {
    fn drop(&mut self) {
        if self.txn.is_active() {
            if let Err(e) = self.store.abort_txn(&mut self.txn) {
                warn!(error = %e, "rollback of unfinished transaction failed");
            }
        }
    }
}

macro_rules! object_accessors {
    ($($ty:ident {
        get: $get:ident,
        raw: $raw:ident,
        by_id: $by_id:ident,
        add: $add:ident,
        commit: $commit:ident,
        delete: $delete:ident,
        handles: $handles:ident,
        count: $count:ident $(,)?
    })*) => {
        impl ObjectStore {
            $(
                #[doc = concat!("Reads the ", stringify!($ty), " with `handle`.")]
                ///
                /// # Errors
                ///
                /// Returns [`StoreError::Decode`] if the stored record is unreadable.
                pub fn $get(&self, handle: &Handle) -> StoreResult<Option<$ty>> {
                    self.get_object(handle)
                }

                #[doc = concat!("Reads the stored ", stringify!($ty), " record without typing it.")]
                ///
                /// # Errors
                ///
                /// Returns [`StoreError::Decode`] if the record matches no known shape.
                pub fn $raw(&self, handle: &Handle) -> StoreResult<Option<RawRecord>> {
                    self.get_raw(ObjectType::$ty, handle)
                }

                #[doc = concat!("Reads the ", stringify!($ty), " carrying `gramps_id`.")]
                ///
                /// # Errors
                ///
                /// Returns [`StoreError::Decode`] if the stored record is unreadable.
                pub fn $by_id(&self, gramps_id: &str) -> StoreResult<Option<$ty>> {
                    self.get_from_gramps_id(gramps_id)
                }

                #[doc = concat!("Adds a ", stringify!($ty), ", assigning a handle and gramps ID where missing.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the transaction is not active or the write fails.
                pub fn $add(&mut self, object: &mut $ty, txn: &mut DbTxn) -> StoreResult<Handle> {
                    self.add_object(object, txn)
                }

                #[doc = concat!("Writes a ", stringify!($ty), ", stamping its change time.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the transaction is not active or the write fails.
                pub fn $commit(&mut self, object: &mut $ty, txn: &mut DbTxn) -> StoreResult<TxnOp> {
                    self.commit_object(object, txn)
                }

                #[doc = concat!("Deletes the ", stringify!($ty), " with `handle`; returns whether it existed.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the transaction is not active or the delete fails.
                pub fn $delete(&mut self, handle: &Handle, txn: &mut DbTxn) -> StoreResult<bool> {
                    self.delete_object(ObjectType::$ty, handle, txn)
                }

                #[doc = concat!("Handles of every ", stringify!($ty), ".")]
                ///
                /// # Errors
                ///
                /// Returns an error if the table cannot be read.
                pub fn $handles(&self) -> StoreResult<impl Iterator<Item = Handle>> {
                    self.iter_handles(ObjectType::$ty)
                }

                #[doc = concat!("Number of stored ", stringify!($ty), " objects.")]
                ///
                /// # Errors
                ///
                /// Returns an error if the table cannot be counted.
                pub fn $count(&self) -> StoreResult<u64> {
                    self.count(ObjectType::$ty)
                }
            )*
        }
    };
}

object_accessors! {
    Person {
        get: get_person, raw: get_raw_person, by_id: get_person_from_gramps_id,
        add: add_person, commit: commit_person, delete: delete_person,
        handles: iter_person_handles, count: get_number_of_people,
    }
    Family {
        get: get_family, raw: get_raw_family, by_id: get_family_from_gramps_id,
        add: add_family, commit: commit_family, delete: delete_family,
        handles: iter_family_handles, count: get_number_of_families,
    }
    Event {
        get: get_event, raw: get_raw_event, by_id: get_event_from_gramps_id,
        add: add_event, commit: commit_event, delete: delete_event,
        handles: iter_event_handles, count: get_number_of_events,
    }
    Place {
        get: get_place, raw: get_raw_place, by_id: get_place_from_gramps_id,
        add: add_place, commit: commit_place, delete: delete_place,
        handles: iter_place_handles, count: get_number_of_places,
    }
    Media {
        get: get_media, raw: get_raw_media, by_id: get_media_from_gramps_id,
        add: add_media, commit: commit_media, delete: delete_media,
        handles: iter_media_handles, count: get_number_of_media,
    }
    Repository {
        get: get_repository, raw: get_raw_repository, by_id: get_repository_from_gramps_id,
        add: add_repository, commit: commit_repository, delete: delete_repository,
        handles: iter_repository_handles, count: get_number_of_repositories,
    }
    Note {
        get: get_note, raw: get_raw_note, by_id: get_note_from_gramps_id,
        add: add_note, commit: commit_note, delete: delete_note,
        handles: iter_note_handles, count: get_number_of_notes,
    }
    Source {
        get: get_source, raw: get_raw_source, by_id: get_source_from_gramps_id,
        add: add_source, commit: commit_source, delete: delete_source,
        handles: iter_source_handles, count: get_number_of_sources,
    }
    Citation {
        get: get_citation, raw: get_raw_citation, by_id: get_citation_from_gramps_id,
        add: add_citation, commit: commit_citation, delete: delete_citation,
        handles: iter_citation_handles, count: get_number_of_citations,
    }
    Tag {
        get: get_tag, raw: get_raw_tag, by_id: get_tag_from_gramps_id,
        add: add_tag, commit: commit_tag, delete: delete_tag,
        handles: iter_tag_handles, count: get_number_of_tags,
    }
}
