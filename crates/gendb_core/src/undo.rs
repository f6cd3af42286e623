//! Undo journal and undo/redo history.
//!
//! The journal is an append-only sequence of before/after images, one per
//! mutation, each framed as:
//!
//! ```text
//! | magic "GUND" (4) | frame version (2) | kind (1) | length (4) | CBOR payload | CRC32 (4) |
//! ```
//!
//! Entries are addressed by [`RecordNumber`]. A committed transaction owns a
//! contiguous `[first, last]` range; entries written by an aborted
//! transaction stay in the journal but no history range ever points at them.

use crate::error::{StoreError, StoreResult};
use crate::types::{Handle, ObjectType, RecordNumber, TxnOp};
use gendb_codec::{from_cbor, to_cbor, Value};
use gendb_storage::{FrameLog, StorageError};
use std::collections::VecDeque;
use std::path::Path;

/// Magic bytes of an undo journal frame.
pub const UNDO_MAGIC: [u8; 4] = *b"GUND";

/// File name of the on-disk journal inside a tree directory.
pub const UNDO_FILE: &str = "undo.log";

const ENTRY_KIND: u8 = 1;

/// One mutation with its before and after images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    /// Table of the mutated object.
    pub object_type: ObjectType,
    /// Kind of mutation.
    pub op: TxnOp,
    /// Mutated object.
    pub handle: Handle,
    /// Stored blob before the mutation; `None` for an add.
    pub old: Option<Vec<u8>>,
    /// Stored blob after the mutation; `None` for a delete.
    pub new: Option<Vec<u8>>,
}

impl UndoEntry {
    fn to_payload(&self) -> StoreResult<Vec<u8>> {
        let image = |data: &Option<Vec<u8>>| data.clone().map_or(Value::Null, Value::Bytes);
        let value = Value::Array(vec![
            Value::Integer(i64::from(self.object_type.key())),
            Value::Integer(i64::from(self.op.as_byte())),
            Value::from(&self.handle),
            image(&self.old),
            image(&self.new),
        ]);
        Ok(to_cbor(&value)?)
    }

    fn from_payload(payload: &[u8]) -> StoreResult<Self> {
        let corrupt = |what: &str| {
            StoreError::Storage(StorageError::Corrupted(format!("undo entry: {what}")))
        };
        let fields = from_cbor(payload)?
            .into_array()
            .filter(|f| f.len() == 5)
            .ok_or_else(|| corrupt("expected a 5-tuple"))?;
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();

        let object_type = next()
            .as_integer()
            .and_then(|k| u8::try_from(k).ok())
            .and_then(ObjectType::from_key)
            .ok_or_else(|| corrupt("bad object type"))?;
        let op = next()
            .as_integer()
            .and_then(|k| u8::try_from(k).ok())
            .and_then(TxnOp::from_byte)
            .ok_or_else(|| corrupt("bad operation"))?;
        let handle = next()
            .into_text()
            .map(Handle::new)
            .ok_or_else(|| corrupt("bad handle"))?;
        let image = |v: Value| match v {
            Value::Null => Ok(None),
            Value::Bytes(b) => Ok(Some(b)),
            _ => Err(corrupt("bad image")),
        };
        let old = image(next())?;
        let new = image(next())?;
        Ok(Self {
            object_type,
            op,
            handle,
            old,
            new,
        })
    }
}

/// Append-only journal of [`UndoEntry`] frames.
#[derive(Debug)]
pub struct UndoLog {
    frames: FrameLog,
}

impl UndoLog {
    /// Creates a journal held in memory.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            frames: FrameLog::in_memory(UNDO_MAGIC),
        }
    }

    /// Opens the journal file in `dir`, discarding anything from a previous
    /// session.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or truncated.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Ok(Self {
            frames: FrameLog::create(&dir.join(UNDO_FILE), UNDO_MAGIC)?,
        })
    }

    /// Appends an entry and returns its record number.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be encoded or written.
    pub fn append(&mut self, entry: &UndoEntry) -> StoreResult<RecordNumber> {
        let number = self.frames.append(ENTRY_KIND, &entry.to_payload()?)?;
        Ok(RecordNumber::new(number))
    }

    /// Reads the entry at `number`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown record number or a damaged frame.
    pub fn read(&self, number: RecordNumber) -> StoreResult<UndoEntry> {
        let (kind, payload) = self.frames.read(number.as_u64()).map_err(|e| match e {
            StorageError::ReadPastEnd { .. } => {
                StoreError::invalid_transaction(format!("no undo record {number}"))
            }
            other => other.into(),
        })?;
        if kind != ENTRY_KIND {
            return Err(StoreError::Storage(StorageError::Corrupted(format!(
                "undo record {number} has kind {kind}"
            ))));
        }
        UndoEntry::from_payload(&payload)
    }

    /// Number of entries written this session.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.frames.len()
    }

    /// Whether nothing has been written this session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Flushes buffered frames to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> StoreResult<()> {
        self.frames.sync()?;
        Ok(())
    }

    /// Discards every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be truncated.
    pub fn clear(&mut self) -> StoreResult<()> {
        self.frames.clear()?;
        Ok(())
    }
}

/// Journal range of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnRange {
    /// First record.
    pub first: RecordNumber,
    /// Last record, inclusive.
    pub last: RecordNumber,
    /// Description shown in the undo history.
    pub message: String,
}

impl TxnRange {
    /// Record numbers in commit order.
    pub fn forward(&self) -> impl Iterator<Item = RecordNumber> {
        (self.first.as_u64()..=self.last.as_u64()).map(RecordNumber::new)
    }

    /// Record numbers in reverse commit order.
    pub fn backward(&self) -> impl Iterator<Item = RecordNumber> {
        (self.first.as_u64()..=self.last.as_u64())
            .rev()
            .map(RecordNumber::new)
    }

    /// Number of entries in the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.last.as_u64() - self.first.as_u64() + 1
    }

    /// Always false; a range holds at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Bounded undo and redo queues.
#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<TxnRange>,
    redo: Vec<TxnRange>,
    limit: usize,
}

impl UndoHistory {
    /// Creates an empty history keeping at most `limit` undoable transactions.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records a newly committed transaction; clears the redo queue.
    pub fn push(&mut self, range: TxnRange) {
        self.redo.clear();
        self.push_undo(range);
    }

    fn push_undo(&mut self, range: TxnRange) {
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(range);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Takes the most recent undoable transaction.
    pub fn pop_undo(&mut self) -> Option<TxnRange> {
        self.undo.pop_back()
    }

    /// Returns an undone transaction to the redo queue.
    pub fn push_redo(&mut self, range: TxnRange) {
        self.redo.push(range);
    }

    /// Takes the most recently undone transaction.
    pub fn pop_redo(&mut self) -> Option<TxnRange> {
        self.redo.pop()
    }

    /// Returns a redone transaction to the undo queue, keeping the redo queue.
    pub fn push_redone(&mut self, range: TxnRange) {
        self.push_undo(range);
    }

    /// Message of the transaction `undo` would revert.
    #[must_use]
    pub fn undo_message(&self) -> Option<&str> {
        self.undo.back().map(|r| r.message.as_str())
    }

    /// Message of the transaction `redo` would replay.
    #[must_use]
    pub fn redo_message(&self) -> Option<&str> {
        self.redo.last().map(|r| r.message.as_str())
    }

    /// Number of undoable transactions.
    #[must_use]
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable transactions.
    #[must_use]
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(handle: &str, op: TxnOp) -> UndoEntry {
        UndoEntry {
            object_type: ObjectType::Person,
            op,
            handle: Handle::new(handle),
            old: (op != TxnOp::Add).then(|| b"old".to_vec()),
            new: (op != TxnOp::Delete).then(|| b"new".to_vec()),
        }
    }

    #[test]
    fn append_and_read() {
        let mut log = UndoLog::in_memory();
        assert!(log.is_empty());
        let a = log.append(&entry("h1", TxnOp::Add)).unwrap();
        let b = log.append(&entry("h2", TxnOp::Delete)).unwrap();
        assert_eq!(a, RecordNumber::new(0));
        assert_eq!(b, RecordNumber::new(1));
        assert_eq!(log.len(), 2);
        assert_eq!(log.read(a).unwrap(), entry("h1", TxnOp::Add));
        assert_eq!(log.read(b).unwrap().old, Some(b"old".to_vec()));
        assert!(log.read(RecordNumber::new(2)).is_err());
    }

    #[test]
    fn disk_journal_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        {
            let mut log = UndoLog::open(dir.path()).unwrap();
            log.append(&entry("h1", TxnOp::Update)).unwrap();
            log.sync().unwrap();
        }
        assert!(std::fs::metadata(dir.path().join(UNDO_FILE)).unwrap().len() > 0);
        let log = UndoLog::open(dir.path()).unwrap();
        assert!(log.is_empty());
        assert_eq!(std::fs::metadata(dir.path().join(UNDO_FILE)).unwrap().len(), 0);
    }

    #[test]
    fn ranges_iterate_both_ways() {
        let range = TxnRange {
            first: RecordNumber::new(3),
            last: RecordNumber::new(5),
            message: "edit".into(),
        };
        let fwd: Vec<_> = range.forward().map(RecordNumber::as_u64).collect();
        let back: Vec<_> = range.backward().map(RecordNumber::as_u64).collect();
        assert_eq!(fwd, vec![3, 4, 5]);
        assert_eq!(back, vec![5, 4, 3]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn history_is_bounded_and_commit_clears_redo() {
        let range = |n: u64| TxnRange {
            first: RecordNumber::new(n),
            last: RecordNumber::new(n),
            message: format!("t{n}"),
        };
        let mut history = UndoHistory::new(2);
        history.push(range(0));
        history.push(range(1));
        history.push(range(2));
        assert_eq!(history.undo_count(), 2);
        assert_eq!(history.undo_message(), Some("t2"));

        let undone = history.pop_undo().unwrap();
        history.push_redo(undone);
        assert_eq!(history.redo_message(), Some("t2"));
        history.push(range(3));
        assert_eq!(history.redo_count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn history_keeps_the_newest_within_limit(limit in 0usize..8, n in 0u64..20) {
            let mut history = UndoHistory::new(limit);
            for i in 0..n {
                history.push(TxnRange {
                    first: RecordNumber::new(i),
                    last: RecordNumber::new(i),
                    message: format!("t{i}"),
                });
            }
            let kept = (n as usize).min(limit);
            proptest::prop_assert_eq!(history.undo_count(), kept);
            let mut popped = Vec::new();
            while let Some(range) = history.pop_undo() {
                popped.push(range.first.as_u64());
            }
            let expected: Vec<u64> = (0..n).rev().take(kept).collect();
            proptest::prop_assert_eq!(popped, expected);
        }
    }
}
