//! Transaction records.
//!
//! A [`DbTxn`] collects the mutations of one logical edit. The store drives
//! its state machine; callers only see it inside a transaction scope.

use crate::error::{StoreError, StoreResult};
use crate::types::{Handle, ObjectType, RecordNumber, TxnOp};
use std::collections::{BTreeMap, BTreeSet};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Built but not yet begun.
    Created,
    /// Accepting mutations.
    Active,
    /// Committed; terminal.
    Committed,
    /// Aborted; terminal.
    Aborted,
}

/// One mutation as recorded in a transaction: the handle and the blob
/// written, or `None` for a delete.
pub type TxnChange = (Handle, Option<Vec<u8>>);

/// An ordered collection of mutations forming one undoable unit.
#[derive(Debug)]
pub struct DbTxn {
    message: String,
    batch: bool,
    state: TxnState,
    first: Option<RecordNumber>,
    last: Option<RecordNumber>,
    changes: BTreeMap<(ObjectType, TxnOp), Vec<TxnChange>>,
    /// Every object touched, in first-touch order.
    touched: Vec<(ObjectType, Handle)>,
    seen: BTreeSet<(ObjectType, Handle)>,
}

impl DbTxn {
    /// Creates a transaction described by `message`.
    ///
    /// Batch transactions fire no change signals and are not journaled.
    #[must_use]
    pub fn new(message: impl Into<String>, batch: bool) -> Self {
        Self {
            message: message.into(),
            batch,
            state: TxnState::Created,
            first: None,
            last: None,
            changes: BTreeMap::new(),
            touched: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    /// Description shown in the undo history.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a batch transaction.
    #[must_use]
    pub fn is_batch(&self) -> bool {
        self.batch
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Whether mutations are accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// First journal record written by this transaction.
    #[must_use]
    pub fn first(&self) -> Option<RecordNumber> {
        self.first
    }

    /// Last journal record written by this transaction.
    #[must_use]
    pub fn last(&self) -> Option<RecordNumber> {
        self.last
    }

    /// Number of journal records written, `last - first + 1`.
    #[must_use]
    pub fn len(&self) -> u64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last.as_u64() - first.as_u64() + 1,
            _ => 0,
        }
    }

    /// Whether no journal record was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutations recorded for one `(type, op)` group, in commit order.
    #[must_use]
    pub fn get_changes(&self, object_type: ObjectType, op: TxnOp) -> &[TxnChange] {
        self.changes
            .get(&(object_type, op))
            .map_or(&[], Vec::as_slice)
    }

    /// Every non-empty group.
    pub fn groups(&self) -> impl Iterator<Item = (ObjectType, TxnOp, &[TxnChange])> {
        self.changes
            .iter()
            .map(|(&(object_type, op), changes)| (object_type, op, changes.as_slice()))
    }

    /// Objects touched by this transaction, in first-touch order.
    #[must_use]
    pub fn touched(&self) -> &[(ObjectType, Handle)] {
        &self.touched
    }

    pub(crate) fn begin(&mut self) -> StoreResult<()> {
        match self.state {
            TxnState::Created => {
                self.state = TxnState::Active;
                Ok(())
            }
            _ => Err(StoreError::invalid_transaction(format!(
                "cannot begin a transaction in state {:?}",
                self.state
            ))),
        }
    }

    /// Records a mutation and the journal record it was written to.
    pub(crate) fn record(
        &mut self,
        object_type: ObjectType,
        op: TxnOp,
        handle: &Handle,
        new: Option<Vec<u8>>,
        journal: Option<RecordNumber>,
    ) -> StoreResult<()> {
        self.ensure_active()?;
        if let Some(number) = journal {
            self.first.get_or_insert(number);
            self.last = Some(number);
        }
        if self.seen.insert((object_type, handle.clone())) {
            self.touched.push((object_type, handle.clone()));
        }
        self.changes
            .entry((object_type, op))
            .or_default()
            .push((handle.clone(), new));
        Ok(())
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TxnState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TxnState::Aborted;
    }

    /// Fails unless the transaction is active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransaction`] in any other state.
    pub fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Created => Err(StoreError::invalid_transaction("transaction not begun")),
            TxnState::Committed => {
                Err(StoreError::invalid_transaction("transaction already committed"))
            }
            TxnState::Aborted => Err(StoreError::invalid_transaction("transaction already aborted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> DbTxn {
        let mut txn = DbTxn::new("edit", false);
        txn.begin().unwrap();
        txn
    }

    #[test]
    fn lifecycle() {
        let mut txn = DbTxn::new("edit", false);
        assert_eq!(txn.state(), TxnState::Created);
        assert!(txn.ensure_active().is_err());
        txn.begin().unwrap();
        assert!(txn.is_active());
        assert!(txn.begin().is_err());
        txn.mark_committed();
        assert!(txn
            .record(ObjectType::Person, TxnOp::Add, &Handle::new("h"), None, None)
            .is_err());
    }

    #[test]
    fn range_tracks_journal_records() {
        let mut txn = active();
        assert!(txn.is_empty());
        let h = Handle::new("h1");
        txn.record(ObjectType::Person, TxnOp::Add, &h, Some(vec![1]), Some(RecordNumber::new(4)))
            .unwrap();
        txn.record(ObjectType::Person, TxnOp::Update, &h, Some(vec![2]), Some(RecordNumber::new(5)))
            .unwrap();
        assert_eq!(txn.first(), Some(RecordNumber::new(4)));
        assert_eq!(txn.last(), Some(RecordNumber::new(5)));
        assert_eq!(txn.len(), 2);
        assert_eq!(txn.touched().len(), 1);
    }

    #[test]
    fn batch_records_have_no_range() {
        let mut txn = DbTxn::new("import", true);
        txn.begin().unwrap();
        txn.record(ObjectType::Note, TxnOp::Add, &Handle::new("n"), Some(vec![]), None)
            .unwrap();
        assert!(txn.is_batch());
        assert_eq!(txn.len(), 0);
        assert_eq!(txn.get_changes(ObjectType::Note, TxnOp::Add).len(), 1);
    }

    #[test]
    fn groups_keep_commit_order() {
        let mut txn = active();
        for name in ["a", "b", "c"] {
            txn.record(ObjectType::Event, TxnOp::Add, &Handle::new(name), Some(vec![]), None)
                .unwrap();
        }
        let handles: Vec<_> = txn
            .get_changes(ObjectType::Event, TxnOp::Add)
            .iter()
            .map(|(h, _)| h.as_str())
            .collect();
        assert_eq!(handles, ["a", "b", "c"]);
        assert!(txn.get_changes(ObjectType::Event, TxnOp::Delete).is_empty());
    }
}
