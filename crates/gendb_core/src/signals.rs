//! Change signals for observers of committed edits.
//!
//! ```rust,ignore
//! let rx = store.subscribe();
//! store.transaction("Add person", |s, txn| s.add_person(&mut person, txn))?;
//! for signal in rx.try_iter() {
//!     println!("{}", signal.name());
//! }
//! ```

use crate::txn::DbTxn;
use crate::types::{Handle, ObjectType, TxnOp};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// A notification delivered after a commit, undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Objects of one type were added, updated or deleted.
    Changed {
        /// Table of the changed objects.
        object_type: ObjectType,
        /// What happened to them.
        op: TxnOp,
        /// Changed objects, in commit order.
        handles: Vec<Handle>,
    },
    /// Derived views must be rebuilt from scratch.
    Rebuild,
}

impl Signal {
    /// Signal name, such as `person-add` or `rebuild`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Signal::Changed { object_type, op, .. } => {
                format!("{}-{}", object_type.table(), op.signal_suffix())
            }
            Signal::Rebuild => "rebuild".to_string(),
        }
    }
}

/// Distributes signals to subscribers.
pub struct SignalHub {
    subscribers: RwLock<Vec<Sender<Signal>>>,
    enabled: AtomicBool,
}

impl SignalHub {
    /// Creates a hub with signals enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Returns a receiver for every future signal.
    pub fn subscribe(&self) -> Receiver<Signal> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Suppresses signals until [`enable`](Self::enable).
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Resumes signal delivery.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Whether signals are delivered.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Sends a signal to every subscriber, dropping disconnected ones.
    pub fn emit(&self, signal: Signal) {
        if !self.is_enabled() {
            return;
        }
        self.subscribers
            .write()
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    /// Emits the grouped signals of a committed transaction.
    ///
    /// Batch transactions are silent.
    pub fn emit_txn(&self, txn: &DbTxn) {
        if txn.is_batch() {
            return;
        }
        for signal in txn_signals(txn) {
            self.emit(signal);
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Groups a transaction's changes into signals.
///
/// Deletes go first; a handle deleted in the same transaction is left out of
/// its type's add and update groups. Handles appear once per group.
#[must_use]
pub fn txn_signals(txn: &DbTxn) -> Vec<Signal> {
    let mut signals = Vec::new();
    for object_type in ObjectType::ALL {
        let deleted: BTreeSet<&Handle> = txn
            .get_changes(object_type, TxnOp::Delete)
            .iter()
            .map(|(h, _)| h)
            .collect();
        for op in [TxnOp::Delete, TxnOp::Add, TxnOp::Update] {
            let mut seen = BTreeSet::new();
            let handles: Vec<Handle> = txn
                .get_changes(object_type, op)
                .iter()
                .map(|(h, _)| h)
                .filter(|h| op == TxnOp::Delete || !deleted.contains(h))
                .filter(|h| seen.insert(*h))
                .cloned()
                .collect();
            if !handles.is_empty() {
                signals.push(Signal::Changed {
                    object_type,
                    op,
                    handles,
                });
            }
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn_with(changes: &[(ObjectType, TxnOp, &str)], batch: bool) -> DbTxn {
        let mut txn = DbTxn::new("edit", batch);
        txn.begin().unwrap();
        for &(ot, op, h) in changes {
            let data = (op != TxnOp::Delete).then(Vec::new);
            txn.record(ot, op, &Handle::new(h), data, None).unwrap();
        }
        txn
    }

    #[test]
    fn deletes_first_and_filtered() {
        let txn = txn_with(
            &[
                (ObjectType::Person, TxnOp::Add, "a"),
                (ObjectType::Person, TxnOp::Add, "b"),
                (ObjectType::Person, TxnOp::Update, "a"),
                (ObjectType::Person, TxnOp::Delete, "a"),
            ],
            false,
        );
        let signals = txn_signals(&txn);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].name(), "person-delete");
        assert_eq!(
            signals[1],
            Signal::Changed {
                object_type: ObjectType::Person,
                op: TxnOp::Add,
                handles: vec![Handle::new("b")],
            }
        );
    }

    #[test]
    fn subscribers_receive_until_dropped() {
        let hub = SignalHub::new();
        let rx = hub.subscribe();
        let gone = hub.subscribe();
        drop(gone);
        hub.emit(Signal::Rebuild);
        assert_eq!(rx.try_recv().unwrap(), Signal::Rebuild);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn disabled_and_batch_are_silent() {
        let hub = SignalHub::new();
        let rx = hub.subscribe();
        hub.emit_txn(&txn_with(&[(ObjectType::Note, TxnOp::Add, "n")], true));
        hub.disable();
        hub.emit_txn(&txn_with(&[(ObjectType::Note, TxnOp::Add, "n")], false));
        assert!(rx.try_recv().is_err());
        hub.enable();
        hub.emit_txn(&txn_with(&[(ObjectType::Note, TxnOp::Add, "n")], false));
        assert_eq!(rx.try_recv().unwrap().name(), "note-add");
    }
}
