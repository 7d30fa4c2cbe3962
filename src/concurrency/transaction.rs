use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::thread;

use crate::common::config::TxnId;
use crate::common::rid::RID;

/// Transaction state under two-phase locking.
///
/// A transaction acquires locks while GROWING, stops acquiring once it enters
/// SHRINKING, and ends COMMITTED or ABORTED. ABORTED is reachable from any
/// non-terminal state, either by the transaction itself or by a wound from an
/// older transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Represents a transaction. The lock manager reads and writes the state and
/// the two lock sets; everything else about the transaction's life is the
/// transaction manager's business.
#[derive(Debug)]
pub struct Transaction {
    // Immutable fields
    txn_id: TxnId,
    isolation_level: IsolationLevel,
    thread_id: thread::ThreadId,

    // Mutable fields with interior mutability
    state: RwLock<TransactionState>,
    shared_lock_set: Mutex<HashSet<RID>>,
    exclusive_lock_set: Mutex<HashSet<RID>>,
}

impl Transaction {
    /// Creates a new transaction in the GROWING state.
    pub fn new(txn_id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            txn_id,
            isolation_level,
            thread_id: thread::current().id(),
            state: RwLock::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the ID of this transaction. IDs are assigned monotonically, so
    /// a smaller ID means an older transaction.
    pub fn get_transaction_id(&self) -> TxnId {
        self.txn_id
    }

    /// Returns the ID of the thread that started the transaction.
    pub fn thread_id(&self) -> thread::ThreadId {
        self.thread_id
    }

    /// Returns the isolation level of this transaction.
    pub fn get_isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Returns the transaction state.
    pub fn get_state(&self) -> TransactionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.write() = state;
    }

    /// Returns whether the transaction holds a shared lock on `rid`.
    pub fn is_shared_locked(&self, rid: &RID) -> bool {
        self.shared_lock_set.lock().contains(rid)
    }

    /// Returns whether the transaction holds an exclusive lock on `rid`.
    pub fn is_exclusive_locked(&self, rid: &RID) -> bool {
        self.exclusive_lock_set.lock().contains(rid)
    }

    /// Returns a snapshot of the shared-locked RIDs.
    pub fn get_shared_lock_set(&self) -> HashSet<RID> {
        self.shared_lock_set.lock().clone()
    }

    /// Returns a snapshot of the exclusive-locked RIDs.
    pub fn get_exclusive_lock_set(&self) -> HashSet<RID> {
        self.exclusive_lock_set.lock().clone()
    }

    pub(crate) fn add_shared_lock(&self, rid: RID) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: RID) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_shared_lock(&self, rid: &RID) {
        self.shared_lock_set.lock().remove(rid);
    }

    pub(crate) fn remove_exclusive_lock(&self, rid: &RID) {
        self.exclusive_lock_set.lock().remove(rid);
    }
}

/// Formatter implementation for `IsolationLevel`.
impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
        };
        write!(f, "{}", name)
    }
}

/// Formatter implementation for `TransactionState`.
impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Growing => "GROWING",
            TransactionState::Shrinking => "SHRINKING",
            TransactionState::Committed => "COMMITTED",
            TransactionState::Aborted => "ABORTED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_basic_properties() {
        let txn = Transaction::new(1, IsolationLevel::ReadCommitted);

        assert_eq!(txn.get_transaction_id(), 1);
        assert_eq!(txn.get_isolation_level(), IsolationLevel::ReadCommitted);
        assert_eq!(txn.get_state(), TransactionState::Growing);
        assert_eq!(txn.thread_id(), thread::current().id());
    }

    #[test]
    fn test_transaction_state_transitions() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);

        assert_eq!(txn.get_state(), TransactionState::Growing);
        txn.set_state(TransactionState::Shrinking);
        assert_eq!(txn.get_state(), TransactionState::Shrinking);
        txn.set_state(TransactionState::Aborted);
        assert_eq!(txn.get_state(), TransactionState::Aborted);
    }

    #[test]
    fn test_lock_set_bookkeeping() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        let rid = RID::new(1, 1);

        txn.add_shared_lock(rid);
        assert!(txn.is_shared_locked(&rid));
        assert!(!txn.is_exclusive_locked(&rid));

        txn.remove_shared_lock(&rid);
        txn.add_exclusive_lock(rid);
        assert!(!txn.is_shared_locked(&rid));
        assert!(txn.is_exclusive_locked(&rid));
        assert_eq!(txn.get_exclusive_lock_set().len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(IsolationLevel::RepeatableRead.to_string(), "REPEATABLE_READ");
        assert_eq!(TransactionState::Growing.to_string(), "GROWING");
        assert_eq!(TransactionState::Aborted.to_string(), "ABORTED");
    }
}
