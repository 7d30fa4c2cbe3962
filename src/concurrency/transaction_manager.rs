use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::config::TxnId;
use crate::concurrency::lock_manager::LockManager;
use crate::concurrency::transaction::{IsolationLevel, Transaction, TransactionState};

/// Hands out transactions and tracks them by id so the lock manager can find
/// the victim of a wound. Lifecycle only; the locking protocol itself lives
/// in [`LockManager`].
pub struct TransactionManager {
    next_txn_id: AtomicU64,
    txn_map: RwLock<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_txn_id: AtomicU64::new(0),
            txn_map: RwLock::new(HashMap::new()),
        }
    }

    /// Begins a new transaction. Ids are monotonic, so later transactions are
    /// younger in the wound-wait order.
    pub fn begin(&self, isolation_level: IsolationLevel) -> Arc<Transaction> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));
        self.txn_map.write().insert(txn_id, txn.clone());
        txn
    }

    /// Looks up a running transaction by id.
    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.read().get(&txn_id).cloned()
    }

    /// Commits the transaction: releases every lock it holds and moves it to
    /// COMMITTED.
    pub fn commit(&self, txn: &Transaction, lock_manager: &LockManager) {
        self.release_all_locks(txn, lock_manager);
        txn.set_state(TransactionState::Committed);
    }

    /// Aborts the transaction: releases every lock it holds and moves it to
    /// ABORTED. Also the unwind path for a wounded transaction once it
    /// observes its abort.
    pub fn abort(&self, txn: &Transaction, lock_manager: &LockManager) {
        self.release_all_locks(txn, lock_manager);
        txn.set_state(TransactionState::Aborted);
    }

    fn release_all_locks(&self, txn: &Transaction, lock_manager: &LockManager) {
        let mut rids: Vec<_> = txn.get_shared_lock_set().into_iter().collect();
        rids.extend(txn.get_exclusive_lock_set());
        for rid in rids {
            lock_manager.unlock(txn, rid);
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
