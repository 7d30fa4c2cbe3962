use log::debug;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::common::config::{TxnId, INVALID_TXN_ID};
use crate::common::exception::{AbortReason, TransactionAbortError};
use crate::common::rid::RID;
use crate::concurrency::transaction::{IsolationLevel, Transaction, TransactionState};
use crate::concurrency::transaction_manager::TransactionManager;

/// Row lock modes. Shared locks are compatible with each other; an exclusive
/// lock is compatible with nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A transaction's position in a record's request queue.
#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    lock_mode: LockMode,
    granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, lock_mode: LockMode) -> Self {
        Self {
            txn_id,
            lock_mode,
            granted: false,
        }
    }
}

/// FIFO lock requests for one record, the condvar its waiters block on, and
/// the id of the transaction with a pending shared-to-exclusive upgrade.
///
/// The queue internals are only touched while the lock manager's global latch
/// is held; the condvar waits release and reacquire that latch atomically.
struct LockRequestQueue {
    request_queue: Mutex<VecDeque<LockRequest>>,
    upgrading: Mutex<TxnId>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            request_queue: Mutex::new(VecDeque::new()),
            upgrading: Mutex::new(INVALID_TXN_ID),
            cv: Condvar::new(),
        }
    }
}

/// LockManager grants row-level shared and exclusive locks under two-phase
/// locking, preventing deadlock with the wound-wait scheme: an older
/// transaction that conflicts with a younger holder or waiter puts it down
/// (marks it ABORTED and wakes the queue); a younger transaction that
/// conflicts with an older one waits.
///
/// Request queues are FIFO, but grants are not strictly FIFO: wound-wait may
/// retire younger waiters out of order. A wounded transaction notices its
/// abort on the next condvar wakeup and unwinds through the transaction
/// manager, which releases its queue entries.
pub struct LockManager {
    txn_manager: Arc<TransactionManager>,
    latch: Mutex<HashMap<RID, Arc<LockRequestQueue>>>,
}

impl LockManager {
    pub fn new(txn_manager: Arc<TransactionManager>) -> Self {
        Self {
            txn_manager,
            latch: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires a shared lock on `rid`, blocking until granted.
    ///
    /// Returns `Ok(false)` if the transaction was already aborted, `Ok(true)`
    /// on grant (or if the lock was already held). A request under
    /// READ_UNCOMMITTED or outside the growing phase aborts the transaction
    /// and returns the error; so does being wounded while waiting.
    pub fn lock_shared(&self, txn: &Transaction, rid: RID) -> Result<bool, TransactionAbortError> {
        if txn.get_state() == TransactionState::Aborted {
            return Ok(false);
        }

        // Read uncommitted reads without shared locks; asking for one is a
        // protocol violation.
        if txn.get_isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError::new(
                txn.get_transaction_id(),
                AbortReason::LockSharedOnReadUncommitted,
            ));
        }

        if txn.get_state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError::new(
                txn.get_transaction_id(),
                AbortReason::LockOnShrinking,
            ));
        }

        if txn.is_shared_locked(&rid) {
            return Ok(true);
        }

        let mut table = self.latch.lock();
        let queue = Arc::clone(
            table
                .entry(rid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new())),
        );
        queue
            .request_queue
            .lock()
            .push_back(LockRequest::new(txn.get_transaction_id(), LockMode::Shared));
        txn.add_shared_lock(rid);

        while self.need_wait(txn, &queue) {
            queue.cv.wait(&mut table);
            debug!("{}: awake, checking own state", txn.get_transaction_id());
            if txn.get_state() == TransactionState::Aborted {
                return Err(TransactionAbortError::new(
                    txn.get_transaction_id(),
                    AbortReason::Deadlock,
                ));
            }
        }

        self.mark_granted(txn.get_transaction_id(), &queue);
        Ok(true)
    }

    /// Acquires an exclusive lock on `rid`, blocking until granted. Same
    /// contract as [`LockManager::lock_shared`] minus the isolation check.
    pub fn lock_exclusive(
        &self,
        txn: &Transaction,
        rid: RID,
    ) -> Result<bool, TransactionAbortError> {
        if txn.get_state() == TransactionState::Aborted {
            return Ok(false);
        }

        if txn.get_state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError::new(
                txn.get_transaction_id(),
                AbortReason::LockOnShrinking,
            ));
        }

        if txn.is_exclusive_locked(&rid) {
            return Ok(true);
        }

        let mut table = self.latch.lock();
        let queue = Arc::clone(
            table
                .entry(rid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new())),
        );
        queue.request_queue.lock().push_back(LockRequest::new(
            txn.get_transaction_id(),
            LockMode::Exclusive,
        ));
        txn.add_exclusive_lock(rid);

        while self.need_wait(txn, &queue) {
            debug!("{}: waiting for exclusive lock", txn.get_transaction_id());
            queue.cv.wait(&mut table);
            debug!("{}: awake, checking own state", txn.get_transaction_id());
            if txn.get_state() == TransactionState::Aborted {
                return Err(TransactionAbortError::new(
                    txn.get_transaction_id(),
                    AbortReason::Deadlock,
                ));
            }
        }

        self.mark_granted(txn.get_transaction_id(), &queue);
        Ok(true)
    }

    /// Upgrades a held shared lock on `rid` to exclusive. At most one upgrade
    /// may be pending per record; a second concurrent upgrader aborts with
    /// `UPGRADE_CONFLICT`, as does an upgrade outside the growing phase.
    pub fn lock_upgrade(
        &self,
        txn: &Transaction,
        rid: RID,
    ) -> Result<bool, TransactionAbortError> {
        if txn.get_state() == TransactionState::Aborted {
            return Ok(false);
        }

        if txn.get_state() != TransactionState::Growing {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionAbortError::new(
                txn.get_transaction_id(),
                AbortReason::UpgradeConflict,
            ));
        }

        if txn.is_exclusive_locked(&rid) {
            return Ok(true);
        }

        let mut table = self.latch.lock();
        let queue = Arc::clone(
            table
                .entry(rid)
                .or_insert_with(|| Arc::new(LockRequestQueue::new())),
        );

        // Reserve the queue's single upgrade slot.
        {
            let mut upgrading = queue.upgrading.lock();
            if *upgrading != INVALID_TXN_ID {
                txn.set_state(TransactionState::Aborted);
                return Err(TransactionAbortError::new(
                    txn.get_transaction_id(),
                    AbortReason::UpgradeConflict,
                ));
            }
            *upgrading = txn.get_transaction_id();
        }

        while self.need_wait_upgrade(txn, &queue) {
            queue.cv.wait(&mut table);
            if txn.get_state() == TransactionState::Aborted {
                let mut upgrading = queue.upgrading.lock();
                if *upgrading == txn.get_transaction_id() {
                    *upgrading = INVALID_TXN_ID;
                }
                return Err(TransactionAbortError::new(
                    txn.get_transaction_id(),
                    AbortReason::Deadlock,
                ));
            }
        }

        {
            let mut requests = queue.request_queue.lock();
            for request in requests.iter_mut() {
                if request.txn_id == txn.get_transaction_id() {
                    request.granted = true;
                    request.lock_mode = LockMode::Exclusive;
                    break;
                }
            }
        }
        *queue.upgrading.lock() = INVALID_TXN_ID;

        txn.remove_shared_lock(&rid);
        txn.add_exclusive_lock(rid);
        Ok(true)
    }

    /// Releases the transaction's lock on `rid`. Returns `false` if it holds
    /// neither mode. Under REPEATABLE_READ the first unlock moves a growing
    /// transaction into its shrinking phase; the weaker isolation levels keep
    /// growing and may lock again later.
    pub fn unlock(&self, txn: &Transaction, rid: RID) -> bool {
        debug!("{}: unlock {}", txn.get_transaction_id(), rid);
        if !txn.is_shared_locked(&rid) && !txn.is_exclusive_locked(&rid) {
            return false;
        }

        let table = self.latch.lock();
        let queue = match table.get(&rid) {
            Some(queue) => Arc::clone(queue),
            None => return false,
        };

        {
            let mut upgrading = queue.upgrading.lock();
            if *upgrading == txn.get_transaction_id() {
                *upgrading = INVALID_TXN_ID;
            }
        }

        let found = {
            let mut requests = queue.request_queue.lock();
            match requests
                .iter()
                .position(|r| r.txn_id == txn.get_transaction_id())
            {
                Some(pos) => {
                    requests.remove(pos);
                    true
                }
                None => false,
            }
        };
        if !found {
            return false;
        }
        queue.cv.notify_all();

        if txn.get_state() == TransactionState::Growing
            && txn.get_isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Shrinking);
        }

        txn.remove_shared_lock(&rid);
        txn.remove_exclusive_lock(&rid);
        true
    }

    fn mark_granted(&self, txn_id: TxnId, queue: &LockRequestQueue) {
        let mut requests = queue.request_queue.lock();
        for request in requests.iter_mut() {
            if request.txn_id == txn_id {
                request.granted = true;
            }
        }
    }

    /// Decides whether the requester must keep waiting, wounding younger
    /// conflicting predecessors along the way.
    ///
    /// Queue order is FIFO and grants never skip an older waiter except via
    /// wound, so the head alone decides the fast path: a requester at the
    /// head proceeds, and a shared requester behind a shared head proceeds.
    /// Otherwise each predecessor is inspected up to, but not including, the
    /// requester itself.
    fn need_wait(&self, txn: &Transaction, queue: &LockRequestQueue) -> bool {
        let requests = queue.request_queue.lock();
        let txn_id = txn.get_transaction_id();
        let self_mode = requests
            .iter()
            .find(|r| r.txn_id == txn_id)
            .map(|r| r.lock_mode)
            .expect("waiting transaction must have a request in the queue");

        let head = requests.front().expect("queue cannot be empty here");
        if self_mode == LockMode::Shared {
            if head.txn_id == txn_id || head.lock_mode == LockMode::Shared {
                return false;
            }
        } else if head.txn_id == txn_id {
            return false;
        }

        let mut need_wait = false;
        let mut has_aborted = false;
        for request in requests.iter() {
            if request.txn_id == txn_id {
                break;
            }

            if request.txn_id > txn_id {
                // Wound-wait: a younger conflicting predecessor is put down
                // rather than making the older requester queue behind it. A
                // shared requester only conflicts with exclusive
                // predecessors; an exclusive requester conflicts with all.
                let conflicts =
                    self_mode == LockMode::Exclusive || request.lock_mode == LockMode::Exclusive;
                if conflicts {
                    self.wound(txn_id, request.txn_id, &mut has_aborted);
                }
                continue;
            }

            // Older predecessor: wait whenever either side wants exclusivity.
            if self_mode == LockMode::Exclusive || request.lock_mode == LockMode::Exclusive {
                need_wait = true;
            }
        }

        if has_aborted {
            queue.cv.notify_all();
        }
        need_wait
    }

    /// Wait condition for an upgrade: any older predecessor still queued
    /// means wait; every younger predecessor is wounded regardless of mode.
    fn need_wait_upgrade(&self, txn: &Transaction, queue: &LockRequestQueue) -> bool {
        let requests = queue.request_queue.lock();
        let txn_id = txn.get_transaction_id();

        let mut need_wait = false;
        let mut has_aborted = false;
        for request in requests.iter() {
            if request.txn_id == txn_id {
                break;
            }

            if request.txn_id > txn_id {
                self.wound(txn_id, request.txn_id, &mut has_aborted);
                continue;
            }

            need_wait = true;
        }

        if has_aborted {
            queue.cv.notify_all();
        }
        need_wait
    }

    fn wound(&self, older: TxnId, younger: TxnId, has_aborted: &mut bool) {
        if let Some(victim) = self.txn_manager.get_transaction(younger) {
            if victim.get_state() != TransactionState::Aborted {
                debug!("{}: wounding younger transaction {}", older, younger);
                victim.set_state(TransactionState::Aborted);
                *has_aborted = true;
            }
        }
    }
}
