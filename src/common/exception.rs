use thiserror::Error;

use crate::common::config::TxnId;

/// Reasons a transaction may be aborted by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A lock was requested after the transaction entered its shrinking phase.
    LockOnShrinking,
    /// A shared lock was requested under READ_UNCOMMITTED.
    LockSharedOnReadUncommitted,
    /// A lock upgrade violated the upgrade protocol, or two upgrades raced on
    /// the same record.
    UpgradeConflict,
    /// The transaction was wounded by an older transaction while waiting.
    Deadlock,
}

impl AbortReason {
    fn as_str(&self) -> &'static str {
        match self {
            AbortReason::LockOnShrinking => "LOCK_ON_SHRINKING",
            AbortReason::LockSharedOnReadUncommitted => "LOCKSHARED_ON_READ_UNCOMMITTED",
            AbortReason::UpgradeConflict => "UPGRADE_CONFLICT",
            AbortReason::Deadlock => "DEADLOCK",
        }
    }
}

/// Raised when the lock manager aborts a transaction for a protocol violation.
/// The transaction's state has already been set to ABORTED when this is
/// returned; the executor layer is expected to unwind and roll back.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {}", .reason.as_str())]
pub struct TransactionAbortError {
    pub txn_id: TxnId,
    pub reason: AbortReason,
}

impl TransactionAbortError {
    pub fn new(txn_id: TxnId, reason: AbortReason) -> Self {
        Self { txn_id, reason }
    }
}
