//! In-process coordinator with per-transaction status tracking.
//!
//! No durability and no resource enlistment: it records what the demarcation
//! engine asked for so the layer can run end-to-end without an external
//! transaction manager.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use super::{TransactionCoordinator, TransactionId};
use crate::error::CoordinatorError;

/// Lifecycle status of a live transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    MarkedRollback,
    Suspended,
    /// Suspended after being marked rollback-only.
    SuspendedMarkedRollback,
}

impl TransactionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::MarkedRollback => "marked-rollback",
            Self::Suspended => "suspended",
            Self::SuspendedMarkedRollback => "suspended-marked-rollback",
        }
    }
}

/// Point-in-time counters exposed by [`LocalCoordinator::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub active: u64,
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

/// Reference [`TransactionCoordinator`] keeping live transactions in a `DashMap`.
#[derive(Debug)]
pub struct LocalCoordinator {
    live: DashMap<TransactionId, TransactionStatus>,
    next_id: AtomicU64,
    counters: Counters,
}

impl LocalCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: DashMap::new(),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Status of a live transaction, `None` once it has completed.
    #[must_use]
    pub fn status(&self, txn: TransactionId) -> Option<TransactionStatus> {
        self.live.get(&txn).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            begun: self.counters.begun.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            rolled_back: self.counters.rolled_back.load(Ordering::Relaxed),
            active: self.live.len() as u64,
        }
    }

    /// Removes a transaction that is attached to the caller, failing if it is suspended.
    fn complete(
        &self,
        txn: TransactionId,
        operation: &'static str,
    ) -> Result<TransactionStatus, CoordinatorError> {
        let status = self.status(txn).ok_or(CoordinatorError::UnknownTransaction(txn))?;
        if matches!(
            status,
            TransactionStatus::Suspended | TransactionStatus::SuspendedMarkedRollback
        ) {
            return Err(CoordinatorError::InvalidState {
                txn,
                operation,
                status: status.as_str(),
            });
        }
        self.live.remove(&txn);
        Ok(status)
    }

    fn transition(
        &self,
        txn: TransactionId,
        operation: &'static str,
        next: impl FnOnce(TransactionStatus) -> Option<TransactionStatus>,
    ) -> Result<(), CoordinatorError> {
        let mut entry = self
            .live
            .get_mut(&txn)
            .ok_or(CoordinatorError::UnknownTransaction(txn))?;
        let current = *entry.value();
        match next(current) {
            Some(status) => {
                *entry.value_mut() = status;
                Ok(())
            }
            None => Err(CoordinatorError::InvalidState {
                txn,
                operation,
                status: current.as_str(),
            }),
        }
    }
}

impl Default for LocalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionCoordinator for LocalCoordinator {
    fn begin(&self) -> Result<TransactionId, CoordinatorError> {
        let txn = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.insert(txn, TransactionStatus::Active);
        self.counters.begun.fetch_add(1, Ordering::Relaxed);
        debug!(%txn, "began transaction");
        Ok(txn)
    }

    fn commit(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        match self.complete(txn, "commit")? {
            TransactionStatus::MarkedRollback => {
                self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
                debug!(%txn, "commit of rollback-only transaction rolled back");
                Err(CoordinatorError::RolledBack(txn))
            }
            _ => {
                self.counters.committed.fetch_add(1, Ordering::Relaxed);
                debug!(%txn, "committed transaction");
                Ok(())
            }
        }
    }

    fn rollback(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.complete(txn, "roll back")?;
        self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
        debug!(%txn, "rolled back transaction");
        Ok(())
    }

    fn set_rollback_only(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.transition(txn, "mark rollback-only", |status| match status {
            TransactionStatus::Active | TransactionStatus::MarkedRollback => {
                Some(TransactionStatus::MarkedRollback)
            }
            _ => None,
        })
    }

    fn suspend(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.transition(txn, "suspend", |status| match status {
            TransactionStatus::Active => Some(TransactionStatus::Suspended),
            TransactionStatus::MarkedRollback => Some(TransactionStatus::SuspendedMarkedRollback),
            _ => None,
        })
    }

    fn resume(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.transition(txn, "resume", |status| match status {
            TransactionStatus::Suspended => Some(TransactionStatus::Active),
            TransactionStatus::SuspendedMarkedRollback => Some(TransactionStatus::MarkedRollback),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_commit_updates_stats() {
        let coordinator = LocalCoordinator::new();
        let txn = coordinator.begin().unwrap();
        assert_eq!(coordinator.status(txn), Some(TransactionStatus::Active));
        assert_eq!(coordinator.stats().active, 1);

        coordinator.commit(txn).unwrap();
        assert!(coordinator.status(txn).is_none());
        assert_eq!(
            coordinator.stats(),
            CoordinatorStats {
                begun: 1,
                committed: 1,
                rolled_back: 0,
                active: 0,
            }
        );
    }

    #[test]
    fn ids_are_unique() {
        let coordinator = LocalCoordinator::new();
        let a = coordinator.begin().unwrap();
        let b = coordinator.begin().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn commit_of_rollback_only_rolls_back() {
        let coordinator = LocalCoordinator::new();
        let txn = coordinator.begin().unwrap();
        coordinator.set_rollback_only(txn).unwrap();

        assert_eq!(coordinator.commit(txn), Err(CoordinatorError::RolledBack(txn)));
        let stats = coordinator.stats();
        assert_eq!(stats.committed, 0);
        assert_eq!(stats.rolled_back, 1);
    }

    #[test]
    fn suspend_resume_preserves_rollback_mark() {
        let coordinator = LocalCoordinator::new();
        let txn = coordinator.begin().unwrap();
        coordinator.set_rollback_only(txn).unwrap();
        coordinator.suspend(txn).unwrap();
        assert_eq!(
            coordinator.status(txn),
            Some(TransactionStatus::SuspendedMarkedRollback)
        );
        coordinator.resume(txn).unwrap();
        assert_eq!(coordinator.status(txn), Some(TransactionStatus::MarkedRollback));
    }

    #[test]
    fn cannot_complete_suspended_transaction() {
        let coordinator = LocalCoordinator::new();
        let txn = coordinator.begin().unwrap();
        coordinator.suspend(txn).unwrap();

        assert!(matches!(
            coordinator.commit(txn),
            Err(CoordinatorError::InvalidState { operation: "commit", .. })
        ));
        assert!(matches!(
            coordinator.suspend(txn),
            Err(CoordinatorError::InvalidState { operation: "suspend", .. })
        ));
    }

    #[test]
    fn unknown_transaction_is_rejected() {
        let coordinator = LocalCoordinator::new();
        let ghost = TransactionId::new(99);
        assert_eq!(
            coordinator.rollback(ghost),
            Err(CoordinatorError::UnknownTransaction(ghost))
        );
        assert_eq!(
            coordinator.resume(ghost),
            Err(CoordinatorError::UnknownTransaction(ghost))
        );
    }
}
