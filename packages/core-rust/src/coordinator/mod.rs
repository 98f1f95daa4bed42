//! The external transaction coordinator seam.
//!
//! The demarcation engine never implements transactions itself. It drives a
//! [`TransactionCoordinator`] located by name through a component resolver.
//! [`LocalCoordinator`] is an in-process implementation for embedding and tests.

pub mod local;

use std::fmt;

use crate::error::CoordinatorError;

pub use local::{CoordinatorStats, LocalCoordinator, TransactionStatus};

/// Opaque identifier of a transaction issued by a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Primitive operations the demarcation engine issues against a coordinator.
///
/// Implementations are shared across concurrent units of work and must
/// serialize internally. Ambient-transaction bookkeeping lives in the caller's
/// [`TransactionContext`](crate::TransactionContext); `suspend` and `resume`
/// notify the coordinator so it can detach and reattach enlisted resources.
pub trait TransactionCoordinator: Send + Sync {
    /// Start a new top-level transaction.
    fn begin(&self) -> Result<TransactionId, CoordinatorError>;

    /// Commit a transaction this caller started.
    fn commit(&self, txn: TransactionId) -> Result<(), CoordinatorError>;

    /// Roll back a transaction this caller started.
    fn rollback(&self, txn: TransactionId) -> Result<(), CoordinatorError>;

    /// Doom a transaction owned by someone else so its eventual commit rolls back.
    fn set_rollback_only(&self, txn: TransactionId) -> Result<(), CoordinatorError>;

    /// Detach a transaction from the current call chain.
    fn suspend(&self, txn: TransactionId) -> Result<(), CoordinatorError>;

    /// Reattach a previously suspended transaction.
    fn resume(&self, txn: TransactionId) -> Result<(), CoordinatorError>;
}
