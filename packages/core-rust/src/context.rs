use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::coordinator::TransactionId;

/// Ambient transaction state for one logical call chain.
///
/// Passed explicitly down the chain instead of living in thread-local storage.
/// Clones share the same chain, so a handler that receives a clone observes the
/// transaction an enclosing boundary began. Each concurrent unit of work must
/// start from its own context; only the demarcation engine mutates it.
#[derive(Clone, Default)]
pub struct TransactionContext {
    ambient: Arc<Mutex<Option<TransactionId>>>,
}

impl TransactionContext {
    /// A call chain with no active transaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The transaction currently active in this chain, if any.
    #[must_use]
    pub fn current(&self) -> Option<TransactionId> {
        *self.ambient.lock()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn replace(&self, txn: Option<TransactionId>) -> Option<TransactionId> {
        std::mem::replace(&mut *self.ambient.lock(), txn)
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("ambient", &self.current())
            .finish()
    }
}
