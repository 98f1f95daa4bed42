use demarcate_core::{CoordinatorError, TransactionCoordinator, TransactionId};
use parking_lot::Mutex;

/// Coordinator that records every primitive in call order.
#[derive(Default)]
pub(crate) struct RecordingCoordinator {
    pub(crate) log: Mutex<Vec<String>>,
    pub(crate) next: Mutex<u64>,
    pub(crate) fail_commit: bool,
    pub(crate) fail_rollback: bool,
}

impl RecordingCoordinator {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl TransactionCoordinator for RecordingCoordinator {
    fn begin(&self) -> Result<TransactionId, CoordinatorError> {
        let id = {
            let mut next = self.next.lock();
            *next += 1;
            *next
        };
        self.log.lock().push(format!("begin:{id}"));
        Ok(TransactionId::new(id))
    }

    fn commit(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.log.lock().push(format!("commit:{}", txn.get()));
        if self.fail_commit {
            return Err(CoordinatorError::RolledBack(txn));
        }
        Ok(())
    }

    fn rollback(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.log.lock().push(format!("rollback:{}", txn.get()));
        if self.fail_rollback {
            return Err(CoordinatorError::Unavailable("rollback refused".to_string()));
        }
        Ok(())
    }

    fn set_rollback_only(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.log.lock().push(format!("rollback-only:{}", txn.get()));
        Ok(())
    }

    fn suspend(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.log.lock().push(format!("suspend:{}", txn.get()));
        Ok(())
    }

    fn resume(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
        self.log.lock().push(format!("resume:{}", txn.get()));
        Ok(())
    }
}
