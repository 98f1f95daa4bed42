//! The begin/end demarcation protocol.
//!
//! A [`TransactionDemarcation`] is a single-use handle moving through
//! `Created -> Begun -> Ended`. `begin` consults the propagation policy, issues
//! the coordinator primitives for the chosen branch and records that branch;
//! `end` completes the branch with a commit/rollback verdict and restores any
//! suspended ambient transaction.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::TransactionContext;
use crate::coordinator::{TransactionCoordinator, TransactionId};
use crate::error::DemarcationError;
use crate::propagation::{BeginPlan, PolicyViolation, PropagationLevel};

/// Lifecycle state of a demarcation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemarcationState {
    Created,
    Begun,
    Ended,
}

/// The branch `begin` took, needed by `end` to complete the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Participating in a transaction owned by an enclosing boundary.
    Joined(TransactionId),
    /// Owns a transaction it started, with the ambient one it suspended, if any.
    Started {
        txn: TransactionId,
        suspended: Option<TransactionId>,
    },
    /// Running without a transaction after suspending the ambient one.
    Suspended(TransactionId),
    /// Running without a transaction; nothing to undo.
    NoTransaction,
}

struct Active {
    coordinator: Arc<dyn TransactionCoordinator>,
    ctx: TransactionContext,
    branch: Branch,
}

/// One begin/end demarcation scope. Not reentrant.
pub struct TransactionDemarcation {
    state: DemarcationState,
    level: Option<PropagationLevel>,
    active: Option<Active>,
}

impl TransactionDemarcation {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DemarcationState::Created,
            level: None,
            active: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> DemarcationState {
        self.state
    }

    /// Branch recorded by a successful `begin`.
    #[must_use]
    pub fn branch(&self) -> Option<Branch> {
        self.active.as_ref().map(|active| active.branch)
    }

    /// Begins a scope on `ctx` according to `level`.
    ///
    /// On failure the handle and the context are left as they were, except that
    /// a handle can never be begun twice.
    ///
    /// # Errors
    ///
    /// - `HandleReused` if this handle was already begun
    /// - `NoAmbientTransaction` / `UnexpectedAmbientTransaction` for policy violations
    /// - `Coordinator` if the coordinator rejects a primitive
    pub fn begin(
        &mut self,
        coordinator: Arc<dyn TransactionCoordinator>,
        ctx: &TransactionContext,
        level: PropagationLevel,
    ) -> Result<(), DemarcationError> {
        if self.state != DemarcationState::Created || self.level.is_some() {
            return Err(DemarcationError::HandleReused);
        }
        self.level = Some(level);

        let ambient = ctx.current();
        let plan = match (level.plan(ambient.is_some()), ambient) {
            (Ok(plan), _) => plan,
            (Err(PolicyViolation::UnexpectedAmbientTransaction), Some(txn)) => {
                return Err(DemarcationError::UnexpectedAmbientTransaction(txn));
            }
            (Err(_), _) => return Err(DemarcationError::NoAmbientTransaction),
        };

        let branch = match (plan, ambient) {
            (BeginPlan::JoinAmbient, Some(txn)) => Branch::Joined(txn),
            (BeginPlan::StartNew, _) => {
                let txn = coordinator
                    .begin()
                    .map_err(DemarcationError::coordinator("begin"))?;
                ctx.replace(Some(txn));
                Branch::Started { txn, suspended: None }
            }
            (BeginPlan::SuspendAndStartNew, Some(outer)) => {
                coordinator
                    .suspend(outer)
                    .map_err(DemarcationError::coordinator("suspend"))?;
                ctx.replace(None);
                match coordinator.begin() {
                    Ok(txn) => {
                        ctx.replace(Some(txn));
                        Branch::Started {
                            txn,
                            suspended: Some(outer),
                        }
                    }
                    Err(source) => {
                        if let Err(e) = coordinator.resume(outer) {
                            tracing::warn!(txn = %outer, error = %e, "failed to resume after rejected begin");
                        }
                        ctx.replace(Some(outer));
                        return Err(DemarcationError::Coordinator {
                            operation: "begin",
                            source,
                        });
                    }
                }
            }
            (BeginPlan::SuspendAndRunWithout, Some(outer)) => {
                coordinator
                    .suspend(outer)
                    .map_err(DemarcationError::coordinator("suspend"))?;
                ctx.replace(None);
                Branch::Suspended(outer)
            }
            (BeginPlan::RunWithout, _) => Branch::NoTransaction,
            // Plans that need an ambient transaction are only produced when one exists.
            (
                BeginPlan::JoinAmbient
                | BeginPlan::SuspendAndStartNew
                | BeginPlan::SuspendAndRunWithout,
                None,
            ) => Branch::NoTransaction,
        };

        debug!(propagation = %level, ?branch, "transaction demarcation begun");
        self.active = Some(Active {
            coordinator,
            ctx: ctx.clone(),
            branch,
        });
        self.state = DemarcationState::Begun;
        Ok(())
    }

    /// Ends the scope with the unit of work's verdict.
    ///
    /// The handle is `Ended` after this call whether or not the coordinator
    /// accepted the completion.
    ///
    /// # Errors
    ///
    /// - `NotBegun` if `begin` never succeeded on this handle
    /// - `AlreadyEnded` on a second call
    /// - `Coordinator` if commit, rollback, rollback marking, or resume fails;
    ///   the first failure is reported and a suspended transaction is still resumed
    pub fn end(&mut self, success: bool) -> Result<(), DemarcationError> {
        match self.state {
            DemarcationState::Created => return Err(DemarcationError::NotBegun),
            DemarcationState::Ended => return Err(DemarcationError::AlreadyEnded),
            DemarcationState::Begun => {}
        }
        self.state = DemarcationState::Ended;
        let Some(active) = self.active.take() else {
            return Err(DemarcationError::NotBegun);
        };
        let Active {
            coordinator,
            ctx,
            branch,
        } = active;

        debug!(success, ?branch, "ending transaction demarcation");
        match branch {
            Branch::Joined(txn) => {
                if success {
                    Ok(())
                } else {
                    coordinator
                        .set_rollback_only(txn)
                        .map_err(DemarcationError::coordinator("mark rollback-only"))
                }
            }
            Branch::Started { txn, suspended } => {
                ctx.replace(None);
                let completed = if success {
                    coordinator
                        .commit(txn)
                        .map_err(DemarcationError::coordinator("commit"))
                } else {
                    coordinator
                        .rollback(txn)
                        .map_err(DemarcationError::coordinator("roll back"))
                };
                let resumed = match suspended {
                    Some(outer) => resume(coordinator.as_ref(), &ctx, outer),
                    None => Ok(()),
                };
                completed.and(resumed)
            }
            Branch::Suspended(outer) => resume(coordinator.as_ref(), &ctx, outer),
            Branch::NoTransaction => Ok(()),
        }
    }
}

fn resume(
    coordinator: &dyn TransactionCoordinator,
    ctx: &TransactionContext,
    outer: TransactionId,
) -> Result<(), DemarcationError> {
    let result = coordinator
        .resume(outer)
        .map_err(DemarcationError::coordinator("resume"));
    ctx.replace(Some(outer));
    result
}

impl Default for TransactionDemarcation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionDemarcation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionDemarcation")
            .field("state", &self.state)
            .field("level", &self.level)
            .field("branch", &self.branch())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;
    use crate::coordinator::LocalCoordinator;
    use crate::error::CoordinatorError;

    /// Coordinator that records every primitive in call order.
    #[derive(Default)]
    pub(crate) struct RecordingCoordinator {
        pub(crate) log: Mutex<Vec<String>>,
        pub(crate) next: Mutex<u64>,
        pub(crate) fail_begin: bool,
        pub(crate) fail_commit: bool,
    }

    impl RecordingCoordinator {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.log.lock().clone()
        }

        pub(crate) fn count(&self, prefix: &str) -> usize {
            self.log.lock().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl TransactionCoordinator for RecordingCoordinator {
        fn begin(&self) -> Result<TransactionId, CoordinatorError> {
            if self.fail_begin {
                self.log.lock().push("begin:rejected".to_string());
                return Err(CoordinatorError::Unavailable("begin refused".to_string()));
            }
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
                Err(CoordinatorError::RolledBack(txn))
            } else {
                Ok(())
            }
        }

        fn rollback(&self, txn: TransactionId) -> Result<(), CoordinatorError> {
            self.log.lock().push(format!("rollback:{}", txn.get()));
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

    /// Context already carrying transaction 100, as if an outer boundary began it.
    fn ambient_ctx() -> TransactionContext {
        let ctx = TransactionContext::new();
        ctx.replace(Some(TransactionId::new(100)));
        ctx
    }

    #[test]
    fn starting_levels_commit_once_without_resume() {
        for level in [PropagationLevel::Required, PropagationLevel::RequiresNew] {
            let coordinator = Arc::new(RecordingCoordinator::default());
            let ctx = TransactionContext::new();
            let mut td = TransactionDemarcation::new();
            td.begin(coordinator.clone(), &ctx, level).unwrap();
            assert!(ctx.is_active());
            td.end(true).unwrap();

            assert_eq!(coordinator.count("commit"), 1, "{level}");
            assert_eq!(coordinator.count("resume"), 0, "{level}");
            assert!(!ctx.is_active());
        }
    }

    #[test]
    fn non_transactional_levels_issue_no_completion() {
        for level in [
            PropagationLevel::Supports,
            PropagationLevel::NotSupported,
            PropagationLevel::Never,
        ] {
            let coordinator = Arc::new(RecordingCoordinator::default());
            let ctx = TransactionContext::new();
            let mut td = TransactionDemarcation::new();
            td.begin(coordinator.clone(), &ctx, level).unwrap();
            assert_eq!(td.branch(), Some(Branch::NoTransaction));
            td.end(true).unwrap();
            assert!(coordinator.calls().is_empty(), "{level}");
        }
    }

    #[test]
    fn mandatory_without_ambient_fails() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mut td = TransactionDemarcation::new();
        let err = td
            .begin(coordinator.clone(), &TransactionContext::new(), PropagationLevel::Mandatory)
            .unwrap_err();
        assert_eq!(err, DemarcationError::NoAmbientTransaction);
        assert_eq!(td.state(), DemarcationState::Created);
        assert_eq!(td.end(false), Err(DemarcationError::NotBegun));
        assert!(coordinator.calls().is_empty());
    }

    #[test]
    fn never_with_ambient_fails() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mut td = TransactionDemarcation::new();
        let err = td
            .begin(coordinator, &ambient_ctx(), PropagationLevel::Never)
            .unwrap_err();
        assert_eq!(
            err,
            DemarcationError::UnexpectedAmbientTransaction(TransactionId::new(100))
        );
    }

    #[test]
    fn requires_new_suspends_then_resumes_in_order() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::RequiresNew)
            .unwrap();
        assert_eq!(ctx.current(), Some(TransactionId::new(1)));
        td.end(true).unwrap();

        assert_eq!(
            coordinator.calls(),
            vec!["suspend:100", "begin:1", "commit:1", "resume:100"]
        );
        assert_eq!(ctx.current(), Some(TransactionId::new(100)));
    }

    #[test]
    fn requires_new_failure_rolls_back_inner_only() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::RequiresNew)
            .unwrap();
        td.end(false).unwrap();

        assert_eq!(
            coordinator.calls(),
            vec!["suspend:100", "begin:1", "rollback:1", "resume:100"]
        );
    }

    #[test]
    fn rejected_begin_after_suspend_restores_ambient() {
        let coordinator = Arc::new(RecordingCoordinator {
            fail_begin: true,
            ..RecordingCoordinator::default()
        });
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        let err = td
            .begin(coordinator.clone(), &ctx, PropagationLevel::RequiresNew)
            .unwrap_err();

        assert!(matches!(err, DemarcationError::Coordinator { operation: "begin", .. }));
        assert_eq!(
            coordinator.calls(),
            vec!["suspend:100", "begin:rejected", "resume:100"]
        );
        assert_eq!(ctx.current(), Some(TransactionId::new(100)));
    }

    #[test]
    fn joined_failure_marks_rollback_only() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::Required)
            .unwrap();
        assert_eq!(td.branch(), Some(Branch::Joined(TransactionId::new(100))));
        td.end(false).unwrap();

        assert_eq!(coordinator.calls(), vec!["rollback-only:100"]);
        assert_eq!(ctx.current(), Some(TransactionId::new(100)));
    }

    #[test]
    fn joined_success_touches_nothing() {
        for level in [
            PropagationLevel::Required,
            PropagationLevel::Mandatory,
            PropagationLevel::Supports,
        ] {
            let coordinator = Arc::new(RecordingCoordinator::default());
            let mut td = TransactionDemarcation::new();
            td.begin(coordinator.clone(), &ambient_ctx(), level).unwrap();
            td.end(true).unwrap();
            assert!(coordinator.calls().is_empty(), "{level}");
        }
    }

    #[test]
    fn not_supported_suspends_and_resumes() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::NotSupported)
            .unwrap();
        assert!(!ctx.is_active());
        td.end(false).unwrap();

        assert_eq!(coordinator.calls(), vec!["suspend:100", "resume:100"]);
        assert_eq!(ctx.current(), Some(TransactionId::new(100)));
    }

    #[test]
    fn double_end_is_rejected() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &TransactionContext::new(), PropagationLevel::Required)
            .unwrap();
        td.end(true).unwrap();
        assert_eq!(td.end(true), Err(DemarcationError::AlreadyEnded));
        assert_eq!(coordinator.count("commit"), 1);
    }

    #[test]
    fn handle_cannot_be_begun_twice() {
        let coordinator = Arc::new(RecordingCoordinator::default());
        let ctx = TransactionContext::new();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::Supports)
            .unwrap();
        td.end(true).unwrap();
        assert_eq!(
            td.begin(coordinator, &ctx, PropagationLevel::Supports),
            Err(DemarcationError::HandleReused)
        );
    }

    #[test]
    fn failed_commit_still_resumes_and_reports_commit() {
        let coordinator = Arc::new(RecordingCoordinator {
            fail_commit: true,
            ..RecordingCoordinator::default()
        });
        let ctx = ambient_ctx();
        let mut td = TransactionDemarcation::new();
        td.begin(coordinator.clone(), &ctx, PropagationLevel::RequiresNew)
            .unwrap();
        let err = td.end(true).unwrap_err();

        assert!(matches!(err, DemarcationError::Coordinator { operation: "commit", .. }));
        assert_eq!(coordinator.count("resume:100"), 1);
        assert_eq!(td.state(), DemarcationState::Ended);
    }

    #[test]
    fn inner_rollback_dooms_outer_commit() {
        let coordinator: Arc<LocalCoordinator> = Arc::new(LocalCoordinator::new());
        let ctx = TransactionContext::new();

        let mut outer = TransactionDemarcation::new();
        outer
            .begin(coordinator.clone(), &ctx, PropagationLevel::Required)
            .unwrap();
        let mut inner = TransactionDemarcation::new();
        inner
            .begin(coordinator.clone(), &ctx, PropagationLevel::Required)
            .unwrap();
        inner.end(false).unwrap();

        let err = outer.end(true).unwrap_err();
        assert!(matches!(
            err,
            DemarcationError::Coordinator {
                source: CoordinatorError::RolledBack(_),
                ..
            }
        ));
        assert_eq!(coordinator.stats().rolled_back, 1);
        assert!(!ctx.is_active());
    }

    fn level_strategy() -> impl Strategy<Value = PropagationLevel> {
        prop::sample::select(PropagationLevel::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn nested_scopes_restore_ambient_state(
            levels in prop::collection::vec(level_strategy(), 1..8),
            outcomes in prop::collection::vec(any::<bool>(), 8),
        ) {
            let coordinator = Arc::new(LocalCoordinator::new());
            let ctx = TransactionContext::new();
            let mut stack = Vec::new();

            for level in levels {
                let before = ctx.current();
                let mut td = TransactionDemarcation::new();
                if td.begin(coordinator.clone(), &ctx, level).is_ok() {
                    stack.push((td, before));
                } else {
                    prop_assert_eq!(ctx.current(), before);
                }
            }

            for (depth, (mut td, before)) in stack.into_iter().enumerate().rev() {
                // Commit failures from doomed transactions are expected here.
                let _ = td.end(outcomes[depth]);
                prop_assert_eq!(ctx.current(), before);
            }

            prop_assert!(!ctx.is_active());
            prop_assert_eq!(coordinator.stats().active, 0);
        }
    }
}
