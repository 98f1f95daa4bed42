//! Scoped demarcation: run a unit of work between `begin` and a guaranteed `end`.
//!
//! [`DemarcationGuard`] owns a begun handle and ends it with rollback when it is
//! dropped without an explicit verdict, which covers panics, early returns and
//! cancelled futures. [`demarcate`] and [`demarcate_async`] compute the verdict
//! strictly from whether the work returned `Ok`.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::context::TransactionContext;
use crate::coordinator::TransactionCoordinator;
use crate::demarcation::{Branch, TransactionDemarcation};
use crate::error::{DemarcationError, TransactionalError};
use crate::propagation::PropagationLevel;

/// A begun demarcation that is ended exactly once.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the transaction with rollback"]
pub struct DemarcationGuard {
    handle: TransactionDemarcation,
    finished: bool,
}

impl DemarcationGuard {
    /// Begins a scope and returns the guard that will end it.
    ///
    /// # Errors
    ///
    /// Propagates the `begin` failure; nothing needs ending in that case.
    pub fn begin(
        coordinator: Arc<dyn TransactionCoordinator>,
        ctx: &TransactionContext,
        level: PropagationLevel,
    ) -> Result<Self, DemarcationError> {
        let mut handle = TransactionDemarcation::new();
        handle.begin(coordinator, ctx, level)?;
        Ok(Self {
            handle,
            finished: false,
        })
    }

    #[must_use]
    pub fn branch(&self) -> Option<Branch> {
        self.handle.branch()
    }

    /// Ends the scope with an explicit verdict.
    ///
    /// # Errors
    ///
    /// Returns the `end` failure reported by the demarcation handle.
    pub fn finish(mut self, success: bool) -> Result<(), DemarcationError> {
        self.finished = true;
        self.handle.end(success)
    }
}

impl Drop for DemarcationGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("transaction scope abandoned, ending with rollback");
        if let Err(e) = self.handle.end(false) {
            warn!(error = %e, "failed to end abandoned transaction scope");
        }
    }
}

/// Runs `work` inside a demarcated scope on `ctx`.
///
/// # Errors
///
/// - `TransactionalError::Begin` if the scope could not begin (work not run)
/// - `TransactionalError::Work` if the work failed (scope ended with rollback)
/// - `TransactionalError::End` / `WorkAndEnd` if ending the scope failed
pub fn demarcate<T, E, F>(
    coordinator: Arc<dyn TransactionCoordinator>,
    ctx: &TransactionContext,
    level: PropagationLevel,
    work: F,
) -> Result<T, TransactionalError<E>>
where
    F: FnOnce(&TransactionContext) -> Result<T, E>,
{
    let guard =
        DemarcationGuard::begin(coordinator, ctx, level).map_err(TransactionalError::Begin)?;
    let outcome = work(ctx);
    settle(guard, outcome)
}

/// Async counterpart of [`demarcate`]. The work receives its own clone of the context.
///
/// If the returned future is dropped before completion the scope still ends
/// with rollback.
///
/// # Errors
///
/// Same as [`demarcate`].
pub async fn demarcate_async<T, E, F, Fut>(
    coordinator: Arc<dyn TransactionCoordinator>,
    ctx: &TransactionContext,
    level: PropagationLevel,
    work: F,
) -> Result<T, TransactionalError<E>>
where
    F: FnOnce(TransactionContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let guard =
        DemarcationGuard::begin(coordinator, ctx, level).map_err(TransactionalError::Begin)?;
    let outcome = work(ctx.clone()).await;
    settle(guard, outcome)
}

pub(crate) fn settle<T, E>(
    guard: DemarcationGuard,
    outcome: Result<T, E>,
) -> Result<T, TransactionalError<E>> {
    match outcome {
        Ok(value) => guard
            .finish(true)
            .map(|()| value)
            .map_err(TransactionalError::End),
        Err(work) => match guard.finish(false) {
            Ok(()) => Err(TransactionalError::Work(work)),
            Err(end) => Err(TransactionalError::WorkAndEnd { work, end }),
        },
    }
}
