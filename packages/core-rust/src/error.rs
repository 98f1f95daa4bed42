//! Error taxonomy for component resolution and transaction demarcation.

use crate::coordinator::TransactionId;

/// Caller-configuration defects. Fatal: never retried, surfaced at startup or first use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no component name set")]
    MissingComponentName,
    #[error("invalid component name {name:?}: {reason}")]
    InvalidComponentName { name: String, reason: &'static str },
    #[error("unknown propagation level: {value:?}")]
    InvalidPropagationLevel { value: String },
    #[error("unknown propagation code: {code}")]
    InvalidPropagationCode { code: i32 },
    #[error("invalid HTTP method: {value:?}")]
    InvalidHttpMethod { value: String },
    #[error("invalid value for {key}: {value:?}")]
    InvalidParameter { key: &'static str, value: String },
}

/// Failure to locate a component at call time.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The context or directory was reachable but holds nothing under the name.
    #[error("component {name} could not be resolved")]
    NotFound { name: String },
    /// Ambient-context resolution was attempted outside any execution context.
    #[error("no execution context available to resolve {name}")]
    NoExecutionContext { name: String },
    /// The lookup mechanism itself failed.
    #[error("lookup of component {name} failed")]
    Lookup {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    /// A component was found but is not of the requested type.
    #[error("component {name} is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// Errors reported by a [`TransactionCoordinator`](crate::TransactionCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    #[error("transaction {txn} cannot {operation} while {status}")]
    InvalidState {
        txn: TransactionId,
        operation: &'static str,
        status: &'static str,
    },
    #[error("transaction {0} was marked rollback-only and has been rolled back")]
    RolledBack(TransactionId),
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),
}

/// Begin/end protocol violations and coordinator rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DemarcationError {
    #[error("propagation MANDATORY requires an active transaction")]
    NoAmbientTransaction,
    #[error("propagation NEVER forbids the active transaction {0}")]
    UnexpectedAmbientTransaction(TransactionId),
    #[error("demarcation handle cannot be begun twice")]
    HandleReused,
    #[error("demarcation handle was never begun")]
    NotBegun,
    #[error("demarcation handle was already ended")]
    AlreadyEnded,
    #[error("coordinator failed to {operation}")]
    Coordinator {
        operation: &'static str,
        #[source]
        source: CoordinatorError,
    },
}

impl DemarcationError {
    pub(crate) fn coordinator(operation: &'static str) -> impl FnOnce(CoordinatorError) -> Self {
        move |source| Self::Coordinator { operation, source }
    }
}

/// Outcome of running a unit of work inside a demarcated scope.
///
/// `E` is the wrapped work's own error type; it is carried untouched so the
/// caller still sees the original failure.
#[derive(Debug, thiserror::Error)]
pub enum TransactionalError<E> {
    /// The coordinator could not be located; the work did not run.
    #[error("transaction coordinator unavailable")]
    Unresolved(#[source] ResolveError),
    /// `begin` failed; the work did not run.
    #[error("failed to begin transaction")]
    Begin(#[source] DemarcationError),
    /// The work failed; the transaction was ended with rollback.
    #[error("transactional work failed")]
    Work(#[source] E),
    /// The work succeeded but ending the transaction failed.
    #[error("failed to end transaction")]
    End(#[source] DemarcationError),
    /// The work failed and ending the transaction failed too.
    #[error("transactional work failed and the transaction could not be ended: {end}")]
    WorkAndEnd {
        #[source]
        work: E,
        end: DemarcationError,
    },
}

impl<E> TransactionalError<E> {
    /// Returns the wrapped work's error, if the work ran and failed.
    pub fn into_work_error(self) -> Option<E> {
        match self {
            Self::Work(e) | Self::WorkAndEnd { work: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Returns the demarcation failure, if begin or end failed.
    pub fn demarcation_error(&self) -> Option<&DemarcationError> {
        match self {
            Self::Begin(e) | Self::End(e) | Self::WorkAndEnd { end: e, .. } => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_error_is_recoverable_from_wrapper() {
        let err: TransactionalError<&str> = TransactionalError::WorkAndEnd {
            work: "boom",
            end: DemarcationError::AlreadyEnded,
        };
        assert_eq!(err.demarcation_error(), Some(&DemarcationError::AlreadyEnded));
        assert_eq!(err.into_work_error(), Some("boom"));
    }

    #[test]
    fn begin_failure_carries_no_work_error() {
        let err: TransactionalError<&str> =
            TransactionalError::Begin(DemarcationError::NoAmbientTransaction);
        assert!(err.demarcation_error().is_some());
        assert!(err.into_work_error().is_none());
    }

    #[test]
    fn coordinator_error_keeps_source() {
        let err = DemarcationError::coordinator("commit")(CoordinatorError::RolledBack(
            TransactionId::new(7),
        ));
        assert_eq!(err.to_string(), "coordinator failed to commit");
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("txn-7"));
    }
}
