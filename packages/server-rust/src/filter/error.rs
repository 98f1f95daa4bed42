use std::fmt;

use axum::http::StatusCode;
use demarcate_core::{ConfigurationError, DemarcationError, ResolveError};
use tracing::error;

/// Startup failures of the transaction filter. Any of these must abort startup.
#[derive(Debug, thiserror::Error)]
pub enum FilterInitError {
    #[error("invalid transaction filter configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("transaction coordinator could not be resolved: {0}")]
    Unresolved(#[from] ResolveError),
}

/// Failure of a demarcated request.
///
/// The inner service's own error is always carried unchanged; an `end` failure
/// is reported alongside it rather than replacing it.
#[derive(Debug, thiserror::Error)]
pub enum TransactionFilterError<E> {
    #[error("request handler failed: {0}")]
    Inner(E),

    #[error("request transaction could not be ended: {0}")]
    End(#[source] DemarcationError),

    #[error("request handler failed ({inner}) and its transaction could not be ended: {end}")]
    InnerAndEnd { inner: E, end: DemarcationError },
}

impl<E> TransactionFilterError<E> {
    /// The inner service's error, if the handler failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(inner) | Self::InnerAndEnd { inner, .. } => Some(inner),
            Self::End(_) => None,
        }
    }

    #[must_use]
    pub fn end_error(&self) -> Option<&DemarcationError> {
        match self {
            Self::End(end) | Self::InnerAndEnd { end, .. } => Some(end),
            Self::Inner(_) => None,
        }
    }
}

/// Converts a filter error into a response, for use with axum's
/// `HandleErrorLayer`.
pub async fn transaction_error_response<E: fmt::Display>(
    err: TransactionFilterError<E>,
) -> (StatusCode, String) {
    error!(error = %err, "demarcated request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "transaction failed".to_string(),
    )
}
