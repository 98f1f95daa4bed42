//! Transaction statistics and the nested-demarcation probe.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use demarcate_core::coordinator::CoordinatorStats;
use demarcate_core::{PropagationLevel, TransactionAttribute, TransactionContext, TransactionalError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;

/// Counters of the in-process coordinator.
pub async fn stats_handler(State(state): State<AppState>) -> Json<CoordinatorStats> {
    Json(state.coordinator.stats())
}

/// Body of `POST /probe`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ProbeRequest {
    /// Propagation level of the nested method-level boundary.
    pub propagation: PropagationLevel,
    /// Make the nested unit of work fail.
    pub fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Transaction active for the request when the handler started.
    pub request_transaction: Option<String>,
    /// Transaction the nested call ran in.
    pub call_transaction: Option<String>,
    /// Whether the nested call ran in the request's transaction.
    pub joined: bool,
}

/// Runs a nested method-level demarcation on the request's call chain.
///
/// Under the transaction layer the request context arrives in the extensions,
/// so a REQUIRED probe joins the request transaction. A failing probe dooms
/// that transaction; the layer's commit then fails.
pub async fn probe_handler(
    State(state): State<AppState>,
    ctx: Option<Extension<TransactionContext>>,
    Json(probe): Json<ProbeRequest>,
) -> Response {
    let ctx = ctx.map(|Extension(ctx)| ctx).unwrap_or_default();
    let request_txn = ctx.current();

    let result = state.interceptor.invoke(
        TransactionAttribute::new(probe.propagation),
        &ctx,
        |inner| {
            if probe.fail {
                Err("probe failed on request")
            } else {
                Ok(inner.current())
            }
        },
    );

    match result {
        Ok(call_txn) => {
            debug!(?request_txn, ?call_txn, "probe completed");
            Json(ProbeResponse {
                request_transaction: request_txn.map(|t| t.to_string()),
                call_transaction: call_txn.map(|t| t.to_string()),
                joined: request_txn.is_some() && request_txn == call_txn,
            })
            .into_response()
        }
        Err(TransactionalError::Begin(e)) => (StatusCode::CONFLICT, e.to_string()).into_response(),
        Err(TransactionalError::Work(msg)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
