//! Tower layer that runs selected HTTP requests inside a transaction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{Request, Response, StatusCode};
use demarcate_core::{
    resolve_coordinator, ComponentDirectory, DemarcationGuard, DirectoryResolver,
    TransactionContext, TransactionCoordinator,
};
use tower::{Layer, Service};
use tracing::{debug, error, info, info_span, Instrument};

use super::config::TransactionFilterConfig;
use super::error::{FilterInitError, TransactionFilterError};

struct FilterState {
    config: TransactionFilterConfig,
    coordinator: Arc<dyn TransactionCoordinator>,
}

// ---------------------------------------------------------------------------
// TransactionLayer
// ---------------------------------------------------------------------------

/// Demarcates every request whose method is in the configured set.
///
/// The coordinator is resolved once, when the layer is built; a missing
/// coordinator is a startup failure, not a per-request one.
#[derive(Clone)]
pub struct TransactionLayer {
    state: Arc<FilterState>,
}

impl TransactionLayer {
    /// Resolves the coordinator named in `config` from `directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilterInitError::Unresolved` if the coordinator is not bound or
    /// the bound component is not a coordinator.
    pub fn new(
        config: TransactionFilterConfig,
        directory: Arc<dyn ComponentDirectory>,
    ) -> Result<Self, FilterInitError> {
        let resolver = DirectoryResolver::new(directory, config.coordinator_name.clone());
        let coordinator = resolve_coordinator(&resolver)?;
        Ok(Self::with_coordinator(config, coordinator))
    }

    /// Uses an already located coordinator.
    #[must_use]
    pub fn with_coordinator(
        config: TransactionFilterConfig,
        coordinator: Arc<dyn TransactionCoordinator>,
    ) -> Self {
        info!(
            methods = ?config.method_names(),
            propagation = %config.propagation,
            coordinator = %config.coordinator_name,
            rollback_on_server_error = config.rollback_on_server_error,
            "transaction filter initialized"
        );
        Self {
            state: Arc::new(FilterState {
                config,
                coordinator,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransactionFilterConfig {
        &self.state.config
    }
}

impl<S> Layer<S> for TransactionLayer {
    type Service = TransactionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TransactionService {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionService
// ---------------------------------------------------------------------------

/// Service produced by [`TransactionLayer`].
///
/// A demarcated request carries a [`TransactionContext`] in its extensions so
/// handlers can nest method-level demarcation on the same call chain. A context
/// already present in the extensions is reused.
#[derive(Clone)]
pub struct TransactionService<S> {
    inner: S,
    state: Arc<FilterState>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TransactionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = TransactionFilterError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(TransactionFilterError::Inner)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        if !self.state.config.requires_transaction(req.method()) {
            debug!(method = %req.method(), "request not demarcated");
            let fut = self.inner.call(req);
            return Box::pin(async move { fut.await.map_err(TransactionFilterError::Inner) });
        }

        let ctx = req
            .extensions()
            .get::<TransactionContext>()
            .cloned()
            .unwrap_or_default();
        req.extensions_mut().insert(ctx.clone());

        // The clone left behind has not been polled ready; the ready one goes with this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);

        let span = info_span!(
            "transaction",
            method = %req.method(),
            uri = %req.uri(),
            propagation = %state.config.propagation,
            outcome = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let guard = match DemarcationGuard::begin(
                    Arc::clone(&state.coordinator),
                    &ctx,
                    state.config.propagation,
                ) {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!(error = %e, "failed to begin request transaction");
                        tracing::Span::current().record("outcome", "not_begun");
                        return Ok(unavailable());
                    }
                };

                let result = inner.call(req).await;
                let success = match &result {
                    Ok(response) => {
                        !(state.config.rollback_on_server_error
                            && response.status().is_server_error())
                    }
                    Err(_) => false,
                };
                let ended = guard.finish(success);

                let outcome = match (&ended, success) {
                    (Err(_), _) => "end_failed",
                    (Ok(()), true) => "completed",
                    (Ok(()), false) => "rolled_back",
                };
                tracing::Span::current().record("outcome", outcome);

                match (result, ended) {
                    (Ok(response), Ok(())) => Ok(response),
                    (Ok(_), Err(end)) => {
                        error!(error = %end, "failed to end request transaction");
                        Err(TransactionFilterError::End(end))
                    }
                    (Err(inner), Ok(())) => Err(TransactionFilterError::Inner(inner)),
                    (Err(inner), Err(end)) => {
                        error!(error = %end, "failed to end request transaction after handler error");
                        Err(TransactionFilterError::InnerAndEnd { inner, end })
                    }
                }
            }
            .instrument(span),
        )
    }
}

fn unavailable<B: Default>() -> Response<B> {
    let mut response = Response::new(B::default());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}
