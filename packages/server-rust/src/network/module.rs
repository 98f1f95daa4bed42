//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles state, `start()` binds the TCP listener, and `serve()`
//! accepts connections until shutdown. Binding before serving lets the
//! caller learn an OS-assigned port first.

use std::convert::Infallible;
use std::future::Future;

use anyhow::anyhow;
use axum::error_handling::HandleErrorLayer;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{health_handler, probe_handler, stats_handler, AppState};
use super::middleware::build_http_layers;
use crate::filter::{transaction_error_response, TransactionLayer};

/// Owns the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    state: AppState,
    transactions: TransactionLayer,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, state: AppState, transactions: TransactionLayer) -> Self {
        Self {
            config,
            state,
            transactions,
            listener: None,
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- process health JSON
    /// - `GET /transactions/stats` -- coordinator counters
    /// - `POST /probe` -- nested method-level demarcation
    ///
    /// Every route sits behind the transaction layer; which requests it
    /// demarcates depends only on the configured methods.
    pub fn build_router(&self) -> Router {
        let transactions = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(transaction_error_response::<Infallible>))
            .layer(self.transactions.clone());

        Router::new()
            .route("/health", get(health_handler))
            .route("/transactions/stats", get(stats_handler))
            .route("/probe", post(probe_handler))
            .layer(transactions)
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then lets in-flight
    /// requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        info!("Serving HTTP connections");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Server stopped");
        Ok(())
    }
}
