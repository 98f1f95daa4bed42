//! HTTP handler definitions for the demarcate server.

pub mod health;
pub mod transactions;

pub use health::health_handler;
pub use transactions::{probe_handler, stats_handler, ProbeRequest, ProbeResponse};

use std::sync::Arc;
use std::time::Instant;

use demarcate_core::{
    ComponentDirectory, ComponentName, ConfigurationError, LocalCoordinator, TransactionInterceptor,
};

/// Shared application state passed to all axum handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// The coordinator bound into the directory, kept for its counters.
    pub coordinator: Arc<LocalCoordinator>,
    /// Method-level demarcation for work done inside handlers.
    pub interceptor: Arc<TransactionInterceptor>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// State whose interceptor locates the coordinator under `coordinator_name`.
    ///
    /// # Errors
    ///
    /// Propagates the interceptor's construction error.
    pub fn new(
        coordinator: Arc<LocalCoordinator>,
        directory: Arc<dyn ComponentDirectory>,
        coordinator_name: ComponentName,
    ) -> Result<Self, ConfigurationError> {
        let interceptor =
            TransactionInterceptor::new(directory)?.with_coordinator_name(coordinator_name);
        Ok(Self {
            coordinator,
            interceptor: Arc::new(interceptor),
            start_time: Instant::now(),
        })
    }
}
