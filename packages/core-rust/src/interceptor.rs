//! Method-level transaction demarcation.
//!
//! There is no aspect weaving here: a call site opts in by routing its work
//! through [`TransactionInterceptor::invoke`] (or `invoke_async` / `wrap`)
//! together with the [`TransactionAttribute`] it would otherwise be annotated with.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::TransactionContext;
use crate::coordinator::TransactionCoordinator;
use crate::error::{ConfigurationError, ResolveError, TransactionalError};
use crate::name::ComponentName;
use crate::propagation::PropagationLevel;
use crate::resolver::{resolve_coordinator, ComponentDirectory, DirectoryResolver};
use crate::scope::{demarcate, demarcate_async};

/// Well-known name under which the transaction coordinator is registered.
pub const COORDINATOR_NAME: &str = "/atg/dynamo/transaction/TransactionManager";

/// Per-call-site transaction configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttribute {
    #[serde(default)]
    pub propagation: PropagationLevel,
}

impl TransactionAttribute {
    #[must_use]
    pub const fn new(propagation: PropagationLevel) -> Self {
        Self { propagation }
    }
}

/// Wraps calls in a transaction whose coordinator is located at call time.
pub struct TransactionInterceptor {
    directory: Arc<dyn ComponentDirectory>,
    coordinator_name: ComponentName,
}

impl TransactionInterceptor {
    /// Interceptor that locates the coordinator under [`COORDINATOR_NAME`].
    ///
    /// # Errors
    ///
    /// Only fails if the well-known name were malformed.
    pub fn new(directory: Arc<dyn ComponentDirectory>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            directory,
            coordinator_name: ComponentName::new(COORDINATOR_NAME)?,
        })
    }

    /// Locates the coordinator under `name` instead of the well-known name.
    #[must_use]
    pub fn with_coordinator_name(mut self, name: ComponentName) -> Self {
        self.coordinator_name = name;
        self
    }

    /// A fresh resolver per call: lookups are never shared between call sites.
    fn coordinator(&self) -> Result<Arc<dyn TransactionCoordinator>, ResolveError> {
        let resolver = DirectoryResolver::new(
            Arc::clone(&self.directory),
            self.coordinator_name.clone(),
        );
        resolve_coordinator(&resolver)
    }

    /// Runs `call` inside a transaction configured by `attribute`.
    ///
    /// # Errors
    ///
    /// - `Unresolved` if the coordinator cannot be located (call not run)
    /// - `Begin` if the propagation level cannot be honoured (call not run)
    /// - `Work`, `End`, `WorkAndEnd` as for [`demarcate`]
    pub fn invoke<T, E, F>(
        &self,
        attribute: TransactionAttribute,
        ctx: &TransactionContext,
        call: F,
    ) -> Result<T, TransactionalError<E>>
    where
        F: FnOnce(&TransactionContext) -> Result<T, E>,
    {
        let coordinator = self.coordinator().map_err(TransactionalError::Unresolved)?;
        debug!(propagation = %attribute.propagation, "intercepting transactional call");
        demarcate(coordinator, ctx, attribute.propagation, call)
    }

    /// Async counterpart of [`invoke`](Self::invoke).
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn invoke_async<T, E, F, Fut>(
        &self,
        attribute: TransactionAttribute,
        ctx: &TransactionContext,
        call: F,
    ) -> Result<T, TransactionalError<E>>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let coordinator = self.coordinator().map_err(TransactionalError::Unresolved)?;
        debug!(propagation = %attribute.propagation, "intercepting transactional call");
        demarcate_async(coordinator, ctx, attribute.propagation, call).await
    }

    /// Decorates `f` so every invocation runs through [`invoke`](Self::invoke).
    pub fn wrap<'a, A, T, E, F>(
        &'a self,
        attribute: TransactionAttribute,
        f: F,
    ) -> impl Fn(&TransactionContext, A) -> Result<T, TransactionalError<E>> + 'a
    where
        F: Fn(&TransactionContext, A) -> Result<T, E> + 'a,
    {
        move |ctx, arg| self.invoke(attribute, ctx, |inner| f(inner, arg))
    }
}
