//! Call-time location of named dependencies.
//!
//! A [`ComponentResolver`] holds exactly one [`ComponentName`] and resolves it on
//! demand. Two strategies exist:
//!
//! - [`AmbientContextResolver`]: asks the host's current execution context
//! - [`DirectoryResolver`]: looks the name up in a global naming directory
//!
//! Both are built through builders that refuse to produce a resolver without a
//! name.

pub mod ambient;
pub mod directory;

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::coordinator::TransactionCoordinator;
use crate::error::ResolveError;
use crate::name::ComponentName;

pub use ambient::{
    AmbientContextResolver, AmbientContextResolverBuilder, ComponentScope, ExecutionContext,
    ExecutionContextProvider,
};
pub use directory::{
    ComponentDirectory, DirectoryResolver, DirectoryResolverBuilder, NamingDirectory,
    DEFAULT_SCHEME,
};

/// A resolved dependency, type-erased.
pub type Component = Arc<dyn Any + Send + Sync>;

/// Strategy for locating one named dependency at call time.
pub trait ComponentResolver: Send + Sync {
    /// The name this resolver looks up.
    fn name(&self) -> &ComponentName;

    /// Locates the component. Has no side effects beyond the lookup.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the context or directory holds nothing under the name
    /// - `NoExecutionContext` if no execution context is current
    /// - `Lookup` if the lookup mechanism itself fails
    fn resolve(&self) -> Result<Component, ResolveError>;
}

/// Resolves and downcasts to a concrete type.
///
/// # Errors
///
/// Propagates resolution failures and returns `TypeMismatch` when the component
/// is not a `T`.
pub fn resolve_as<T: Any + Send + Sync>(
    resolver: &dyn ComponentResolver,
) -> Result<Arc<T>, ResolveError> {
    resolver
        .resolve()?
        .downcast::<T>()
        .map_err(|_| ResolveError::TypeMismatch {
            name: resolver.name().to_string(),
            expected: type_name::<T>(),
        })
}

/// Wraps a coordinator so it can be registered as a component.
#[must_use]
pub fn coordinator_component(coordinator: Arc<dyn TransactionCoordinator>) -> Component {
    Arc::new(coordinator)
}

/// Resolves a coordinator registered with [`coordinator_component`].
///
/// # Errors
///
/// Same as [`resolve_as`].
pub fn resolve_coordinator(
    resolver: &dyn ComponentResolver,
) -> Result<Arc<dyn TransactionCoordinator>, ResolveError> {
    resolve_as::<Arc<dyn TransactionCoordinator>>(resolver).map(|found| Arc::clone(found.as_ref()))
}
