//! Demarcate Core — transaction demarcation engine, propagation policy, and
//! call-time component resolution.

pub mod context;
pub mod coordinator;
pub mod demarcation;
pub mod error;
pub mod interceptor;
pub mod name;
pub mod propagation;
pub mod resolver;
pub mod scope;

pub use context::TransactionContext;
pub use coordinator::{LocalCoordinator, TransactionCoordinator, TransactionId};
pub use demarcation::{Branch, DemarcationState, TransactionDemarcation};
pub use error::{
    ConfigurationError, CoordinatorError, DemarcationError, ResolveError, TransactionalError,
};
pub use interceptor::{TransactionAttribute, TransactionInterceptor, COORDINATOR_NAME};
pub use name::ComponentName;
pub use propagation::{BeginPlan, PolicyViolation, PropagationLevel};
pub use resolver::{
    coordinator_component, resolve_as, resolve_coordinator, AmbientContextResolver, Component,
    ComponentDirectory, ComponentResolver, DirectoryResolver, NamingDirectory,
};
pub use scope::{demarcate, demarcate_async, DemarcationGuard};
