//! Resolution through the host's current execution context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Component, ComponentResolver};
use crate::error::{ConfigurationError, ResolveError};
use crate::name::ComponentName;

/// A per-call scope able to resolve component names (request, session, global).
pub trait ExecutionContext: Send + Sync {
    fn resolve_name(&self, name: &ComponentName) -> Option<Component>;
}

/// Supplies the execution context of the call in progress, if there is one.
pub trait ExecutionContextProvider: Send + Sync {
    fn current(&self) -> Option<Arc<dyn ExecutionContext>>;
}

impl<F> ExecutionContextProvider for F
where
    F: Fn() -> Option<Arc<dyn ExecutionContext>> + Send + Sync,
{
    fn current(&self) -> Option<Arc<dyn ExecutionContext>> {
        self()
    }
}

/// A map-backed execution context, for hosts that assemble scoped components per call.
#[derive(Default)]
pub struct ComponentScope {
    components: HashMap<ComponentName, Component>,
}

impl ComponentScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: ComponentName, component: Component) -> Self {
        self.components.insert(name, component);
        self
    }
}

impl ExecutionContext for ComponentScope {
    fn resolve_name(&self, name: &ComponentName) -> Option<Component> {
        self.components.get(name).cloned()
    }
}

impl fmt::Debug for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentScope")
            .field("names", &self.components.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves a component from whatever execution context is current at call time.
pub struct AmbientContextResolver {
    name: ComponentName,
    provider: Arc<dyn ExecutionContextProvider>,
}

impl AmbientContextResolver {
    #[must_use]
    pub fn builder(provider: Arc<dyn ExecutionContextProvider>) -> AmbientContextResolverBuilder {
        AmbientContextResolverBuilder {
            name: None,
            provider,
        }
    }
}

impl ComponentResolver for AmbientContextResolver {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn resolve(&self) -> Result<Component, ResolveError> {
        let Some(context) = self.provider.current() else {
            return Err(ResolveError::NoExecutionContext {
                name: self.name.to_string(),
            });
        };
        debug!(name = %self.name, "resolving component from execution context");
        context
            .resolve_name(&self.name)
            .ok_or_else(|| ResolveError::NotFound {
                name: self.name.to_string(),
            })
    }
}

impl fmt::Debug for AmbientContextResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmbientContextResolver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder that cannot yield an [`AmbientContextResolver`] without a name.
pub struct AmbientContextResolverBuilder {
    name: Option<String>,
    provider: Arc<dyn ExecutionContextProvider>,
}

impl AmbientContextResolverBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// # Errors
    ///
    /// Returns `MissingComponentName` if no name was set, or the name's
    /// validation error. No lookup is attempted either way.
    pub fn build(self) -> Result<AmbientContextResolver, ConfigurationError> {
        let name = ComponentName::new(self.name.ok_or(ConfigurationError::MissingComponentName)?)?;
        Ok(AmbientContextResolver {
            name,
            provider: self.provider,
        })
    }
}
