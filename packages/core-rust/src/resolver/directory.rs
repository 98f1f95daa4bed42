//! Resolution through a global naming directory, independent of any call context.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{Component, ComponentResolver};
use crate::error::{ConfigurationError, ResolveError};
use crate::name::ComponentName;

/// Scheme prepended to component names when forming directory keys.
pub const DEFAULT_SCHEME: &str = "component:";

/// A naming directory that maps keys to components.
pub trait ComponentDirectory: Send + Sync {
    /// Look up a key. `Ok(None)` means the directory answered but has no binding.
    fn lookup(&self, key: &str) -> anyhow::Result<Option<Component>>;
}

/// Concurrent in-process naming directory.
pub struct NamingDirectory {
    bindings: DashMap<String, Component>,
    available: AtomicBool,
}

impl NamingDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Binds `key` if it is free. Returns `false` when already bound.
    pub fn bind(&self, key: impl Into<String>, component: Component) -> bool {
        match self.bindings.entry(key.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(component);
                true
            }
        }
    }

    /// Binds `key`, replacing any previous binding.
    pub fn rebind(&self, key: impl Into<String>, component: Component) -> Option<Component> {
        self.bindings.insert(key.into(), component)
    }

    /// Binds a component name under [`DEFAULT_SCHEME`], replacing any previous binding.
    pub fn bind_component(&self, name: &ComponentName, component: Component) -> Option<Component> {
        self.rebind(directory_key(DEFAULT_SCHEME, name), component)
    }

    pub fn unbind(&self, key: &str) -> Option<Component> {
        self.bindings.remove(key).map(|(_, component)| component)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Marks the directory reachable or unreachable; lookups fail while unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for NamingDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NamingDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingDirectory")
            .field("bindings", &self.bindings.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish()
    }
}

impl ComponentDirectory for NamingDirectory {
    fn lookup(&self, key: &str) -> anyhow::Result<Option<Component>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(anyhow!("naming directory is unavailable"));
        }
        Ok(self.bindings.get(key).map(|entry| Arc::clone(entry.value())))
    }
}

/// Directory key for a component name under a scheme.
#[must_use]
pub fn directory_key(scheme: &str, name: &ComponentName) -> String {
    format!("{scheme}{name}")
}

/// Resolves a component by name from a [`ComponentDirectory`].
pub struct DirectoryResolver {
    name: ComponentName,
    key: String,
    directory: Arc<dyn ComponentDirectory>,
}

impl DirectoryResolver {
    /// Resolver for an already validated name under [`DEFAULT_SCHEME`].
    #[must_use]
    pub fn new(directory: Arc<dyn ComponentDirectory>, name: ComponentName) -> Self {
        let key = directory_key(DEFAULT_SCHEME, &name);
        Self {
            name,
            key,
            directory,
        }
    }

    #[must_use]
    pub fn builder(directory: Arc<dyn ComponentDirectory>) -> DirectoryResolverBuilder {
        DirectoryResolverBuilder {
            name: None,
            scheme: DEFAULT_SCHEME.to_string(),
            directory,
        }
    }

    /// The directory key this resolver looks up.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ComponentResolver for DirectoryResolver {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn resolve(&self) -> Result<Component, ResolveError> {
        debug!(key = %self.key, "resolving component from naming directory");
        match self.directory.lookup(&self.key) {
            Ok(Some(component)) => Ok(component),
            Ok(None) => Err(ResolveError::NotFound {
                name: self.key.clone(),
            }),
            Err(source) => Err(ResolveError::Lookup {
                name: self.key.clone(),
                source,
            }),
        }
    }
}

impl fmt::Debug for DirectoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryResolver")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Builder that cannot yield a [`DirectoryResolver`] without a name.
pub struct DirectoryResolverBuilder {
    name: Option<String>,
    scheme: String,
    directory: Arc<dyn ComponentDirectory>,
}

impl DirectoryResolverBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides [`DEFAULT_SCHEME`]; an empty scheme looks up the bare name.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// # Errors
    ///
    /// Returns `MissingComponentName` if no name was set, or the name's
    /// validation error. The directory is not consulted.
    pub fn build(self) -> Result<DirectoryResolver, ConfigurationError> {
        let name = ComponentName::new(self.name.ok_or(ConfigurationError::MissingComponentName)?)?;
        let key = directory_key(&self.scheme, &name);
        Ok(DirectoryResolver {
            name,
            key,
            directory: self.directory,
        })
    }
}
