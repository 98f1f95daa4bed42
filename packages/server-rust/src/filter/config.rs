//! Startup configuration for the request-level transaction filter.

use std::collections::{BTreeSet, HashMap, HashSet};

use demarcate_core::{ComponentName, ConfigurationError, PropagationLevel, COORDINATOR_NAME};
use http::Method;
use serde::Deserialize;

/// Methods demarcated when no `methods` parameter is configured.
pub const DEFAULT_METHODS: [&str; 3] = ["PUT", "POST", "DELETE"];

/// Init-parameter keys understood by [`TransactionFilterConfig::from_params`].
pub mod params {
    pub const METHODS: &str = "methods";
    pub const PROPAGATION_LEVEL: &str = "propagationLevel";
    pub const COORDINATOR_NAME: &str = "coordinatorName";
    pub const ROLLBACK_ON_SERVER_ERROR: &str = "rollbackOnServerError";
}

/// Validated filter configuration. Every field is checked when it is built, so
/// an invalid value fails startup rather than a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFilterConfig")]
pub struct TransactionFilterConfig {
    /// Request methods that run inside a transaction.
    pub methods: HashSet<Method>,
    /// Propagation level applied to every demarcated request.
    pub propagation: PropagationLevel,
    /// Name under which the coordinator is registered.
    pub coordinator_name: ComponentName,
    /// Treat 5xx responses as failed units of work.
    pub rollback_on_server_error: bool,
}

impl Default for TransactionFilterConfig {
    fn default() -> Self {
        Self {
            methods: DEFAULT_METHODS
                .iter()
                .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
                .collect(),
            propagation: PropagationLevel::Required,
            coordinator_name: default_coordinator_name(),
            rollback_on_server_error: false,
        }
    }
}

impl TransactionFilterConfig {
    /// Builds the configuration from string init parameters. Absent keys keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` for an unknown propagation level, a
    /// malformed method list or coordinator name, or a non-boolean flag.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigurationError> {
        let mut config = Self::default();
        if let Some(raw) = params.get(params::METHODS) {
            config.methods = parse_methods(raw)?;
        }
        if let Some(raw) = params.get(params::PROPAGATION_LEVEL) {
            config.propagation = raw.parse()?;
        }
        if let Some(raw) = params.get(params::COORDINATOR_NAME) {
            config.coordinator_name = ComponentName::new(raw.as_str())?;
        }
        if let Some(raw) = params.get(params::ROLLBACK_ON_SERVER_ERROR) {
            config.rollback_on_server_error = parse_flag(params::ROLLBACK_ON_SERVER_ERROR, raw)?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn requires_transaction(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Configured methods in a stable order, for logging.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Parses a comma-separated method list such as `"PUT, POST"`.
///
/// # Errors
///
/// Returns `InvalidHttpMethod` for a token that is not a valid method, and
/// `InvalidParameter` for a list with no methods at all.
pub fn parse_methods(raw: &str) -> Result<HashSet<Method>, ConfigurationError> {
    let methods = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            Method::from_bytes(token.to_ascii_uppercase().as_bytes()).map_err(|_| {
                ConfigurationError::InvalidHttpMethod {
                    value: token.to_string(),
                }
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    if methods.is_empty() {
        return Err(ConfigurationError::InvalidParameter {
            key: params::METHODS,
            value: raw.to_string(),
        });
    }
    Ok(methods)
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigurationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigurationError::InvalidParameter {
            key,
            value: raw.to_string(),
        }),
    }
}

fn default_coordinator_name() -> ComponentName {
    ComponentName::new(COORDINATOR_NAME).unwrap_or_else(|e| panic!("{COORDINATOR_NAME}: {e}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawFilterConfig {
    methods: Vec<String>,
    propagation_level: String,
    coordinator_name: String,
    rollback_on_server_error: bool,
}

impl Default for RawFilterConfig {
    fn default() -> Self {
        Self {
            methods: DEFAULT_METHODS.iter().map(ToString::to_string).collect(),
            propagation_level: PropagationLevel::Required.to_string(),
            coordinator_name: COORDINATOR_NAME.to_string(),
            rollback_on_server_error: false,
        }
    }
}

impl TryFrom<RawFilterConfig> for TransactionFilterConfig {
    type Error = ConfigurationError;

    fn try_from(raw: RawFilterConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            methods: parse_methods(&raw.methods.join(","))?,
            propagation: raw.propagation_level.parse()?,
            coordinator_name: ComponentName::new(raw.coordinator_name)?,
            rollback_on_server_error: raw.rollback_on_server_error,
        })
    }
}
