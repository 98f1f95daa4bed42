//! Command-line arguments for the `demarcate-server` binary.

use std::time::Duration;

use clap::Parser;
use demarcate_core::{ComponentName, ConfigurationError, PropagationLevel, COORDINATOR_NAME};

use crate::filter::{parse_methods, TransactionFilterConfig};
use crate::network::NetworkConfig;

/// HTTP server that demarcates mutating requests in transactions.
#[derive(Debug, Parser)]
#[command(name = "demarcate-server", version, about)]
pub struct ServerArgs {
    /// Bind address
    #[arg(long, env = "DEMARCATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port (0 picks a free port)
    #[arg(long, env = "DEMARCATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum request duration in seconds
    #[arg(long, env = "DEMARCATE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Comma-separated request methods run inside a transaction
    #[arg(long, env = "DEMARCATE_TX_METHODS", default_value = "PUT,POST,DELETE")]
    pub methods: String,

    /// Propagation level for demarcated requests
    #[arg(long, env = "DEMARCATE_TX_PROPAGATION", default_value = "REQUIRED")]
    pub propagation: String,

    /// Name the coordinator is registered under
    #[arg(long, env = "DEMARCATE_TX_COORDINATOR", default_value = COORDINATOR_NAME)]
    pub coordinator_name: String,

    /// Roll back requests that answer with a 5xx status
    #[arg(long, env = "DEMARCATE_TX_ROLLBACK_ON_SERVER_ERROR")]
    pub rollback_on_server_error: bool,

    /// Emit logs as JSON
    #[arg(long, env = "DEMARCATE_JSON_LOGS")]
    pub json_logs: bool,
}

impl ServerArgs {
    /// # Errors
    ///
    /// Returns the first invalid method, propagation level or coordinator name.
    pub fn filter_config(&self) -> Result<TransactionFilterConfig, ConfigurationError> {
        Ok(TransactionFilterConfig {
            methods: parse_methods(&self.methods)?,
            propagation: self.propagation.parse::<PropagationLevel>()?,
            coordinator_name: ComponentName::new(self.coordinator_name.as_str())?,
            rollback_on_server_error: self.rollback_on_server_error,
        })
    }

    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
