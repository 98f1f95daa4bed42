//! Request-level transaction demarcation for HTTP services.

pub mod config;
pub mod error;
pub mod layer;

pub use config::{parse_methods, TransactionFilterConfig, DEFAULT_METHODS};
pub use error::{transaction_error_response, FilterInitError, TransactionFilterError};
pub use layer::{TransactionLayer, TransactionService};
