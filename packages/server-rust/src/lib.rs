//! Demarcate Server — request-level transaction demarcation as a tower layer,
//! with an axum server around it.

pub mod cli;
pub mod filter;
pub mod network;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use filter::{
    transaction_error_response, FilterInitError, TransactionFilterConfig, TransactionFilterError,
    TransactionLayer, TransactionService,
};
