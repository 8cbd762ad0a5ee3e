//! Error types for admit-bench

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The driver could not complete the run
    #[error("driver error: {0}")]
    Driver(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
