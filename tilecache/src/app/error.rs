//! Application error types.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::config::ConfigError;
use crate::provider::FetchError;
use crate::storage::StorageError;

/// Errors that can occur during application lifecycle.
#[derive(Debug)]
pub enum AppError {
    /// Invalid or incomplete configuration.
    Config(ConfigError),

    /// The cache root could not be prepared.
    Storage(StorageError),

    /// The upstream HTTP client could not be created.
    HttpClient(FetchError),

    /// The listener could not be bound.
    Bind { addr: SocketAddr, source: io::Error },

    /// The server stopped with an I/O error.
    Serve(io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Storage(e) => write!(f, "Failed to prepare tile cache: {}", e),
            AppError::HttpClient(e) => write!(f, "Failed to create upstream client: {}", e),
            AppError::Bind { addr, source } => {
                write!(f, "Failed to bind {}: {}", addr, source)
            }
            AppError::Serve(e) => write!(f, "Server error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Storage(e) => Some(e),
            AppError::HttpClient(e) => Some(e),
            AppError::Bind { source, .. } => Some(source),
            AppError::Serve(e) => Some(e),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config(e)
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Storage(e)
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        AppError::HttpClient(e)
    }
}
