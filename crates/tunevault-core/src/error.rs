//! Error types for tunevault.
//!
//! One error enum covers the whole download and migration engine. Variants are
//! grouped by the taxonomy the downloader acts on: fatal errors stop a run,
//! item-terminal errors fail a single item, and everything else is reported as
//! a warning next to an otherwise successful item.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the tunevault library.
#[derive(Debug, Error)]
pub enum VaultError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Catalog errors
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Premium account required for '{quality}' quality")]
    PremiumRequired { quality: String },

    #[error("Failed to fetch resource {id}: {message}")]
    ResourceUnavailable { id: String, message: String },

    #[error("{kind} {id} has no songs")]
    EmptyResource { kind: String, id: String },

    #[error("Failed to fetch media: {message}")]
    MediaResolution { message: String },

    #[error("Requested quality '{requested}' not available")]
    QualityUnavailable { requested: String },

    #[error("Invalid quality option: {0}")]
    InvalidQuality(String),

    // Transfer errors
    #[error("Cipher error: {message}")]
    Cipher { message: String },

    #[error("Failed to stream to file {path:?}: {message}")]
    Transfer { path: PathBuf, message: String },

    // Metadata errors
    #[error("No data found")]
    NoDataFound,

    #[error("Unexpected status code: {0}")]
    UnexpectedStatus(u16),

    #[error("Tag error for {path:?}: {message}")]
    Tags { path: PathBuf, message: String },

    // Migration errors
    #[error("Migration {id} ({name}) failed: {message}")]
    Migration {
        id: u32,
        name: String,
        message: String,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for tunevault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

// Conversion implementations for common error types

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VaultError::Timeout(Duration::from_secs(0))
        } else {
            VaultError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl VaultError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VaultError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True when the error came from a cancelled run rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VaultError::Cancelled)
    }

    /// True for errors that must end the whole run, not just one item.
    ///
    /// Cancellation also stops the run but is reported separately and is
    /// never counted as a failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VaultError::Authentication { .. }
                | VaultError::PremiumRequired { .. }
                | VaultError::Database { .. }
                | VaultError::Config { .. }
        )
    }
}
