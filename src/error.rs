//! Unified error handling for the artcast crate
//!
//! This module defines the domain-specific error types (fetch, media,
//! publish) and a unified `Error` enum that wraps them, plus the
//! crate-wide `Result` alias.
//!
//! Errors carry a recoverability classification: the dispatcher absorbs
//! recoverable pull failures (the next trigger retries) and aborts on
//! everything else (config, corrupt or unwritable state files).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,
}

/// Errors that can occur while turning a media URL into a fingerprint
#[derive(Error, Debug)]
pub enum MediaError {
    /// URL extension is not in the configured allow-list
    #[error("Unsupported media format: {url}")]
    UnsupportedFormat { url: String },

    /// Downloaded bytes could not be decoded as an image
    #[error("Image decoding failed: {0}")]
    Decode(String),
}

/// Errors raised by an outbound channel publisher
///
/// The dispatcher treats every publish error as retryable: the entry is
/// rescheduled with a fresh timestamp rather than dropped.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The channel's server rejected the publish call
    #[error("Publish rejected by server: {0}")]
    Server(String),

    /// Transport-level failure before the server answered
    #[error("Publish transport failed: {0}")]
    Transport(#[from] FetchError),
}

/// Unified error type for the artcast crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Media fingerprinting errors
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Publish errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Fingerprint store errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors (fatal at startup)
    #[error("Config error: {0}")]
    Config(String),

    /// A state file exists but cannot be read or parsed (fatal at startup)
    #[error("Persistence error for {path}: {message}")]
    Persistence { path: PathBuf, message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a persistence error for a state file
    pub fn persistence(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is recoverable (retry or reschedule is warranted)
    ///
    /// I/O errors count as unrecoverable: outside tests they only arise
    /// from state files, and proceeding with unreadable or unwritable
    /// state risks silent loss.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Publish(_) => true,
            Self::Media(_) | Self::Database(_) | Self::Json(_) => false,
            Self::Io(_) | Self::Config(_) | Self::Persistence { .. } => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
