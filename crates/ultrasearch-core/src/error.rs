//! Error types for Ultrasearch core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while higher-level code (and the entity-resolution
//! collaborator) can use `anyhow` for convenient error handling.
//!
//! Only [`SearchError::Transient`] is ever retried; see [`crate::retry`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using SearchError
pub type Result<T> = std::result::Result<T, SearchError>;

/// Core error types for search operations.
///
/// These errors represent specific failure modes that callers may want to
/// handle differently (e.g., retrying a connection failure but surfacing a
/// rejected query immediately).
#[derive(Error, Debug)]
pub enum SearchError {
    // === Caller Errors ===
    /// A feature was requested that this search was not configured for
    #[error("usage error: {reason}")]
    Usage { reason: String },

    // === Daemon Errors ===
    /// The daemon rejected the translated query syntax
    #[error("query rejected by daemon: {reason}")]
    Query { reason: String },

    /// The daemon could not be reached or timed out
    #[error("daemon unavailable: {reason}")]
    Transient { reason: String },

    /// The daemon answered with a reply that does not fit the request
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    // === Configuration Errors ===
    /// The generated daemon configuration is missing or inconsistent
    #[error("daemon configuration at {path} is corrupted: {reason}")]
    ConfigCorrupted { path: PathBuf, reason: String },

    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    Config { reason: String },

    // === Collaborator Errors ===
    /// The entity-resolution capability failed
    #[error("failed to resolve {class_name} records: {reason}")]
    Resolve { class_name: String, reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Returns true if this error is a connectivity failure worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, SearchError::Transient { .. })
    }

    /// Returns true if the caller asked for something invalid
    pub fn is_caller_error(&self) -> bool {
        matches!(self, SearchError::Usage { .. } | SearchError::Query { .. })
    }

    /// Create a usage error
    pub fn usage(reason: impl Into<String>) -> Self {
        SearchError::Usage {
            reason: reason.into(),
        }
    }

    /// Create a query-rejected error
    pub fn query(reason: impl Into<String>) -> Self {
        SearchError::Query {
            reason: reason.into(),
        }
    }

    /// Create a transient connectivity error
    pub fn transient(reason: impl Into<String>) -> Self {
        SearchError::Transient {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        SearchError::Protocol {
            reason: reason.into(),
        }
    }
}
