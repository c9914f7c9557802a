//! Unified error types for the billing sync engine.
//!
//! [`Error`] is the crate-wide error returned by configuration, logging,
//! storage and reconciliation code. [`SourceError`] covers everything that can go wrong
//! while talking to the remote billing API; the orchestrator treats it as a
//! soft failure scoped to one chunk or stage.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// A required environment variable is not set. Fatal at startup.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the variable
        name: String,
    },

    /// Any failure reported by the record store.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Filesystem failure, such as an unwritable log directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while fetching data from the remote billing API.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure (connect, timeout, body decoding).
    #[error("request to {endpoint} failed: {source}")]
    Request {
        /// Endpoint path that was requested
        endpoint: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success HTTP status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint path that was requested
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// The API answered 2xx but its `status` field did not report success.
    #[error("{endpoint} reported status {status:?}")]
    Api {
        /// Endpoint path that was requested
        endpoint: String,
        /// Value of the `status` field, if any
        status: Option<String>,
    },

    /// The response body did not have the expected shape.
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed {
        /// Endpoint path that was requested
        endpoint: String,
        /// What was missing or mistyped
        reason: String,
    },
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
