//! Error types for RelayQ
//!
//! Defines all error types used throughout the application.

use std::time::Duration;

use thiserror::Error;

/// Main error type for RelayQ operations
#[derive(Error, Debug)]
pub enum Error {
    /// Exchange not found
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Exchange re-declared with a different kind
    #[error("Exchange kind conflict for '{name}': declared as {existing}, requested {requested}")]
    ExchangeKindConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// Queue not found
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// A consumer is already attached to the queue
    #[error("Consumer already attached to queue: {0}")]
    ConsumerAlreadyAttached(String),

    /// Publish exceeded its deadline
    #[error("Publish timed out after {0:?}")]
    PublishTimeout(Duration),

    /// Invalid message format
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this is a setup-phase configuration error.
    ///
    /// Configuration errors (bad declare, bind against missing entities,
    /// duplicate consumer registration) are unrecoverable at the call site
    /// and should abort the calling component. Publish timeouts are not:
    /// they are reported per message and must not take down consumers.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::ExchangeNotFound(_)
                | Error::ExchangeKindConflict { .. }
                | Error::QueueNotFound(_)
                | Error::ConsumerAlreadyAttached(_)
        )
    }
}

/// Result type alias for RelayQ operations
pub type Result<T> = std::result::Result<T, Error>;
