//! Centralized error handling module
//!
//! Provides the error taxonomy shared by the REST client, the push channel
//! and the session layer.

use thiserror::Error;

/// Errors surfaced by backend communication.
///
/// A failed fetch never leaves a session holding stale data: the owning
/// session clears its buffer and reports an explicit unavailable state.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Create a status error from a response code and body text.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }
}

/// A push payload that could not be shaped into a well-formed event.
///
/// Produced only at the validation boundary and consumed there with a
/// warning; it never propagates into the reconciler or crashes the stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed event: {reason}")]
pub struct MalformedEvent {
    pub reason: String,
}

impl MalformedEvent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type alias for backend operations
pub type ClientResult<T> = Result<T, ClientError>;
