//! Error taxonomy for the session layer.
//!
//! Auth, transport and fetch failures are recovered locally (retry plus a
//! sticky notification). Protocol errors are the one category meant to reach
//! a top-level handler.

use thiserror::Error;

/// Token slot error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Token that does not decode or carries no session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("token is not a three-segment JWT")]
    Malformed,
    #[error("token payload is not a base64url JSON object")]
    Payload,
    #[error("token has no session id")]
    MissingSessionId,
}

/// Credential fetch or validation failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Request(String),
    #[error("Token request returned status {0}")]
    Status(u16),
    #[error("Token response did not contain a token")]
    EmptyToken,
    /// A freshly fetched token failed validation. Not retried within the call.
    #[error("Fetched token failed validation: {0}")]
    Invalid(#[from] ValidationError),
    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Socket-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Socket error: {0}")]
    Socket(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Not connected")]
    NotConnected,
}

/// Malformed inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame is not a JSON object")]
    NotAnObject,
    #[error("Action discriminant is not a string: {0}")]
    InvalidDiscriminant(String),
}

/// History or plan fetch failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{resource} request failed: {message}")]
    Request {
        resource: &'static str,
        message: String,
    },
    #[error("{resource} request returned status {status}")]
    Status { resource: &'static str, status: u16 },
    #[error("{resource} response could not be decoded: {message}")]
    Decode {
        resource: &'static str,
        message: String,
    },
}

/// Any session-layer failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
