//! Error types for the ML REST client.
//!
//! # Design
//! Failures come from two layers: the transport (the request never produced a
//! response) and decoding (a response arrived but its body is unusable).
//! Generic verbs surface `TransportError` directly. Resource helpers wrap
//! whichever layer failed in a `ClientError` that also names the high-level
//! operation, so call sites match on one type regardless of origin.
//!
//! HTTP status codes are never errors at this level. A 404 or 500 is returned
//! as an ordinary `HttpResponse` for the caller to assert on.

use thiserror::Error;

/// The request could not be sent or its response could not be received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// DNS resolution or the TCP/TLS connect failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Reading or writing the socket failed mid-exchange.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the HTTP stack.
    #[error("transport error: {0}")]
    Other(String),
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::BadUri(uri) => TransportError::InvalidUrl(uri),
            ureq::Error::Io(io) => TransportError::Io(io),
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
                TransportError::Connection(err.to_string())
            }
            other => TransportError::Other(other.to_string()),
        }
    }
}

/// The response body could not be turned into the requested value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response body is empty")]
    EmptyBody,

    #[error("response body is neither a JSON object nor a JSON array: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("field `{0}` is missing from the response")]
    MissingField(String),

    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    /// The body was an array but a field of its first element was requested.
    #[error("response array is empty")]
    EmptyArray,
}

/// The underlying failure carried by a `ClientError`.
#[derive(Debug, Error)]
pub enum ErrorCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A local file needed for an upload could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A failed high-level client operation.
///
/// `operation` is a human-readable description such as
/// `failed to create project P`; `cause` is the layer that failed.
#[derive(Debug, Error)]
#[error("{operation}: {cause}")]
pub struct ClientError {
    operation: String,
    #[source]
    cause: ErrorCause,
}

impl ClientError {
    pub fn new(operation: impl Into<String>, cause: impl Into<ErrorCause>) -> Self {
        Self {
            operation: operation.into(),
            cause: cause.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn cause(&self) -> &ErrorCause {
        &self.cause
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.cause, ErrorCause::Transport(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self.cause, ErrorCause::Decode(_))
    }
}

/// Invalid client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported scheme `{0}`, expected `http` or `https`")]
    UnsupportedScheme(String),

    #[error("invalid port `{0}`")]
    InvalidPort(String),
}
