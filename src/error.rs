//! Crate error type and result alias.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type AriResult<T> = Result<T, AriError>;

/// Errors surfaced by the ARI client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AriError {
    /// DNS failure, connection refused, timeout, or any other transport
    /// failure that happened before an HTTP response was received.
    #[error("host is not reachable: {source}")]
    Unreachable {
        /// The underlying transport error (carries the OS-level cause).
        #[source]
        source: reqwest::Error,
    },

    /// The API description could not be fetched or parsed.
    #[error("failed to load API description: {message}")]
    ApiLoad {
        /// What went wrong, including the document URL where known.
        message: String,
    },

    /// The server answered a REST operation with a non-2xx status.
    ///
    /// The display string is the server's reply verbatim (e.g.
    /// `"Bridge not found"`) so callers may pattern-match on it.
    #[error("{message}")]
    Operation {
        /// HTTP status code of the reply.
        status: u16,
        /// Server-provided cause, verbatim.
        message: String,
    },

    /// Malformed event frame, response body, or schema content.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformation.
        message: String,
    },

    /// WebSocket connection or lifecycle failure.
    #[error("WebSocket error: {message}")]
    WebSocket {
        /// Description of the failure.
        message: String,
    },

    /// An operation was invoked without a parameter the schema requires.
    #[error("missing required parameter: {name}")]
    MissingParam {
        /// Name of the missing parameter.
        name: String,
    },

    /// A URL could not be parsed or constructed.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AriError {
    pub(crate) fn api_load(message: impl Into<String>) -> Self {
        AriError::ApiLoad {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        AriError::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn websocket(message: impl Into<String>) -> Self {
        AriError::WebSocket {
            message: message.into(),
        }
    }

    /// Classify a `reqwest` send error. Anything that failed before a
    /// response arrived counts as the host being unreachable.
    pub(crate) fn transport(source: reqwest::Error) -> Self {
        AriError::Unreachable { source }
    }

    /// `true` if this is a transport-level failure (DNS, refused, timeout).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AriError::Unreachable { .. })
    }

    /// HTTP status code, if this is an [`Operation`](AriError::Operation) error.
    pub fn status(&self) -> Option<u16> {
        match self {
            AriError::Operation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` if the server answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
