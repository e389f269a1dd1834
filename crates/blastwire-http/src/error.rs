//! HTTP adapter error types.

use blastwire_core::WireError;
use thiserror::Error;

use crate::types::ErrorCode;

/// Result type alias for adapter and client operations.
pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error("unsupported body: {0}")]
    UnsupportedBody(String),

    /// The handler answered with an error value instead of a response.
    #[error("rpc error: {0:?}")]
    Rpc(ErrorCode),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("body error: {0}")]
    Body(String),

    #[error("body already closed")]
    BodyClosed,
}

impl HttpError {
    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the call failed before any response was decoded.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Wire(_))
    }
}

impl From<std::io::Error> for HttpError {
    fn from(e: std::io::Error) -> Self {
        Self::Wire(WireError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_are_transparent() {
        let err = HttpError::from(WireError::Transport("refused".into()));
        assert_eq!(err.to_string(), "transport error: refused");
        assert!(err.is_transport());
    }

    #[test]
    fn rpc_errors_are_not_transport() {
        let err = HttpError::Rpc(ErrorCode::ConnectionRefused);
        assert!(!err.is_transport());
        assert!(err.to_string().contains("ConnectionRefused"));
    }
}
