//! Wire-level error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for encode, decode and invoke operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while encoding, decoding or transporting wire values.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed varint: {0}")]
    MalformedVarint(&'static str),

    #[error("length of {0} overflows a 32-bit integer")]
    LengthOverflow(usize),

    #[error("`{name}` field: {source}")]
    Field {
        name: &'static str,
        #[source]
        source: Box<WireError>,
    },

    #[error("list element {index}: {source}")]
    Element {
        index: u32,
        #[source]
        source: Box<WireError>,
    },

    #[error("unknown {kind} discriminant `{value}`")]
    UnknownDiscriminant { kind: &'static str, value: u32 },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid utf-8 in string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("unexpected deferred write for synchronous `{0}`")]
    UnexpectedDeferred(&'static str),

    #[error("stream at path {0:?} already taken")]
    StreamTaken(Vec<u32>),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("deferred writer task failed: {0}")]
    Task(String),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("call cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Wrap `source` with the name of the record field it came from.
    pub fn field(name: &'static str, source: WireError) -> Self {
        Self::Field {
            name,
            source: Box::new(source),
        }
    }

    /// Wrap `source` with the position of the list element it came from.
    pub fn element(index: u32, source: WireError) -> Self {
        Self::Element {
            index,
            source: Box::new(source),
        }
    }

    /// Returns `true` for deadline and cancellation errors, looking through
    /// field and element wrappers.
    pub fn is_timeout_or_cancelled(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Cancelled => true,
            Self::Field { source, .. } | Self::Element { source, .. } => {
                source.is_timeout_or_cancelled()
            }
            _ => false,
        }
    }

    /// The innermost error, with field and element wrappers removed.
    pub fn root_cause(&self) -> &WireError {
        match self {
            Self::Field { source, .. } | Self::Element { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_error_names_the_field() {
        let err = WireError::field("payload", WireError::LengthOverflow(5_000_000_000));
        assert_eq!(
            err.to_string(),
            "`payload` field: length of 5000000000 overflows a 32-bit integer"
        );
    }

    #[test]
    fn root_cause_unwraps_nested_fields() {
        let err = WireError::field(
            "headers",
            WireError::field("name", WireError::MalformedVarint("unexpected end of stream")),
        );
        assert!(matches!(err.root_cause(), WireError::MalformedVarint(_)));
    }

    #[test]
    fn timeout_is_detected_through_fields() {
        let err = WireError::field("body", WireError::Timeout(Duration::from_millis(10)));
        assert!(err.is_timeout_or_cancelled());
        assert!(!WireError::Transport("refused".into()).is_timeout_or_cancelled());
    }
}
