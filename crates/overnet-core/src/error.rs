//! Error types for the overnet-core crate.

/// Errors produced while parsing or emitting wire formats.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid overlay address: {0}")]
    InvalidAddr(String),
    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
    #[error("packet too short: need at least {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },
    #[error("missing protocol header line")]
    MissingHeader,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("malformed field `{field}`: {reason}")]
    MalformedField {
        field: &'static str,
        reason: String,
    },
}
