//! Error types for the reliable transport.

/// Errors surfaced by the transport's wire codec and handles.
#[derive(Debug, thiserror::Error)]
pub enum RdtError {
    #[error("packet too short: need at least {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },
    #[error("invalid packet type: {0}")]
    InvalidType(u8),
    #[error("sequence number out of range: {0}")]
    InvalidSequence(u16),
    #[error("payload is not valid UTF-8")]
    InvalidPayload,
    #[error("transport has shut down")]
    Closed,
}
