//! Error types for the overlay router core.

use overnet_core::CodecError;

/// Errors surfaced to callers of the router and forwarder handles.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("forwarder has shut down")]
    Closed,
}
