//! Error types for the DHT server and client.

use overnet_core::CodecError;

/// Errors that can occur during DHT operation.
#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("request timed out")]
    Timeout,
    #[error("server replied `failure`: {0}")]
    Failure(String),
}
