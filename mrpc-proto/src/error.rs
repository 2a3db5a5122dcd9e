//! Wire/codec-level error type for `mrpc-proto`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer disconnected")]
    Disconnected,

    #[error("framing error: {0}")]
    Framing(&'static str),

    #[error("operation timed out")]
    Timeout,

    #[error("value out of bounds: {0}")]
    OutOfBounds(&'static str),

    #[error("unknown method id {0}")]
    UnknownMethod(u8),

    #[error("unexpected non-zero empty-response byte")]
    MalformedEmptyResponse,
}

impl ProtoError {
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
