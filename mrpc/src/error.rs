//! Unified, externally-meaningful error type for the public API.
//!
//! A flat `thiserror` enum plus classification predicates: callers match on
//! `Timeout`, `Disconnected`, `Protocol`, `UnknownMethod`, etc., while
//! caller-contract violations (wrong processor state, bad method id) remain
//! `debug_assert!`/`panic!` in debug builds rather than error variants.

use mrpc_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MrpcError {
    #[error("connection failed or was dropped: {0}")]
    Disconnected(String),

    #[error("operation timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown method id {0}")]
    UnknownMethod(u8),

    #[error("no server available in the consistent-hash ring")]
    NoServerAvailable,

    #[error("stream processor is not in the required state for this operation")]
    InvalidState,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MrpcError {
    #[must_use]
    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::Disconnected(msg.into())
    }

    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether a client should tear down and reconnect rather than retry
    /// the same connection.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::Timeout)
    }
}

impl From<ProtoError> for MrpcError {
    fn from(e: ProtoError) -> Self {
        match e {
            ProtoError::Disconnected => Self::Disconnected("peer closed the connection".to_string()),
            ProtoError::Timeout => Self::Timeout,
            ProtoError::UnknownMethod(id) => Self::UnknownMethod(id),
            ProtoError::Io(io_err) => Self::Io(io_err),
            other => Self::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MrpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_classified() {
        assert!(MrpcError::Timeout.is_connection_error());
        assert!(MrpcError::disconnected("eof").is_connection_error());
        assert!(!MrpcError::UnknownMethod(3).is_connection_error());
    }

    #[test]
    fn proto_errors_map_to_connection_errors_where_applicable() {
        let e: MrpcError = ProtoError::Timeout.into();
        assert!(matches!(e, MrpcError::Timeout));
        let e: MrpcError = ProtoError::Disconnected.into();
        assert!(matches!(e, MrpcError::Disconnected(_)));
        let e: MrpcError = ProtoError::UnknownMethod(5).into();
        assert!(matches!(e, MrpcError::UnknownMethod(5)));
    }
}
