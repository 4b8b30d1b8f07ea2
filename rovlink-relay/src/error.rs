//! Relay error types.

use rovlink_protocol::ProtocolError;
use thiserror::Error;

/// Errors that terminate a single connection.
///
/// Every variant is fatal for the connection it occurs on, and never for
/// the event loop driving it: the loop discards the connection and keeps
/// serving the others.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Whether this is the peer's orderly shutdown rather than a fault.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, RelayError::PeerClosed)
    }
}
