//! Unified error type for the Gavel server.

use gavel_protocol::ProtocolError;
use gavel_room::RoomError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GavelError {
    /// A socket-level error (bind, accept).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A WebSocket handshake or framing error.
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A room-level error (not found, rejected operation).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let gavel_err: GavelError = err.into();
        assert!(matches!(gavel_err, GavelError::Protocol(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err = RoomError::NotFound(gavel_protocol::RoomCode("AAAA22".into()));
        let gavel_err: GavelError = err.into();
        assert!(matches!(gavel_err, GavelError::Room(_)));
        assert!(gavel_err.to_string().contains("AAAA22"));
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken");
        let gavel_err: GavelError = err.into();
        assert!(matches!(gavel_err, GavelError::Io(_)));
    }
}
