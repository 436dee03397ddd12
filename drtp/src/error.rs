//! Error kinds surfaced by the protocol engine.

use thiserror::Error;

use crate::packet::PacketError;

/// Every terminal failure a DRTP operation can report.
///
/// Recoverable conditions (a lost packet, a stale ACK, a malformed datagram
/// in the middle of a transfer) are handled inside the loops and never reach
/// the caller as an `Err`.
#[derive(Debug, Error)]
pub enum DrtpError {
    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] PacketError),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("gave up after {attempts} consecutive retransmission timeouts")]
    RetransmitTimeout { attempts: u32 },

    #[error("connection timed out before FIN ({bytes_written} bytes written, file incomplete)")]
    ConnectionTimedOut { bytes_written: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DrtpError {
    /// Process exit code for this failure kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            DrtpError::Io(_) => 1,
            DrtpError::HandshakeFailed(_) => 2,
            DrtpError::RetransmitTimeout { .. } => 3,
            DrtpError::ConnectionTimedOut { .. } => 4,
            DrtpError::MalformedPacket(_) => 5,
            DrtpError::Cancelled => 130,
        }
    }
}
