//! Connection phase types.
//!
//! DRTP has a much smaller state diagram than TCP: one side only sends data,
//! the other only receives it, and teardown is a single FIN / FIN|ACK pair.
//!
//! ```text
//!  client:  CLOSED ──SYN──▶ SYN_SENT ──SYN|ACK / ACK──▶ ESTABLISHED
//!                                                           │ all chunks acked
//!                                                           ▼
//!           CLOSED ◀──FIN|ACK or timeout── FIN_SENT ◀──FIN──┘
//!
//!  server:  LISTEN ──SYN / SYN|ACK──▶ SYN_RECEIVED ──ACK──▶ ESTABLISHED
//!                                                            │ FIN / FIN|ACK
//!                                                            ▼
//!           CLOSED ◀────────── linger expires ──────────── LINGER
//! ```

/// All phases a DRTP session can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// Server is waiting for a SYN.
    Listen,
    /// SYN sent; waiting for SYN|ACK.
    SynSent,
    /// SYN received and SYN|ACK sent; waiting for the final ACK.
    SynReceived,
    /// Handshake complete; data transfer in progress.
    Established,
    /// Client sent FIN; waiting for FIN|ACK.
    FinSent,
    /// Server answered FIN and is absorbing retransmitted FINs.
    Linger,
}

impl ConnectionState {
    /// `true` while data may flow.
    pub fn is_established(self) -> bool {
        self == Self::Established
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinSent => "FIN_SENT",
            Self::Linger => "LINGER",
        };
        f.write_str(name)
    }
}
