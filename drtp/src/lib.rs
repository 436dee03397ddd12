//! `drtp`: reliable file transfer over UDP with Go-Back-N.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  DATA   ┌─────────────┐
//!  │ GbnSender │────────▶│ GbnReceiver │
//!  └────┬──────┘         └──────┬──────┘
//!       │      cumulative ACKs  │
//!       │◀──────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────────────┐
//!  │  ClientSession / ServerSession            │
//!  │  (handshake → transfer → teardown)        │
//!  └────┬──────────────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (tokio UdpSocket + deadline + shutdown)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      wire format (serialise / deserialise)
//! - [`config`]      protocol timing and window settings
//! - [`error`]       terminal failure kinds and exit codes
//! - [`socket`]      async UDP socket abstraction
//! - [`simulator`]   optional lossy layer for testing (`--discard`)
//! - [`state`]       connection phase enum
//! - [`handshake`]   SYN / SYN|ACK / ACK window negotiation
//! - [`sender`]      GBN outbound window state machine
//! - [`receiver`]    GBN inbound cumulative-ACK state machine
//! - [`teardown`]    FIN / FIN|ACK exchange
//! - [`connection`]  per-role session drivers
//! - [`transfer`]    file reading, output, throughput

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod teardown;
pub mod transfer;

pub use config::Config;
pub use connection::{ClientSession, ServerSession};
pub use error::DrtpError;
pub use packet::Packet;
pub use socket::{shutdown_channel, Shutdown, ShutdownSignal, Socket};
pub use teardown::TeardownOutcome;
