//! Three-way connection handshake.
//!
//! ```text
//!  client                                  server
//!    │ ── SYN        win = requested ────────▶ │
//!    │ ◀─ SYN|ACK    win = advertised ──────── │
//!    │ ── ACK        win = min(both) ────────▶ │
//! ```
//!
//! The value carried in the final ACK governs the whole transfer.  The
//! client re-sends its SYN up to [`Config::syn_retries`] times; the server
//! answers a repeated SYN with a repeated SYN|ACK, and accepts the first
//! data packet (or, for an empty file, the FIN) in place of a lost final ACK.
//!
//! Both sides step the caller's [`ConnectionState`] through the handshake
//! phases, so a failure leaves it showing where the exchange stopped.

use std::net::SocketAddr;

use tokio::time::Instant;

use crate::config::{negotiate_window, Config};
use crate::error::DrtpError;
use crate::packet::{describe_flags, Packet};
use crate::socket::{Incoming, Socket};
use crate::state::ConnectionState;

/// Result of a successful passive open.
#[derive(Debug)]
pub struct Accepted {
    pub peer: SocketAddr,
    /// Window negotiated by the client.
    pub window: u16,
    /// A data packet or FIN that completed the handshake in place of the
    /// final ACK.
    pub first_data: Option<Packet>,
}

/// Active open: negotiate a window with `peer`.
///
/// Returns the effective window.  Fails with [`DrtpError::HandshakeFailed`]
/// if the reply is not SYN|ACK or every attempt times out.
pub async fn client_handshake(
    socket: &Socket,
    peer: SocketAddr,
    requested: u16,
    config: &Config,
    state: &mut ConnectionState,
) -> Result<u16, DrtpError> {
    let syn = Packet::syn(requested);
    let attempts = config.syn_retries + 1;
    *state = ConnectionState::SynSent;

    for attempt in 1..=attempts {
        socket.send_to(&syn, peer).await?;
        log::info!("SYN packet is sent (window request {requested})");

        let deadline = Instant::now() + config.timeout;
        loop {
            match socket.recv_until(deadline).await? {
                Incoming::TimedOut => {
                    log::warn!("no SYN-ACK within {:?} (attempt {attempt}/{attempts})", config.timeout);
                    break;
                }
                Incoming::Malformed { from, error } => {
                    log::warn!("discarding malformed datagram from {from}: {error}");
                }
                Incoming::Packet { from, .. } if from != peer => {
                    log::debug!("ignoring datagram from unexpected address {from}");
                }
                Incoming::Packet { packet, .. } => {
                    if !packet.is_syn_ack() {
                        log::error!("Unexpected packet in handshake");
                        return Err(DrtpError::HandshakeFailed(format!(
                            "expected SYN|ACK, received {}",
                            describe_flags(packet.header.flags)
                        )));
                    }
                    log::info!("SYN-ACK packet is received");
                    let window = negotiate_window(requested, packet.header.window);
                    log::info!(
                        "Effective sliding window size is set to {window} (min of {requested} and {})",
                        packet.header.window
                    );
                    socket.send_to(&Packet::ack(0, window), peer).await?;
                    log::info!("ACK packet is sent");
                    *state = ConnectionState::Established;
                    log::info!("Connection established");
                    return Ok(window);
                }
            }
        }
    }

    Err(DrtpError::HandshakeFailed(format!(
        "no SYN-ACK from {peer} after {attempts} attempt(s)"
    )))
}

/// Passive open: wait for a client and complete the handshake.
///
/// The first well-formed packet must be a SYN; anything else aborts with
/// [`DrtpError::HandshakeFailed`] without replying.
pub async fn server_handshake(
    socket: &Socket,
    config: &Config,
    state: &mut ConnectionState,
) -> Result<Accepted, DrtpError> {
    *state = ConnectionState::Listen;
    log::info!("Listening on {}", socket.local_addr);

    let (syn, peer) = loop {
        match socket.recv_deadline(config.accept_timeout).await? {
            Incoming::TimedOut => {
                return Err(DrtpError::HandshakeFailed("no SYN before accept timeout".into()));
            }
            Incoming::Malformed { from, error } => {
                log::warn!("discarding malformed datagram from {from}: {error}");
            }
            Incoming::Packet { packet, from } => break (packet, from),
        }
    };

    if !syn.is_syn() {
        log::error!("Expected SYN, received unexpected packet.");
        return Err(DrtpError::HandshakeFailed(format!(
            "expected SYN from {peer}, received {}",
            describe_flags(syn.header.flags)
        )));
    }
    log::info!("SYN packet is received from {peer} (window request {})", syn.header.window);

    let syn_ack = Packet::syn_ack(config.server_window);
    socket.send_to(&syn_ack, peer).await?;
    *state = ConnectionState::SynReceived;
    log::info!("SYN-ACK packet is sent");

    let deadline = Instant::now() + config.handshake_timeout();
    loop {
        let packet = match socket.recv_until(deadline).await? {
            Incoming::TimedOut => {
                return Err(DrtpError::HandshakeFailed("timed out waiting for ACK".into()));
            }
            Incoming::Malformed { from, error } => {
                log::warn!("discarding malformed datagram from {from}: {error}");
                continue;
            }
            Incoming::Packet { from, .. } if from != peer => {
                log::debug!("ignoring datagram from {from} during handshake with {peer}");
                continue;
            }
            Incoming::Packet { packet, .. } => packet,
        };

        if packet.is_syn() {
            log::debug!("duplicate SYN; re-sending SYN-ACK");
            socket.send_to(&syn_ack, peer).await?;
        } else if packet.is_pure_ack() {
            let window = negotiate_window(packet.header.window, config.server_window);
            log::info!("ACK packet is received");
            *state = ConnectionState::Established;
            log::info!("Connection established (window {window})");
            return Ok(Accepted {
                peer,
                window,
                first_data: None,
            });
        } else if packet.is_data() || (packet.is_fin() && !packet.is_fin_ack()) {
            let window = negotiate_window(packet.header.window, config.server_window);
            log::warn!(
                "final ACK lost; {} seq = {} completes the handshake",
                describe_flags(packet.header.flags),
                packet.header.seq
            );
            *state = ConnectionState::Established;
            log::info!("Connection established (window {window})");
            return Ok(Accepted {
                peer,
                window,
                first_data: Some(packet),
            });
        } else {
            log::error!("Invalid ACK, closing connection.");
            return Err(DrtpError::HandshakeFailed(format!(
                "expected ACK, received {}",
                describe_flags(packet.header.flags)
            )));
        }
    }
}
