//! Connection teardown.
//!
//! The client sends FIN once every chunk is acknowledged and waits for
//! FIN|ACK.  The server answers the FIN, stops reading data, and lingers
//! briefly so a retransmitted FIN (its FIN|ACK was lost) still gets an
//! answer.  A client that never sees FIN|ACK still treats its half as
//! closed and reports [`TeardownOutcome::Incomplete`].

use std::net::SocketAddr;

use tokio::time::Instant;

use crate::config::Config;
use crate::error::DrtpError;
use crate::packet::Packet;
use crate::socket::{Incoming, Socket};

/// How the closing exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// FIN|ACK observed.
    Closed,
    /// FIN sent but never acknowledged; the session is closed locally.
    Incomplete,
}

impl TeardownOutcome {
    pub fn is_complete(self) -> bool {
        self == Self::Closed
    }
}

/// Send FIN and wait for FIN|ACK, re-sending up to [`Config::fin_retries`]
/// times.  Nothing is sent after FIN|ACK arrives.
pub async fn client_close(
    socket: &Socket,
    peer: SocketAddr,
    window: u16,
    config: &Config,
) -> Result<TeardownOutcome, DrtpError> {
    let fin = Packet::fin(window);
    let attempts = config.fin_retries + 1;

    for attempt in 1..=attempts {
        socket.send_to(&fin, peer).await?;
        log::info!("FIN packet is sent");

        let deadline = Instant::now() + config.timeout;
        loop {
            match socket.recv_until(deadline).await? {
                Incoming::TimedOut => break,
                Incoming::Packet { packet, from } if from == peer && packet.is_fin_ack() => {
                    log::info!("FIN-ACK packet is received");
                    log::info!("Connection closes");
                    return Ok(TeardownOutcome::Closed);
                }
                Incoming::Packet { packet, .. } => {
                    log::debug!("ignoring late packet ack={} while closing", packet.header.ack);
                }
                Incoming::Malformed { from, error } => {
                    log::warn!("discarding malformed datagram from {from}: {error}");
                }
            }
        }
        log::warn!("no FIN-ACK within {:?} (attempt {attempt}/{attempts})", config.timeout);
    }

    log::warn!("FIN was never acknowledged; closing the connection anyway");
    Ok(TeardownOutcome::Incomplete)
}

/// Reply to a FIN with FIN|ACK.
pub async fn answer_fin(socket: &Socket, peer: SocketAddr) -> Result<(), DrtpError> {
    log::info!("FIN packet is received");
    socket.send_to(&Packet::fin_ack(), peer).await?;
    log::info!("FIN ACK packet is sent");
    Ok(())
}

/// Absorb traffic for [`Config::linger`] after answering a FIN, replying to
/// any repeated FIN.  Returns how many repeats were answered.
pub async fn server_linger(
    socket: &Socket,
    peer: SocketAddr,
    config: &Config,
) -> Result<u32, DrtpError> {
    let deadline = Instant::now() + config.linger;
    let mut answered = 0;
    loop {
        match socket.recv_until(deadline).await? {
            Incoming::TimedOut => return Ok(answered),
            Incoming::Packet { packet, from } if from == peer && packet.is_fin() && !packet.is_fin_ack() => {
                log::debug!("repeated FIN while lingering");
                socket.send_to(&Packet::fin_ack(), peer).await?;
                answered += 1;
            }
            _ => {}
        }
    }
}
