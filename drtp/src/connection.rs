//! Session drivers: handshake + Go-Back-N data transfer + teardown.
//!
//! # Architecture
//!
//! ```text
//!  ClientSession                         ServerSession
//!    ├── GbnSender (window, cursors)       ├── GbnReceiver (cumulative ACK,
//!    │                                     │                reorder buffer)
//!    ├── Socket ── DATA ─────────────────▶ ├── Simulator (optional loss)
//!    │         ◀──────────────── ACK ───── ├── Socket
//!    └── teardown::client_close            └── teardown::answer_fin / linger
//! ```
//!
//! Each role runs as one sequential loop alternating between transmitting
//! and a single receive-with-deadline; there is no separate timer task.  A
//! session owns its socket and all of its state, so sessions never share
//! anything.
//!
//! ```ignore
//! let mut client = ClientSession::connect(socket, server, 5, config).await?;
//! let stats = client.send_chunks(chunks).await?;
//! let outcome = client.close().await?;
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::config::Config;
use crate::error::DrtpError;
use crate::handshake::{client_handshake, server_handshake};
use crate::packet::{describe_flags, Packet};
use crate::receiver::{Disposition, GbnReceiver, ReceiveStats};
use crate::sender::{GbnSender, SendStats};
use crate::simulator::Simulator;
use crate::socket::{Incoming, Socket};
use crate::state::ConnectionState;
use crate::teardown::{answer_fin, client_close, server_linger, TeardownOutcome};

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// The sending side of one connection.
#[derive(Debug)]
pub struct ClientSession {
    /// Current phase.
    pub state: ConnectionState,
    socket: Socket,
    peer: SocketAddr,
    /// Negotiated window, fixed for the session.
    window: u16,
    /// Chunks already delivered on this session; the next call continues
    /// numbering from here.
    chunks_sent: u64,
    config: Config,
}

impl ClientSession {
    /// Perform an active open against `peer`, requesting `window`.
    pub async fn connect(
        socket: Socket,
        peer: SocketAddr,
        window: u16,
        config: Config,
    ) -> Result<Self, DrtpError> {
        log::info!("Connection Establishment Phase: {} → {peer}", socket.local_addr);
        let mut state = ConnectionState::Closed;
        let window = client_handshake(&socket, peer, window, &config, &mut state).await?;
        Ok(Self {
            state,
            socket,
            peer,
            window,
            chunks_sent: 0,
            config,
        })
    }

    pub fn window(&self) -> u16 {
        self.window
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Deliver `chunks` in order with Go-Back-N.
    ///
    /// Returns once every chunk is acknowledged.  Fails with
    /// [`DrtpError::RetransmitTimeout`] when [`Config::max_retransmits`]
    /// consecutive timeouts pass without progress.
    pub async fn send_chunks(&mut self, chunks: Vec<Vec<u8>>) -> Result<SendStats, DrtpError> {
        let mut sender = GbnSender::new(chunks, self.window).starting_at(self.chunks_sent);
        log::info!(
            "Data Transfer: {} chunk(s), window {}",
            sender.stats().chunks,
            self.window
        );

        let mut deadline = Instant::now() + self.config.timeout;
        while !sender.is_done() {
            // Fill the window.
            while let Some(pkt) = sender.next_packet() {
                self.socket.send_to(&pkt, self.peer).await?;
                log::info!(
                    "packet with seq = {} is sent, sliding window = {}",
                    pkt.header.seq,
                    window_view(sender.base(), sender.next_seq())
                );
            }

            // Wait for a cumulative ACK.
            match self.socket.recv_until(deadline).await? {
                Incoming::Packet { packet, from } if from == self.peer && packet.is_pure_ack() => {
                    let ack = packet.header.ack;
                    if sender.on_ack(ack) > 0 {
                        log::info!("ACK for packet = {ack} is received, base = {}", sender.base());
                        deadline = Instant::now() + self.config.timeout;
                    } else {
                        log::debug!("stale ACK {ack} ignored (base = {})", sender.base());
                    }
                }
                Incoming::Packet { packet, from } => {
                    log::debug!(
                        "ignoring {} from {from} during transfer",
                        describe_flags(packet.header.flags)
                    );
                }
                Incoming::Malformed { from, error } => {
                    log::warn!("discarding malformed datagram from {from}: {error}");
                }
                Incoming::TimedOut => {
                    let resend = sender.on_timeout();
                    let attempts = sender.consecutive_timeouts();
                    if let Some(limit) = self.config.max_retransmits {
                        if attempts > limit {
                            log::error!("no progress after {attempts} timeouts; giving up");
                            return Err(DrtpError::RetransmitTimeout { attempts });
                        }
                    }
                    log::warn!(
                        "Timeout! Resending {resend} packet(s) from base = {}",
                        sender.base() as u16
                    );
                    deadline = Instant::now() + self.config.timeout;
                }
            }
        }

        self.chunks_sent = sender.end();
        let stats = sender.stats();
        log::info!(
            "all {} chunk(s) acknowledged ({} sent, {} retransmitted)",
            stats.chunks,
            stats.packets_sent,
            stats.retransmissions
        );
        Ok(stats)
    }

    /// Run the teardown exchange and consume the session.
    pub async fn close(mut self) -> Result<TeardownOutcome, DrtpError> {
        log::info!("Connection Teardown");
        self.state = ConnectionState::FinSent;
        let outcome = client_close(&self.socket, self.peer, self.window, &self.config).await?;
        self.state = ConnectionState::Closed;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// ServerSession
// ---------------------------------------------------------------------------

/// The receiving side of one connection.
#[derive(Debug)]
pub struct ServerSession {
    /// Current phase.
    pub state: ConnectionState,
    socket: Socket,
    peer: SocketAddr,
    window: u16,
    receiver: GbnReceiver,
    simulator: Simulator,
    /// Data packet or FIN that stood in for the final handshake ACK.
    first_data: Option<Packet>,
    /// Time from the start of the receive loop to the client's FIN.
    transfer_elapsed: Option<Duration>,
    config: Config,
}

impl ServerSession {
    /// Perform a passive open: wait for a client and complete the handshake.
    pub async fn accept(socket: Socket, config: Config) -> Result<Self, DrtpError> {
        let mut state = ConnectionState::Closed;
        let accepted = server_handshake(&socket, &config, &mut state).await?;
        Ok(Self {
            state,
            socket,
            peer: accepted.peer,
            window: accepted.window,
            receiver: GbnReceiver::new(accepted.window),
            simulator: Simulator::passthrough(),
            first_data: accepted.first_data,
            transfer_elapsed: None,
            config,
        })
    }

    /// Route inbound data through `simulator` before the receiver sees it.
    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn window(&self) -> u16 {
        self.window
    }

    /// Time from the start of [`receive_into`](Self::receive_into) until the
    /// client's FIN arrived; `None` before that.  Excludes the linger.
    pub fn transfer_elapsed(&self) -> Option<Duration> {
        self.transfer_elapsed
    }

    /// Receive the stream into `out` until the client's FIN.
    ///
    /// Payloads are written append-only, one write per chunk, in sequence
    /// order.  After FIN|ACK the session lingers for [`Config::linger`] and
    /// then closes.  An idle period of [`Config::idle_timeout`] before FIN
    /// fails with [`DrtpError::ConnectionTimedOut`].  `out` is flushed on
    /// every exit, so every acknowledged payload stays written even when
    /// the loop fails or is cancelled.
    pub async fn receive_into<W>(&mut self, out: &mut W) -> Result<ReceiveStats, DrtpError>
    where
        W: AsyncWrite + Unpin,
    {
        let result = self.receive_loop(out).await;
        match out.flush().await {
            Ok(()) => result,
            Err(err) if result.is_ok() => Err(err.into()),
            Err(err) => {
                log::error!("flushing output after failure: {err}");
                result
            }
        }
    }

    async fn receive_loop<W>(&mut self, out: &mut W) -> Result<ReceiveStats, DrtpError>
    where
        W: AsyncWrite + Unpin,
    {
        log::info!("Data Transfer: receiving from {} (window {})", self.peer, self.window);
        let started = Instant::now();

        loop {
            let packet = match self.first_data.take() {
                Some(packet) => packet,
                None => match self.socket.recv_deadline(Some(self.config.idle_timeout)).await? {
                    Incoming::TimedOut => {
                        let bytes_written = self.receiver.stats().bytes;
                        log::error!("Timeout waiting for data ({bytes_written} bytes written).");
                        self.state = ConnectionState::Closed;
                        return Err(DrtpError::ConnectionTimedOut { bytes_written });
                    }
                    Incoming::Malformed { from, error } => {
                        log::warn!("discarding malformed datagram from {from}: {error}");
                        continue;
                    }
                    Incoming::Packet { from, .. } if from != self.peer => {
                        log::debug!("ignoring datagram from {from}; connected to {}", self.peer);
                        continue;
                    }
                    Incoming::Packet { packet, .. } => packet,
                },
            };

            if packet.is_fin() {
                self.transfer_elapsed = Some(started.elapsed());
                answer_fin(&self.socket, self.peer).await?;
                out.flush().await?;
                self.state = ConnectionState::Linger;
                server_linger(&self.socket, self.peer, &self.config).await?;
                self.state = ConnectionState::Closed;
                log::info!("Connection closes");
                return Ok(self.receiver.stats());
            }

            if !packet.is_data() {
                log::debug!(
                    "ignoring {} during transfer",
                    describe_flags(packet.header.flags)
                );
                continue;
            }

            let seq = packet.header.seq;
            if self.simulator.should_drop(&packet) {
                self.receiver.note_simulated_drop();
                log::info!("Intentionally discarding packet with seq = {seq}");
                continue;
            }

            match self.receiver.on_segment(seq, packet.payload) {
                Disposition::Delivered(_) => log::info!("packet {seq} is received"),
                Disposition::Buffered => log::info!("packet {seq} is received out of order; buffered"),
                Disposition::Duplicate => log::info!("duplicate packet {seq} discarded"),
                Disposition::OutOfWindow => log::warn!("packet {seq} is beyond the window; discarded"),
            }
            while let Some(payload) = self.receiver.pop_ready() {
                out.write_all(&payload).await?;
            }

            let ack = self.receiver.ack_number();
            self.socket.send_to(&Packet::ack(ack, self.window), self.peer).await?;
            log::info!("sending ack {ack} for the received {seq}");
        }
    }
}

/// Render the in-flight range the way the log lines show it: `{3, 4, 5}`.
fn window_view(base: u64, next_seq: u64) -> String {
    const SHOWN: u64 = 16;
    if next_seq - base > SHOWN {
        return format!("{{{} .. {}}}", base as u16, (next_seq - 1) as u16);
    }
    let seqs: Vec<String> = (base..next_seq).map(|i| (i as u16).to_string()).collect();
    format!("{{{}}}", seqs.join(", "))
}
