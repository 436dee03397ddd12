//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O, the receive deadline and the
//! shutdown signal that unblocks a pending receive.

use std::future::pending;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::DrtpError;
use crate::packet::{describe_flags, Packet, PacketError, MAX_DATAGRAM};

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Trigger side of the operator interrupt.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Observer side, cloned into every [`Socket`] that should be cancellable.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger/observer pair.
pub fn shutdown_channel() -> (Shutdown, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (Shutdown { tx }, ShutdownSignal { rx })
}

impl Shutdown {
    /// Cancel every receive currently blocked on a linked socket, and every
    /// future one.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the trigger fires.  Pends forever if the trigger was
    /// dropped without firing.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                pending::<()>().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Incoming
// ---------------------------------------------------------------------------

/// Outcome of one receive-with-deadline.
///
/// Transport failures and cancellation are reported as `Err` instead.
#[derive(Debug)]
pub enum Incoming {
    /// A well-formed packet.
    Packet { packet: Packet, from: SocketAddr },
    /// A datagram too short to hold a header.  Callers log and skip it.
    Malformed { from: SocketAddr, error: PacketError },
    /// The deadline passed with nothing received.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, packet-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    shutdown: ShutdownSignal,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, DrtpError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            shutdown: ShutdownSignal::never(),
        })
    }

    /// Attach a shutdown signal; a trigger makes any receive return
    /// [`DrtpError::Cancelled`].
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), DrtpError> {
        if self.shutdown.is_triggered() {
            return Err(DrtpError::Cancelled);
        }
        let bytes = packet.encode()?;
        self.inner.send_to(&bytes, dest).await?;
        log::trace!(
            "→ {} seq={} ack={} win={} len={} to {dest}",
            describe_flags(packet.header.flags),
            packet.header.seq,
            packet.header.ack,
            packet.header.window,
            packet.payload.len()
        );
        Ok(())
    }

    /// Receive the next datagram, waiting at most `deadline` (`None` waits
    /// indefinitely).
    pub async fn recv_deadline(&self, deadline: Option<Duration>) -> Result<Incoming, DrtpError> {
        let mut shutdown = self.shutdown.clone();
        let mut buf = [0u8; MAX_DATAGRAM];

        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(DrtpError::Cancelled),
            r = async {
                match deadline {
                    Some(d) => tokio::time::timeout(d, self.inner.recv_from(&mut buf)).await.ok(),
                    None => Some(self.inner.recv_from(&mut buf).await),
                }
            } => r,
        };

        let Some(result) = received else {
            return Ok(Incoming::TimedOut);
        };
        let (n, from) = result?;
        Ok(match Packet::decode(&buf[..n]) {
            Ok(packet) => Incoming::Packet { packet, from },
            Err(error) => Incoming::Malformed { from, error },
        })
    }

    /// Like [`recv_deadline`](Self::recv_deadline) but against an absolute
    /// instant, so a caller skipping unwanted packets keeps its original
    /// deadline.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Incoming, DrtpError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.recv_deadline(Some(remaining)).await
    }
}
