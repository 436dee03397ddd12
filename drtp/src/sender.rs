//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] owns the chunk list for one transfer and a sliding window of
//! up to `window` in-flight chunks.
//!
//! # Protocol contract
//!
//! - Chunk `i` travels with sequence number `i mod 2^16`.
//! - At most `window` chunks may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` means the receiver holds every chunk
//!   before `K`.  Stale, duplicate and out-of-range ACKs are ignored.
//! - On timeout the caller rewinds `next_seq` to `base` and sends the whole
//!   window again (go back to N).
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use crate::packet::Packet;

/// Counters reported when a transfer finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendStats {
    /// Chunks in the file.
    pub chunks: u64,
    /// Payload bytes in the file.
    pub bytes: u64,
    /// Data packets put on the wire, first transmissions and resends.
    pub packets_sent: u64,
    /// Data packets that were resends.
    pub retransmissions: u64,
    /// Retransmission timeouts.
    pub timeouts: u64,
}

/// Go-Back-N send-side state for one transfer.
///
/// # Cursor layout
///
/// ```text
///     base          next_seq       base + window
///      │                │                │
///  ────┼────────────────┼────────────────┼──────▶ chunk index
///      │ <── in flight ─▶│ <── sendable ──▶│
/// ```
///
/// Invariant: `base ≤ next_seq ≤ min(base + window, total)`.
#[derive(Debug)]
pub struct GbnSender {
    /// Index of the oldest unacknowledged chunk.
    base: u64,
    /// Index of the next chunk to transmit.
    next_seq: u64,
    /// Highest `next_seq` ever reached; indices below it were sent at least once.
    high_water: u64,
    window: u64,
    wire_window: u16,
    /// Index of `chunks[0]`.
    start: u64,
    chunks: Vec<Vec<u8>>,
    stats: SendStats,
    consecutive_timeouts: u32,
}

impl GbnSender {
    /// Create a sender for `chunks` with a fixed window (at least 1).
    pub fn new(chunks: Vec<Vec<u8>>, window: u16) -> Self {
        let wire_window = window.max(1);
        let stats = SendStats {
            chunks: chunks.len() as u64,
            bytes: chunks.iter().map(|c| c.len() as u64).sum(),
            ..SendStats::default()
        };
        Self {
            base: 0,
            next_seq: 0,
            high_water: 0,
            window: u64::from(wire_window),
            wire_window,
            start: 0,
            chunks,
            stats,
            consecutive_timeouts: 0,
        }
    }

    /// Number the first chunk `first` instead of 0, continuing a stream
    /// that already carried `first` chunks.
    pub fn starting_at(mut self, first: u64) -> Self {
        self.start = first;
        self.base = first;
        self.next_seq = first;
        self.high_water = first;
        self
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn window(&self) -> u16 {
        self.wire_window
    }

    /// One past the index of the last chunk.
    pub fn end(&self) -> u64 {
        self.start + self.chunks.len() as u64
    }

    /// `true` once every chunk is acknowledged.
    pub fn is_done(&self) -> bool {
        self.base == self.end()
    }

    /// `true` when the window has room and chunks remain.
    pub fn can_send(&self) -> bool {
        self.next_seq < self.base + self.window && self.next_seq < self.end()
    }

    /// Number of chunks sent but not yet acknowledged.
    pub fn in_flight(&self) -> u64 {
        self.next_seq - self.base
    }

    /// Timeouts since the last ACK that made progress.
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    pub fn stats(&self) -> SendStats {
        self.stats
    }

    /// Build the data packet for `next_seq` and advance it.
    ///
    /// Returns `None` when [`can_send`](Self::can_send) is `false`.
    pub fn next_packet(&mut self) -> Option<Packet> {
        if !self.can_send() {
            return None;
        }
        let index = self.next_seq;
        let payload = self.chunks[(index - self.start) as usize].clone();
        if index < self.high_water {
            self.stats.retransmissions += 1;
        }
        self.stats.packets_sent += 1;
        self.next_seq += 1;
        self.high_water = self.high_water.max(self.next_seq);
        Some(Packet::data(index as u16, self.wire_window, payload))
    }

    /// Process a cumulative ACK carrying wire value `ack`.
    ///
    /// The wire value is resolved to the chunk index closest above `base`.
    /// Only an ACK for a chunk that was actually transmitted can move the
    /// window.  Returns the number of newly acknowledged chunks; `0` for a
    /// stale or duplicate ACK.
    pub fn on_ack(&mut self, ack: u16) -> u64 {
        let offset = u64::from(ack.wrapping_sub(self.base as u16));
        let acked_to = self.base + offset;
        if offset == 0 || acked_to > self.high_water {
            return 0;
        }
        self.base = acked_to;
        self.next_seq = self.next_seq.max(self.base);
        self.consecutive_timeouts = 0;
        offset
    }

    /// Rewind to `base` after a retransmission timeout.
    ///
    /// Returns the number of chunks that will be sent again.
    pub fn on_timeout(&mut self) -> u64 {
        self.stats.timeouts += 1;
        self.consecutive_timeouts += 1;
        let resend = self.next_seq - self.base;
        self.next_seq = self.base;
        resend
    }
}

/// Split `data` into consecutive chunks of at most `chunk_size` bytes.
///
/// An empty input yields no chunks.
pub fn chunk_bytes(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
