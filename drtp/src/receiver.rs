//! Go-Back-N receive-side state machine with a bounded reorder buffer.
//!
//! [`GbnReceiver`] accepts data packets and hands payloads to the caller
//! strictly in sequence order:
//!
//! - `seq == expected`: the payload is ready, along with any buffered
//!   successors that are now contiguous.
//! - `seq` ahead of `expected` but inside the reorder window: the payload is
//!   held until the gap fills.
//! - Duplicates and anything beyond the window are discarded.
//!
//! After every data packet the caller sends a **cumulative ACK** carrying
//! [`GbnReceiver::ack_number`], i.e. the next index the receiver expects.
//! The first data chunk has index 0; handshake packets consume no sequence
//! numbers.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::{BTreeMap, VecDeque};

/// Counters reported when the receive loop finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    /// Payload bytes handed to the output, in order.
    pub bytes: u64,
    /// Data packets that reached the state machine.
    pub packets_received: u64,
    /// Payloads handed to the output.
    pub delivered: u64,
    /// Data packets for chunks already delivered or already buffered.
    pub duplicates: u64,
    /// Data packets parked in the reorder buffer.
    pub buffered: u64,
    /// Data packets discarded by the fault simulator.
    pub dropped_by_simulator: u64,
}

/// What happened to one data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// In order; this many payloads are now ready (the packet itself plus
    /// drained successors).
    Delivered(u64),
    /// Ahead of `expected`; held for later.
    Buffered,
    /// Already delivered or already held.
    Duplicate,
    /// Too far ahead to hold.
    OutOfWindow,
}

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct GbnReceiver {
    /// Index of the next in-order chunk.
    expected: u64,
    /// How far ahead of `expected` a chunk may be and still be held.
    reorder_window: u64,
    /// Out-of-order payloads keyed by chunk index.
    pending: BTreeMap<u64, Vec<u8>>,
    /// In-order payloads waiting for the caller.
    ready: VecDeque<Vec<u8>>,
    stats: ReceiveStats,
}

impl GbnReceiver {
    /// Create a receiver expecting chunk 0.
    ///
    /// A `reorder_window` of 1 disables buffering (classic Go-Back-N).
    pub fn new(reorder_window: u16) -> Self {
        Self {
            expected: 0,
            reorder_window: u64::from(reorder_window.max(1)),
            pending: BTreeMap::new(),
            ready: VecDeque::new(),
            stats: ReceiveStats::default(),
        }
    }

    pub fn expected_seq(&self) -> u64 {
        self.expected
    }

    /// Cumulative ACK value for the wire: the next expected index.
    pub fn ack_number(&self) -> u16 {
        self.expected as u16
    }

    /// Number of payloads held out of order.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> ReceiveStats {
        self.stats
    }

    /// Record a packet the fault simulator discarded.
    pub fn note_simulated_drop(&mut self) {
        self.stats.dropped_by_simulator += 1;
    }

    /// Process an inbound data packet carrying wire sequence `seq`.
    pub fn on_segment(&mut self, seq: u16, payload: Vec<u8>) -> Disposition {
        self.stats.packets_received += 1;
        let offset = u64::from(seq.wrapping_sub(self.expected as u16));

        if offset == 0 {
            self.deliver(payload);
            let mut count = 1;
            while let Some(next) = self.pending.remove(&self.expected) {
                self.deliver(next);
                count += 1;
            }
            return Disposition::Delivered(count);
        }

        // Offsets in the upper half of the sequence space lie behind us.
        if offset > u64::from(u16::MAX / 2) {
            self.stats.duplicates += 1;
            return Disposition::Duplicate;
        }
        if offset >= self.reorder_window {
            return Disposition::OutOfWindow;
        }

        let index = self.expected + offset;
        if self.pending.contains_key(&index) {
            self.stats.duplicates += 1;
            return Disposition::Duplicate;
        }
        self.pending.insert(index, payload);
        self.stats.buffered += 1;
        Disposition::Buffered
    }

    /// Take the next in-order payload, if any.
    pub fn pop_ready(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    fn deliver(&mut self, payload: Vec<u8>) {
        self.stats.bytes += payload.len() as u64;
        self.stats.delivered += 1;
        self.ready.push_back(payload);
        self.expected += 1;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
