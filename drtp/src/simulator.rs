//! Fault injection for exercising the retransmission path.
//!
//! Real networks drop packets.  To exercise the reliability mechanisms
//! without depending on actual network conditions, the receive loop passes
//! every inbound data packet through a [`Simulator`] first; a packet it
//! decides to drop is treated as if it never arrived.
//!
//! | Fault                | Description                                    |
//! |----------------------|------------------------------------------------|
//! | First-packet discard | Drop the first data packet (`--discard`).      |
//! | Targeted drops       | Drop the first arrival of listed sequence nos. |
//! | Random loss          | Drop with probability `loss_rate`, seeded.     |
//!
//! Only data packets are ever dropped; control packets pass untouched.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::packet::Packet;

/// Configuration for the fault-injection model.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Drop the very first data packet that arrives.
    pub drop_first_data: bool,
    /// Drop the first arrival of each of these sequence numbers.
    pub drop_seqs: Vec<u16>,
    /// Probability in `[0.0, 1.0]` that any data packet is dropped.
    pub loss_rate: f64,
    /// RNG seed so lossy runs are reproducible.
    pub seed: u64,
}

impl SimulatorConfig {
    /// The `--discard` behaviour: lose exactly one data packet.
    pub fn discard_first() -> Self {
        Self {
            drop_first_data: true,
            ..Self::default()
        }
    }
}

/// Stateful drop decider for one session.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    seen_data: bool,
    pending_seqs: HashSet<u16>,
    dropped: u64,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let pending_seqs = config.drop_seqs.iter().copied().collect();
        Self {
            config,
            rng,
            seen_data: false,
            pending_seqs,
            dropped: 0,
        }
    }

    /// A simulator that never drops anything.
    pub fn passthrough() -> Self {
        Self::new(SimulatorConfig::default())
    }

    /// Decide the fate of an inbound packet.  Returns `true` to drop it.
    pub fn should_drop(&mut self, packet: &Packet) -> bool {
        if !packet.is_data() {
            return false;
        }
        let first = !self.seen_data;
        self.seen_data = true;

        let drop = (first && self.config.drop_first_data)
            || self.pending_seqs.remove(&packet.header.seq)
            || (self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate.min(1.0)));
        if drop {
            self.dropped += 1;
        }
        drop
    }

    /// Number of packets dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
