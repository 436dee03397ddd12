//! Protocol tuning parameters.
//!
//! Every timing and sizing constant the protocol uses lives in [`Config`],
//! which is passed by reference to the handshake, the sender and receiver
//! drivers, and teardown.  Nothing here is global or mutable at runtime.

use std::time::Duration;

use crate::packet::MAX_PAYLOAD;

/// Largest window either side will accept.
///
/// Sequence numbers are 16 bits on the wire; keeping the window below half
/// the sequence space makes every in-window value unambiguous.
pub const MAX_WINDOW: u16 = u16::MAX / 2;

/// Window the client requests when none is given.
pub const DEFAULT_CLIENT_WINDOW: u16 = 3;

/// Adjustable protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Retransmission timeout and per-receive deadline for the sender,
    /// the client handshake and teardown.  Constant: no backoff.
    pub timeout: Duration,
    /// Payload bytes per data packet.
    pub chunk_size: usize,
    /// Receive capacity the server advertises in SYN|ACK.
    pub server_window: u16,
    /// Extra SYN transmissions after the first one times out.
    pub syn_retries: u32,
    /// Extra FIN transmissions after the first one times out.
    pub fin_retries: u32,
    /// Consecutive timeouts without progress before the sender gives up.
    /// `None` retries forever.
    pub max_retransmits: Option<u32>,
    /// How long the receiver waits for the next packet before giving up.
    pub idle_timeout: Duration,
    /// How long the server waits for the first SYN.  `None` waits forever.
    pub accept_timeout: Option<Duration>,
    /// How long the server keeps answering retransmitted FINs after
    /// sending FIN|ACK.
    pub linger: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let timeout = Duration::from_millis(400);
        Self {
            timeout,
            chunk_size: MAX_PAYLOAD,
            server_window: 15,
            syn_retries: 3,
            fin_retries: 2,
            max_retransmits: Some(30),
            idle_timeout: Duration::from_secs(10),
            accept_timeout: None,
            linger: timeout * 2,
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_server_window(mut self, window: u16) -> Self {
        self.server_window = window;
        self
    }

    pub fn with_syn_retries(mut self, retries: u32) -> Self {
        self.syn_retries = retries;
        self
    }

    pub fn with_fin_retries(mut self, retries: u32) -> Self {
        self.fin_retries = retries;
        self
    }

    pub fn with_max_retransmits(mut self, limit: Option<u32>) -> Self {
        self.max_retransmits = limit;
        self
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn with_accept_timeout(mut self, accept: Option<Duration>) -> Self {
        self.accept_timeout = accept;
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// How long the server waits for the client's final handshake ACK.
    ///
    /// Long enough to cover every SYN retry the client may still make.
    pub fn handshake_timeout(&self) -> Duration {
        self.timeout * (self.syn_retries + 2)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be non-zero".into());
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
            return Err(format!(
                "chunk size {} outside 1..={MAX_PAYLOAD}",
                self.chunk_size
            ));
        }
        if self.server_window == 0 {
            return Err("server window must be at least 1".into());
        }
        Ok(())
    }
}

/// Effective window for a transfer: the smaller of the two offers, kept
/// inside `1..=MAX_WINDOW`.
pub fn negotiate_window(requested: u16, advertised: u16) -> u16 {
    requested.min(advertised).clamp(1, MAX_WINDOW)
}
