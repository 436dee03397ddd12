//! Wire-format definitions for DRTP packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Sequence Number        |     Acknowledgment Number     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Flags             |        Receive Window         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload (0..=992 bytes)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 8 bytes.  The datagram never exceeds
//! [`MAX_DATAGRAM`] bytes, so a payload carries at most [`MAX_PAYLOAD`] bytes.
//! The header does not carry a payload length: everything after the header
//! in the datagram is payload.

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledgement field is valid.
    pub const ACK: u16 = 0b0001;
    /// Connection request (handshake initiation).
    pub const SYN: u16 = 0b0010;
    /// Finish: the sender has no more data to send.
    pub const FIN: u16 = 0b0100;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 8;

/// Largest datagram either peer will ever send.
pub const MAX_DATAGRAM: usize = 1000;

/// Largest payload that fits in one datagram.
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 2;
const OFF_FLAGS: usize = 4;
const OFF_WINDOW: usize = 6;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Chunk index of the payload, modulo 2^16.
    pub seq: u16,
    /// Cumulative acknowledgement: the next chunk index the receiver expects.
    pub ack: u16,
    /// Bitmask of [`flags`] constants.
    pub flags: u16,
    /// Window field.  Carries the requested window in SYN, the advertised
    /// capacity in SYN|ACK and the negotiated window afterwards.
    pub window: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Assemble a packet from raw header values.
    pub fn new(seq: u16, ack: u16, flags: u16, window: u16, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                seq,
                ack,
                flags,
                window,
            },
            payload,
        }
    }

    /// Client connection request advertising the requested window.
    pub fn syn(window: u16) -> Self {
        Self::new(0, 0, flags::SYN, window, Vec::new())
    }

    /// Server reply to a SYN advertising its receive capacity.
    pub fn syn_ack(window: u16) -> Self {
        Self::new(0, 0, flags::SYN | flags::ACK, window, Vec::new())
    }

    /// Pure acknowledgement.  `ack` is the next expected sequence number.
    pub fn ack(ack: u16, window: u16) -> Self {
        Self::new(0, ack, flags::ACK, window, Vec::new())
    }

    /// Data packet carrying one file chunk.
    pub fn data(seq: u16, window: u16, payload: Vec<u8>) -> Self {
        Self::new(seq, 0, 0, window, payload)
    }

    /// Connection close request.
    pub fn fin(window: u16) -> Self {
        Self::new(0, 0, flags::FIN, window, Vec::new())
    }

    /// Reply to a FIN.
    pub fn fin_ack() -> Self {
        Self::new(0, 0, flags::FIN | flags::ACK, 0, Vec::new())
    }

    /// `true` when every bit in `mask` is set.
    pub fn has(&self, mask: u16) -> bool {
        self.header.flags & mask == mask
    }

    /// A bare SYN (no ACK).
    pub fn is_syn(&self) -> bool {
        self.has(flags::SYN) && !self.has(flags::ACK)
    }

    pub fn is_syn_ack(&self) -> bool {
        self.has(flags::SYN | flags::ACK)
    }

    /// Any packet with FIN set, acknowledged or not.
    pub fn is_fin(&self) -> bool {
        self.has(flags::FIN)
    }

    pub fn is_fin_ack(&self) -> bool {
        self.has(flags::FIN | flags::ACK)
    }

    /// ACK without SYN or FIN, i.e. a data acknowledgement.
    pub fn is_pure_ack(&self) -> bool {
        self.header.flags & (flags::ACK | flags::SYN | flags::FIN) == flags::ACK
    }

    /// No control flags at all.
    pub fn is_data(&self) -> bool {
        self.header.flags & (flags::ACK | flags::SYN | flags::FIN) == 0
    }

    /// Serialise this packet into a newly allocated byte vector of exactly
    /// `HEADER_LEN + payload.len()` bytes.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(PacketError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.seq.to_be_bytes());
        buf.extend_from_slice(&self.header.ack.to_be_bytes());
        buf.extend_from_slice(&self.header.flags.to_be_bytes());
        buf.extend_from_slice(&self.header.window.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`PacketError::BufferTooShort`] if `buf` cannot hold a header.
    /// Any trailing bytes become the payload; the length is not checked
    /// against [`MAX_PAYLOAD`], the caller's buffer bounds it.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }
        let field = |off: usize| u16::from_be_bytes([buf[off], buf[off + 1]]);

        Ok(Packet {
            header: Header {
                seq: field(OFF_SEQ),
                ack: field(OFF_ACK),
                flags: field(OFF_FLAGS),
                window: field(OFF_WINDOW),
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Human-readable flag names for log lines, e.g. `SYN|ACK`.
pub fn describe_flags(bits: u16) -> String {
    let names: Vec<&str> = [(flags::SYN, "SYN"), (flags::FIN, "FIN"), (flags::ACK, "ACK")]
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|&(_, name)| name)
        .collect();
    if names.is_empty() {
        "DATA".to_string()
    } else {
        names.join("|")
    }
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("datagram of {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    BufferTooShort(usize),
    /// Payload would push the datagram past [`MAX_DATAGRAM`].
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let pkt = Packet::new(42, 7, flags::SYN, 4096, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn roundtrip_at_payload_bounds() {
        for len in [0, 1, MAX_PAYLOAD - 1, MAX_PAYLOAD] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let pkt = Packet::new(u16::MAX, 1, flags::ACK, 15, payload);
            let bytes = pkt.encode().unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + len);
            assert_eq!(Packet::decode(&bytes).unwrap(), pkt);
        }
    }

    #[test]
    fn oversized_payload_rejected() {
        let pkt = Packet::data(0, 1, vec![0u8; MAX_PAYLOAD + 1]);
        assert_eq!(
            pkt.encode(),
            Err(PacketError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn header_only_decodes_with_empty_payload() {
        let decoded = Packet::decode(&[0u8; HEADER_LEN]).unwrap();
        assert!(decoded.payload.is_empty());
        assert!(decoded.is_data());
    }

    #[test]
    fn fields_big_endian_in_fixed_order() {
        let bytes = Packet::new(0x0102, 0x0304, 0x0506, 0x0708, vec![0xaa])
            .encode()
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xaa]
        );
    }

    #[test]
    fn flag_bits_match_wire_assignment() {
        assert_eq!(Packet::syn(5).encode().unwrap()[OFF_FLAGS + 1], 0b0010);
        assert_eq!(Packet::syn_ack(15).encode().unwrap()[OFF_FLAGS + 1], 0b0011);
        assert_eq!(Packet::fin_ack().encode().unwrap()[OFF_FLAGS + 1], 0b0101);
    }

    #[test]
    fn classification_helpers() {
        assert!(Packet::syn(3).is_syn());
        assert!(!Packet::syn_ack(3).is_syn());
        assert!(Packet::syn_ack(3).is_syn_ack());
        assert!(Packet::ack(4, 3).is_pure_ack());
        assert!(!Packet::syn_ack(3).is_pure_ack());
        assert!(!Packet::fin_ack().is_pure_ack());
        assert!(Packet::data(9, 3, vec![1]).is_data());
        assert!(Packet::fin(3).is_fin());
        assert!(!Packet::fin(3).is_fin_ack());
        assert!(Packet::fin_ack().is_fin_ack());
    }

    #[test]
    fn describe_flags_names() {
        assert_eq!(describe_flags(flags::SYN | flags::ACK), "SYN|ACK");
        assert_eq!(describe_flags(flags::FIN | flags::ACK), "FIN|ACK");
        assert_eq!(describe_flags(0), "DATA");
    }

    #[test]
    fn header_len_constant_is_correct() {
        // seq(2) + ack(2) + flags(2) + window(2) = 8
        assert_eq!(HEADER_LEN, 8);
        assert_eq!(MAX_PAYLOAD, 992);
    }
}
