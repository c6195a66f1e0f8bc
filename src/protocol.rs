//! LLRPC wire protocol: the fixed-size message header and its codec.
//!
//! Every message on the wire is (today) header-only. The header is a fixed
//! 24-byte layout with all multi-byte integers in network byte order and no
//! padding between fields:
//!
//! ```text
//! ┌─────────┬────────────────┬────────────────┬─────────┐
//! │ Type(2) │ Endpoint ID(4) │ Sequence ID(4) │ Len(2)  │
//! ├─────────┴────────────────┴────────────────┴─────────┤
//! │ Timestamp (8, seconds since epoch)                  │
//! ├─────────────────────────────────────────────────────┤
//! │ Checksum (4, reserved — written as zero)            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The checksum field is carried on the wire but never computed or
//! validated; it is surfaced untouched on decode.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Size of the encoded header in bytes. Messages are header-only, so this
/// is also the full encoded message length.
pub const HEADER_SIZE: usize = 24;

/// Message kinds carried in the header's type field.
///
/// The wire representation is a `u16`; values outside this set are a
/// [`DecodeError::UnknownType`], never a panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    /// Periodic liveness probe sent to the configured peer.
    EchoRequest = 0,
    /// Reply to an echo request.
    EchoResponse = 1,
    /// RPC command invocation.
    CommandRequest = 2,
    /// RPC command result.
    CommandResponse = 3,
}

impl MessageType {
    /// Maps a wire value back to a message type.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::EchoRequest),
            1 => Some(Self::EchoResponse),
            2 => Some(Self::CommandRequest),
            3 => Some(Self::CommandResponse),
            _ => None,
        }
    }

    /// Raw value for wire serialization.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Identifies the sending endpoint within a deployment.
///
/// Always zero today; reserved for multi-endpoint deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointId(u32);

impl EndpointId {
    pub const ZERO: Self = Self(0);

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for EndpointId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A decoded (or about-to-be-encoded) message header.
///
/// Constructed fresh for every send and discarded after logging on every
/// receive; never mutated after encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message kind.
    pub kind: MessageType,
    /// Sending endpoint identifier.
    pub endpoint: EndpointId,
    /// Per-endpoint monotonic sequence number (starts at 1, wraps).
    pub sequence: u32,
    /// Total encoded message length in bytes.
    pub length: u16,
    /// Sender's wall-clock time at send, seconds since epoch.
    pub timestamp: u64,
    /// Integrity checksum. Reserved: written as zero, never validated.
    pub checksum: u32,
}

/// Errors during header decode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is smaller than the fixed header size.
    #[error("buffer too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },
    /// Type field does not map to a known [`MessageType`].
    #[error("unknown message type: {0}")]
    UnknownType(u16),
}

/// Writer that appends big-endian fields to a fixed header buffer.
struct HeaderWriter {
    buf: [u8; HEADER_SIZE],
    cursor: usize,
}

impl HeaderWriter {
    const fn new() -> Self {
        Self {
            buf: [0u8; HEADER_SIZE],
            cursor: 0,
        }
    }

    fn put_u16(&mut self, v: u16) {
        self.buf[self.cursor..self.cursor + 2].copy_from_slice(&v.to_be_bytes());
        self.cursor += 2;
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.cursor..self.cursor + 4].copy_from_slice(&v.to_be_bytes());
        self.cursor += 4;
    }

    fn put_u64(&mut self, v: u64) {
        self.buf[self.cursor..self.cursor + 8].copy_from_slice(&v.to_be_bytes());
        self.cursor += 8;
    }
}

/// Reader that walks a length-checked header buffer field by field.
struct HeaderReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> HeaderReader<'a> {
    /// Callers must have verified `buf.len() >= HEADER_SIZE`.
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn take_u16(&mut self) -> u16 {
        let mut arr = [0u8; 2];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        u16::from_be_bytes(arr)
    }

    fn take_u32(&mut self) -> u32 {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        u32::from_be_bytes(arr)
    }

    fn take_u64(&mut self) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + 8]);
        self.cursor += 8;
        u64::from_be_bytes(arr)
    }
}

/// Header encoder owning the endpoint's sequence counter.
///
/// The counter starts at 1 and advances by one after every encode, whether
/// or not the subsequent send succeeds. It wraps on `u32` overflow and is
/// never reused within a process lifetime. It is explicit instance state so
/// that multiple endpoints in one process do not collide.
#[derive(Debug)]
pub struct HeaderCodec {
    next_seq: u32,
}

impl HeaderCodec {
    /// Creates a codec whose first encoded sequence number is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next_seq: 1 }
    }

    /// Builds and serializes a header-only message.
    ///
    /// Stamps the next sequence number and the current wall clock, sets
    /// `length` to the encoded size, and leaves the checksum zero. Returns
    /// the header (for logging) alongside its wire encoding.
    pub fn encode(&mut self, kind: MessageType, endpoint: EndpointId) -> (MessageHeader, [u8; HEADER_SIZE]) {
        let header = MessageHeader {
            kind,
            endpoint,
            sequence: self.next_seq,
            length: HEADER_SIZE as u16,
            timestamp: unix_now(),
            checksum: 0,
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        let mut w = HeaderWriter::new();
        w.put_u16(header.kind.as_u16());
        w.put_u32(header.endpoint.as_u32());
        w.put_u32(header.sequence);
        w.put_u16(header.length);
        w.put_u64(header.timestamp);
        w.put_u32(header.checksum);
        (header, w.buf)
    }
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a message header from untrusted bytes.
///
/// Fails on short buffers and unknown type values. Performs no semantic
/// validation beyond that: implausible content (zero timestamp, sequence
/// regression, checksum mismatch) is accepted and surfaced as data.
pub fn decode(bytes: &[u8]) -> Result<MessageHeader, DecodeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort {
            need: HEADER_SIZE,
            have: bytes.len(),
        });
    }

    let mut r = HeaderReader::new(bytes);
    let raw_kind = r.take_u16();
    let kind = MessageType::from_u16(raw_kind).ok_or(DecodeError::UnknownType(raw_kind))?;

    Ok(MessageHeader {
        kind,
        endpoint: EndpointId::from(r.take_u32()),
        sequence: r.take_u32(),
        length: r.take_u16(),
        timestamp: r.take_u64(),
        checksum: r.take_u32(),
    })
}

/// Current wall clock in whole seconds since the Unix epoch.
///
/// A clock before the epoch yields 0; the decoder accepts that too.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_echo_request() {
        let mut codec = HeaderCodec::new();
        let (header, bytes) = codec.encode(MessageType::EchoRequest, EndpointId::ZERO);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.kind, MessageType::EchoRequest);
        assert_eq!(decoded.length, HEADER_SIZE as u16);
        assert_eq!(decoded.checksum, 0);
    }

    #[test]
    fn roundtrip_all_types() {
        let mut codec = HeaderCodec::new();
        for kind in [
            MessageType::EchoRequest,
            MessageType::EchoResponse,
            MessageType::CommandRequest,
            MessageType::CommandResponse,
        ] {
            let (header, bytes) = codec.encode(kind, EndpointId::from(7));
            let decoded = decode(&bytes).unwrap();
            assert_eq!(decoded, header);
            assert_eq!(decoded.endpoint.as_u32(), 7);
        }
    }

    #[test]
    fn sequence_is_monotonic_from_one() {
        let mut codec = HeaderCodec::new();
        for expected in 1..=100u32 {
            let (header, _) = codec.encode(MessageType::EchoRequest, EndpointId::ZERO);
            assert_eq!(header.sequence, expected);
        }
    }

    #[test]
    fn sequence_wraps_on_overflow() {
        let mut codec = HeaderCodec { next_seq: u32::MAX };
        let (header, _) = codec.encode(MessageType::EchoRequest, EndpointId::ZERO);
        assert_eq!(header.sequence, u32::MAX);
        let (header, _) = codec.encode(MessageType::EchoRequest, EndpointId::ZERO);
        assert_eq!(header.sequence, 0);
    }

    #[test]
    fn wire_layout_is_big_endian_at_documented_offsets() {
        let mut codec = HeaderCodec::new();
        let (header, bytes) = codec.encode(MessageType::CommandRequest, EndpointId::from(0xAABBCCDD));

        assert_eq!(&bytes[0..2], &2u16.to_be_bytes());
        assert_eq!(&bytes[2..6], &0xAABB_CCDDu32.to_be_bytes());
        assert_eq!(&bytes[6..10], &1u32.to_be_bytes());
        assert_eq!(&bytes[10..12], &24u16.to_be_bytes());
        assert_eq!(&bytes[12..20], &header.timestamp.to_be_bytes());
        assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn decode_short_buffer() {
        let result = decode(&[0u8; 10]);
        assert_eq!(result, Err(DecodeError::TooShort { need: 24, have: 10 }));
    }

    #[test]
    fn decode_empty_buffer() {
        let result = decode(&[]);
        assert_eq!(result, Err(DecodeError::TooShort { need: 24, have: 0 }));
    }

    #[test]
    fn decode_unknown_type() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(decode(&bytes), Err(DecodeError::UnknownType(99)));
    }

    #[test]
    fn decode_accepts_implausible_content() {
        // Zero timestamp, zero length, nonzero checksum: well formed, so
        // it decodes and is surfaced as-is.
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..2].copy_from_slice(&1u16.to_be_bytes());
        bytes[20..24].copy_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let header = decode(&bytes).unwrap();
        assert_eq!(header.kind, MessageType::EchoResponse);
        assert_eq!(header.timestamp, 0);
        assert_eq!(header.length, 0);
        assert_eq!(header.checksum, 0xDEAD_BEEF);
    }

    #[test]
    fn decode_ignores_trailing_bytes() {
        let mut codec = HeaderCodec::new();
        let (header, bytes) = codec.encode(MessageType::EchoRequest, EndpointId::ZERO);
        let mut padded = bytes.to_vec();
        padded.extend_from_slice(&[0xFF; 8]);
        assert_eq!(decode(&padded).unwrap(), header);
    }

    #[test]
    fn message_type_from_u16() {
        assert_eq!(MessageType::from_u16(0), Some(MessageType::EchoRequest));
        assert_eq!(MessageType::from_u16(3), Some(MessageType::CommandResponse));
        assert_eq!(MessageType::from_u16(4), None);
        assert_eq!(MessageType::from_u16(u16::MAX), None);
    }
}
