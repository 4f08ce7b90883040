//! Wire-format definitions for data and acknowledgment frames.
//!
//! Every datagram exchanged between the endpoints is one frame.  This module
//! is responsible for:
//! - Defining the on-wire binary layout of both frame shapes.
//! - Encoding a frame into a freshly allocated byte buffer.
//! - Decoding the header fields back out of a received buffer.
//! - Rewriting header fields in place when a stored frame is retransmitted.
//!
//! No I/O happens here; this is pure data transformation with no ambient
//! state.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Checksum Flag          |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              Sequence Number (data frames only)               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Payload ... (data frames only)             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A data frame header is [`DATA_HEADER_LEN`] = 12 bytes, an acknowledgment
//! frame is exactly [`ACK_HEADER_LEN`] = 8 bytes.  `length` always counts the
//! header of the frame's own shape plus its payload.

/// Byte length of a data frame header.
pub const DATA_HEADER_LEN: usize = 12;

/// Byte length of an acknowledgment frame (header only, no payload).
pub const ACK_HEADER_LEN: usize = 8;

/// Default capacity of a receive buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Largest payload a single data frame can describe in its `length` field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - DATA_HEADER_LEN;

// Byte offsets of each field within the serialised header.
const OFF_CHECKSUM: usize = 0;
const OFF_LENGTH: usize = 2;
const OFF_ACK: usize = 4;
const OFF_SEQ: usize = 8;

/// Binary good/bad flag standing in for a real checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumFlag {
    Bad,
    Good,
}

impl ChecksumFlag {
    /// Wire value of [`ChecksumFlag::Good`].
    pub const GOOD: u16 = 1;
    /// Wire value of [`ChecksumFlag::Bad`].
    pub const BAD: u16 = 0;

    /// Interpret a raw wire value.  Anything other than `GOOD` is bad.
    pub fn from_wire(raw: u16) -> Self {
        if raw == Self::GOOD {
            ChecksumFlag::Good
        } else {
            ChecksumFlag::Bad
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            ChecksumFlag::Good => Self::GOOD,
            ChecksumFlag::Bad => Self::BAD,
        }
    }

    pub fn is_good(self) -> bool {
        self == ChecksumFlag::Good
    }

    /// `Bad` when `corrupt` is set, `Good` otherwise.
    pub fn corrupted_if(corrupt: bool) -> Self {
        if corrupt {
            ChecksumFlag::Bad
        } else {
            ChecksumFlag::Good
        }
    }
}

/// The two header shapes carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Ack,
}

impl FrameKind {
    /// Header size of this shape.
    pub fn header_len(self) -> usize {
        match self {
            FrameKind::Data => DATA_HEADER_LEN,
            FrameKind::Ack => ACK_HEADER_LEN,
        }
    }
}

/// Decoded header fields.
///
/// `seq` is `Some` only for data frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub checksum: ChecksumFlag,
    /// Header plus payload byte count, as carried on the wire.
    pub length: u16,
    pub ack: u32,
    pub seq: Option<u32>,
}

/// Encode a data frame: 12-byte header followed by `payload`.
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_PAYLOAD_LEN`]; configuration
/// validation keeps the payload size below that bound.
pub fn encode_data_frame(checksum: ChecksumFlag, ack: u32, seq: u32, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes does not fit a data frame",
        payload.len()
    );
    let length = (DATA_HEADER_LEN + payload.len()) as u16;
    let mut buf = vec![0u8; DATA_HEADER_LEN + payload.len()];

    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&checksum.to_wire().to_be_bytes());
    buf[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&length.to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ack.to_be_bytes());
    buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&seq.to_be_bytes());
    buf[DATA_HEADER_LEN..].copy_from_slice(payload);

    buf
}

/// Encode an 8-byte acknowledgment frame.
pub fn encode_ack_frame(checksum: ChecksumFlag, ack: u32) -> Vec<u8> {
    let mut buf = vec![0u8; ACK_HEADER_LEN];

    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&checksum.to_wire().to_be_bytes());
    buf[OFF_LENGTH..OFF_LENGTH + 2].copy_from_slice(&(ACK_HEADER_LEN as u16).to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ack.to_be_bytes());

    buf
}

/// Decode the header of a frame of the given shape.
///
/// Acknowledgment frames are never read past offset 8.
///
/// # Panics
///
/// Panics if `buf` is shorter than `kind.header_len()`.  Callers check the
/// datagram length before decoding.
pub fn decode_header(buf: &[u8], kind: FrameKind) -> FrameHeader {
    let seq = match kind {
        FrameKind::Data => Some(read_u32(buf, OFF_SEQ)),
        FrameKind::Ack => None,
    };
    FrameHeader {
        checksum: ChecksumFlag::from_wire(read_u16(buf, OFF_CHECKSUM)),
        length: read_u16(buf, OFF_LENGTH),
        ack: read_u32(buf, OFF_ACK),
        seq,
    }
}

/// Payload of a data frame, bounded by its `length` field.
///
/// Returns `None` when the `length` field is smaller than the header or
/// claims more bytes than `buf` holds.
pub fn data_payload(buf: &[u8]) -> Option<&[u8]> {
    let length = usize::from(read_u16(buf, OFF_LENGTH));
    if length < DATA_HEADER_LEN {
        return None;
    }
    buf.get(DATA_HEADER_LEN..length)
}

/// Overwrite the checksum flag of an encoded frame.
pub fn set_checksum(buf: &mut [u8], checksum: ChecksumFlag) {
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&checksum.to_wire().to_be_bytes());
}

/// Overwrite the acknowledgment number of an encoded frame.
pub fn set_ack_number(buf: &mut [u8], ack: u32) {
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&ack.to_be_bytes());
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
