//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while framing or parsing TDS packets and tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The buffer ended before a complete structure could be read.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// A packet header announced more bytes than were available.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },

    /// Unknown packet type byte.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Unknown packet status bits.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// Unknown token type byte.
    #[error("invalid token type: 0x{0:02X}")]
    InvalidTokenType(u8),

    /// Unknown or unsupported TYPE_INFO type byte.
    #[error("unsupported data type: 0x{0:02X}")]
    UnsupportedDataType(u8),

    /// A field carried a value outside its legal domain.
    #[error("invalid {field}: {value}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The raw value read.
        value: u32,
    },

    /// A UTF-16 string could not be decoded.
    #[error("invalid string encoding in {0}")]
    StringEncoding(&'static str),

    /// A name or value exceeds what its length prefix can express.
    #[error("{what} too long: {len} exceeds {max}")]
    TooLong {
        /// What was being written.
        what: &'static str,
        /// Actual length.
        len: usize,
        /// Largest representable length.
        max: usize,
    },
}
