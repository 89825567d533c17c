//! Codec error types.

use thiserror::Error;

/// Errors raised while framing packets on a byte stream.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet or token could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_wire::ProtocolError),

    /// The packet header declares a length shorter than the header itself.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet exceeds the negotiated maximum size.
    #[error("packet too large: {size} bytes exceeds maximum {max}")]
    PacketTooLarge {
        /// Size of the offending packet.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The peer closed the stream in the middle of a message.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the error came from the transport rather than malformed data.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}
