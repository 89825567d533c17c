//! Packet header of the TDS transport.
//!
//! A bulk session only ever exchanges four message kinds: the `INSERT BULK`
//! batch, the bulk-load payload, an optional attention, and the server's
//! tabular reply. The header model is restricted to those.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Size of the fixed packet header.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Largest packet the length field can describe.
pub const MAX_PACKET_SIZE: usize = 65535;

/// Smallest packet size a server will negotiate.
pub const MIN_PACKET_SIZE: usize = 512;

/// Packet size used until the server says otherwise.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Message kind carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch; carries the `INSERT BULK` statement.
    SqlBatch = 0x01,
    /// Tabular reply from the server.
    TabularResult = 0x04,
    /// Attention; cancels the load in flight.
    Attention = 0x06,
    /// Bulk-load payload (COLMETADATA, ROW tokens, DONE).
    BulkLoad = 0x07,
}

impl PacketType {
    /// Map a header byte onto a message kind.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::SqlBatch),
            0x04 => Ok(Self::TabularResult),
            0x06 => Ok(Self::Attention),
            0x07 => Ok(Self::BulkLoad),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

bitflags! {
    /// Status byte of a packet.
    ///
    /// The bulk path only marks the last packet of a message; any other bit
    /// on an incoming header is rejected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// More packets of this message follow.
        const NORMAL = 0x00;
        /// Last packet of the message.
        const END_OF_MESSAGE = 0x01;
    }
}

/// Fixed header in front of every packet.
///
/// The length and SPID are big-endian, unlike everything inside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Message kind.
    pub packet_type: PacketType,
    /// Status bits.
    pub status: PacketStatus,
    /// Packet length, header included.
    pub length: u16,
    /// Server process id; zero on client packets.
    pub spid: u16,
    /// Sequence number within the message, starting at 1.
    pub packet_id: u8,
    /// Always zero.
    pub window: u8,
}

impl PacketHeader {
    /// Header with zeroed SPID, sequence number and window.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Read a header, rejecting unknown kinds, unknown status bits and
    /// lengths shorter than the header itself.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < PACKET_HEADER_SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: PACKET_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let packet_type = PacketType::from_u8(src.get_u8())?;
        let raw_status = src.get_u8();
        let status = PacketStatus::from_bits(raw_status)
            .ok_or(ProtocolError::InvalidPacketStatus(raw_status))?;
        let length = src.get_u16();
        let spid = src.get_u16();
        let packet_id = src.get_u8();
        let window = src.get_u8();

        if usize::from(length) < PACKET_HEADER_SIZE {
            return Err(ProtocolError::InvalidField {
                field: "packet length",
                value: u32::from(length),
            });
        }

        Ok(Self {
            packet_type,
            status,
            length,
            spid,
            packet_id,
            window,
        })
    }

    /// Write the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Write the header into a fresh buffer.
    #[must_use]
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Bytes of payload following the header.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Whether this packet closes its message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }
}
