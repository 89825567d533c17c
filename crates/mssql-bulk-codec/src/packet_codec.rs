//! TDS packet codec.

use bytes::{BufMut, BytesMut};
use tds_wire::packet::{MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// One TDS packet: header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header. `length` and `packet_id` are rewritten on encode.
    pub header: PacketHeader,
    /// Payload following the header.
    pub payload: BytesMut,
}

impl Packet {
    /// Create a packet.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Size on the wire.
    #[must_use]
    pub fn total_size(&self) -> usize {
        PACKET_HEADER_SIZE + self.payload.len()
    }

    /// Whether this packet closes its message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// tokio-util codec for TDS packets.
///
/// Packet ids restart at 1 for every message and wrap from 255 to 0, as
/// the server expects for long BULK_LOAD streams.
#[derive(Debug)]
pub struct TdsCodec {
    max_packet_size: usize,
    packet_id: u8,
}

impl TdsCodec {
    /// Create a codec accepting packets up to the protocol maximum.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_id: 1,
        }
    }

    /// Limit the accepted packet size, clamped to the protocol bounds.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.clamp(MIN_PACKET_SIZE, MAX_PACKET_SIZE);
        self
    }

    /// Largest packet this codec reads or writes.
    #[must_use]
    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        id
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::InvalidHeader);
        }
        if length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let mut packet_bytes = src.split_to(length);
        let header = PacketHeader::decode(&mut packet_bytes.as_ref())?;
        let payload = packet_bytes.split_off(PACKET_HEADER_SIZE);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = length,
            is_eom = header.is_end_of_message(),
            "decoded TDS packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total_length = item.total_size();
        if total_length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total_length,
                max: self.max_packet_size,
            });
        }

        let mut header = item.header;
        header.length = total_length as u16;
        header.packet_id = self.next_packet_id();
        if header.is_end_of_message() {
            self.packet_id = 1;
        }

        dst.reserve(total_length);
        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total_length,
            packet_id = header.packet_id,
            "encoded TDS packet"
        );

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tds_wire::packet::{PacketStatus, PacketType};

    fn bulk_packet(eom: bool, payload: &[u8]) -> Packet {
        let status = if eom {
            PacketStatus::END_OF_MESSAGE
        } else {
            PacketStatus::NORMAL
        };
        Packet::new(
            PacketHeader::new(PacketType::BulkLoad, status, 0),
            BytesMut::from(payload),
        )
    }

    #[test]
    fn test_decode_packet() {
        let mut codec = TdsCodec::new();

        let mut data = BytesMut::new();
        data.put_u8(PacketType::TabularResult as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u16(0);
        data.put_u8(1);
        data.put_u8(0);
        data.put_slice(b"done");

        let packet = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(packet.header.packet_type, PacketType::TabularResult);
        assert!(packet.is_end_of_message());
        assert_eq!(&packet.payload[..], b"done");
        assert!(data.is_empty());
    }

    #[test]
    fn test_incomplete_packet() {
        let mut codec = TdsCodec::new();
        let mut data = BytesMut::new();
        data.put_u8(PacketType::TabularResult as u8);
        data.put_u8(PacketStatus::END_OF_MESSAGE.bits());
        data.put_u16(12);
        data.put_u32(0);

        assert!(codec.decode(&mut data).unwrap().is_none());
    }

    #[test]
    fn test_short_length_is_invalid() {
        let mut codec = TdsCodec::new();
        let mut data = BytesMut::from(&[0x04, 0x01, 0x00, 0x04, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut data),
            Err(CodecError::InvalidHeader)
        ));
    }

    #[test]
    fn test_packet_ids_restart_per_message() {
        let mut codec = TdsCodec::new();
        let mut dst = BytesMut::new();

        codec.encode(bulk_packet(false, b"a"), &mut dst).unwrap();
        codec.encode(bulk_packet(true, b"b"), &mut dst).unwrap();
        codec.encode(bulk_packet(true, b"c"), &mut dst).unwrap();

        assert_eq!(dst[6], 1);
        assert_eq!(dst[9 + 6], 2);
        assert_eq!(dst[18 + 6], 1);
        assert_eq!(u16::from_be_bytes([dst[2], dst[3]]), 9);
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut codec = TdsCodec::new().with_max_packet_size(MIN_PACKET_SIZE);
        let payload = vec![0u8; MIN_PACKET_SIZE];
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(bulk_packet(true, &payload), &mut dst),
            Err(CodecError::PacketTooLarge { .. })
        ));
    }
}
