//! Joining packets back into messages.

use bytes::{Bytes, BytesMut};
use tds_wire::packet::PacketType;

use crate::packet_codec::Packet;

/// Payload of every packet of one message, in order.
#[derive(Debug, Clone)]
pub struct Message {
    /// Type of the message's first packet.
    pub packet_type: PacketType,
    /// Concatenated packet payloads.
    pub payload: Bytes,
}

impl Message {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Collects packet payloads until one arrives with `END_OF_MESSAGE`.
///
/// The first packet fixes the message type; later packets only contribute
/// payload.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    pending: Option<PacketType>,
    payload: BytesMut,
}

impl MessageAssembler {
    /// Assembler with nothing buffered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `packet`, yielding the finished message on its last packet.
    pub fn push(&mut self, packet: Packet) -> Option<Message> {
        let packet_type = *self.pending.get_or_insert(packet.header.packet_type);
        self.payload.extend_from_slice(&packet.payload);

        let last = packet.is_end_of_message();
        tracing::trace!(?packet_type, buffered = self.payload.len(), last, "packet buffered");

        if !last {
            return None;
        }
        self.pending = None;
        Some(Message {
            packet_type,
            payload: self.payload.split().freeze(),
        })
    }

    /// Whether a message has started but not finished.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.pending.is_some()
    }

    /// Discard a half-received message, e.g. after an attention.
    pub fn clear(&mut self) {
        self.pending = None;
        self.payload.clear();
    }
}
