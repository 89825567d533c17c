//! Property tests for the framing primitives.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use tds_wire::plp::{PlpLength, decode_plp, encode_plp_chunked};
use tds_wire::{Done, DoneStatus, PacketHeader, PacketStatus, PacketType};

proptest! {
    #[test]
    fn plp_preserves_payload(
        data in proptest::collection::vec(any::<u8>(), 0..20_000),
        chunk in 1usize..9000,
        unknown in any::<bool>(),
    ) {
        let length = if unknown { PlpLength::Unknown } else { PlpLength::Known };
        let mut buf = BytesMut::new();
        encode_plp_chunked(&data, length, chunk, &mut buf);
        let decoded = decode_plp(&mut buf.freeze()).unwrap();
        prop_assert_eq!(decoded, Some(data));
    }

    #[test]
    fn done_preserves_fields(bits in any::<u16>(), cur_cmd in any::<u16>(), rows in any::<u64>()) {
        let masked = DoneStatus::from_bits(bits);
        let done = Done { status: masked, cur_cmd, row_count: rows };
        let mut buf = BytesMut::new();
        done.encode(&mut buf);
        let mut cursor = &buf[1..];
        prop_assert_eq!(Done::decode(&mut cursor).unwrap(), done);
    }

    #[test]
    fn packet_header_preserves_fields(length in 8u16.., spid in any::<u16>(), id in any::<u8>()) {
        let header = PacketHeader {
            packet_type: PacketType::BulkLoad,
            status: PacketStatus::NORMAL,
            length,
            spid,
            packet_id: id,
            window: 0,
        };
        let bytes = header.encode_to_bytes();
        let mut cursor = bytes.as_ref();
        prop_assert_eq!(PacketHeader::decode(&mut cursor).unwrap(), header);
    }
}
