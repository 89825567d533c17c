//! # tds-wire
//!
//! IO-agnostic pieces of the MS-TDS protocol needed to move bulk data into
//! SQL Server: packet headers, TYPE_INFO, the COLMETADATA/DONE/ERROR token
//! family, PLP framing for `(max)` values, SQL batch payloads, and the
//! table-valued parameter envelope.
//!
//! Nothing here performs I/O; the codec crate frames these bytes onto a
//! transport and the bulk crate decides what to write.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use tds_wire::{Done, PacketHeader, PacketStatus, PacketType};
//!
//! let mut payload = BytesMut::new();
//! Done::with_count(3).encode(&mut payload);
//!
//! let header = PacketHeader::new(
//!     PacketType::BulkLoad,
//!     PacketStatus::END_OF_MESSAGE,
//!     (8 + payload.len()) as u16,
//! );
//! assert_eq!(header.payload_length(), payload.len());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod packet;
pub mod plp;
pub mod sql_batch;
pub mod token;
pub mod tvp;
pub mod types;

pub use error::ProtocolError;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader,
    PacketStatus, PacketType,
};
pub use plp::{PLP_NULL, PLP_UNKNOWN_LENGTH, PlpLength};
pub use sql_batch::{decode_sql_batch, encode_sql_batch};
pub use token::{ColMetaData, ColumnData, Done, DoneStatus, ServerError, Token, TokenParser, TokenType};
pub use tvp::{TvpColumnFlags, TvpHeader};
pub use types::{Collation, ColumnFlags, LengthClass, MAX_LENGTH_MARKER, TypeId, TypeInfo, Updateable};
