//! # mssql-bulk-codec
//!
//! Async packet framing for the bulk-load path.
//!
//! ```text
//! byte stream → TdsCodec (packets) → MessageAssembler (messages) → session
//! ```
//!
//! ## Features
//!
//! - Packet reassembly across TCP segments
//! - Message reassembly from multiple packets
//! - Incremental sends of long messages in whole packets
//! - Split read/write halves so an attention packet can be sent while a
//!   read is pending
//!
//! ```rust,ignore
//! use mssql_bulk_codec::Connection;
//!
//! let conn = Connection::new(tcp_stream);
//! let cancel = conn.cancel_handle();
//!
//! tokio::spawn(async move {
//!     cancel.cancel().await?;
//! });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod framed;
pub mod message;
pub mod packet_codec;

pub use connection::{CancelHandle, Connection};
pub use error::CodecError;
pub use framed::{PacketReader, PacketStream, PacketWriter};
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, TdsCodec};
