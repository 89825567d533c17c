//! TDS token stream definitions.
//!
//! Tokens are the fundamental units of TDS message data. A BULK_LOAD request
//! is itself a token stream (COLMETADATA, ROW*, DONE), and every server
//! reply is one too (ERROR/INFO, ENVCHANGE, DONE).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tds_wire::token::{Token, TokenParser};
//!
//! let mut parser = TokenParser::new(response);
//! while let Some(token) = parser.next_token()? {
//!     match token {
//!         Token::Done(done) => println!("rows affected: {}", done.row_count),
//!         Token::Error(err) => eprintln!("error {}: {}", err.number, err.message),
//!         _ => {}
//!     }
//! }
//! ```

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{read_b_varchar, read_us_varchar, write_b_varchar, write_us_varchar};
use crate::error::ProtocolError;
use crate::types::{ColumnFlags, TypeInfo};

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Row data (ROW).
    Row = 0xD1,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Done (DONE).
    Done = 0xFD,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Order (ORDER).
    Order = 0xA9,
}

impl TokenType {
    /// Create a token type from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xD1 => Some(Self::Row),
            0xE3 => Some(Self::EnvChange),
            0xFD => Some(Self::Done),
            0xFE => Some(Self::DoneProc),
            0xFF => Some(Self::DoneInProc),
            0x79 => Some(Self::ReturnStatus),
            0xA9 => Some(Self::Order),
            _ => None,
        }
    }
}

/// Parsed token from a server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Column metadata.
    ColMetaData(ColMetaData),
    /// Statement completion.
    Done(Done),
    /// Stored procedure completion.
    DoneProc(Done),
    /// Statement completion inside a procedure.
    DoneInProc(Done),
    /// Error message.
    Error(ServerError),
    /// Informational message.
    Info(ServerError),
    /// Return status of a procedure.
    ReturnStatus(i32),
}

/// Column metadata token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColMetaData {
    /// Column definitions, in row order.
    pub columns: Vec<ColumnData>,
}

/// One column definition in COLMETADATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnData {
    /// Column name.
    pub name: String,
    /// User-defined type id, `0` for system types.
    pub user_type: u32,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Type description.
    pub type_info: TypeInfo,
}

impl ColumnData {
    /// Check if this column is nullable.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.flags.nullable
    }
}

/// COLMETADATA column count meaning "no metadata".
pub const NO_METADATA: u16 = 0xFFFF;

impl ColMetaData {
    /// Decode a COLMETADATA token body (after the token type byte).
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let count = src.get_u16_le();
        if count == NO_METADATA {
            return Ok(Self::default());
        }

        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            columns.push(Self::decode_column(src)?);
        }
        Ok(Self { columns })
    }

    fn decode_column(src: &mut impl Buf) -> Result<ColumnData, ProtocolError> {
        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let user_type = src.get_u32_le();
        let flags = ColumnFlags::from_bits(src.get_u16_le());
        let type_info = TypeInfo::decode(src)?;
        let name = read_b_varchar(src).ok_or(ProtocolError::StringEncoding("column name"))?;

        Ok(ColumnData {
            name,
            user_type,
            flags,
            type_info,
        })
    }

    /// Encode the token, including its type byte.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        dst.put_u8(TokenType::ColMetaData as u8);
        if self.columns.is_empty() {
            dst.put_u16_le(NO_METADATA);
            return Ok(());
        }
        let count = u16::try_from(self.columns.len())
            .ok()
            .filter(|c| *c != NO_METADATA)
            .ok_or(ProtocolError::TooLong {
                what: "column list",
                len: self.columns.len(),
                max: NO_METADATA as usize - 1,
            })?;
        dst.put_u16_le(count);
        for column in &self.columns {
            dst.put_u32_le(column.user_type);
            dst.put_u16_le(column.flags.to_bits());
            column.type_info.encode(dst);
            write_b_varchar(dst, &column.name)?;
        }
        Ok(())
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Done token status flags bit positions.
mod done_status_bits {
    pub const DONE_MORE: u16 = 0x0001;
    pub const DONE_ERROR: u16 = 0x0002;
    pub const DONE_INXACT: u16 = 0x0004;
    pub const DONE_COUNT: u16 = 0x0010;
    pub const DONE_ATTN: u16 = 0x0020;
    pub const DONE_SRVERROR: u16 = 0x0100;
}

/// Done status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoneStatus {
    /// More results follow.
    pub more: bool,
    /// Error occurred.
    pub error: bool,
    /// Transaction in progress.
    pub in_xact: bool,
    /// Row count is valid.
    pub count: bool,
    /// Attention acknowledgment.
    pub attn: bool,
    /// Server error caused statement termination.
    pub srverror: bool,
}

impl DoneStatus {
    /// Parse done status from raw bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        use done_status_bits::*;
        Self {
            more: (bits & DONE_MORE) != 0,
            error: (bits & DONE_ERROR) != 0,
            in_xact: (bits & DONE_INXACT) != 0,
            count: (bits & DONE_COUNT) != 0,
            attn: (bits & DONE_ATTN) != 0,
            srverror: (bits & DONE_SRVERROR) != 0,
        }
    }

    /// Convert to raw bits.
    #[must_use]
    pub fn to_bits(&self) -> u16 {
        use done_status_bits::*;
        let mut bits = 0u16;
        if self.more {
            bits |= DONE_MORE;
        }
        if self.error {
            bits |= DONE_ERROR;
        }
        if self.in_xact {
            bits |= DONE_INXACT;
        }
        if self.count {
            bits |= DONE_COUNT;
        }
        if self.attn {
            bits |= DONE_ATTN;
        }
        if self.srverror {
            bits |= DONE_SRVERROR;
        }
        bits
    }
}

/// DONE, DONEPROC and DONEINPROC share one layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count (valid when `status.count` is set).
    pub row_count: u64,
}

impl Done {
    /// Size of the token body in bytes (excluding token type byte).
    pub const SIZE: usize = 12;

    /// A final DONE reporting `rows` affected rows.
    #[must_use]
    pub fn with_count(rows: u64) -> Self {
        Self {
            status: DoneStatus {
                count: true,
                ..Default::default()
            },
            cur_cmd: 0,
            row_count: rows,
        }
    }

    /// Decode a token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode as a DONE token.
    pub fn encode(&self, dst: &mut impl BufMut) {
        self.encode_as(TokenType::Done, dst);
    }

    /// Encode with an explicit token type (DONE, DONEPROC or DONEINPROC).
    pub fn encode_as(&self, token_type: TokenType, dst: &mut impl BufMut) {
        dst.put_u8(token_type as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }

    /// Check if more results follow this token.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.more
    }

    /// Check if an error occurred.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.status.error || self.status.srverror
    }

    /// Check if the row count is valid.
    #[must_use]
    pub const fn has_count(&self) -> bool {
        self.status.count
    }
}

/// Server error or informational message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Error number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Error severity class.
    pub class: u8,
    /// Error message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

impl ServerError {
    /// Decode an ERROR or INFO token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u16_le() as usize;
        if src.remaining() < length || length < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let server = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let procedure = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Encode as a token of the given type (ERROR or INFO).
    pub fn encode_as(&self, token_type: TokenType, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        let mut body = Vec::new();
        body.put_i32_le(self.number);
        body.put_u8(self.state);
        body.put_u8(self.class);
        write_us_varchar(&mut body, &self.message)?;
        write_b_varchar(&mut body, &self.server)?;
        write_b_varchar(&mut body, &self.procedure)?;
        body.put_i32_le(self.line);

        let length = u16::try_from(body.len()).map_err(|_| ProtocolError::TooLong {
            what: "ERROR token",
            len: body.len(),
            max: u16::MAX as usize,
        })?;
        dst.put_u8(token_type as u8);
        dst.put_u16_le(length);
        dst.put_slice(&body);
        Ok(())
    }

    /// Check if this is a fatal error (severity >= 20).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }

    /// Check if this is an error rather than an informational message.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.class > 10
    }
}

/// Parser over a server reply.
///
/// ROW tokens need column metadata to be sized and are rejected here;
/// replies on the bulk-load path never carry them.
#[derive(Debug)]
pub struct TokenParser {
    data: Bytes,
}

impl TokenParser {
    /// Create a new token parser from bytes.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Get remaining bytes in the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Parse the next token, skipping ENVCHANGE and ORDER.
    ///
    /// Returns `None` when the reply is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        loop {
            if !self.data.has_remaining() {
                return Ok(None);
            }
            let raw = self.data.get_u8();
            let token_type = TokenType::from_u8(raw).ok_or(ProtocolError::InvalidTokenType(raw))?;
            let src = &mut self.data;

            let token = match token_type {
                TokenType::ColMetaData => Token::ColMetaData(ColMetaData::decode(src)?),
                TokenType::Done => Token::Done(Done::decode(src)?),
                TokenType::DoneProc => Token::DoneProc(Done::decode(src)?),
                TokenType::DoneInProc => Token::DoneInProc(Done::decode(src)?),
                TokenType::Error => Token::Error(ServerError::decode(src)?),
                TokenType::Info => Token::Info(ServerError::decode(src)?),
                TokenType::ReturnStatus => {
                    if src.remaining() < 4 {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    Token::ReturnStatus(src.get_i32_le())
                }
                TokenType::EnvChange | TokenType::Order => {
                    if src.remaining() < 2 {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    let length = src.get_u16_le() as usize;
                    if src.remaining() < length {
                        return Err(ProtocolError::UnexpectedEof);
                    }
                    src.advance(length);
                    continue;
                }
                TokenType::Row => return Err(ProtocolError::InvalidTokenType(raw)),
            };
            return Ok(Some(token));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Collation, TypeId};
    use bytes::BytesMut;

    #[test]
    fn test_done_roundtrip() {
        let done = Done::with_count(42);
        let mut buf = BytesMut::new();
        done.encode(&mut buf);
        assert_eq!(buf.len(), 1 + Done::SIZE);
        assert_eq!(buf[0], 0xFD);
        assert_eq!(&buf[1..3], &[0x10, 0x00]);

        let mut cursor = &buf[1..];
        let decoded = Done::decode(&mut cursor).unwrap();
        assert_eq!(decoded, done);
        assert!(decoded.has_count());
    }

    #[test]
    fn test_done_status_bits() {
        let status = DoneStatus::from_bits(0x0123);
        assert!(status.more && status.error && status.attn && status.srverror);
        assert!(!status.count);
        assert_eq!(status.to_bits(), 0x0123);
    }

    #[test]
    fn test_colmetadata_roundtrip() {
        let mut name_type = TypeInfo::with_length(TypeId::NVarChar, 100);
        name_type.collation = Some(Collation::DEFAULT);
        let meta = ColMetaData {
            columns: vec![
                ColumnData {
                    name: "id".into(),
                    user_type: 0,
                    flags: ColumnFlags::with_nullable(false),
                    type_info: TypeInfo::fixed(TypeId::Int4),
                },
                ColumnData {
                    name: "name".into(),
                    user_type: 0,
                    flags: ColumnFlags::with_nullable(true),
                    type_info: name_type,
                },
            ],
        };

        let mut buf = BytesMut::new();
        meta.encode(&mut buf).unwrap();
        assert_eq!(&buf[..3], &[0x81, 0x02, 0x00]);
        // user type, flags, INT4
        assert_eq!(&buf[3..10], &[0, 0, 0, 0, 0x04, 0x00, 0x38]);

        let mut cursor = &buf[1..];
        assert_eq!(ColMetaData::decode(&mut cursor).unwrap(), meta);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_empty_colmetadata_uses_marker() {
        let mut buf = BytesMut::new();
        ColMetaData::default().encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x81, 0xFF, 0xFF]);
    }

    #[test]
    fn test_server_error_roundtrip() {
        let err = ServerError {
            number: 4815,
            state: 1,
            class: 16,
            message: "Received an invalid column length from the bcp client".into(),
            server: "mock".into(),
            procedure: String::new(),
            line: 1,
        };
        let mut buf = BytesMut::new();
        err.encode_as(TokenType::Error, &mut buf).unwrap();
        assert_eq!(buf[0], 0xAA);

        let mut cursor = &buf[1..];
        let decoded = ServerError::decode(&mut cursor).unwrap();
        assert_eq!(decoded, err);
        assert!(decoded.is_error());
        assert!(!decoded.is_fatal());
    }

    #[test]
    fn test_parser_skips_envchange() {
        let mut buf = BytesMut::new();
        buf.put_u8(TokenType::EnvChange as u8);
        buf.put_u16_le(3);
        buf.put_slice(&[1, 2, 3]);
        Done::with_count(7).encode(&mut buf);

        let mut parser = TokenParser::new(buf.freeze());
        assert_eq!(
            parser.next_token().unwrap(),
            Some(Token::Done(Done::with_count(7)))
        );
        assert_eq!(parser.next_token().unwrap(), None);
    }

    #[test]
    fn test_parser_rejects_unknown_token() {
        let mut parser = TokenParser::new(Bytes::from_static(&[0x42]));
        assert!(matches!(
            parser.next_token(),
            Err(ProtocolError::InvalidTokenType(0x42))
        ));
    }
}
