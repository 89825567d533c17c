//! Table-valued parameter framing.
//!
//! ```text
//! TVP_TYPE_INFO   = %xF3 TVP_TYPENAME TVP_COLMETADATA [TVP_ORDER] TVP_END *TVP_ROW TVP_END
//! TVP_TYPENAME    = DbName OwningSchema TypeName      ; all B_VARCHAR, DbName empty
//! TVP_COLMETADATA = %xFFFF / (Count *(UserType Flags TYPE_INFO ColName))
//! TVP_ROW         = %x01 AllColumnData
//! TVP_END         = %x00
//! ```
//!
//! Column names are always written empty; the server binds TVP columns by
//! position against the user-defined table type.

use bytes::{Buf, BufMut};

use crate::codec::{read_b_varchar, write_b_varchar};
use crate::error::ProtocolError;
use crate::token::NO_METADATA;
use crate::types::TypeInfo;

/// TVP type identifier in TDS.
pub const TVP_TYPE_ID: u8 = 0xF3;

/// Token indicating end of TVP metadata or rows.
pub const TVP_END_TOKEN: u8 = 0x00;

/// Token indicating a TVP row follows.
pub const TVP_ROW_TOKEN: u8 = 0x01;

/// Flags of one TVP column.
///
/// Only the nullable bit is meaningful here; TVP columns carry none of the
/// updateability bits COLMETADATA uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TvpColumnFlags {
    /// Column is nullable.
    pub nullable: bool,
}

impl TvpColumnFlags {
    /// Flags of a nullable column.
    pub const NULLABLE: Self = Self { nullable: true };

    /// Encode to the 2-byte flags field.
    #[must_use]
    pub const fn to_bits(&self) -> u16 {
        if self.nullable { 0x0001 } else { 0 }
    }

    /// Parse the 2-byte flags field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self {
            nullable: bits & 0x0001 != 0,
        }
    }
}

/// Metadata header of a table-valued parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TvpHeader {
    /// Owning schema, empty for the caller's default schema.
    pub schema: String,
    /// Table type name.
    pub type_name: String,
    /// Column types, in row order. Always nullable on the wire.
    pub columns: Vec<TypeInfo>,
}

impl TvpHeader {
    /// Create a header.
    pub fn new(schema: impl Into<String>, type_name: impl Into<String>, columns: Vec<TypeInfo>) -> Self {
        Self {
            schema: schema.into(),
            type_name: type_name.into(),
            columns,
        }
    }

    /// Encode the type byte, type name and column metadata, ending with TVP_END.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        dst.put_u8(TVP_TYPE_ID);
        self.encode_without_type_id(dst)
    }

    /// Encode everything after the 0xF3 type byte.
    pub fn encode_without_type_id(&self, dst: &mut impl BufMut) -> Result<(), ProtocolError> {
        // DbName
        dst.put_u8(0);
        write_b_varchar(dst, &self.schema)?;
        write_b_varchar(dst, &self.type_name)?;

        if self.columns.is_empty() {
            dst.put_u16_le(NO_METADATA);
        } else {
            let count = u16::try_from(self.columns.len())
                .ok()
                .filter(|c| *c != NO_METADATA)
                .ok_or(ProtocolError::TooLong {
                    what: "TVP column list",
                    len: self.columns.len(),
                    max: NO_METADATA as usize - 1,
                })?;
            dst.put_u16_le(count);
            let flags = TvpColumnFlags::NULLABLE.to_bits();
            for column in &self.columns {
                dst.put_u32_le(0);
                dst.put_u16_le(flags);
                column.encode(dst);
                dst.put_u8(0);
            }
        }

        dst.put_u8(TVP_END_TOKEN);
        Ok(())
    }

    /// Decode a header written by [`TvpHeader::encode`], including the type byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let type_id = src.get_u8();
        if type_id != TVP_TYPE_ID {
            return Err(ProtocolError::UnsupportedDataType(type_id));
        }
        let _db_name = read_b_varchar(src).ok_or(ProtocolError::StringEncoding("TVP database"))?;
        let schema = read_b_varchar(src).ok_or(ProtocolError::StringEncoding("TVP schema"))?;
        let type_name = read_b_varchar(src).ok_or(ProtocolError::StringEncoding("TVP type name"))?;

        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let count = src.get_u16_le();
        let mut columns = Vec::new();
        if count != NO_METADATA {
            for _ in 0..count {
                if src.remaining() < 6 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let _user_type = src.get_u32_le();
                let _flags = src.get_u16_le();
                columns.push(TypeInfo::decode(src)?);
                let _name = read_b_varchar(src).ok_or(ProtocolError::StringEncoding("TVP column"))?;
            }
        }

        match src.has_remaining().then(|| src.get_u8()) {
            Some(TVP_END_TOKEN) => Ok(Self {
                schema,
                type_name,
                columns,
            }),
            Some(other) => Err(ProtocolError::InvalidTokenType(other)),
            None => Err(ProtocolError::UnexpectedEof),
        }
    }
}

/// Start a TVP row; the caller writes the column data next.
pub fn encode_row_token(dst: &mut impl BufMut) {
    dst.put_u8(TVP_ROW_TOKEN);
}

/// Terminate the row list.
pub fn encode_end(dst: &mut impl BufMut) {
    dst.put_u8(TVP_END_TOKEN);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Collation, TypeId};
    use bytes::BytesMut;

    #[test]
    fn test_header_layout() {
        let header = TvpHeader::new("dbo", "T", vec![TypeInfo::with_length(TypeId::IntN, 4)]);
        let mut buf = BytesMut::new();
        header.encode(&mut buf).unwrap();

        let expected: &[u8] = &[
            0xF3, // TVP type
            0x00, // DbName
            0x03, b'd', 0, b'b', 0, b'o', 0, // schema
            0x01, b'T', 0, // type name
            0x01, 0x00, // count
            0, 0, 0, 0, // user type
            0x01, 0x00, // nullable
            0x26, 0x04, // INTN(4)
            0x00, // empty column name
            0x00, // end of metadata
        ];
        assert_eq!(&buf[..], expected);
    }

    #[test]
    fn test_column_flags_only_carry_nullable() {
        assert_eq!(TvpColumnFlags::NULLABLE.to_bits(), 0x0001);
        assert_eq!(TvpColumnFlags::default().to_bits(), 0x0000);
        assert_eq!(TvpColumnFlags::from_bits(0x0005), TvpColumnFlags::NULLABLE);

        let header = TvpHeader::new("", "T", vec![TypeInfo::with_length(TypeId::BitN, 1)]);
        let mut buf = BytesMut::new();
        header.encode_without_type_id(&mut buf).unwrap();
        // DbName, schema, type name, count, user type
        let flags_at = 1 + 1 + 3 + 2 + 4;
        assert_eq!(&buf[flags_at..flags_at + 2], &[0x01, 0x00]);
    }

    #[test]
    fn test_no_columns_marker() {
        let header = TvpHeader::new("", "Empty", Vec::new());
        let mut buf = BytesMut::new();
        header.encode_without_type_id(&mut buf).unwrap();
        let tail = &buf[buf.len() - 3..];
        assert_eq!(tail, &[0xFF, 0xFF, 0x00]);
    }

    #[test]
    fn test_header_decode_roundtrip() {
        let mut text = TypeInfo::with_length(TypeId::NVarChar, 0xFFFF);
        text.collation = Some(Collation::DEFAULT);
        let header = TvpHeader::new(
            "sales",
            "OrderLines",
            vec![text, TypeInfo::with_length(TypeId::Guid, 16)],
        );
        let mut buf = BytesMut::new();
        header.encode(&mut buf).unwrap();
        encode_end(&mut buf);

        let mut cursor = buf.freeze();
        let decoded = TvpHeader::decode(&mut cursor).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(cursor.as_ref(), &[TVP_END_TOKEN]);
    }
}
