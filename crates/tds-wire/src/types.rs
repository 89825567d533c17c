//! TDS data type definitions.
//!
//! This module defines the SQL Server data types as they appear in the TDS
//! protocol, and the TYPE_INFO structure that accompanies each column in
//! COLMETADATA and TVP metadata.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Length marker meaning `(max)` on a USHORTLEN type.
pub const MAX_LENGTH_MARKER: u16 = 0xFFFF;

/// TDS data type identifiers.
///
/// These correspond to the type bytes sent in column metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    // Fixed-length types (no length prefix)
    /// 8-bit unsigned integer (tinyint).
    Int1 = 0x30,
    /// Bit (boolean).
    Bit = 0x32,
    /// 16-bit signed integer.
    Int2 = 0x34,
    /// 32-bit signed integer.
    Int4 = 0x38,
    /// 64-bit signed integer.
    Int8 = 0x7F,
    /// 32-bit floating point.
    Float4 = 0x3B,
    /// 64-bit floating point.
    Float8 = 0x3E,
    /// 8-byte money.
    Money = 0x3C,
    /// 4-byte money.
    Money4 = 0x7A,
    /// 8-byte datetime.
    DateTime = 0x3D,
    /// 4-byte small datetime.
    DateTime4 = 0x3A,

    // Nullable variants (1-byte length prefix)
    /// Variable-length GUID.
    Guid = 0x24,
    /// Variable-length integer.
    IntN = 0x26,
    /// Variable-length bit.
    BitN = 0x68,
    /// Decimal.
    DecimalN = 0x6A,
    /// Numeric.
    NumericN = 0x6C,
    /// Variable-length float.
    FloatN = 0x6D,
    /// Variable-length money.
    MoneyN = 0x6E,
    /// Variable-length datetime.
    DateTimeN = 0x6F,

    // Date/time types (SQL Server 2008+)
    /// Date (3 bytes).
    Date = 0x28,
    /// Time with variable precision.
    Time = 0x29,
    /// DateTime2 with variable precision.
    DateTime2 = 0x2A,
    /// DateTimeOffset with variable precision.
    DateTimeOffset = 0x2B,

    // Counted types with 2-byte length
    /// Large variable-length character.
    BigVarChar = 0xA7,
    /// Large variable-length binary.
    BigVarBinary = 0xA5,
    /// Large fixed-length character.
    BigChar = 0xAF,
    /// Large fixed-length binary.
    BigBinary = 0xAD,
    /// Fixed-length Unicode character.
    NChar = 0xEF,
    /// Variable-length Unicode character.
    NVarChar = 0xE7,

    /// XML type (always PLP).
    Xml = 0xF1,
}

/// How a type's values are length-prefixed inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// No prefix; the value always occupies this many bytes.
    Fixed(usize),
    /// 1-byte length; `0` means NULL.
    Byte,
    /// 2-byte length; `0xFFFF` means NULL.
    UShort,
    /// Partially length-prefixed chunks.
    Plp,
}

impl TypeId {
    /// Create a type ID from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x30 => Some(Self::Int1),
            0x32 => Some(Self::Bit),
            0x34 => Some(Self::Int2),
            0x38 => Some(Self::Int4),
            0x7F => Some(Self::Int8),
            0x3B => Some(Self::Float4),
            0x3E => Some(Self::Float8),
            0x3C => Some(Self::Money),
            0x7A => Some(Self::Money4),
            0x3D => Some(Self::DateTime),
            0x3A => Some(Self::DateTime4),
            0x24 => Some(Self::Guid),
            0x26 => Some(Self::IntN),
            0x68 => Some(Self::BitN),
            0x6A => Some(Self::DecimalN),
            0x6C => Some(Self::NumericN),
            0x6D => Some(Self::FloatN),
            0x6E => Some(Self::MoneyN),
            0x6F => Some(Self::DateTimeN),
            0x28 => Some(Self::Date),
            0x29 => Some(Self::Time),
            0x2A => Some(Self::DateTime2),
            0x2B => Some(Self::DateTimeOffset),
            0xA7 => Some(Self::BigVarChar),
            0xA5 => Some(Self::BigVarBinary),
            0xAF => Some(Self::BigChar),
            0xAD => Some(Self::BigBinary),
            0xEF => Some(Self::NChar),
            0xE7 => Some(Self::NVarChar),
            0xF1 => Some(Self::Xml),
            _ => None,
        }
    }

    /// Check if this is a fixed-length type.
    #[must_use]
    pub const fn is_fixed_length(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Get the fixed size of this type in bytes, if applicable.
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self {
            Self::Int1 | Self::Bit => Some(1),
            Self::Int2 => Some(2),
            Self::Int4 | Self::Float4 | Self::Money4 | Self::DateTime4 => Some(4),
            Self::Int8 | Self::Float8 | Self::Money | Self::DateTime => Some(8),
            _ => None,
        }
    }

    /// Check if this is a Unicode character type.
    #[must_use]
    pub const fn is_unicode(&self) -> bool {
        matches!(self, Self::NChar | Self::NVarChar)
    }

    /// Check if this type carries a collation in its TYPE_INFO.
    #[must_use]
    pub const fn has_collation(&self) -> bool {
        matches!(
            self,
            Self::BigVarChar | Self::BigChar | Self::NChar | Self::NVarChar
        )
    }

    /// The nullable counterpart of a fixed-length type.
    ///
    /// Types that are already nullable map to themselves.
    #[must_use]
    pub const fn nullable_variant(&self) -> Self {
        match self {
            Self::Int1 | Self::Int2 | Self::Int4 | Self::Int8 => Self::IntN,
            Self::Bit => Self::BitN,
            Self::Float4 | Self::Float8 => Self::FloatN,
            Self::Money | Self::Money4 => Self::MoneyN,
            Self::DateTime | Self::DateTime4 => Self::DateTimeN,
            other => *other,
        }
    }
}

/// SQL Server collation as carried on the wire (5 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Collation {
    /// LCID (low 20 bits) plus comparison flags and version.
    pub info: u32,
    /// Sort ID for SQL collations, `0` for Windows collations.
    pub sort_id: u8,
}

impl Collation {
    /// Size of a collation on the wire.
    pub const SIZE: usize = 5;

    /// `SQL_Latin1_General_CP1_CI_AS`, the server installation default.
    pub const DEFAULT: Self = Self {
        info: 0x00D0_0409,
        sort_id: 0x34,
    };

    /// Locale identifier.
    #[must_use]
    pub const fn lcid(&self) -> u32 {
        self.info & 0x000F_FFFF
    }

    /// Decode a collation.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::UnexpectedEof);
        }
        let info = src.get_u32_le();
        let sort_id = src.get_u8();
        Ok(Self { info, sort_id })
    }

    /// Encode a collation.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.info);
        dst.put_u8(self.sort_id);
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// TYPE_INFO: the wire description of one column's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Wire type.
    pub type_id: TypeId,
    /// Declared byte length (1-byte or 2-byte length types).
    ///
    /// For USHORTLEN types, [`MAX_LENGTH_MARKER`] selects PLP encoding.
    pub max_length: u16,
    /// Decimal precision.
    pub precision: u8,
    /// Decimal or fractional-second scale.
    pub scale: u8,
    /// Collation for character types.
    pub collation: Option<Collation>,
}

impl TypeInfo {
    /// Fixed-length type with no extra fields.
    #[must_use]
    pub const fn fixed(type_id: TypeId) -> Self {
        Self {
            type_id,
            max_length: 0,
            precision: 0,
            scale: 0,
            collation: None,
        }
    }

    /// Type carrying only a length.
    #[must_use]
    pub const fn with_length(type_id: TypeId, max_length: u16) -> Self {
        Self {
            type_id,
            max_length,
            precision: 0,
            scale: 0,
            collation: None,
        }
    }

    /// How values of this type are framed inside a row.
    #[must_use]
    pub fn length_class(&self) -> LengthClass {
        match self.type_id {
            TypeId::Xml => LengthClass::Plp,
            TypeId::BigVarChar
            | TypeId::BigVarBinary
            | TypeId::NVarChar
            | TypeId::BigChar
            | TypeId::BigBinary
            | TypeId::NChar => {
                if self.max_length == MAX_LENGTH_MARKER {
                    LengthClass::Plp
                } else {
                    LengthClass::UShort
                }
            }
            other => match other.fixed_size() {
                Some(size) => LengthClass::Fixed(size),
                None => LengthClass::Byte,
            },
        }
    }

    /// Whether values use PLP chunked encoding.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        self.length_class() == LengthClass::Plp
    }

    /// Encode TYPE_INFO.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.type_id as u8);
        match self.type_id {
            TypeId::IntN
            | TypeId::BitN
            | TypeId::FloatN
            | TypeId::MoneyN
            | TypeId::DateTimeN
            | TypeId::Guid => dst.put_u8(self.max_length as u8),
            TypeId::DecimalN | TypeId::NumericN => {
                dst.put_u8(self.max_length as u8);
                dst.put_u8(self.precision);
                dst.put_u8(self.scale);
            }
            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => dst.put_u8(self.scale),
            TypeId::BigVarChar
            | TypeId::BigChar
            | TypeId::NVarChar
            | TypeId::NChar
            | TypeId::BigVarBinary
            | TypeId::BigBinary => {
                dst.put_u16_le(self.max_length);
                if self.type_id.has_collation() {
                    self.collation.unwrap_or_default().encode(dst);
                }
            }
            // No schema collection.
            TypeId::Xml => dst.put_u8(0),
            _ => {}
        }
    }

    /// Decode TYPE_INFO.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if !src.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let raw = src.get_u8();
        let type_id = TypeId::from_u8(raw).ok_or(ProtocolError::UnsupportedDataType(raw))?;
        let mut info = Self::fixed(type_id);

        match type_id {
            TypeId::IntN
            | TypeId::BitN
            | TypeId::FloatN
            | TypeId::MoneyN
            | TypeId::DateTimeN
            | TypeId::Guid => {
                info.max_length = u16::from(read_u8(src)?);
            }
            TypeId::DecimalN | TypeId::NumericN => {
                info.max_length = u16::from(read_u8(src)?);
                info.precision = read_u8(src)?;
                info.scale = read_u8(src)?;
            }
            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                let scale = read_u8(src)?;
                if scale > 7 {
                    return Err(ProtocolError::InvalidField {
                        field: "time scale",
                        value: u32::from(scale),
                    });
                }
                info.scale = scale;
            }
            TypeId::BigVarChar
            | TypeId::BigChar
            | TypeId::NVarChar
            | TypeId::NChar
            | TypeId::BigVarBinary
            | TypeId::BigBinary => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                info.max_length = src.get_u16_le();
                if type_id.has_collation() {
                    info.collation = Some(Collation::decode(src)?);
                }
            }
            TypeId::Xml => {
                let schema_present = read_u8(src)?;
                if schema_present != 0 {
                    return Err(ProtocolError::InvalidField {
                        field: "xml schema flag",
                        value: u32::from(schema_present),
                    });
                }
            }
            _ => {}
        }

        Ok(info)
    }
}

fn read_u8(src: &mut impl Buf) -> Result<u8, ProtocolError> {
    if src.has_remaining() {
        Ok(src.get_u8())
    } else {
        Err(ProtocolError::UnexpectedEof)
    }
}

/// Column flags from COLMETADATA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    /// Column is nullable.
    pub nullable: bool,
    /// Column allows case-sensitive comparison.
    pub case_sensitive: bool,
    /// Column is updateable.
    pub updateable: Updateable,
    /// Column is an identity column.
    pub identity: bool,
    /// Column is computed.
    pub computed: bool,
    /// Column is nullable but unknown at query time.
    pub nullable_unknown: bool,
}

/// Update mode for a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Updateable {
    /// Column is read-only.
    #[default]
    ReadOnly,
    /// Column is read-write.
    ReadWrite,
    /// Updateability unknown.
    Unknown,
}

impl ColumnFlags {
    /// Flags for a plain column with the given nullability.
    #[must_use]
    pub fn with_nullable(nullable: bool) -> Self {
        Self {
            nullable,
            updateable: Updateable::ReadWrite,
            ..Default::default()
        }
    }

    /// Parse column flags from the 2-byte flags field.
    #[must_use]
    pub fn from_bits(flags: u16) -> Self {
        Self {
            nullable: (flags & 0x0001) != 0,
            case_sensitive: (flags & 0x0002) != 0,
            updateable: match (flags >> 2) & 0x03 {
                0 => Updateable::ReadOnly,
                1 => Updateable::ReadWrite,
                _ => Updateable::Unknown,
            },
            identity: (flags & 0x0010) != 0,
            computed: (flags & 0x0020) != 0,
            nullable_unknown: (flags & 0x8000) != 0,
        }
    }

    /// Convert flags back to bits.
    #[must_use]
    pub fn to_bits(&self) -> u16 {
        let mut flags = 0u16;
        if self.nullable {
            flags |= 0x0001;
        }
        if self.case_sensitive {
            flags |= 0x0002;
        }
        flags |= match self.updateable {
            Updateable::ReadOnly => 0,
            Updateable::ReadWrite => 1 << 2,
            Updateable::Unknown => 2 << 2,
        };
        if self.identity {
            flags |= 0x0010;
        }
        if self.computed {
            flags |= 0x0020;
        }
        if self.nullable_unknown {
            flags |= 0x8000;
        }
        flags
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_type_id_from_u8() {
        assert_eq!(TypeId::from_u8(0x38), Some(TypeId::Int4));
        assert_eq!(TypeId::from_u8(0xE7), Some(TypeId::NVarChar));
        assert_eq!(TypeId::from_u8(0x99), None);
    }

    #[test]
    fn test_fixed_length_detection() {
        assert!(TypeId::Int4.is_fixed_length());
        assert!(TypeId::Float8.is_fixed_length());
        assert!(!TypeId::DateTimeN.is_fixed_length());
        assert!(!TypeId::NVarChar.is_fixed_length());
    }

    #[test]
    fn test_nullable_variant() {
        assert_eq!(TypeId::Int2.nullable_variant(), TypeId::IntN);
        assert_eq!(TypeId::DateTime4.nullable_variant(), TypeId::DateTimeN);
        assert_eq!(TypeId::Guid.nullable_variant(), TypeId::Guid);
    }

    #[test]
    fn test_length_class_max_switches_to_plp() {
        let bounded = TypeInfo::with_length(TypeId::NVarChar, 8000);
        let max = TypeInfo::with_length(TypeId::NVarChar, MAX_LENGTH_MARKER);
        assert_eq!(bounded.length_class(), LengthClass::UShort);
        assert_eq!(max.length_class(), LengthClass::Plp);
        assert_eq!(
            TypeInfo::fixed(TypeId::Money).length_class(),
            LengthClass::Fixed(8)
        );
        assert_eq!(
            TypeInfo::with_length(TypeId::MoneyN, 8).length_class(),
            LengthClass::Byte
        );
    }

    #[test]
    fn test_type_info_varchar_layout() {
        let mut info = TypeInfo::with_length(TypeId::BigVarChar, 50);
        info.collation = Some(Collation::DEFAULT);
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[0xA7, 0x32, 0x00, 0x09, 0x04, 0xD0, 0x00, 0x34]
        );

        let decoded = TypeInfo::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn test_type_info_decimal_layout() {
        let info = TypeInfo {
            type_id: TypeId::DecimalN,
            max_length: 9,
            precision: 18,
            scale: 2,
            collation: None,
        };
        let mut buf = BytesMut::new();
        info.encode(&mut buf);
        assert_eq!(&buf[..], &[0x6A, 0x09, 0x12, 0x02]);
    }

    #[test]
    fn test_type_info_rejects_bad_scale() {
        let raw = [0x2A, 0x08];
        assert!(TypeInfo::decode(&mut &raw[..]).is_err());
    }

    #[test]
    fn test_column_flags_roundtrip() {
        let flags = ColumnFlags {
            nullable: true,
            identity: true,
            ..Default::default()
        };
        let bits = flags.to_bits();
        let restored = ColumnFlags::from_bits(bits);
        assert_eq!(flags, restored);
        assert_eq!(ColumnFlags::with_nullable(true).to_bits(), 0x0005);
    }
}
