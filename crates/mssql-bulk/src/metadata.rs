//! Column type resolution.
//!
//! A [`ColumnDescriptor`] fixes one column's wire representation for a whole
//! transfer. Descriptors come from a declared SQL type string
//! ([`parse_sql_type`]), from an explicit [`SqlType`], or from the first
//! value seen for the column ([`infer_sql_type`]).

use std::fmt;

use mssql_bulk_types::{MAX_PRECISION, MAX_TIME_SCALE, SqlValue, decimal_byte_length, utf16_len};
use tds_wire::{Collation, ColumnData, ColumnFlags, MAX_LENGTH_MARKER, TypeId, TypeInfo};

use crate::error::{Error, Result};

/// Longest bounded `char`/`varchar`/`binary`/`varbinary` column, in bytes.
pub const MAX_NARROW_LENGTH: u16 = 8000;

/// Longest bounded `nchar`/`nvarchar` column, in UTF-16 code units.
pub const MAX_WIDE_LENGTH: u16 = 4000;

/// Declared length of a variable-length column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Length {
    /// Bounded length, sent with a 2-byte length prefix.
    Bounded(u16),
    /// `(max)`, sent as PLP chunks.
    Max,
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{n}"),
            Self::Max => f.write_str("max"),
        }
    }
}

/// Logical SQL Server column type.
///
/// Legacy large-object types are folded into their `(max)` equivalents:
/// `text` is `varchar(max)`, `ntext` is `nvarchar(max)`, and `image`,
/// `geometry` and `geography` are `varbinary(max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SqlType {
    /// `bit`
    Bit,
    /// `tinyint`
    TinyInt,
    /// `smallint`
    SmallInt,
    /// `int`
    Int,
    /// `bigint`
    BigInt,
    /// `real`
    Real,
    /// `float`
    Float,
    /// `decimal(p, s)` / `numeric(p, s)`
    Decimal {
        /// Total digits, 1-38.
        precision: u8,
        /// Fractional digits, at most `precision`.
        scale: u8,
    },
    /// `money`
    Money,
    /// `smallmoney`
    SmallMoney,
    /// `char(n)`
    Char(u16),
    /// `varchar(n)` / `varchar(max)`
    VarChar(Length),
    /// `nchar(n)`
    NChar(u16),
    /// `nvarchar(n)` / `nvarchar(max)`
    NVarChar(Length),
    /// `binary(n)`
    Binary(u16),
    /// `varbinary(n)` / `varbinary(max)`
    VarBinary(Length),
    /// `date`
    Date,
    /// `time(s)`
    Time(u8),
    /// `datetime`
    DateTime,
    /// `smalldatetime`
    SmallDateTime,
    /// `datetime2(s)`
    DateTime2(u8),
    /// `datetimeoffset(s)`
    DateTimeOffset(u8),
    /// `uniqueidentifier`
    UniqueIdentifier,
    /// `xml`
    Xml,
}

impl SqlType {
    /// Check precision, scale and length bounds.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::UnsupportedType(msg));
        match *self {
            Self::Decimal { precision, scale } => {
                if precision == 0 || precision > MAX_PRECISION {
                    return bad(format!("decimal precision {precision} outside 1..=38"));
                }
                if scale > precision {
                    return bad(format!("decimal scale {scale} exceeds precision {precision}"));
                }
            }
            Self::Char(n) | Self::Binary(n) | Self::VarChar(Length::Bounded(n))
            | Self::VarBinary(Length::Bounded(n)) => {
                if n == 0 || n > MAX_NARROW_LENGTH {
                    return bad(format!("{self}: length {n} outside 1..={MAX_NARROW_LENGTH}"));
                }
            }
            Self::NChar(n) | Self::NVarChar(Length::Bounded(n)) => {
                if n == 0 || n > MAX_WIDE_LENGTH {
                    return bad(format!("{self}: length {n} outside 1..={MAX_WIDE_LENGTH}"));
                }
            }
            Self::Time(s) | Self::DateTime2(s) | Self::DateTimeOffset(s) => {
                if s > MAX_TIME_SCALE {
                    return bad(format!("{self}: scale {s} exceeds {MAX_TIME_SCALE}"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether values travel as PLP chunks.
    #[must_use]
    pub fn is_max(&self) -> bool {
        matches!(
            self,
            Self::VarChar(Length::Max)
                | Self::NVarChar(Length::Max)
                | Self::VarBinary(Length::Max)
                | Self::Xml
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit => f.write_str("bit"),
            Self::TinyInt => f.write_str("tinyint"),
            Self::SmallInt => f.write_str("smallint"),
            Self::Int => f.write_str("int"),
            Self::BigInt => f.write_str("bigint"),
            Self::Real => f.write_str("real"),
            Self::Float => f.write_str("float"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision}, {scale})"),
            Self::Money => f.write_str("money"),
            Self::SmallMoney => f.write_str("smallmoney"),
            Self::Char(n) => write!(f, "char({n})"),
            Self::VarChar(len) => write!(f, "varchar({len})"),
            Self::NChar(n) => write!(f, "nchar({n})"),
            Self::NVarChar(len) => write!(f, "nvarchar({len})"),
            Self::Binary(n) => write!(f, "binary({n})"),
            Self::VarBinary(len) => write!(f, "varbinary({len})"),
            Self::Date => f.write_str("date"),
            Self::Time(s) => write!(f, "time({s})"),
            Self::DateTime => f.write_str("datetime"),
            Self::SmallDateTime => f.write_str("smalldatetime"),
            Self::DateTime2(s) => write!(f, "datetime2({s})"),
            Self::DateTimeOffset(s) => write!(f, "datetimeoffset({s})"),
            Self::UniqueIdentifier => f.write_str("uniqueidentifier"),
            Self::Xml => f.write_str("xml"),
        }
    }
}

/// Parse a declared SQL type such as `"decimal(18, 2)"` or `"NVARCHAR(MAX)"`.
///
/// Matching is case-insensitive and tolerates whitespace around the
/// parameters. Character and binary types without a length default to 1,
/// as in a T-SQL declaration; `decimal` defaults to `(18, 0)` and the time
/// types to scale 7.
pub fn parse_sql_type(declared: &str) -> Result<SqlType> {
    let unsupported = || Error::UnsupportedType(declared.to_string());

    let lower = declared.trim().to_ascii_lowercase();
    let (base, params) = match lower.find('(') {
        Some(open) => {
            let rest = lower[open + 1..].trim_end();
            let inner = rest.strip_suffix(')').ok_or_else(unsupported)?;
            let params: Vec<&str> = inner.split(',').map(str::trim).collect();
            (lower[..open].trim_end(), params)
        }
        None => (lower.as_str(), Vec::new()),
    };

    let number = |index: usize| -> Result<Option<u16>> {
        match params.get(index) {
            None => Ok(None),
            Some(p) => p.parse::<u16>().map(Some).map_err(|_| unsupported()),
        }
    };
    let length = || -> Result<Length> {
        match params.as_slice() {
            [] => Ok(Length::Bounded(1)),
            ["max"] => Ok(Length::Max),
            [_] => Ok(Length::Bounded(number(0)?.unwrap_or(1))),
            _ => Err(unsupported()),
        }
    };
    let fixed_length = || -> Result<u16> {
        match length()? {
            Length::Bounded(n) => Ok(n),
            Length::Max => Err(unsupported()),
        }
    };
    let time_scale = || -> Result<u8> {
        match number(0)? {
            None => Ok(MAX_TIME_SCALE),
            Some(s) => u8::try_from(s).map_err(|_| unsupported()),
        }
    };
    let no_params = |ty: SqlType| -> Result<SqlType> {
        if params.is_empty() { Ok(ty) } else { Err(unsupported()) }
    };

    let ty = match base {
        "bit" => no_params(SqlType::Bit)?,
        "tinyint" => no_params(SqlType::TinyInt)?,
        "smallint" => no_params(SqlType::SmallInt)?,
        "int" | "integer" => no_params(SqlType::Int)?,
        "bigint" => no_params(SqlType::BigInt)?,
        "real" => no_params(SqlType::Real)?,
        "float" => match number(0)? {
            None => SqlType::Float,
            Some(1..=24) => SqlType::Real,
            Some(25..=53) => SqlType::Float,
            Some(_) => return Err(unsupported()),
        },
        "decimal" | "numeric" | "dec" => {
            if params.len() > 2 {
                return Err(unsupported());
            }
            let precision = number(0)?.unwrap_or(18);
            let scale = number(1)?.unwrap_or(0);
            SqlType::Decimal {
                precision: u8::try_from(precision).map_err(|_| unsupported())?,
                scale: u8::try_from(scale).map_err(|_| unsupported())?,
            }
        }
        "money" => no_params(SqlType::Money)?,
        "smallmoney" => no_params(SqlType::SmallMoney)?,
        "char" => SqlType::Char(fixed_length()?),
        "varchar" => SqlType::VarChar(length()?),
        "nchar" => SqlType::NChar(fixed_length()?),
        "nvarchar" => SqlType::NVarChar(length()?),
        "sysname" => no_params(SqlType::NVarChar(Length::Bounded(128)))?,
        "binary" => SqlType::Binary(fixed_length()?),
        "varbinary" => SqlType::VarBinary(length()?),
        "text" => no_params(SqlType::VarChar(Length::Max))?,
        "ntext" => no_params(SqlType::NVarChar(Length::Max))?,
        "image" | "geometry" | "geography" => no_params(SqlType::VarBinary(Length::Max))?,
        "date" => no_params(SqlType::Date)?,
        "time" => SqlType::Time(time_scale()?),
        "datetime" => no_params(SqlType::DateTime)?,
        "smalldatetime" => no_params(SqlType::SmallDateTime)?,
        "datetime2" => SqlType::DateTime2(time_scale()?),
        "datetimeoffset" => SqlType::DateTimeOffset(time_scale()?),
        "uniqueidentifier" => no_params(SqlType::UniqueIdentifier)?,
        "xml" => no_params(SqlType::Xml)?,
        _ => return Err(unsupported()),
    };
    ty.validate()?;
    Ok(ty)
}

/// Pick a column type for a value when none was declared.
///
/// Strings and byte strings get the widest bounded type, or `(max)` when
/// the first value is already longer than that. NULL carries no type.
pub fn infer_sql_type(value: &SqlValue) -> Result<SqlType> {
    let ty = match value {
        SqlValue::Null => {
            return Err(Error::UnsupportedType(
                "cannot infer a column type from NULL".into(),
            ));
        }
        SqlValue::Bool(_) => SqlType::Bit,
        SqlValue::TinyInt(_) => SqlType::TinyInt,
        SqlValue::SmallInt(_) => SqlType::SmallInt,
        SqlValue::Int(_) => SqlType::Int,
        SqlValue::BigInt(_) => SqlType::BigInt,
        SqlValue::Float(_) => SqlType::Real,
        SqlValue::Double(_) => SqlType::Float,
        SqlValue::Numeric(n) => SqlType::Decimal {
            precision: MAX_PRECISION,
            scale: n.scale(),
        },
        SqlValue::Money(_) => SqlType::Money,
        SqlValue::String(s) => {
            if utf16_len(s) <= usize::from(MAX_WIDE_LENGTH) {
                SqlType::NVarChar(Length::Bounded(MAX_WIDE_LENGTH))
            } else {
                SqlType::NVarChar(Length::Max)
            }
        }
        SqlValue::Binary(b) => {
            if b.len() <= usize::from(MAX_NARROW_LENGTH) {
                SqlType::VarBinary(Length::Bounded(MAX_NARROW_LENGTH))
            } else {
                SqlType::VarBinary(Length::Max)
            }
        }
        SqlValue::Guid(_) => SqlType::UniqueIdentifier,
        SqlValue::Date(_) => SqlType::Date,
        SqlValue::Time(_) => SqlType::Time(MAX_TIME_SCALE),
        SqlValue::DateTime(_) => SqlType::DateTime2(MAX_TIME_SCALE),
        SqlValue::DateTimeOffset(_) => SqlType::DateTimeOffset(MAX_TIME_SCALE),
        SqlValue::Xml(_) => SqlType::Xml,
    };
    Ok(ty)
}

/// One column's wire description, fixed for a whole transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub sql_type: SqlType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Collation used for narrow character data.
    pub collation: Collation,
}

impl ColumnDescriptor {
    /// Create a nullable column, validating the type's bounds.
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Result<Self> {
        sql_type.validate()?;
        Ok(Self {
            name: name.into(),
            sql_type,
            nullable: true,
            collation: Collation::DEFAULT,
        })
    }

    /// Create a column from a declared SQL type string.
    pub fn parse(name: impl Into<String>, declared: &str) -> Result<Self> {
        Self::new(name, parse_sql_type(declared)?)
    }

    /// Set whether this column allows NULL values.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the collation for narrow character data.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// The TYPE_INFO sent in column metadata.
    ///
    /// Nullable fixed-width columns use the N-type variants; NOT NULL ones
    /// use the fixed type ids, which carry no length byte in rows.
    #[must_use]
    pub fn type_info(&self) -> TypeInfo {
        let sized = |fixed: TypeId, width: u16| {
            if self.nullable {
                TypeInfo::with_length(fixed.nullable_variant(), width)
            } else {
                TypeInfo::fixed(fixed)
            }
        };
        let chars = |type_id: TypeId, max_length: u16| TypeInfo {
            collation: Some(self.collation),
            ..TypeInfo::with_length(type_id, max_length)
        };
        let scaled = |type_id: TypeId, scale: u8| TypeInfo {
            scale,
            ..TypeInfo::fixed(type_id)
        };
        let bytes = |len: Length| match len {
            Length::Bounded(n) => n,
            Length::Max => MAX_LENGTH_MARKER,
        };
        let wide = |len: Length| match len {
            Length::Bounded(n) => n.saturating_mul(2),
            Length::Max => MAX_LENGTH_MARKER,
        };

        match self.sql_type {
            SqlType::Bit => sized(TypeId::Bit, 1),
            SqlType::TinyInt => sized(TypeId::Int1, 1),
            SqlType::SmallInt => sized(TypeId::Int2, 2),
            SqlType::Int => sized(TypeId::Int4, 4),
            SqlType::BigInt => sized(TypeId::Int8, 8),
            SqlType::Real => sized(TypeId::Float4, 4),
            SqlType::Float => sized(TypeId::Float8, 8),
            SqlType::Money => sized(TypeId::Money, 8),
            SqlType::SmallMoney => sized(TypeId::Money4, 4),
            SqlType::DateTime => sized(TypeId::DateTime, 8),
            SqlType::SmallDateTime => sized(TypeId::DateTime4, 4),
            SqlType::Decimal { precision, scale } => TypeInfo {
                precision,
                scale,
                // decimal_byte_length is at most 17
                ..TypeInfo::with_length(TypeId::DecimalN, decimal_byte_length(precision) as u16)
            },
            SqlType::Char(n) => chars(TypeId::BigChar, n),
            SqlType::VarChar(len) => chars(TypeId::BigVarChar, bytes(len)),
            SqlType::NChar(n) => chars(TypeId::NChar, n.saturating_mul(2)),
            SqlType::NVarChar(len) => chars(TypeId::NVarChar, wide(len)),
            SqlType::Binary(n) => TypeInfo::with_length(TypeId::BigBinary, n),
            SqlType::VarBinary(len) => TypeInfo::with_length(TypeId::BigVarBinary, bytes(len)),
            SqlType::Date => TypeInfo::fixed(TypeId::Date),
            SqlType::Time(s) => scaled(TypeId::Time, s),
            SqlType::DateTime2(s) => scaled(TypeId::DateTime2, s),
            SqlType::DateTimeOffset(s) => scaled(TypeId::DateTimeOffset, s),
            SqlType::UniqueIdentifier => TypeInfo::with_length(TypeId::Guid, 16),
            SqlType::Xml => TypeInfo::fixed(TypeId::Xml),
        }
    }

    /// Write this column's TYPE_INFO.
    pub fn encode_type_info(&self, dst: &mut impl bytes::BufMut) {
        self.type_info().encode(dst);
    }

    /// The type as written in the `INSERT BULK` column list.
    #[must_use]
    pub fn sql_declaration(&self) -> String {
        self.sql_type.to_string()
    }

    /// Whether values travel as PLP chunks.
    #[must_use]
    pub fn is_plp(&self) -> bool {
        self.sql_type.is_max()
    }

    /// The COLMETADATA entry for this column.
    #[must_use]
    pub fn to_column_data(&self) -> ColumnData {
        ColumnData {
            name: self.name.clone(),
            user_type: 0,
            flags: ColumnFlags::with_nullable(self.nullable),
            type_info: self.type_info(),
        }
    }

    /// Rebuild a descriptor from a decoded COLMETADATA entry.
    pub fn from_column_data(column: &ColumnData) -> Result<Self> {
        let info = &column.type_info;
        let unsupported = || {
            Error::UnsupportedType(format!(
                "{:?} with length {} for column {}",
                info.type_id, info.max_length, column.name
            ))
        };
        let narrow = |n: u16| {
            if n == MAX_LENGTH_MARKER {
                Length::Max
            } else {
                Length::Bounded(n)
            }
        };
        let wide = |n: u16| {
            if n == MAX_LENGTH_MARKER {
                Length::Max
            } else {
                Length::Bounded(n / 2)
            }
        };

        let sql_type = match info.type_id {
            TypeId::Bit | TypeId::BitN => SqlType::Bit,
            TypeId::Int1 => SqlType::TinyInt,
            TypeId::Int2 => SqlType::SmallInt,
            TypeId::Int4 => SqlType::Int,
            TypeId::Int8 => SqlType::BigInt,
            TypeId::IntN => match info.max_length {
                1 => SqlType::TinyInt,
                2 => SqlType::SmallInt,
                4 => SqlType::Int,
                8 => SqlType::BigInt,
                _ => return Err(unsupported()),
            },
            TypeId::Float4 => SqlType::Real,
            TypeId::Float8 => SqlType::Float,
            TypeId::FloatN => match info.max_length {
                4 => SqlType::Real,
                8 => SqlType::Float,
                _ => return Err(unsupported()),
            },
            TypeId::Money => SqlType::Money,
            TypeId::Money4 => SqlType::SmallMoney,
            TypeId::MoneyN => match info.max_length {
                4 => SqlType::SmallMoney,
                8 => SqlType::Money,
                _ => return Err(unsupported()),
            },
            TypeId::DateTime => SqlType::DateTime,
            TypeId::DateTime4 => SqlType::SmallDateTime,
            TypeId::DateTimeN => match info.max_length {
                4 => SqlType::SmallDateTime,
                8 => SqlType::DateTime,
                _ => return Err(unsupported()),
            },
            TypeId::DecimalN | TypeId::NumericN => SqlType::Decimal {
                precision: info.precision,
                scale: info.scale,
            },
            TypeId::BigChar => SqlType::Char(info.max_length),
            TypeId::BigVarChar => SqlType::VarChar(narrow(info.max_length)),
            TypeId::NChar => SqlType::NChar(info.max_length / 2),
            TypeId::NVarChar => SqlType::NVarChar(wide(info.max_length)),
            TypeId::BigBinary => SqlType::Binary(info.max_length),
            TypeId::BigVarBinary => SqlType::VarBinary(narrow(info.max_length)),
            TypeId::Date => SqlType::Date,
            TypeId::Time => SqlType::Time(info.scale),
            TypeId::DateTime2 => SqlType::DateTime2(info.scale),
            TypeId::DateTimeOffset => SqlType::DateTimeOffset(info.scale),
            TypeId::Guid => SqlType::UniqueIdentifier,
            TypeId::Xml => SqlType::Xml,
        };

        Ok(Self::new(column.name.clone(), sql_type)?
            .with_nullable(column.is_nullable())
            .with_collation(info.collation.unwrap_or_default()))
    }
}

/// Bracket-quote an identifier, doubling any `]`.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a possibly multi-part table name.
///
/// Names that already contain brackets are passed through untouched;
/// otherwise each `.`-separated part is quoted.
#[must_use]
pub fn quote_table_name(name: &str) -> String {
    if name.contains('[') {
        return name.to_string();
    }
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}
