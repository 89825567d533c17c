//! SQL value representation.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::guid::Guid;
use crate::money::Money;
use crate::numeric::Numeric;

/// One cell of a row on its way to (or from) the wire.
///
/// The column descriptor, not the variant, decides the wire layout: an
/// `Int` bound for a `decimal(10, 2)` column is widened there, a
/// `DateTime` bound for `smalldatetime` is truncated to the minute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value (BIT).
    Bool(bool),
    /// 8-bit unsigned integer (TINYINT).
    TinyInt(u8),
    /// 16-bit signed integer (SMALLINT).
    SmallInt(i16),
    /// 32-bit signed integer (INT).
    Int(i32),
    /// 64-bit signed integer (BIGINT).
    BigInt(i64),
    /// 32-bit floating point (REAL).
    Float(f32),
    /// 64-bit floating point (FLOAT).
    Double(f64),
    /// Scaled decimal (DECIMAL, NUMERIC).
    Numeric(Numeric),
    /// Amount scaled by 10,000 (MONEY, SMALLMONEY).
    Money(Money),
    /// Character data (CHAR, VARCHAR, NCHAR, NVARCHAR, TEXT, NTEXT).
    String(String),
    /// Binary data (BINARY, VARBINARY, IMAGE, spatial payloads).
    Binary(Bytes),
    /// Unique identifier in RFC 4122 byte order.
    Guid(Guid),
    /// Date value (DATE).
    Date(NaiveDate),
    /// Time value (TIME).
    Time(NaiveTime),
    /// Date and time (DATETIME, DATETIME2, SMALLDATETIME).
    DateTime(NaiveDateTime),
    /// Date and time with offset (DATETIMEOFFSET).
    DateTimeOffset(DateTime<FixedOffset>),
    /// XML document.
    Xml(String),
}

impl SqlValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64 if it is any integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::TinyInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a decimal, if it is one.
    #[must_use]
    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as money, if it is.
    #[must_use]
    pub fn as_money(&self) -> Option<Money> {
        match self {
            Self::Money(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Xml(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as a GUID, if it is one.
    #[must_use]
    pub fn as_guid(&self) -> Option<Guid> {
        match self {
            Self::Guid(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BIT",
            Self::TinyInt(_) => "TINYINT",
            Self::SmallInt(_) => "SMALLINT",
            Self::Int(_) => "INT",
            Self::BigInt(_) => "BIGINT",
            Self::Float(_) => "REAL",
            Self::Double(_) => "FLOAT",
            Self::Numeric(_) => "DECIMAL",
            Self::Money(_) => "MONEY",
            Self::String(_) => "NVARCHAR",
            Self::Binary(_) => "VARBINARY",
            Self::Guid(_) => "UNIQUEIDENTIFIER",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "DATETIME2",
            Self::DateTimeOffset(_) => "DATETIMEOFFSET",
            Self::Xml(_) => "XML",
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    u8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    Numeric => Numeric,
    Money => Money,
    String => String,
    Bytes => Binary,
    Guid => Guid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(v))
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for SqlValue {
    fn from(v: uuid::Uuid) -> Self {
        Self::Guid(Guid::from(v))
    }
}

#[cfg(feature = "decimal")]
impl From<rust_decimal::Decimal> for SqlValue {
    fn from(v: rust_decimal::Decimal) -> Self {
        Self::Numeric(Numeric::from(v))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_option_into_value() {
        let some: SqlValue = Some(7i32).into();
        assert_eq!(some, SqlValue::Int(7));
        let none: SqlValue = Option::<i32>::None.into();
        assert!(none.is_null());
    }

    #[test]
    fn test_integer_widening_accessor() {
        assert_eq!(SqlValue::TinyInt(255).as_i64(), Some(255));
        assert_eq!(SqlValue::SmallInt(-5).as_i64(), Some(-5));
        assert_eq!(SqlValue::Double(1.0).as_i64(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(SqlValue::Money(Money(0)).type_name(), "MONEY");
        assert_eq!(SqlValue::from(vec![1u8, 2]).type_name(), "VARBINARY");
        assert_eq!(SqlValue::default().type_name(), "NULL");
    }
}
