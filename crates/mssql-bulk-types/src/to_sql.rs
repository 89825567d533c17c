//! Trait for converting Rust types to SQL values.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::TypeError;
use crate::guid::Guid;
use crate::money::Money;
use crate::numeric::Numeric;
use crate::value::SqlValue;

/// Types that can be bound to a bulk-copy or TVP column.
///
/// `sql_type` names the type used when a column is inferred from the
/// value rather than declared.
pub trait ToSql {
    /// Convert this value to a SQL value.
    fn to_sql(&self) -> Result<SqlValue, TypeError>;

    /// Get the SQL type name for this value.
    fn sql_type(&self) -> &'static str;
}

macro_rules! impl_to_sql_copy {
    ($($ty:ty => $variant:ident, $name:literal);* $(;)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    Ok(SqlValue::$variant(*self))
                }

                fn sql_type(&self) -> &'static str {
                    $name
                }
            }
        )*
    };
}

impl_to_sql_copy! {
    bool => Bool, "BIT";
    u8 => TinyInt, "TINYINT";
    i16 => SmallInt, "SMALLINT";
    i32 => Int, "INT";
    i64 => BigInt, "BIGINT";
    f32 => Float, "REAL";
    f64 => Double, "FLOAT";
    Numeric => Numeric, "DECIMAL";
    Money => Money, "MONEY";
    Guid => Guid, "UNIQUEIDENTIFIER";
    NaiveDate => Date, "DATE";
    NaiveTime => Time, "TIME";
    NaiveDateTime => DateTime, "DATETIME2";
    DateTime<FixedOffset> => DateTimeOffset, "DATETIMEOFFSET";
}

// Types without a same-width SQL Server counterpart are widened.
macro_rules! impl_to_sql_widen {
    ($($ty:ty => $variant:ident($target:ty), $name:literal);* $(;)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> Result<SqlValue, TypeError> {
                    Ok(SqlValue::$variant(<$target>::from(*self)))
                }

                fn sql_type(&self) -> &'static str {
                    $name
                }
            }
        )*
    };
}

impl_to_sql_widen! {
    i8 => SmallInt(i16), "SMALLINT";
    u16 => Int(i32), "INT";
    u32 => BigInt(i64), "BIGINT";
}

impl ToSql for u64 {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        i64::try_from(*self)
            .map(SqlValue::BigInt)
            .map_err(|_| TypeError::OutOfRange {
                target_type: "BIGINT",
            })
    }

    fn sql_type(&self) -> &'static str {
        "BIGINT"
    }
}

impl ToSql for str {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.to_owned()))
    }

    fn sql_type(&self) -> &'static str {
        "NVARCHAR"
    }
}

impl ToSql for String {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::String(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "NVARCHAR"
    }
}

impl ToSql for [u8] {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for Vec<u8> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(Bytes::copy_from_slice(self)))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for Bytes {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Binary(self.clone()))
    }

    fn sql_type(&self) -> &'static str {
        "VARBINARY"
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(self.clone())
    }

    fn sql_type(&self) -> &'static str {
        self.type_name()
    }
}

impl<T: ToSql> ToSql for Option<T> {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        match self {
            Some(v) => v.to_sql(),
            None => Ok(SqlValue::Null),
        }
    }

    fn sql_type(&self) -> &'static str {
        match self {
            Some(v) => v.sql_type(),
            None => "NULL",
        }
    }
}

impl<T: ToSql + ?Sized> ToSql for &T {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        (*self).to_sql()
    }

    fn sql_type(&self) -> &'static str {
        (*self).sql_type()
    }
}

#[cfg(feature = "uuid")]
impl ToSql for uuid::Uuid {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Guid(Guid::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "UNIQUEIDENTIFIER"
    }
}

#[cfg(feature = "decimal")]
impl ToSql for rust_decimal::Decimal {
    fn to_sql(&self) -> Result<SqlValue, TypeError> {
        Ok(SqlValue::Numeric(Numeric::from(*self)))
    }

    fn sql_type(&self) -> &'static str {
        "DECIMAL"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sql_i32() {
        let value: i32 = 42;
        assert_eq!(value.to_sql().unwrap(), SqlValue::Int(42));
        assert_eq!(value.sql_type(), "INT");
    }

    #[test]
    fn test_to_sql_widening() {
        assert_eq!((-5i8).to_sql().unwrap(), SqlValue::SmallInt(-5));
        assert_eq!(u16::MAX.to_sql().unwrap(), SqlValue::Int(65535));
        assert_eq!(u32::MAX.to_sql().unwrap(), SqlValue::BigInt(4_294_967_295));
        assert_eq!(7u64.to_sql().unwrap(), SqlValue::BigInt(7));
        assert!(matches!(
            u64::MAX.to_sql(),
            Err(TypeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_to_sql_string() {
        let value = "hello".to_string();
        assert_eq!(
            value.to_sql().unwrap(),
            SqlValue::String("hello".to_string())
        );
        assert_eq!(value.sql_type(), "NVARCHAR");
    }

    #[test]
    fn test_to_sql_option() {
        let some: Option<i32> = Some(42);
        assert_eq!(some.to_sql().unwrap(), SqlValue::Int(42));

        let none: Option<i32> = None;
        assert_eq!(none.to_sql().unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_to_sql_money() {
        let m = Money::from_scaled(12_345);
        assert_eq!(m.to_sql().unwrap(), SqlValue::Money(m));
        assert_eq!(m.sql_type(), "MONEY");
    }
}
