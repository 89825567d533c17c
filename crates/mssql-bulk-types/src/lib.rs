//! # mssql-bulk-types
//!
//! Bit-exact scalar codecs for SQL Server bulk copy and table-valued
//! parameters.
//!
//! Every codec is a pure function over `bytes::Buf`/`BufMut`: no column
//! metadata, no protocol state. Length prefixes and NULL markers belong to
//! the row encoder in `mssql-bulk`.
//!
//! ## Features
//!
//! - `uuid` (default): `uuid::Uuid` conversions for [`Guid`]
//! - `decimal` (default): `rust_decimal::Decimal` conversions for [`Numeric`]
//! - `encoding` (default): code-page transcoding of narrow strings via `encoding_rs`
//!
//! ## Type Mappings
//!
//! | SQL Server Type | Rust Type |
//! |-----------------|-----------|
//! | `BIT` | `bool` |
//! | `TINYINT` | `u8` |
//! | `SMALLINT` | `i16` |
//! | `INT` | `i32` |
//! | `BIGINT` | `i64` |
//! | `REAL` | `f32` |
//! | `FLOAT` | `f64` |
//! | `DECIMAL`/`NUMERIC` | [`Numeric`] (or `rust_decimal::Decimal`) |
//! | `MONEY`/`SMALLMONEY` | [`Money`] |
//! | `CHAR`/`VARCHAR`/`NCHAR`/`NVARCHAR` | `String` |
//! | `BINARY`/`VARBINARY` | `Vec<u8>` / `bytes::Bytes` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `DATETIME`/`SMALLDATETIME`/`DATETIME2` | `chrono::NaiveDateTime` |
//! | `DATETIMEOFFSET` | `chrono::DateTime<FixedOffset>` |
//! | `UNIQUEIDENTIFIER` | [`Guid`] (or `uuid::Uuid`) |
//!
//! ## Example
//!
//! ```rust
//! use mssql_bulk_types::{decode_money, encode_money, Money};
//!
//! let mut buf = Vec::new();
//! encode_money(Money::from_scaled(i64::MAX), &mut buf);
//! let back = decode_money(&mut buf.as_slice()).unwrap();
//! assert_eq!(back.to_string(), "922337203685477.5807");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod datetime;
pub mod error;
pub mod guid;
pub mod money;
pub mod numeric;
pub mod string;
pub mod to_sql;
pub mod value;

pub use datetime::{
    MAX_TIME_SCALE, decode_date, decode_datetime, decode_datetime2, decode_datetimeoffset,
    decode_smalldatetime, decode_time, encode_date, encode_datetime, encode_datetime2,
    encode_datetimeoffset, encode_smalldatetime, encode_time, time_bytes_for_scale,
};
pub use error::TypeError;
pub use guid::{Guid, decode_guid, encode_guid};
pub use money::{Money, decode_money, decode_smallmoney, encode_money, encode_smallmoney};
pub use numeric::{MAX_PRECISION, Numeric, decimal_byte_length, decode_decimal, encode_decimal};
pub use string::{decode_narrow, decode_utf16, encode_narrow, encode_utf16, utf16_len};
pub use to_sql::ToSql;
pub use value::SqlValue;
