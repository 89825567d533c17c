//! Row encoding.
//!
//! A row is the concatenation of its column values in descriptor order. Each
//! value is framed according to its column's TYPE_INFO:
//!
//! | Length class | NULL              | Value                        |
//! |--------------|-------------------|------------------------------|
//! | fixed        | not representable | payload only                 |
//! | byte         | `0x00`            | 1-byte length, payload       |
//! | ushort       | `0xFFFF`          | 2-byte length, payload       |
//! | PLP          | `0xFF` x 8        | 8-byte total, chunks, `0u32` |
//!
//! The ROW (0xD1) or TVP_ROW (0x01) token byte is written by the caller.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use mssql_bulk_types::{
    Guid, Money, Numeric, SqlValue, TypeError, decimal_byte_length, decode_date, decode_datetime,
    decode_datetime2, decode_datetimeoffset, decode_decimal, decode_guid, decode_money,
    decode_narrow, decode_smalldatetime, decode_smallmoney, decode_time, decode_utf16,
    encode_date, encode_datetime, encode_datetime2, encode_datetimeoffset, encode_decimal,
    encode_guid, encode_money, encode_narrow, encode_smalldatetime, encode_smallmoney,
    encode_time, encode_utf16, time_bytes_for_scale,
};
use tds_wire::plp::{decode_plp, encode_plp, encode_plp_null};
use tds_wire::{LengthClass, PlpLength, TypeInfo};

use crate::error::{Error, Result};
use crate::metadata::{ColumnDescriptor, Length, SqlType};

/// Encode one row of values.
///
/// On error nothing is left in `dst` from this row.
pub fn encode_row(
    columns: &[ColumnDescriptor],
    values: &[SqlValue],
    dst: &mut BytesMut,
) -> Result<()> {
    if values.len() != columns.len() {
        return Err(Error::ColumnCount {
            expected: columns.len(),
            actual: values.len(),
        });
    }
    let start = dst.len();
    for (column, value) in columns.iter().zip(values) {
        if let Err(e) = encode_value(column, value, dst) {
            dst.truncate(start);
            return Err(Error::encoding(&column.name, e));
        }
    }
    Ok(())
}

/// Decode one row of values, the inverse of [`encode_row`].
pub fn decode_row(columns: &[ColumnDescriptor], src: &mut impl Buf) -> Result<Vec<SqlValue>> {
    columns
        .iter()
        .map(|column| decode_value(column, src).map_err(|e| Error::encoding(&column.name, e)))
        .collect()
}

/// Encode one value for a column.
///
/// The value is coerced to the column's type first; see the crate docs for
/// the accepted conversions. On error nothing is written.
pub fn encode_value(
    column: &ColumnDescriptor,
    value: &SqlValue,
    dst: &mut BytesMut,
) -> std::result::Result<(), TypeError> {
    let start = dst.len();
    let result = encode_value_inner(column, value, dst);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

fn encode_value_inner(
    column: &ColumnDescriptor,
    value: &SqlValue,
    dst: &mut BytesMut,
) -> std::result::Result<(), TypeError> {
    let info = column.type_info();

    if value.is_null() {
        if !column.nullable {
            return Err(TypeError::UnexpectedNull);
        }
        match info.length_class() {
            LengthClass::Fixed(_) => return Err(TypeError::UnexpectedNull),
            LengthClass::Byte => dst.put_u8(0),
            LengthClass::UShort => dst.put_u16_le(0xFFFF),
            LengthClass::Plp => encode_plp_null(dst),
        }
        return Ok(());
    }

    let target = type_name(&column.sql_type);
    match column.sql_type {
        SqlType::Bit => {
            let v = coerce_bool(value, target)?;
            put_prefix(&info, 1, dst);
            dst.put_u8(u8::from(v));
        }
        SqlType::TinyInt => {
            let v = u8::try_from(coerce_int(value, target)?).map_err(|_| out_of_range(target))?;
            put_prefix(&info, 1, dst);
            dst.put_u8(v);
        }
        SqlType::SmallInt => {
            let v = i16::try_from(coerce_int(value, target)?).map_err(|_| out_of_range(target))?;
            put_prefix(&info, 2, dst);
            dst.put_i16_le(v);
        }
        SqlType::Int => {
            let v = i32::try_from(coerce_int(value, target)?).map_err(|_| out_of_range(target))?;
            put_prefix(&info, 4, dst);
            dst.put_i32_le(v);
        }
        SqlType::BigInt => {
            let v = coerce_int(value, target)?;
            put_prefix(&info, 8, dst);
            dst.put_i64_le(v);
        }
        SqlType::Real => {
            let v = coerce_f64(value, target)?;
            let narrowed = v as f32;
            if v.is_finite() && !narrowed.is_finite() {
                return Err(out_of_range(target));
            }
            put_prefix(&info, 4, dst);
            dst.put_f32_le(narrowed);
        }
        SqlType::Float => {
            let v = coerce_f64(value, target)?;
            put_prefix(&info, 8, dst);
            dst.put_f64_le(v);
        }
        SqlType::Decimal { precision, scale } => {
            let v = coerce_numeric(value, scale, target)?;
            let len = decimal_byte_length(precision);
            // At most 17
            dst.put_u8(len as u8);
            encode_decimal(v, precision, scale, dst)?;
        }
        SqlType::Money => {
            let v = coerce_money(value, target)?;
            put_prefix(&info, 8, dst);
            encode_money(v, dst);
        }
        SqlType::SmallMoney => {
            let v = coerce_money(value, target)?;
            if !v.fits_small() {
                return Err(out_of_range(target));
            }
            put_prefix(&info, 4, dst);
            encode_smallmoney(v, dst)?;
        }
        SqlType::DateTime => {
            let v = coerce_naive_datetime(value, target)?;
            let mut payload = Vec::with_capacity(8);
            encode_datetime(v, &mut payload)?;
            put_prefix(&info, 8, dst);
            dst.put_slice(&payload);
        }
        SqlType::SmallDateTime => {
            let v = coerce_naive_datetime(value, target)?;
            let mut payload = Vec::with_capacity(4);
            encode_smalldatetime(v, &mut payload)?;
            put_prefix(&info, 4, dst);
            dst.put_slice(&payload);
        }
        SqlType::DateTime2(scale) => {
            let v = coerce_naive_datetime(value, target)?;
            let mut payload = Vec::with_capacity(8);
            encode_datetime2(v, scale, &mut payload)?;
            put_byte_len(payload.len(), dst);
            dst.put_slice(&payload);
        }
        SqlType::Date => {
            let v = coerce_date(value, target)?;
            let mut payload = Vec::with_capacity(3);
            encode_date(v, &mut payload)?;
            put_byte_len(payload.len(), dst);
            dst.put_slice(&payload);
        }
        SqlType::Time(scale) => {
            let v = coerce_time(value, target)?;
            put_byte_len(time_bytes_for_scale(scale), dst);
            encode_time(v, scale, dst)?;
        }
        SqlType::DateTimeOffset(scale) => {
            let v = coerce_datetimeoffset(value, target)?;
            let mut payload = Vec::with_capacity(10);
            encode_datetimeoffset(v, scale, &mut payload)?;
            put_byte_len(payload.len(), dst);
            dst.put_slice(&payload);
        }
        SqlType::UniqueIdentifier => {
            let v = coerce_guid(value, target)?;
            dst.put_u8(16);
            encode_guid(v, dst);
        }
        SqlType::Char(n) => {
            let data = encode_narrow(coerce_str(value, target)?, &column.collation)?;
            check_length(data.len(), usize::from(n), target)?;
            put_ushort_payload(&data, dst)?;
        }
        SqlType::VarChar(len) => {
            let data = encode_narrow(coerce_str(value, target)?, &column.collation)?;
            put_variable(&data, len, 1, target, dst)?;
        }
        SqlType::NChar(n) => {
            let data = encode_utf16(coerce_str(value, target)?);
            check_length(data.len() / 2, usize::from(n), target)?;
            put_ushort_payload(&data, dst)?;
        }
        SqlType::NVarChar(len) => {
            let data = encode_utf16(coerce_str(value, target)?);
            put_variable(&data, len, 2, target, dst)?;
        }
        SqlType::Binary(n) => {
            let data = coerce_bytes(value, target)?;
            check_length(data.len(), usize::from(n), target)?;
            put_ushort_payload(data, dst)?;
        }
        SqlType::VarBinary(len) => {
            let data = coerce_bytes(value, target)?;
            put_variable(data, len, 1, target, dst)?;
        }
        SqlType::Xml => {
            let data = encode_utf16(coerce_str(value, target)?);
            encode_plp(&data, PlpLength::Known, dst);
        }
    }
    Ok(())
}

/// Decode one value for a column.
pub fn decode_value(
    column: &ColumnDescriptor,
    src: &mut impl Buf,
) -> std::result::Result<SqlValue, TypeError> {
    let info = column.type_info();
    let payload = match read_payload(&info, src)? {
        Some(payload) => payload,
        None => return Ok(SqlValue::Null),
    };
    let len = payload.len();
    let mut buf = payload;
    let need = |n: usize| {
        if len == n {
            Ok(())
        } else {
            Err(TypeError::InvalidEncoding(format!(
                "{} expects {n} bytes, got {len}",
                type_name(&column.sql_type)
            )))
        }
    };

    let value = match column.sql_type {
        SqlType::Bit => {
            need(1)?;
            SqlValue::Bool(buf.get_u8() != 0)
        }
        SqlType::TinyInt => {
            need(1)?;
            SqlValue::TinyInt(buf.get_u8())
        }
        SqlType::SmallInt => {
            need(2)?;
            SqlValue::SmallInt(buf.get_i16_le())
        }
        SqlType::Int => {
            need(4)?;
            SqlValue::Int(buf.get_i32_le())
        }
        SqlType::BigInt => {
            need(8)?;
            SqlValue::BigInt(buf.get_i64_le())
        }
        SqlType::Real => {
            need(4)?;
            SqlValue::Float(buf.get_f32_le())
        }
        SqlType::Float => {
            need(8)?;
            SqlValue::Double(buf.get_f64_le())
        }
        SqlType::Decimal { scale, .. } => SqlValue::Numeric(decode_decimal(&mut buf, len, scale)?),
        SqlType::Money => {
            need(8)?;
            SqlValue::Money(decode_money(&mut buf)?)
        }
        SqlType::SmallMoney => {
            need(4)?;
            SqlValue::Money(decode_smallmoney(&mut buf)?)
        }
        SqlType::DateTime => {
            need(8)?;
            SqlValue::DateTime(decode_datetime(&mut buf)?)
        }
        SqlType::SmallDateTime => {
            need(4)?;
            SqlValue::DateTime(decode_smalldatetime(&mut buf)?)
        }
        SqlType::DateTime2(scale) => {
            need(time_bytes_for_scale(scale) + 3)?;
            SqlValue::DateTime(decode_datetime2(&mut buf, scale)?)
        }
        SqlType::Date => {
            need(3)?;
            SqlValue::Date(decode_date(&mut buf)?)
        }
        SqlType::Time(scale) => {
            need(time_bytes_for_scale(scale))?;
            SqlValue::Time(decode_time(&mut buf, scale)?)
        }
        SqlType::DateTimeOffset(scale) => {
            need(time_bytes_for_scale(scale) + 5)?;
            SqlValue::DateTimeOffset(decode_datetimeoffset(&mut buf, scale)?)
        }
        SqlType::UniqueIdentifier => {
            need(16)?;
            SqlValue::Guid(decode_guid(&mut buf)?)
        }
        SqlType::Char(_) | SqlType::VarChar(_) => {
            SqlValue::String(decode_narrow(&buf, &column.collation)?)
        }
        SqlType::NChar(_) | SqlType::NVarChar(_) => SqlValue::String(decode_utf16(&buf)?),
        SqlType::Binary(_) | SqlType::VarBinary(_) => SqlValue::Binary(buf),
        SqlType::Xml => SqlValue::Xml(decode_utf16(&buf)?),
    };
    Ok(value)
}

/// Read a value's framing, returning its payload or `None` for NULL.
fn read_payload(
    info: &TypeInfo,
    src: &mut impl Buf,
) -> std::result::Result<Option<Bytes>, TypeError> {
    let len = match info.length_class() {
        LengthClass::Fixed(n) => n,
        LengthClass::Byte => {
            ensure(src, 1)?;
            match src.get_u8() {
                0 => return Ok(None),
                n => usize::from(n),
            }
        }
        LengthClass::UShort => {
            ensure(src, 2)?;
            match src.get_u16_le() {
                0xFFFF => return Ok(None),
                n => usize::from(n),
            }
        }
        LengthClass::Plp => {
            return decode_plp(src)
                .map(|data| data.map(Bytes::from))
                .map_err(|e| TypeError::InvalidEncoding(format!("PLP value: {e}")));
        }
    };
    ensure(src, len)?;
    Ok(Some(src.copy_to_bytes(len)))
}

fn ensure(src: &impl Buf, needed: usize) -> std::result::Result<(), TypeError> {
    if src.remaining() < needed {
        return Err(TypeError::BufferTooSmall {
            needed,
            available: src.remaining(),
        });
    }
    Ok(())
}

// =============================================================================
// Framing helpers
// =============================================================================

/// Length byte for N-types; fixed types carry none.
fn put_prefix(info: &TypeInfo, len: u8, dst: &mut BytesMut) {
    if info.length_class() == LengthClass::Byte {
        dst.put_u8(len);
    }
}

fn put_byte_len(len: usize, dst: &mut BytesMut) {
    // Scaled date/time payloads are at most 10 bytes.
    dst.put_u8(len as u8);
}

fn put_ushort_payload(data: &[u8], dst: &mut BytesMut) -> std::result::Result<(), TypeError> {
    let len = u16::try_from(data.len())
        .ok()
        .filter(|len| *len != 0xFFFF)
        .ok_or_else(|| TypeError::Truncation(format!("{} bytes exceed a bounded column", data.len())))?;
    dst.put_u16_le(len);
    dst.put_slice(data);
    Ok(())
}

/// Bounded columns take a 2-byte length, `(max)` columns PLP chunks.
///
/// `unit` is the byte width of one declared length unit.
fn put_variable(
    data: &[u8],
    len: Length,
    unit: usize,
    target: &'static str,
    dst: &mut BytesMut,
) -> std::result::Result<(), TypeError> {
    match len {
        Length::Bounded(n) => {
            check_length(data.len() / unit, usize::from(n), target)?;
            put_ushort_payload(data, dst)
        }
        Length::Max => {
            encode_plp(data, PlpLength::Known, dst);
            Ok(())
        }
    }
}

fn check_length(actual: usize, declared: usize, target: &'static str) -> std::result::Result<(), TypeError> {
    if actual > declared {
        return Err(TypeError::Truncation(format!(
            "{actual} units exceed {target}({declared})"
        )));
    }
    Ok(())
}

// =============================================================================
// Coercions
// =============================================================================

fn type_name(sql_type: &SqlType) -> &'static str {
    match sql_type {
        SqlType::Bit => "BIT",
        SqlType::TinyInt => "TINYINT",
        SqlType::SmallInt => "SMALLINT",
        SqlType::Int => "INT",
        SqlType::BigInt => "BIGINT",
        SqlType::Real => "REAL",
        SqlType::Float => "FLOAT",
        SqlType::Decimal { .. } => "DECIMAL",
        SqlType::Money => "MONEY",
        SqlType::SmallMoney => "SMALLMONEY",
        SqlType::Char(_) => "CHAR",
        SqlType::VarChar(_) => "VARCHAR",
        SqlType::NChar(_) => "NCHAR",
        SqlType::NVarChar(_) => "NVARCHAR",
        SqlType::Binary(_) => "BINARY",
        SqlType::VarBinary(_) => "VARBINARY",
        SqlType::Date => "DATE",
        SqlType::Time(_) => "TIME",
        SqlType::DateTime => "DATETIME",
        SqlType::SmallDateTime => "SMALLDATETIME",
        SqlType::DateTime2(_) => "DATETIME2",
        SqlType::DateTimeOffset(_) => "DATETIMEOFFSET",
        SqlType::UniqueIdentifier => "UNIQUEIDENTIFIER",
        SqlType::Xml => "XML",
    }
}

fn unsupported(value: &SqlValue, target: &'static str) -> TypeError {
    TypeError::UnsupportedConversion {
        from: value.type_name(),
        to: target,
    }
}

fn out_of_range(target: &'static str) -> TypeError {
    TypeError::OutOfRange {
        target_type: target,
    }
}

fn coerce_int(value: &SqlValue, target: &'static str) -> std::result::Result<i64, TypeError> {
    match value {
        SqlValue::TinyInt(_) | SqlValue::SmallInt(_) | SqlValue::Int(_) | SqlValue::BigInt(_) => {
            value.as_i64().ok_or_else(|| unsupported(value, target))
        }
        SqlValue::Bool(b) => Ok(i64::from(*b)),
        _ => Err(unsupported(value, target)),
    }
}

fn coerce_bool(value: &SqlValue, target: &'static str) -> std::result::Result<bool, TypeError> {
    match value {
        SqlValue::Bool(b) => Ok(*b),
        _ => match coerce_int(value, target)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(out_of_range(target)),
        },
    }
}

fn coerce_f64(value: &SqlValue, target: &'static str) -> std::result::Result<f64, TypeError> {
    match value {
        SqlValue::Float(v) => Ok(f64::from(*v)),
        SqlValue::Double(v) => Ok(*v),
        SqlValue::Numeric(n) => n
            .to_string()
            .parse()
            .map_err(|_| unsupported(value, target)),
        _ => coerce_int(value, target).map(|v| v as f64),
    }
}

/// Rescale to the column scale. Floats are rounded from their exact binary
/// value; exact decimals must not lose digits.
fn coerce_numeric(
    value: &SqlValue,
    scale: u8,
    target: &'static str,
) -> std::result::Result<Numeric, TypeError> {
    match value {
        SqlValue::Numeric(n) => n.rescale(scale),
        SqlValue::Money(m) => m.to_numeric().rescale(scale),
        SqlValue::Float(v) => Numeric::from_f64(f64::from(*v), scale),
        SqlValue::Double(v) => Numeric::from_f64(*v, scale),
        _ => Numeric::from(coerce_int(value, target)?).rescale(scale),
    }
}

/// Integers are taken as amounts already scaled by 10,000.
fn coerce_money(value: &SqlValue, target: &'static str) -> std::result::Result<Money, TypeError> {
    match value {
        SqlValue::Money(m) => Ok(*m),
        SqlValue::Numeric(n) => Money::try_from(*n),
        SqlValue::Float(v) => Money::try_from(Numeric::from_f64(f64::from(*v), 4)?),
        SqlValue::Double(v) => Money::try_from(Numeric::from_f64(*v, 4)?),
        SqlValue::TinyInt(_) | SqlValue::SmallInt(_) | SqlValue::Int(_) | SqlValue::BigInt(_) => {
            Ok(Money::from_scaled(coerce_int(value, target)?))
        }
        _ => Err(unsupported(value, target)),
    }
}

/// The legacy and `datetime2` types have no offset; an offset value is
/// stored as its local wall-clock time.
fn coerce_naive_datetime(
    value: &SqlValue,
    target: &'static str,
) -> std::result::Result<NaiveDateTime, TypeError> {
    match value {
        SqlValue::DateTime(v) => Ok(*v),
        SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
        SqlValue::DateTimeOffset(v) => Ok(v.naive_local()),
        _ => Err(unsupported(value, target)),
    }
}

fn coerce_date(value: &SqlValue, target: &'static str) -> std::result::Result<NaiveDate, TypeError> {
    match value {
        SqlValue::Date(d) => Ok(*d),
        SqlValue::DateTime(v) => Ok(v.date()),
        SqlValue::DateTimeOffset(v) => Ok(v.naive_local().date()),
        _ => Err(unsupported(value, target)),
    }
}

fn coerce_time(value: &SqlValue, target: &'static str) -> std::result::Result<NaiveTime, TypeError> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::DateTime(v) => Ok(v.time()),
        SqlValue::DateTimeOffset(v) => Ok(v.naive_local().time()),
        _ => Err(unsupported(value, target)),
    }
}

/// Values without an offset are taken as UTC.
fn coerce_datetimeoffset(
    value: &SqlValue,
    target: &'static str,
) -> std::result::Result<DateTime<FixedOffset>, TypeError> {
    match value {
        SqlValue::DateTimeOffset(v) => Ok(*v),
        SqlValue::DateTime(v) => Ok(v.and_utc().fixed_offset()),
        SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN).and_utc().fixed_offset()),
        _ => Err(unsupported(value, target)),
    }
}

/// 16 raw bytes are read in RFC 4122 order.
fn coerce_guid(value: &SqlValue, target: &'static str) -> std::result::Result<Guid, TypeError> {
    match value {
        SqlValue::Guid(g) => Ok(*g),
        SqlValue::Binary(b) => Guid::try_from(b.as_ref()),
        _ => Err(unsupported(value, target)),
    }
}

fn coerce_str<'a>(value: &'a SqlValue, target: &'static str) -> std::result::Result<&'a str, TypeError> {
    match value {
        SqlValue::String(s) | SqlValue::Xml(s) => Ok(s.as_str()),
        _ => Err(unsupported(value, target)),
    }
}

fn coerce_bytes<'a>(value: &'a SqlValue, target: &'static str) -> std::result::Result<&'a [u8], TypeError> {
    match value {
        SqlValue::Binary(b) => Ok(b.as_ref()),
        SqlValue::Guid(g) => Ok(g.as_bytes().as_slice()),
        _ => Err(unsupported(value, target)),
    }
}
