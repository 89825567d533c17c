//! Date and time codecs.
//!
//! | Type | Layout |
//! |------|--------|
//! | `date` | 3-byte day count since 0001-01-01 |
//! | `time(n)` | 3/4/5-byte count of 10^-n second intervals since midnight |
//! | `datetime2(n)` | `time(n)` then `date` |
//! | `datetimeoffset(n)` | `datetime2(n)` in UTC then a signed 16-bit minute offset |
//! | `datetime` | i32 days since 1900-01-01, u32 ticks of 1/300 s |
//! | `smalldatetime` | u16 days since 1900-01-01, u16 minutes since midnight |
//!
//! Fractional seconds beyond a column's scale are truncated. `datetime`
//! rounds to the nearest tick, carrying into the next day.

use bytes::{Buf, BufMut};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{TypeError, ensure_remaining};

/// Largest fractional-second scale.
pub const MAX_TIME_SCALE: u8 = 7;

/// `NaiveDate::num_days_from_ce` of 1900-01-01.
const DAYS_CE_1900: i32 = 693_596;
/// Days from 1900-01-01 to 1753-01-01, the first `datetime` day.
const DATETIME_MIN_DAYS: i32 = -53_690;
/// Days from 1900-01-01 to 9999-12-31.
const DATETIME_MAX_DAYS: i32 = 2_958_463;
/// Days from 0001-01-01 to 9999-12-31.
const DATE_MAX_DAYS: i32 = 3_652_058;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SEC;
const TICKS_PER_DAY: u64 = 86_400 * 300;
const MINUTES_PER_DAY: u16 = 1_440;
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// Bytes used by a `time` value of the given scale.
#[must_use]
pub const fn time_bytes_for_scale(scale: u8) -> usize {
    match scale {
        0..=2 => 3,
        3..=4 => 4,
        _ => 5,
    }
}

fn check_scale(scale: u8) -> Result<(), TypeError> {
    if scale > MAX_TIME_SCALE {
        return Err(TypeError::InvalidDateTime(format!(
            "scale {scale} exceeds {MAX_TIME_SCALE}"
        )));
    }
    Ok(())
}

fn interval_nanos(scale: u8) -> u64 {
    10u64.pow(9 - u32::from(scale))
}

/// Nanoseconds since midnight; leap-second representations clamp to the last nanosecond.
fn nanos_of_day(time: NaiveTime) -> u64 {
    u64::from(time.num_seconds_from_midnight()) * NANOS_PER_SEC
        + u64::from(time.nanosecond().min(999_999_999))
}

fn time_from_nanos(nanos: u64) -> Result<NaiveTime, TypeError> {
    if nanos >= NANOS_PER_DAY {
        return Err(TypeError::InvalidDateTime(format!(
            "{nanos}ns is past midnight"
        )));
    }
    NaiveTime::from_num_seconds_from_midnight_opt(
        (nanos / NANOS_PER_SEC) as u32,
        (nanos % NANOS_PER_SEC) as u32,
    )
    .ok_or_else(|| TypeError::InvalidDateTime(format!("{nanos}ns since midnight")))
}

fn put_uint_le(buf: &mut impl BufMut, value: u64, len: usize) {
    buf.put_slice(&value.to_le_bytes()[..len]);
}

fn get_uint_le(buf: &mut impl Buf, len: usize) -> u64 {
    let mut raw = [0u8; 8];
    buf.copy_to_slice(&mut raw[..len]);
    u64::from_le_bytes(raw)
}

// =============================================================================
// date
// =============================================================================

/// Encode a DATE (3 bytes).
pub fn encode_date(date: NaiveDate, buf: &mut impl BufMut) -> Result<(), TypeError> {
    let days = date.num_days_from_ce() - 1;
    if !(0..=DATE_MAX_DAYS).contains(&days) {
        return Err(TypeError::OutOfRange { target_type: "DATE" });
    }
    put_uint_le(buf, days as u64, 3);
    Ok(())
}

/// Decode a DATE (3 bytes).
pub fn decode_date(buf: &mut impl Buf) -> Result<NaiveDate, TypeError> {
    ensure_remaining(buf, 3)?;
    let days = get_uint_le(buf, 3) as i32;
    NaiveDate::from_num_days_from_ce_opt(days + 1)
        .filter(|_| days <= DATE_MAX_DAYS)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{days} days since 0001-01-01")))
}

// =============================================================================
// time / datetime2 / datetimeoffset
// =============================================================================

/// Encode a TIME with the given scale; extra fractional digits are truncated.
pub fn encode_time(time: NaiveTime, scale: u8, buf: &mut impl BufMut) -> Result<(), TypeError> {
    check_scale(scale)?;
    let intervals = nanos_of_day(time) / interval_nanos(scale);
    put_uint_le(buf, intervals, time_bytes_for_scale(scale));
    Ok(())
}

/// Decode a TIME with the given scale.
pub fn decode_time(buf: &mut impl Buf, scale: u8) -> Result<NaiveTime, TypeError> {
    check_scale(scale)?;
    let len = time_bytes_for_scale(scale);
    ensure_remaining(buf, len)?;
    let intervals = get_uint_le(buf, len);
    let nanos = intervals
        .checked_mul(interval_nanos(scale))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{intervals} intervals")))?;
    time_from_nanos(nanos)
}

/// Encode a DATETIME2: time at `scale`, then date.
pub fn encode_datetime2(
    value: NaiveDateTime,
    scale: u8,
    buf: &mut impl BufMut,
) -> Result<(), TypeError> {
    // Validate the date first so nothing is written on failure.
    let mut date = Vec::with_capacity(3);
    encode_date(value.date(), &mut date)?;
    encode_time(value.time(), scale, buf)?;
    buf.put_slice(&date);
    Ok(())
}

/// Decode a DATETIME2.
pub fn decode_datetime2(buf: &mut impl Buf, scale: u8) -> Result<NaiveDateTime, TypeError> {
    let time = decode_time(buf, scale)?;
    let date = decode_date(buf)?;
    Ok(date.and_time(time))
}

/// Encode a DATETIMEOFFSET: UTC datetime2 followed by the offset in minutes.
pub fn encode_datetimeoffset(
    value: DateTime<FixedOffset>,
    scale: u8,
    buf: &mut impl BufMut,
) -> Result<(), TypeError> {
    let offset_secs = value.offset().local_minus_utc();
    if offset_secs % 60 != 0 || (offset_secs / 60).abs() > MAX_OFFSET_MINUTES {
        return Err(TypeError::InvalidDateTime(format!(
            "offset of {offset_secs}s is not a whole minute within ±14:00"
        )));
    }
    encode_datetime2(value.naive_utc(), scale, buf)?;
    buf.put_i16_le((offset_secs / 60) as i16);
    Ok(())
}

/// Decode a DATETIMEOFFSET.
pub fn decode_datetimeoffset(
    buf: &mut impl Buf,
    scale: u8,
) -> Result<DateTime<FixedOffset>, TypeError> {
    let utc = decode_datetime2(buf, scale)?;
    ensure_remaining(buf, 2)?;
    let minutes = i32::from(buf.get_i16_le());
    let offset = FixedOffset::east_opt(minutes * 60)
        .filter(|_| minutes.abs() <= MAX_OFFSET_MINUTES)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("offset of {minutes} minutes")))?;
    Ok(DateTime::from_naive_utc_and_offset(utc, offset))
}

// =============================================================================
// datetime / smalldatetime
// =============================================================================

/// Encode a DATETIME (8 bytes), rounding to the nearest 1/300 second.
pub fn encode_datetime(value: NaiveDateTime, buf: &mut impl BufMut) -> Result<(), TypeError> {
    let mut days = value.date().num_days_from_ce() - DAYS_CE_1900;
    let mut ticks = (nanos_of_day(value.time()) * 3 + 5_000_000) / 10_000_000;
    if ticks >= TICKS_PER_DAY {
        days += 1;
        ticks = 0;
    }
    if !(DATETIME_MIN_DAYS..=DATETIME_MAX_DAYS).contains(&days) {
        return Err(TypeError::OutOfRange {
            target_type: "DATETIME",
        });
    }
    buf.put_i32_le(days);
    buf.put_u32_le(ticks as u32);
    Ok(())
}

/// Decode a DATETIME (8 bytes).
pub fn decode_datetime(buf: &mut impl Buf) -> Result<NaiveDateTime, TypeError> {
    ensure_remaining(buf, 8)?;
    let days = buf.get_i32_le();
    let ticks = u64::from(buf.get_u32_le());
    if ticks >= TICKS_PER_DAY || !(DATETIME_MIN_DAYS..=DATETIME_MAX_DAYS).contains(&days) {
        return Err(TypeError::InvalidDateTime(format!(
            "datetime days={days} ticks={ticks}"
        )));
    }
    let date = NaiveDate::from_num_days_from_ce_opt(days + DAYS_CE_1900)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{days} days since 1900-01-01")))?;
    let time = time_from_nanos(ticks * 10_000_000 / 3)?;
    Ok(date.and_time(time))
}

/// Encode a SMALLDATETIME (4 bytes); seconds are truncated.
pub fn encode_smalldatetime(value: NaiveDateTime, buf: &mut impl BufMut) -> Result<(), TypeError> {
    let days = u16::try_from(value.date().num_days_from_ce() - DAYS_CE_1900).map_err(|_| {
        TypeError::OutOfRange {
            target_type: "SMALLDATETIME",
        }
    })?;
    let minutes = (value.hour() * 60 + value.minute()) as u16;
    buf.put_u16_le(days);
    buf.put_u16_le(minutes);
    Ok(())
}

/// Decode a SMALLDATETIME (4 bytes).
pub fn decode_smalldatetime(buf: &mut impl Buf) -> Result<NaiveDateTime, TypeError> {
    ensure_remaining(buf, 4)?;
    let days = i32::from(buf.get_u16_le());
    let minutes = buf.get_u16_le();
    if minutes >= MINUTES_PER_DAY {
        return Err(TypeError::InvalidDateTime(format!("{minutes} minutes")));
    }
    let date = NaiveDate::from_num_days_from_ce_opt(days + DAYS_CE_1900)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{days} days since 1900-01-01")))?;
    let time = time_from_nanos(u64::from(minutes) * 60 * NANOS_PER_SEC)?;
    Ok(date.and_time(time))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nanos: u32) -> NaiveDateTime {
        ymd(y, mo, d).and_hms_nano_opt(h, mi, s, nanos).unwrap()
    }

    #[test]
    fn test_epoch_constants() {
        assert_eq!(ymd(1900, 1, 1).num_days_from_ce(), DAYS_CE_1900);
        assert_eq!(ymd(1753, 1, 1).num_days_from_ce() - DAYS_CE_1900, DATETIME_MIN_DAYS);
        assert_eq!(ymd(9999, 12, 31).num_days_from_ce() - DAYS_CE_1900, DATETIME_MAX_DAYS);
        assert_eq!(ymd(9999, 12, 31).num_days_from_ce() - 1, DATE_MAX_DAYS);
    }

    #[test]
    fn test_time_bytes_for_scale() {
        assert_eq!(time_bytes_for_scale(0), 3);
        assert_eq!(time_bytes_for_scale(1), 3);
        assert_eq!(time_bytes_for_scale(3), 4);
        assert_eq!(time_bytes_for_scale(4), 4);
        assert_eq!(time_bytes_for_scale(5), 5);
        assert_eq!(time_bytes_for_scale(7), 5);
    }

    #[test]
    fn test_date_layout() {
        let mut buf = BytesMut::new();
        encode_date(ymd(1, 1, 1), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0]);

        let mut buf = BytesMut::new();
        encode_date(ymd(2010, 11, 12), &mut buf).unwrap();
        assert_eq!(decode_date(&mut buf.freeze()).unwrap(), ymd(2010, 11, 12));

        let mut buf = BytesMut::new();
        assert!(encode_date(ymd(10000, 1, 1), &mut buf).is_err());
    }

    #[test]
    fn test_datetime2_scale_tiers() {
        let value = dt(2010, 11, 12, 13, 14, 15, 123_456_789);
        for (scale, width, expected_nanos) in [
            (1u8, 3usize, 100_000_000u32),
            (3, 4, 123_000_000),
            (7, 5, 123_456_700),
        ] {
            let mut buf = BytesMut::new();
            encode_datetime2(value, scale, &mut buf).unwrap();
            assert_eq!(buf.len(), width + 3, "scale {scale}");
            let decoded = decode_datetime2(&mut buf.freeze(), scale).unwrap();
            assert_eq!(decoded, dt(2010, 11, 12, 13, 14, 15, expected_nanos));
        }
    }

    #[test]
    fn test_time_scale_7_layout() {
        let mut buf = BytesMut::new();
        let time = NaiveTime::from_hms_opt(0, 0, 1).unwrap();
        encode_time(time, 7, &mut buf).unwrap();
        // 10,000,000 intervals of 100ns
        assert_eq!(&buf[..], &[0x80, 0x96, 0x98, 0x00, 0x00]);
    }

    #[test]
    fn test_invalid_scale() {
        let mut buf = BytesMut::new();
        assert!(encode_time(NaiveTime::MIN, 8, &mut buf).is_err());
    }

    #[test]
    fn test_datetimeoffset_stores_utc() {
        let offset = FixedOffset::east_opt(-5 * 3600).unwrap();
        let local = dt(2024, 3, 1, 22, 30, 0, 0);
        let value = local.and_local_timezone(offset).unwrap();

        let mut buf = BytesMut::new();
        encode_datetimeoffset(value, 7, &mut buf).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(&buf[8..], &(-300i16).to_le_bytes());

        let mut cursor = buf.freeze();
        let utc_part = decode_datetime2(&mut cursor.clone(), 7).unwrap();
        assert_eq!(utc_part, dt(2024, 3, 2, 3, 30, 0, 0));
        assert_eq!(decode_datetimeoffset(&mut cursor, 7).unwrap(), value);
    }

    #[test]
    fn test_datetime_ticks() {
        let value = dt(2010, 11, 12, 13, 14, 15, 120_000_000);
        let mut buf = BytesMut::new();
        encode_datetime(value, &mut buf).unwrap();
        let days = i32::from_le_bytes(buf[..4].try_into().unwrap());
        let ticks = u32::from_le_bytes(buf[4..].try_into().unwrap());
        assert_eq!(days, 40_492);
        assert_eq!(ticks, 14_296_536);
        assert_eq!(decode_datetime(&mut buf.freeze()).unwrap(), value);
    }

    #[test]
    fn test_datetime_rounds_into_next_day() {
        let value = dt(2010, 11, 12, 23, 59, 59, 999_000_000);
        let mut buf = BytesMut::new();
        encode_datetime(value, &mut buf).unwrap();
        assert_eq!(
            decode_datetime(&mut buf.freeze()).unwrap(),
            dt(2010, 11, 13, 0, 0, 0, 0)
        );
    }

    #[test]
    fn test_datetime_range() {
        let mut buf = BytesMut::new();
        assert!(encode_datetime(dt(1752, 12, 31, 0, 0, 0, 0), &mut buf).is_err());
        assert!(encode_datetime(dt(1753, 1, 1, 0, 0, 0, 0), &mut buf).is_ok());
        assert!(encode_datetime(dt(4010, 11, 12, 13, 14, 15, 120_000_000), &mut buf).is_ok());
        assert!(encode_datetime(dt(9999, 12, 31, 23, 59, 59, 999_000_000), &mut buf).is_err());
    }

    #[test]
    fn test_smalldatetime() {
        let value = dt(2010, 11, 12, 13, 14, 59, 0);
        let mut buf = BytesMut::new();
        encode_smalldatetime(value, &mut buf).unwrap();
        assert_eq!(&buf[2..], &(13u16 * 60 + 14).to_le_bytes());
        assert_eq!(
            decode_smalldatetime(&mut buf.freeze()).unwrap(),
            dt(2010, 11, 12, 13, 14, 0, 0)
        );

        let mut buf = BytesMut::new();
        assert!(encode_smalldatetime(dt(2079, 6, 6, 23, 59, 0, 0), &mut buf).is_ok());
        assert!(encode_smalldatetime(dt(2079, 6, 7, 0, 0, 0, 0), &mut buf).is_err());
        assert!(encode_smalldatetime(dt(1899, 12, 31, 0, 0, 0, 0), &mut buf).is_err());
    }
}
