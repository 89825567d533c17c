//! Round-trip laws for the scalar codecs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mssql_bulk_types::*;
use proptest::prelude::*;

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Any datetime2-representable instant with 100ns resolution.
fn datetime2_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (0i64..=3_652_058, 0i64..864_000_000_000).prop_map(|(days, ticks)| {
        epoch() + Duration::days(days) + Duration::nanoseconds(ticks * 100)
    })
}

fn truncate_to_scale(value: NaiveDateTime, scale: u8) -> NaiveDateTime {
    let step = 10u32.pow(9 - u32::from(scale));
    let nanos = value.nanosecond() / step * step;
    value.with_nanosecond(nanos).unwrap()
}

// =============================================================================
// Money
// =============================================================================

proptest! {
    #[test]
    fn money_round_trips(scaled in any::<i64>()) {
        let mut buf = Vec::new();
        encode_money(Money::from_scaled(scaled), &mut buf);
        prop_assert_eq!(buf.len(), 8);
        let back = decode_money(&mut buf.as_slice()).unwrap();
        prop_assert_eq!(back.scaled(), scaled);
    }

    #[test]
    fn money_display_parses_back(scaled in any::<i64>()) {
        let text = Money::from_scaled(scaled).to_string();
        let fraction = text.rsplit('.').next().unwrap();
        prop_assert_eq!(fraction.len(), 4);
        prop_assert_eq!(text.parse::<Money>().unwrap().scaled(), scaled);
    }

    #[test]
    fn smallmoney_round_trips(scaled in i64::from(i32::MIN)..=i64::from(i32::MAX)) {
        let mut buf = Vec::new();
        encode_smallmoney(Money::from_scaled(scaled), &mut buf).unwrap();
        prop_assert_eq!(decode_smallmoney(&mut buf.as_slice()).unwrap().scaled(), scaled);
    }
}

#[test]
fn money_boundary_strings() {
    for (scaled, text) in [
        (0, "0.0000"),
        (i64::MAX, "922337203685477.5807"),
        (i64::MIN, "-922337203685477.5808"),
    ] {
        let mut buf = Vec::new();
        encode_money(Money::from_scaled(scaled), &mut buf);
        assert_eq!(decode_money(&mut buf.as_slice()).unwrap().to_string(), text);
    }
}

// =============================================================================
// Decimal
// =============================================================================

proptest! {
    #[test]
    fn decimal_round_trips(value in -(10i128.pow(38) - 1)..10i128.pow(38), scale in 0u8..=38) {
        let numeric = Numeric::new(value, scale);
        let precision = numeric.digits().max(scale).max(1);
        let mut buf = Vec::new();
        encode_decimal(numeric, precision, scale, &mut buf).unwrap();
        prop_assert_eq!(buf.len(), decimal_byte_length(precision));
        let back = decode_decimal(&mut buf.as_slice(), buf.len(), scale).unwrap();
        prop_assert_eq!(back, numeric);
    }

    #[test]
    fn decimal_display_parses_back(value in any::<i64>(), scale in 0u8..=18) {
        let numeric = Numeric::new(i128::from(value), scale);
        prop_assert_eq!(numeric.to_string().parse::<Numeric>().unwrap(), numeric);
    }
}

// =============================================================================
// Date and time
// =============================================================================

proptest! {
    #[test]
    fn datetime2_round_trips_at_every_scale(value in datetime2_strategy(), scale in 0u8..=7) {
        let mut buf = Vec::new();
        encode_datetime2(value, scale, &mut buf).unwrap();
        prop_assert_eq!(buf.len(), time_bytes_for_scale(scale) + 3);
        let back = decode_datetime2(&mut buf.as_slice(), scale).unwrap();
        prop_assert_eq!(back, truncate_to_scale(value, scale));
    }

    #[test]
    fn date_round_trips(days in 0i64..=3_652_058) {
        let date = epoch().date() + Duration::days(days);
        let mut buf = Vec::new();
        encode_date(date, &mut buf).unwrap();
        prop_assert_eq!(decode_date(&mut buf.as_slice()).unwrap(), date);
    }

    #[test]
    fn time_round_trips(nanos in 0u64..86_400_000_000_000) {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            (nanos / 1_000_000_000) as u32,
            (nanos % 1_000_000_000) as u32 / 100 * 100,
        ).unwrap();
        let mut buf = Vec::new();
        encode_time(time, 7, &mut buf).unwrap();
        prop_assert_eq!(decode_time(&mut buf.as_slice(), 7).unwrap(), time);
    }

    #[test]
    fn datetimeoffset_preserves_instant(
        value in datetime2_strategy(),
        offset_minutes in -840i32..=840,
    ) {
        let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap();
        // Keep the UTC instant inside the date range.
        let utc = value.max(epoch() + Duration::days(1)).min(epoch() + Duration::days(3_652_057));
        let dto = chrono::DateTime::<FixedOffset>::from_naive_utc_and_offset(utc, offset);
        let mut buf = Vec::new();
        encode_datetimeoffset(dto, 7, &mut buf).unwrap();
        let back = decode_datetimeoffset(&mut buf.as_slice(), 7).unwrap();
        prop_assert_eq!(back, dto);
        prop_assert_eq!(back.offset(), dto.offset());
    }

    #[test]
    fn datetime_is_within_half_a_tick(
        days in -53_690i64..=2_958_463,
        millis in 0i64..86_400_000,
    ) {
        let base = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let value = base + Duration::days(days) + Duration::milliseconds(millis);
        let mut buf = Vec::new();
        // The last instant of 9999-12-31 rounds into year 10000.
        if encode_datetime(value, &mut buf).is_ok() {
            let back = decode_datetime(&mut buf.as_slice()).unwrap();
            let drift = (back - value).num_microseconds().unwrap().abs();
            prop_assert!(drift <= 1_667, "drift {drift}us");
        }
    }

    #[test]
    fn smalldatetime_truncates_seconds(days in 0i64..=65_535, minutes in 0i64..1_440, secs in 0i64..60) {
        let base = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let value = base + Duration::days(days) + Duration::minutes(minutes);
        let mut buf = Vec::new();
        encode_smalldatetime(value + Duration::seconds(secs), &mut buf).unwrap();
        prop_assert_eq!(decode_smalldatetime(&mut buf.as_slice()).unwrap(), value);
    }
}

// =============================================================================
// GUID and strings
// =============================================================================

proptest! {
    #[test]
    fn guid_round_trips(bytes in any::<[u8; 16]>()) {
        let guid = Guid::from_bytes(bytes);
        let mut buf = Vec::new();
        encode_guid(guid, &mut buf);
        prop_assert_eq!(&buf[8..], &bytes[8..]);
        prop_assert_eq!(decode_guid(&mut buf.as_slice()).unwrap(), guid);
    }

    #[test]
    fn utf16_round_trips(s in any::<String>()) {
        let bytes = encode_utf16(&s);
        prop_assert_eq!(bytes.len(), utf16_len(&s) * 2);
        prop_assert_eq!(decode_utf16(&bytes).unwrap(), s);
    }

    #[test]
    fn ascii_narrow_round_trips(s in "[ -~]{0,200}") {
        let collation = tds_wire::Collation::DEFAULT;
        let bytes = encode_narrow(&s, &collation).unwrap();
        prop_assert_eq!(bytes.len(), s.len());
        prop_assert_eq!(decode_narrow(&bytes, &collation).unwrap(), s);
    }
}
