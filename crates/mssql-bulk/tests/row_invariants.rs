//! Invariants of row encoding and name handling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::BytesMut;
use mssql_bulk::{
    ColumnDescriptor, Error, Length, Numeric, SqlType, SqlValue, decode_row, encode_row,
    get_schema_and_name, infer_sql_type, quote_identifier,
};
use proptest::prelude::*;

fn nvarchar(n: u16) -> ColumnDescriptor {
    ColumnDescriptor::new("s", SqlType::NVarChar(Length::Bounded(n))).unwrap()
}

// =============================================================================
// Row encoding
// =============================================================================

proptest! {
    #[test]
    fn failed_row_leaves_buffer_untouched(
        prefix in proptest::collection::vec(any::<u8>(), 0..64),
        ok in "[a-z]{0,10}",
        too_long in "[a-z]{11,40}",
    ) {
        let columns = [nvarchar(10), nvarchar(10)];
        let mut buf = BytesMut::from(prefix.as_slice());

        let err = encode_row(
            &columns,
            &[SqlValue::String(ok), SqlValue::String(too_long)],
            &mut buf,
        )
        .unwrap_err();

        let is_encoding = matches!(err, Error::Encoding { .. });
        prop_assert!(is_encoding);
        prop_assert_eq!(&buf[..], prefix.as_slice());
    }

    #[test]
    fn bounded_nvarchar_is_length_prefixed_utf16(s in "\\PC{0,50}") {
        let units = s.encode_utf16().count();
        prop_assume!(units <= 100);
        let columns = [nvarchar(100)];
        let mut buf = BytesMut::new();
        encode_row(&columns, &[SqlValue::String(s.clone())], &mut buf).unwrap();

        prop_assert_eq!(buf.len(), 2 + units * 2);
        prop_assert_eq!(u16::from_le_bytes([buf[0], buf[1]]) as usize, units * 2);
        let back = decode_row(&columns, &mut buf.freeze()).unwrap();
        prop_assert_eq!(back, vec![SqlValue::String(s)]);
    }

    #[test]
    fn float_into_decimal_rounds_to_scale(cents in -1_000_000_000i64..1_000_000_000) {
        let value = cents as f64 / 100.0;
        let columns = [ColumnDescriptor::new(
            "d",
            SqlType::Decimal { precision: 12, scale: 2 },
        )
        .unwrap()];
        let mut buf = BytesMut::new();
        encode_row(&columns, &[SqlValue::Double(value)], &mut buf).unwrap();

        let back = decode_row(&columns, &mut buf.freeze()).unwrap();
        prop_assert_eq!(back, vec![SqlValue::Numeric(Numeric::new(i128::from(cents), 2))]);
    }

    #[test]
    fn inferred_string_type_follows_length(len in 0usize..5000) {
        let ty = infer_sql_type(&SqlValue::String("a".repeat(len))).unwrap();
        if len <= 4000 {
            prop_assert_eq!(ty, SqlType::NVarChar(Length::Bounded(4000)));
        } else {
            prop_assert_eq!(ty, SqlType::NVarChar(Length::Max));
        }
    }
}

#[test]
fn null_markers_follow_length_class() {
    let cases = [
        (SqlType::Int, vec![0x00]),
        (SqlType::NVarChar(Length::Bounded(10)), vec![0xFF, 0xFF]),
        (
            SqlType::VarBinary(Length::Max),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
        ),
    ];
    for (sql_type, expected) in cases {
        let columns = [ColumnDescriptor::new("c", sql_type).unwrap()];
        let mut buf = BytesMut::new();
        encode_row(&columns, &[SqlValue::Null], &mut buf).unwrap();
        assert_eq!(&buf[..], expected.as_slice(), "{sql_type}");
    }
}

#[test]
fn wrong_value_count_is_rejected() {
    let columns = [nvarchar(5)];
    let mut buf = BytesMut::new();
    let err = encode_row(&columns, &[], &mut buf).unwrap_err();
    assert!(matches!(
        err,
        Error::ColumnCount {
            expected: 1,
            actual: 0
        }
    ));
    assert!(buf.is_empty());
}

// =============================================================================
// Names
// =============================================================================

proptest! {
    #[test]
    fn bracketed_names_split_back(
        schema in "[A-Za-z0-9_ .\\[]{1,16}",
        name in "[A-Za-z0-9_ .\\[]{1,16}",
    ) {
        let full = format!("{}.{}", quote_identifier(&schema), quote_identifier(&name));
        prop_assert_eq!(get_schema_and_name(&full).unwrap(), (schema, name));
    }

    #[test]
    fn bare_names_split_on_dot(schema in "[A-Za-z_][A-Za-z0-9_]{0,15}", name in "[A-Za-z_][A-Za-z0-9_]{0,15}") {
        let full = format!("{schema}.{name}");
        prop_assert_eq!(get_schema_and_name(&full).unwrap(), (schema, name.clone()));
        prop_assert_eq!(get_schema_and_name(&name).unwrap(), (String::new(), name));
    }

    #[test]
    fn closing_bracket_inside_segment_is_rejected(
        head in "[A-Za-z0-9_]{1,8}",
        tail in "[A-Za-z0-9_]{1,8}",
    ) {
        // quote_identifier doubles `]`, which a TVP type name may not contain
        let quoted = quote_identifier(&format!("{head}]{tail}"));
        prop_assert!(get_schema_and_name(&quoted).is_err());
        let qualified = format!("dbo.{quoted}");
        prop_assert!(get_schema_and_name(&qualified).is_err());
    }
}
