//! Table-valued parameters.
//!
//! A TVP is a typed row set passed as one RPC parameter. Its columns come
//! from the fields of a record type, described by [`TvpRecord`], either
//! written by hand or generated with `#[derive(TvpRecord)]`.
//!
//! ## Field selection
//!
//! Each field may carry tags. The dedicated tag (key `tvp` by default, see
//! [`TvpType::with_tag_key`]) and the general `json` tag decide whether the
//! field becomes a column and under which name:
//!
//! | dedicated tag | `json` tag | result                   |
//! |---------------|------------|--------------------------|
//! | absent        | absent     | kept, field name         |
//! | `"-"`         | any        | skipped                  |
//! | `"name"`      | any        | kept, `name`             |
//! | absent        | `"-"`      | skipped                  |
//! | absent        | `"name"`   | kept, `name`             |
//!
//! Skipping is decided before the field's type is looked at, so a skipped
//! field may have a type with no SQL mapping.
//!
//! ## Example
//!
//! ```rust
//! use mssql_bulk::tvp::{FieldDescriptor, FieldType, TvpRecord, TvpType};
//! use mssql_bulk::{Length, SqlType};
//! use mssql_bulk_types::{SqlValue, ToSql, TypeError};
//!
//! struct Item {
//!     id: i32,
//!     label: String,
//! }
//!
//! impl TvpRecord for Item {
//!     fn type_name() -> &'static str {
//!         "Item"
//!     }
//!
//!     fn fields() -> &'static [FieldDescriptor] {
//!         const FIELDS: &[FieldDescriptor] = &[
//!             FieldDescriptor::new("id", FieldType::Mapped(SqlType::Int)),
//!             FieldDescriptor::new("label", FieldType::Mapped(SqlType::NVarChar(Length::Max)))
//!                 .with_tags(&[("json", "name")]),
//!         ];
//!         FIELDS
//!     }
//!
//!     fn field_value(&self, index: usize) -> Result<SqlValue, TypeError> {
//!         match index {
//!             0 => self.id.to_sql(),
//!             _ => self.label.to_sql(),
//!         }
//!     }
//! }
//!
//! let tvp = TvpType::new("dbo.ItemList", vec![Item { id: 1, label: "one".into() }]);
//! tvp.check().unwrap();
//! let param = tvp.encode_value().unwrap();
//! assert_eq!(param[0], 0xF3);
//! ```

use bytes::{Bytes, BytesMut};
use mssql_bulk_types::{SqlValue, TypeError};
use tds_wire::TvpHeader;
use tds_wire::tvp::{encode_end, encode_row_token};

use crate::error::{Error, Result};
use crate::instrumentation::tvp_encode_span;
use crate::metadata::{ColumnDescriptor, SqlType};
use crate::row::encode_row;

/// Default dedicated tag key.
pub const DEFAULT_TAG_KEY: &str = "tvp";

/// General serialization tag key consulted when the dedicated tag is absent.
pub const JSON_TAG_KEY: &str = "json";

/// Tag value meaning "skip this field".
pub const SKIP_TAG_VALUE: &str = "-";

/// SQL mapping of a record field's host type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// The field maps to this column type.
    Mapped(SqlType),
    /// The host type, named here, has no mapping.
    Unsupported(&'static str),
}

/// One field of a record type, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: &'static str,
    /// SQL mapping of the field's type.
    pub field_type: FieldType,
    /// `(key, value)` tags attached to the field.
    pub tags: &'static [(&'static str, &'static str)],
}

impl FieldDescriptor {
    /// Describe an untagged field.
    #[must_use]
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            tags: &[],
        }
    }

    /// Attach tags.
    #[must_use]
    pub const fn with_tags(mut self, tags: &'static [(&'static str, &'static str)]) -> Self {
        self.tags = tags;
        self
    }

    /// Look up a tag value by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// The column name this field produces, or `None` when it is skipped.
    ///
    /// A non-skip tag value is the column name as written; `json` options
    /// such as `,omitempty` are not stripped.
    #[must_use]
    pub fn column_name(&self, tag_key: &str) -> Option<&'static str> {
        let dedicated = self.tag(tag_key);
        let json = self.tag(JSON_TAG_KEY);
        if is_skip_field(dedicated, json) {
            return None;
        }
        let rename = dedicated.or(json).filter(|name| !name.is_empty());
        Some(rename.unwrap_or(self.name))
    }
}

/// Decide whether a field is skipped from its dedicated and `json` tags.
///
/// A dedicated tag always wins; the `json` tag only matters when the
/// dedicated tag is absent.
#[must_use]
pub fn is_skip_field(dedicated: Option<&str>, json: Option<&str>) -> bool {
    match (dedicated, json) {
        (Some(tag), _) => tag == SKIP_TAG_VALUE,
        (None, Some(tag)) => tag == SKIP_TAG_VALUE,
        (None, None) => false,
    }
}

/// A record type usable as a TVP row.
pub trait TvpRecord {
    /// Type name used in error messages.
    fn type_name() -> &'static str;

    /// All fields, skipped ones included, in declaration order.
    fn fields() -> &'static [FieldDescriptor];

    /// Value of the field at `index` into [`fields`](Self::fields).
    ///
    /// Only called for retained fields.
    fn field_value(&self, index: usize) -> std::result::Result<SqlValue, TypeError>;
}

/// A table-valued parameter: a type name plus rows.
#[derive(Debug, Clone)]
pub struct TvpType<R> {
    name: String,
    rows: Vec<R>,
    tag_key: String,
}

impl<R: TvpRecord> TvpType<R> {
    /// Create a TVP for the user-defined table type `name`.
    pub fn new(name: impl Into<String>, rows: impl Into<Vec<R>>) -> Self {
        Self {
            name: name.into(),
            rows: rows.into(),
            tag_key: DEFAULT_TAG_KEY.to_string(),
        }
    }

    /// Use a different dedicated tag key.
    #[must_use]
    pub fn with_tag_key(mut self, tag_key: impl Into<String>) -> Self {
        self.tag_key = tag_key.into();
        self
    }

    /// The table type name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rows.
    #[must_use]
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// The dedicated tag key in use.
    #[must_use]
    pub fn tag_key(&self) -> &str {
        &self.tag_key
    }

    /// Validate the type name.
    pub fn check(&self) -> Result<()> {
        get_schema_and_name(&self.name).map(|_| ())
    }

    /// Derive the columns from the record type's fields.
    ///
    /// Returns the columns and, for each, the index of the field it came
    /// from. All columns are nullable.
    pub fn column_types(&self) -> Result<(Vec<ColumnDescriptor>, Vec<usize>)> {
        let mut columns = Vec::new();
        let mut indices = Vec::new();

        for (index, field) in R::fields().iter().enumerate() {
            let Some(name) = field.column_name(&self.tag_key) else {
                continue;
            };
            let sql_type = match field.field_type {
                FieldType::Mapped(sql_type) => sql_type,
                FieldType::Unsupported(host) => {
                    return Err(Error::UnsupportedType(format!(
                        "field {}.{} has type {host}",
                        R::type_name(),
                        field.name
                    )));
                }
            };
            columns.push(ColumnDescriptor::new(name, sql_type)?);
            indices.push(index);
        }

        if columns.is_empty() {
            return Err(Error::EmptySchema(R::type_name().to_string()));
        }
        Ok((columns, indices))
    }

    /// Encode the parameter value without the leading 0xF3 type byte.
    pub fn encode(&self, schema: &str, name: &str) -> Result<Bytes> {
        let (columns, indices) = self.column_types()?;
        let _span = tvp_encode_span(name, self.rows.len()).entered();

        let header = TvpHeader::new(
            schema,
            name,
            columns.iter().map(ColumnDescriptor::type_info).collect(),
        );
        let mut buf = BytesMut::new();
        header.encode_without_type_id(&mut buf)?;

        let mut values = Vec::with_capacity(indices.len());
        for row in &self.rows {
            values.clear();
            for (column, &index) in columns.iter().zip(&indices) {
                let value = row
                    .field_value(index)
                    .map_err(|e| Error::encoding(&column.name, e))?;
                values.push(value);
            }
            encode_row_token(&mut buf);
            encode_row(&columns, &values, &mut buf)?;
        }
        encode_end(&mut buf);

        tracing::debug!(rows = self.rows.len(), columns = columns.len(), "encoded TVP");
        Ok(buf.freeze())
    }

    /// Check the name and encode the full parameter value, 0xF3 included.
    pub fn encode_value(&self) -> Result<Bytes> {
        let (schema, name) = get_schema_and_name(&self.name)?;
        let body = self.encode(&schema, &name)?;
        let mut buf = BytesMut::with_capacity(body.len() + 1);
        buf.extend_from_slice(&[tds_wire::tvp::TVP_TYPE_ID]);
        buf.extend_from_slice(&body);
        Ok(buf.freeze())
    }
}

/// Split a TVP type name into `(schema, name)`, removing brackets.
///
/// Accepts `name` or `schema.name`, each part optionally bracketed. A
/// bracketed part ends at its first `]` and has no escape for it, so `[a]]b]`
/// is rejected. The schema is empty when absent.
pub fn get_schema_and_name(full: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidName(full.to_string());

    let (first, rest) = parse_name_part(full).ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok((String::new(), first));
    }
    let rest = rest.strip_prefix('.').ok_or_else(invalid)?;
    let (second, rest) = parse_name_part(rest).ok_or_else(invalid)?;
    if !rest.is_empty() {
        return Err(invalid());
    }
    Ok((first, second))
}

/// Parse one identifier part, returning it and the unparsed rest.
fn parse_name_part(s: &str) -> Option<(String, &str)> {
    let is_forbidden = |c: char| matches!(c, '[' | ']' | '.' | '\n' | '\r');

    let part = if let Some(inner) = s.strip_prefix('[') {
        let mut out = String::new();
        let mut chars = inner.char_indices();
        let end = loop {
            let (i, c) = chars.next()?;
            match c {
                ']' => break i + 1,
                '\n' | '\r' => return None,
                c => out.push(c),
            }
        };
        (out, &inner[end..])
    } else {
        let end = s.find(is_forbidden).unwrap_or(s.len());
        (s[..end].to_string(), &s[end..])
    };

    if part.0.is_empty() {
        return None;
    }
    Some(part)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::metadata::Length;
    use mssql_bulk_types::ToSql;

    #[derive(Debug, Clone)]
    struct Row {
        id: i32,
        name: String,
    }

    impl TvpRecord for Row {
        fn type_name() -> &'static str {
            "Row"
        }

        fn fields() -> &'static [FieldDescriptor] {
            const FIELDS: &[FieldDescriptor] = &[
                FieldDescriptor::new("id", FieldType::Mapped(SqlType::Int)),
                FieldDescriptor::new("name", FieldType::Mapped(SqlType::NVarChar(Length::Max))),
            ];
            FIELDS
        }

        fn field_value(&self, index: usize) -> std::result::Result<SqlValue, TypeError> {
            match index {
                0 => self.id.to_sql(),
                1 => self.name.to_sql(),
                _ => Err(TypeError::OutOfRange {
                    target_type: "field index",
                }),
            }
        }
    }

    /// Every field skipped, one of them with an unmappable type.
    struct AllSkipped;

    impl TvpRecord for AllSkipped {
        fn type_name() -> &'static str {
            "AllSkipped"
        }

        fn fields() -> &'static [FieldDescriptor] {
            const FIELDS: &[FieldDescriptor] = &[
                FieldDescriptor::new("a", FieldType::Mapped(SqlType::Int))
                    .with_tags(&[("tvp", "-")]),
                FieldDescriptor::new("b", FieldType::Unsupported("Vec<*const u8>"))
                    .with_tags(&[("json", "-")]),
            ];
            FIELDS
        }

        fn field_value(&self, _: usize) -> std::result::Result<SqlValue, TypeError> {
            Ok(SqlValue::Null)
        }
    }

    struct NestedField;

    impl TvpRecord for NestedField {
        fn type_name() -> &'static str {
            "NestedField"
        }

        fn fields() -> &'static [FieldDescriptor] {
            const FIELDS: &[FieldDescriptor] = &[
                FieldDescriptor::new("ok", FieldType::Mapped(SqlType::Int)),
                FieldDescriptor::new("nested", FieldType::Unsupported("Inner")),
            ];
            FIELDS
        }

        fn field_value(&self, _: usize) -> std::result::Result<SqlValue, TypeError> {
            Ok(SqlValue::Null)
        }
    }

    #[test]
    fn test_is_skip_field() {
        assert!(!is_skip_field(None, None));
        assert!(!is_skip_field(Some("name"), None));
        assert!(is_skip_field(Some("-"), None));
        assert!(is_skip_field(Some("-"), Some("name")));
        assert!(is_skip_field(Some("-"), Some("-")));
        assert!(!is_skip_field(Some("name"), Some("-")));
        assert!(is_skip_field(None, Some("-")));
        assert!(!is_skip_field(None, Some("name")));
    }

    #[test]
    fn test_column_name_resolution() {
        let field = FieldDescriptor::new("Field", FieldType::Mapped(SqlType::Int));
        assert_eq!(field.column_name("tvp"), Some("Field"));

        let json = field.with_tags(&[("json", "renamed")]);
        assert_eq!(json.column_name("tvp"), Some("renamed"));

        let with_options = field.with_tags(&[("json", "renamed,omitempty")]);
        assert_eq!(with_options.column_name("tvp"), Some("renamed,omitempty"));

        let both = field.with_tags(&[("json", "-"), ("tvp", "kept")]);
        assert_eq!(both.column_name("tvp"), Some("kept"));

        let unrelated = field.with_tags(&[("echo", "-")]);
        assert_eq!(unrelated.column_name("tvp"), Some("Field"));

        let custom = field.with_tags(&[("custom", "-"), ("tvp", "x")]);
        assert_eq!(custom.column_name("custom"), None);
        assert_eq!(custom.column_name("tvp"), Some("x"));
    }

    #[test]
    fn test_check_names() {
        for good in ["Test", "[Test]", "[123].[Test]", "[123].Test", "123.[Test]", "obj.tvp"] {
            let tvp = TvpType::<Row>::new(good, Vec::new());
            assert!(tvp.check().is_ok(), "{good:?} should be accepted");
        }
        for bad in [
            "",
            "123.[Test\n]",
            "123.[Test].456",
            "1.2.3",
            "[Test",
            "a..b",
            ".a",
            "a.",
            "[a]]b]",
            "[dbo].[a]]b]",
            "[a]b",
        ] {
            let tvp = TvpType::<Row>::new(bad, Vec::new());
            assert!(
                matches!(tvp.check(), Err(Error::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_get_schema_and_name() {
        let split = |s: &str| get_schema_and_name(s).unwrap();
        assert_eq!(split("obj.tvp"), ("obj".into(), "tvp".into()));
        assert_eq!(split("[obj].[tvp]"), ("obj".into(), "tvp".into()));
        assert_eq!(split("tvp"), (String::new(), "tvp".into()));
        assert_eq!(split("[tvp]"), (String::new(), "tvp".into()));
        assert_eq!(split("[a b].[c.d]"), ("a b".into(), "c.d".into()));
        assert!(get_schema_and_name("").is_err());
        assert!(get_schema_and_name("1.2.3").is_err());
    }

    #[test]
    fn test_column_types_skip_before_type() {
        let tvp = TvpType::new("t", Vec::<AllSkipped>::new());
        assert!(matches!(tvp.column_types(), Err(Error::EmptySchema(name)) if name == "AllSkipped"));

        let tvp = TvpType::new("t", Vec::<NestedField>::new());
        assert!(matches!(tvp.column_types(), Err(Error::UnsupportedType(_))));
        assert!(matches!(tvp.encode("", "t"), Err(Error::UnsupportedType(_))));
    }

    #[test]
    fn test_column_types() {
        let tvp = TvpType::new("t", Vec::<Row>::new());
        let (columns, indices) = tvp.column_types().unwrap();
        assert_eq!(indices, [0, 1]);
        assert_eq!(columns[0].name, "id");
        assert!(columns.iter().all(|c| c.nullable));
    }

    #[test]
    fn test_encode_empty_table() {
        let tvp = TvpType::new("dbo.Rows", Vec::<Row>::new());
        let bytes = tvp.encode("dbo", "Rows").unwrap();

        let mut expected = vec![0u8]; // db name
        expected.push(3);
        expected.extend_from_slice(&[b'd', 0, b'b', 0, b'o', 0]);
        expected.push(4);
        expected.extend_from_slice(&[b'R', 0, b'o', 0, b'w', 0, b's', 0]);
        expected.extend_from_slice(&[2, 0]); // column count
        // id: user type, flags (nullable), INTN(4), empty name
        expected.extend_from_slice(&[0, 0, 0, 0, 0x01, 0x00, 0x26, 4, 0]);
        // name: NVARCHAR(max) with default collation, empty name
        expected.extend_from_slice(&[0, 0, 0, 0, 0x01, 0x00, 0xE7, 0xFF, 0xFF]);
        expected.extend_from_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34, 0]);
        expected.push(0x00); // end of metadata
        expected.push(0x00); // end of rows
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_encode_rows() {
        let rows = vec![
            Row {
                id: 1,
                name: "a".into(),
            },
            Row {
                id: 2,
                name: "b".into(),
            },
        ];
        let tvp = TvpType::new("Rows", rows);
        let bytes = tvp.encode_value().unwrap();
        assert_eq!(bytes[0], 0xF3);

        let header_len = TvpType::new("Rows", Vec::<Row>::new()).encode_value().unwrap().len() - 1;
        let rows = &bytes[header_len..];
        // 0x01, INTN 4 bytes, PLP "a", 0x01, ..., 0x00
        let row_len = 1 + 5 + (8 + 4 + 2 + 4);
        assert_eq!(rows.len(), 2 * row_len + 1);
        assert_eq!(rows[0], 0x01);
        assert_eq!(&rows[1..6], &[4, 1, 0, 0, 0]);
        assert_eq!(rows[row_len], 0x01);
        assert_eq!(rows[rows.len() - 1], 0x00);
    }

    #[test]
    fn test_custom_tag_key() {
        struct Tagged;
        impl TvpRecord for Tagged {
            fn type_name() -> &'static str {
                "Tagged"
            }
            fn fields() -> &'static [FieldDescriptor] {
                const FIELDS: &[FieldDescriptor] = &[
                    FieldDescriptor::new("a", FieldType::Mapped(SqlType::Int))
                        .with_tags(&[("custom", "-")]),
                    FieldDescriptor::new("b", FieldType::Mapped(SqlType::Int)),
                ];
                FIELDS
            }
            fn field_value(&self, _: usize) -> std::result::Result<SqlValue, TypeError> {
                Ok(SqlValue::Int(1))
            }
        }

        let default = TvpType::new("t", Vec::<Tagged>::new());
        assert_eq!(default.column_types().unwrap().1, [0, 1]);
        let custom = TvpType::new("t", Vec::<Tagged>::new()).with_tag_key("custom");
        assert_eq!(custom.tag_key(), "custom");
        assert_eq!(custom.column_types().unwrap().1, [1]);
    }
}
