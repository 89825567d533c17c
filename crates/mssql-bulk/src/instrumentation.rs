//! Tracing span names and attributes.
//!
//! Span and attribute names follow the OpenTelemetry database semantic
//! conventions so that a subscriber exporting to OpenTelemetry picks them up
//! without mapping. No subscriber is installed here.

use tracing::Span;

/// Database system identifier for MSSQL.
pub const DB_SYSTEM: &str = "mssql";

/// Span names for bulk operations.
pub mod span_names {
    /// Span covering a whole bulk copy session.
    pub const BULK_INSERT: &str = "mssql.bulk_insert";
    /// Span covering a TVP encode.
    pub const TVP_ENCODE: &str = "mssql.tvp_encode";
}

/// Attribute names for bulk operations.
pub mod attributes {
    /// Database system.
    pub const DB_SYSTEM: &str = "db.system";
    /// Target table.
    pub const DB_SQL_TABLE: &str = "db.sql.table";
    /// Operation name.
    pub const DB_OPERATION: &str = "db.operation";
    /// Rows written.
    pub const DB_ROWS_AFFECTED: &str = "db.rows_affected";
}

/// Open the span for a bulk copy into `table`.
pub fn bulk_insert_span(table: &str) -> Span {
    tracing::info_span!(
        "mssql.bulk_insert",
        db.system = DB_SYSTEM,
        db.sql.table = table,
        db.operation = "INSERT BULK",
        db.rows_affected = tracing::field::Empty,
    )
}

/// Open the span for encoding a TVP of type `type_name`.
pub fn tvp_encode_span(type_name: &str, rows: usize) -> Span {
    tracing::debug_span!(
        "mssql.tvp_encode",
        db.system = DB_SYSTEM,
        tvp.type_name = type_name,
        tvp.rows = rows,
    )
}
