//! # mssql-bulk
//!
//! Bulk copy and table-valued parameter encoding for SQL Server.
//!
//! This crate turns typed rows into the TDS byte streams SQL Server expects
//! for `INSERT BULK` and for table-valued parameters, and drives the
//! bulk-load exchange over any [`BulkTransport`].
//!
//! ## Features
//!
//! - **Type metadata**: [`SqlType`] and [`ColumnDescriptor`] describe each
//!   column's wire layout; declared types are parsed from T-SQL strings
//!   and undeclared ones inferred from the first row
//! - **Row encoding**: [`encode_row`] writes one row's column data with the
//!   right NULL markers, coercing values to the column type
//! - **Bulk copy**: [`BulkSession`] runs `INSERT BULK` with bounded
//!   buffering, cancellation and an explicit state machine
//! - **Table-valued parameters**: [`TvpType`] derives columns from a record
//!   type's fields and encodes the parameter value
//!
//! ## Feature flags
//!
//! - `uuid`, `decimal`, `encoding` (default): forwarded to `mssql-bulk-types`
//! - `derive`: `#[derive(TvpRecord)]`
//!
//! ## Coercions
//!
//! The column, not the value, decides the wire layout:
//!
//! | Column | Accepted values |
//! |--------|-----------------|
//! | integer types | any integer in range, `bool` |
//! | `bit` | `bool`, integers `0`/`1` |
//! | `real`/`float` | floats, integers, `Numeric` |
//! | `decimal(p, s)` | `Numeric` (exact), `Money`, integers, floats (rounded to `s`) |
//! | `money`/`smallmoney` | `Money`, `Numeric` (exact), integers as amounts scaled by 10,000, floats |
//! | character types | `String`, XML text |
//! | binary types | bytes, `Guid` |
//! | `uniqueidentifier` | `Guid`, 16 bytes in RFC order |
//! | date/time types | any date-time value; offsets are dropped for naive types |
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_bulk::{BulkColumn, BulkInsertBuilder, BulkOptions};
//!
//! let mut bulk = BulkInsertBuilder::new("dbo.Events")
//!     .with_typed_columns(vec![
//!         BulkColumn::new("id", "bigint")?.with_nullable(false),
//!         BulkColumn::new("payload", "nvarchar(max)")?,
//!     ])
//!     .with_options(BulkOptions::new().table_lock(true).rows_per_batch(10_000))
//!     .build(&mut conn)?;
//!
//! for event in events {
//!     bulk.send_row(&[&event.id, &event.payload]).await?;
//! }
//! let result = bulk.finish().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bulk;
pub mod config;
pub mod error;
pub mod instrumentation;
pub mod metadata;
pub mod row;
pub mod state;
pub mod transport;
pub mod tvp;

// Re-export commonly used types
pub use bulk::{BulkColumn, BulkInsertBuilder, BulkResult, BulkSession, build_insert_bulk_statement};
pub use config::{BulkOptions, SessionConfig, SortOrder};
pub use error::{Error, Result};
pub use metadata::{
    ColumnDescriptor, Length, SqlType, infer_sql_type, parse_sql_type, quote_identifier,
    quote_table_name,
};
pub use mssql_bulk_types::{Guid, Money, Numeric, SqlValue, ToSql, TypeError};
pub use row::{decode_row, encode_row};
pub use state::SessionState;
pub use transport::{BulkTransport, Completion, read_completion};
pub use tvp::{FieldDescriptor, FieldType, TvpRecord, TvpType, get_schema_and_name, is_skip_field};

#[cfg(feature = "derive")]
pub use mssql_bulk_derive::TvpRecord;
