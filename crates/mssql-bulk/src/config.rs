//! Bulk copy configuration.
//!
//! [`BulkOptions`] are server-side hints rendered into the `WITH (...)`
//! clause of the `INSERT BULK` statement. [`SessionConfig`] controls how the
//! client frames the row stream.

use std::fmt::Write as _;

use mssql_bulk_codec::Connection;
use tds_wire::packet::{DEFAULT_PACKET_SIZE, MIN_PACKET_SIZE};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::metadata::quote_identifier;

/// Largest packet size a bulk session negotiates.
pub const MAX_BULK_PACKET_SIZE: usize = 32767;

/// Default number of buffered row bytes before packets are pushed.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Sort direction of an `ORDER` hint column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Options controlling bulk insert behavior.
///
/// These map to the server's bulk load hints and affect logging, locking
/// and constraint checking. None of them change the row encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOptions {
    /// Check constraints during insert.
    ///
    /// Default: false, matching the server's own bulk load default.
    pub check_constraints: bool,

    /// Fire INSERT triggers on the table.
    ///
    /// Default: false
    pub fire_triggers: bool,

    /// Keep NULL values instead of using column defaults.
    ///
    /// Default: false
    pub keep_nulls: bool,

    /// Acquire a table-level lock for the duration of the bulk operation.
    ///
    /// Default: false
    pub table_lock: bool,

    /// Estimated number of rows, passed as `ROWS_PER_BATCH`.
    pub rows_per_batch: Option<u32>,

    /// Approximate batch size in kilobytes, passed as `KILOBYTES_PER_BATCH`.
    pub kilobytes_per_batch: Option<u32>,

    /// Columns the incoming rows are already sorted by.
    ///
    /// Lets the server skip a sort when the order matches the clustered
    /// index.
    pub order_hints: Vec<(String, SortOrder)>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            check_constraints: false,
            fire_triggers: false,
            keep_nulls: false,
            table_lock: false,
            rows_per_batch: None,
            kilobytes_per_batch: None,
            order_hints: Vec::new(),
        }
    }
}

impl BulkOptions {
    /// Create options with server defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable constraint checking.
    #[must_use]
    pub fn check_constraints(mut self, enabled: bool) -> Self {
        self.check_constraints = enabled;
        self
    }

    /// Enable or disable trigger firing.
    #[must_use]
    pub fn fire_triggers(mut self, enabled: bool) -> Self {
        self.fire_triggers = enabled;
        self
    }

    /// Keep NULLs rather than applying column defaults.
    #[must_use]
    pub fn keep_nulls(mut self, enabled: bool) -> Self {
        self.keep_nulls = enabled;
        self
    }

    /// Enable or disable table lock.
    #[must_use]
    pub fn table_lock(mut self, enabled: bool) -> Self {
        self.table_lock = enabled;
        self
    }

    /// Set the `ROWS_PER_BATCH` hint.
    #[must_use]
    pub fn rows_per_batch(mut self, rows: u32) -> Self {
        self.rows_per_batch = Some(rows);
        self
    }

    /// Set the `KILOBYTES_PER_BATCH` hint.
    #[must_use]
    pub fn kilobytes_per_batch(mut self, kilobytes: u32) -> Self {
        self.kilobytes_per_batch = Some(kilobytes);
        self
    }

    /// Append a column to the `ORDER` hint.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_hints.push((column.into(), order));
        self
    }

    /// Render the hints as a ` WITH (...)` clause, or an empty string.
    pub fn with_clause(&self) -> String {
        let mut hints: Vec<String> = Vec::new();

        if self.check_constraints {
            hints.push("CHECK_CONSTRAINTS".to_string());
        }
        if self.fire_triggers {
            hints.push("FIRE_TRIGGERS".to_string());
        }
        if self.keep_nulls {
            hints.push("KEEP_NULLS".to_string());
        }
        if self.table_lock {
            hints.push("TABLOCK".to_string());
        }
        if let Some(rows) = self.rows_per_batch {
            hints.push(format!("ROWS_PER_BATCH = {rows}"));
        }
        if let Some(kb) = self.kilobytes_per_batch {
            hints.push(format!("KILOBYTES_PER_BATCH = {kb}"));
        }
        if !self.order_hints.is_empty() {
            let mut order = String::from("ORDER(");
            for (i, (column, direction)) in self.order_hints.iter().enumerate() {
                if i > 0 {
                    order.push_str(", ");
                }
                let _ = write!(order, "{} {}", quote_identifier(column), direction.as_sql());
            }
            order.push(')');
            hints.push(order);
        }

        if hints.is_empty() {
            String::new()
        } else {
            format!(" WITH ({})", hints.join(", "))
        }
    }
}

/// Client-side framing of a bulk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Negotiated packet size.
    pub packet_size: usize,
    /// Buffered row bytes that trigger pushing whole packets.
    pub flush_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl SessionConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the packet size, clamped to the supported range.
    #[must_use]
    pub fn packet_size(mut self, size: usize) -> Self {
        self.packet_size = size.clamp(MIN_PACKET_SIZE, MAX_BULK_PACKET_SIZE);
        self
    }

    /// Set the flush threshold. It never drops below one packet.
    #[must_use]
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    /// The threshold actually used, at least one packet.
    pub(crate) fn effective_flush_threshold(&self) -> usize {
        self.flush_threshold.max(self.packet_size)
    }

    /// Wrap a stream in a [`Connection`] framing packets at this size.
    pub fn connect<T>(&self, io: T) -> Connection<T>
    where
        T: AsyncRead + AsyncWrite,
    {
        Connection::with_packet_size(io, self.packet_size)
    }
}
