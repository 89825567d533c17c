//! Bulk copy sessions.
//!
//! A session streams rows into one table over the TDS bulk-load path
//! (packet type 0x07). The exchange is:
//!
//! 1. `INSERT BULK [table] ([col] type, ...) WITH (...)` as a SQL batch,
//!    acknowledged by a DONE.
//! 2. One BULK_LOAD message: COLMETADATA, one ROW token per row, DONE.
//! 3. The server's reply, whose DONE carries the affected-row count.
//!
//! Rows are buffered and pushed to the transport as whole packets once the
//! buffer passes the flush threshold, so memory stays bounded however many
//! rows are sent. Only the last packet carries END_OF_MESSAGE.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mssql_bulk::{BulkColumn, BulkInsertBuilder, SessionConfig};
//!
//! let mut conn = SessionConfig::new().packet_size(8000).connect(stream);
//!
//! let mut bulk = BulkInsertBuilder::new("dbo.Users")
//!     .with_typed_columns(vec![
//!         BulkColumn::new("id", "int")?.with_nullable(false),
//!         BulkColumn::new("name", "nvarchar(100)")?,
//!     ])
//!     .table_lock(true)
//!     .build(&mut conn)?;
//!
//! for user in &users {
//!     bulk.send_row(&[&user.id, &user.name]).await?;
//! }
//!
//! let result = bulk.finish().await?;
//! println!("inserted {} rows", result.rows_affected);
//! ```
//!
//! ## Failure
//!
//! Any error from a row write or from the transport leaves the session
//! [`Failed`](SessionState::Failed). If the row stream was already open the
//! session sends an attention signal so the connection is usable again.
//! Rows already sent are not retried; restart the transfer with a new
//! session. A session dropped mid-stream leaves its connection in the
//! middle of a request.

use bytes::{BufMut, BytesMut};
use mssql_bulk_types::{SqlValue, ToSql};
use tds_wire::{ColMetaData, Collation, Done, PacketType, TokenType, encode_sql_batch};
use tracing::Instrument;

use crate::config::{BulkOptions, SessionConfig};
use crate::error::{Error, Result};
use crate::instrumentation::{attributes, bulk_insert_span};
use crate::metadata::{
    ColumnDescriptor, SqlType, infer_sql_type, parse_sql_type, quote_identifier, quote_table_name,
};
use crate::row::encode_row;
use crate::state::SessionState;
use crate::transport::{BulkTransport, read_completion};

/// Column definition for bulk insert.
///
/// A column either declares its type up front or leaves it to be
/// inferred from the first row's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkColumn {
    /// Column name.
    pub name: String,
    /// Declared type, `None` to infer from the first row.
    pub sql_type: Option<SqlType>,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Collation for narrow character data.
    pub collation: Collation,
}

impl BulkColumn {
    /// Create a column from a declared SQL type such as `"nvarchar(100)"`.
    pub fn new(name: impl Into<String>, sql_type: &str) -> Result<Self> {
        Ok(Self::typed(name, parse_sql_type(sql_type)?))
    }

    /// Create a column with an already-parsed type.
    pub fn typed(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type: Some(sql_type),
            nullable: true,
            collation: Collation::DEFAULT,
        }
    }

    /// Create a column whose type is inferred from the first row.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: None,
            nullable: true,
            collation: Collation::DEFAULT,
        }
    }

    /// Set whether this column allows NULL values.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the collation for narrow character data.
    #[must_use]
    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = collation;
        self
    }

    /// Whether the type is known without seeing a row.
    #[must_use]
    pub fn is_declared(&self) -> bool {
        self.sql_type.is_some()
    }

    fn resolve(&self, first: Option<&SqlValue>) -> Result<ColumnDescriptor> {
        let sql_type = match (self.sql_type, first) {
            (Some(sql_type), _) => sql_type,
            (None, Some(value)) => infer_sql_type(value).map_err(|e| match e {
                Error::UnsupportedType(why) => {
                    Error::UnsupportedType(format!("column {}: {why}", self.name))
                }
                other => other,
            })?,
            (None, None) => {
                return Err(Error::UnsupportedType(format!(
                    "column {} has no declared type",
                    self.name
                )));
            }
        };
        Ok(ColumnDescriptor::new(self.name.clone(), sql_type)?
            .with_nullable(self.nullable)
            .with_collation(self.collation))
    }
}

/// Result of a bulk insert operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkResult {
    /// Rows the server reports as inserted.
    pub rows_affected: u64,
    /// Rows written by this session.
    pub rows_sent: u64,
}

/// Builder for configuring a bulk insert operation.
#[derive(Debug, Clone)]
pub struct BulkInsertBuilder {
    table_name: String,
    columns: Vec<BulkColumn>,
    options: BulkOptions,
    config: SessionConfig,
}

impl BulkInsertBuilder {
    /// Create a new bulk insert builder for the specified table.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            options: BulkOptions::default(),
            config: SessionConfig::default(),
        }
    }

    /// Name the columns; their types are inferred from the first row.
    #[must_use]
    pub fn with_columns(mut self, column_names: &[&str]) -> Self {
        self.columns = column_names.iter().map(|name| BulkColumn::named(*name)).collect();
        self
    }

    /// Specify columns with full type information.
    #[must_use]
    pub fn with_typed_columns(mut self, columns: Vec<BulkColumn>) -> Self {
        self.columns = columns;
        self
    }

    /// Append one column.
    #[must_use]
    pub fn column(mut self, column: BulkColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Set bulk insert options.
    #[must_use]
    pub fn with_options(mut self, options: BulkOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the client-side framing configuration.
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable table lock.
    #[must_use]
    pub fn table_lock(mut self, enabled: bool) -> Self {
        self.options = self.options.table_lock(enabled);
        self
    }

    /// Enable or disable trigger firing.
    #[must_use]
    pub fn fire_triggers(mut self, enabled: bool) -> Self {
        self.options = self.options.fire_triggers(enabled);
        self
    }

    /// Get the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Get the columns.
    pub fn columns(&self) -> &[BulkColumn] {
        &self.columns
    }

    /// Get the options.
    pub fn options(&self) -> &BulkOptions {
        &self.options
    }

    /// Start a session on `transport`.
    ///
    /// Nothing is sent until the first row or [`BulkSession::finish`].
    pub fn build<T: BulkTransport>(self, transport: T) -> Result<BulkSession<T>> {
        if self.table_name.trim().is_empty() {
            return Err(Error::Config("bulk insert needs a table name".into()));
        }
        if self.columns.is_empty() {
            return Err(Error::Config(format!(
                "bulk insert into {} needs at least one column",
                self.table_name
            )));
        }

        let flush_threshold = self
            .config
            .effective_flush_threshold()
            .max(transport.packet_size());
        let span = bulk_insert_span(&self.table_name);

        Ok(BulkSession {
            transport,
            table_name: self.table_name,
            columns: self.columns,
            descriptors: Vec::new(),
            options: self.options,
            flush_threshold,
            buffer: BytesMut::with_capacity(flush_threshold),
            state: SessionState::Init,
            stream_open: false,
            aborted: false,
            rows_sent: 0,
            span,
        })
    }
}

/// Render the `INSERT BULK` statement for resolved columns.
pub fn build_insert_bulk_statement(
    table_name: &str,
    columns: &[ColumnDescriptor],
    options: &BulkOptions,
) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.sql_declaration()))
        .collect();
    format!(
        "INSERT BULK {} ({}){}",
        quote_table_name(table_name),
        cols.join(", "),
        options.with_clause()
    )
}

/// Active bulk insert operation.
///
/// Call [`send_row`](Self::send_row) for each row, then
/// [`finish`](Self::finish). Operations must not run concurrently; the
/// session holds its transport exclusively.
pub struct BulkSession<T> {
    transport: T,
    table_name: String,
    columns: Vec<BulkColumn>,
    /// Resolved on open, fixed for the transfer.
    descriptors: Vec<ColumnDescriptor>,
    options: BulkOptions,
    flush_threshold: usize,
    buffer: BytesMut,
    state: SessionState,
    /// The server is waiting for (the rest of) the bulk-load message.
    stream_open: bool,
    aborted: bool,
    rows_sent: u64,
    span: tracing::Span,
}

impl<T> std::fmt::Debug for BulkSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkSession")
            .field("table_name", &self.table_name)
            .field("state", &self.state)
            .field("rows_sent", &self.rows_sent)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<T: BulkTransport> BulkSession<T> {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Rows written so far.
    #[must_use]
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    /// Target table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Resolved column descriptors; empty until the first row.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    /// Bytes buffered and not yet handed to the transport.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Release the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send one row of values convertible with [`ToSql`].
    pub async fn send_row(&mut self, values: &[&dyn ToSql]) -> Result<()> {
        self.ensure_usable()?;
        let converted = values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                value.to_sql().map_err(|e| {
                    let name = self.columns.get(i).map_or("?", |c| c.name.as_str());
                    Error::encoding(name, e)
                })
            })
            .collect::<Result<Vec<_>>>();
        match converted {
            Ok(row) => self.send_row_values(&row).await,
            Err(e) => self.settle(Err(e)).await,
        }
    }

    /// Send one row of already-converted values.
    pub async fn send_row_values(&mut self, values: &[SqlValue]) -> Result<()> {
        self.ensure_usable()?;
        let span = self.span.clone();
        let result = self.write_row(values).instrument(span).await;
        self.settle(result).await
    }

    /// End the row stream and read the server's row count.
    ///
    /// With no rows sent and some column types left to inference nothing
    /// is sent and the result is zero rows.
    pub async fn finish(&mut self) -> Result<BulkResult> {
        self.ensure_usable()?;
        let span = self.span.clone();
        let result = self.complete().instrument(span).await;
        self.settle(result).await
    }

    /// Abandon the transfer.
    ///
    /// If the row stream is open an attention signal is sent and the reply
    /// drained up to its acknowledgement. The session ends `Failed`.
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let span = self.span.clone();
        self.cancel_stream().instrument(span).await
    }

    async fn cancel_stream(&mut self) -> Result<()> {
        self.aborted = true;
        self.state.transition(SessionState::Failed)?;
        if !self.stream_open {
            tracing::debug!("bulk insert aborted before the row stream opened");
            return Ok(());
        }
        self.stream_open = false;
        self.buffer.clear();
        tracing::warn!(rows_sent = self.rows_sent, "aborting bulk insert");
        self.transport.cancel().await?;
        Ok(())
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.aborted {
            return Err(Error::Cancelled);
        }
        self.state.ensure_active()
    }

    async fn write_row(&mut self, values: &[SqlValue]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::ColumnCount {
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        if self.state == SessionState::Init {
            self.open(Some(values)).await?;
        }

        let start = self.buffer.len();
        self.buffer.put_u8(TokenType::Row as u8);
        if let Err(e) = encode_row(&self.descriptors, values, &mut self.buffer) {
            self.buffer.truncate(start);
            return Err(e);
        }
        self.rows_sent += 1;
        self.state.transition(SessionState::Streaming)?;

        if self.buffer.len() >= self.flush_threshold {
            let sent = self
                .transport
                .send_partial(PacketType::BulkLoad, &mut self.buffer)
                .await?;
            tracing::trace!(bytes = sent, rows_sent = self.rows_sent, "flushed bulk rows");
        }
        Ok(())
    }

    /// Resolve columns, send `INSERT BULK` and buffer COLMETADATA.
    async fn open(&mut self, first: Option<&[SqlValue]>) -> Result<()> {
        let descriptors = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| column.resolve(first.and_then(|row| row.get(i))))
            .collect::<Result<Vec<_>>>()?;

        let sql = build_insert_bulk_statement(&self.table_name, &descriptors, &self.options);
        tracing::debug!(sql = %sql, "sending INSERT BULK");
        self.transport
            .send_message(PacketType::SqlBatch, encode_sql_batch(&sql))
            .await?;
        read_completion(&mut self.transport).await?;
        self.stream_open = true;

        let metadata = ColMetaData {
            columns: descriptors.iter().map(ColumnDescriptor::to_column_data).collect(),
        };
        metadata.encode(&mut self.buffer)?;
        self.descriptors = descriptors;
        self.state.transition(SessionState::MetadataSent)?;
        tracing::debug!(columns = self.descriptors.len(), "column metadata sent");
        Ok(())
    }

    async fn complete(&mut self) -> Result<BulkResult> {
        if self.state == SessionState::Init {
            if !self.columns.iter().all(BulkColumn::is_declared) {
                self.state.transition(SessionState::Completed)?;
                tracing::debug!("no rows and undeclared column types, nothing sent");
                return Ok(BulkResult::default());
            }
            self.open(None).await?;
        }

        Done::default().encode(&mut self.buffer);
        self.transport
            .finish_message(PacketType::BulkLoad, &mut self.buffer)
            .await?;
        self.stream_open = false;

        let completion = read_completion(&mut self.transport).await?;
        let rows_affected = completion.rows_affected.unwrap_or(0);
        self.state.transition(SessionState::Completed)?;
        self.span.record(attributes::DB_ROWS_AFFECTED, rows_affected);
        if rows_affected != self.rows_sent {
            tracing::warn!(
                rows_affected,
                rows_sent = self.rows_sent,
                "server row count differs from rows sent"
            );
        }
        tracing::debug!(rows_affected, "bulk insert completed");

        Ok(BulkResult {
            rows_affected,
            rows_sent: self.rows_sent,
        })
    }

    /// Move to `Failed` on error, cancelling an open row stream.
    async fn settle<R>(&mut self, result: Result<R>) -> Result<R> {
        if result.is_err() && !self.state.is_terminal() {
            let _ = self.state.transition(SessionState::Failed);
            self.buffer.clear();
            if self.stream_open {
                self.stream_open = false;
                if let Err(e) = self.transport.cancel().await {
                    tracing::warn!(error = %e, "failed to cancel bulk insert");
                }
            }
        }
        result
    }
}
