//! Mock bulk-load endpoint.
//!
//! Speaks the subset of TDS a bulk copy session uses: SQL batches (the
//! `INSERT BULK` statement), BULK_LOAD messages, and attention. Every
//! accepted load is decoded back into rows with the same column
//! descriptors the client sent, so tests can compare values end to end.
//!
//! There is no login handshake; connect a session's transport straight to
//! the server with [`MockBulkServer::duplex`] or [`MockBulkServer::connect`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_bulk::{BulkColumn, BulkInsertBuilder, SessionConfig};
//! use mssql_bulk_testing::MockBulkServer;
//!
//! #[tokio::test]
//! async fn test_load() {
//!     let server = MockBulkServer::builder().build().await.unwrap();
//!     let mut conn = SessionConfig::new().connect(server.duplex());
//!
//!     let mut bulk = BulkInsertBuilder::new("t")
//!         .with_typed_columns(vec![BulkColumn::new("id", "int").unwrap()])
//!         .build(&mut conn)
//!         .unwrap();
//!     bulk.send_row(&[&1i32]).await.unwrap();
//!     assert_eq!(bulk.finish().await.unwrap().rows_affected, 1);
//!     assert_eq!(server.row_count("[t]").await, 1);
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use mssql_bulk::{ColumnDescriptor, SqlValue, decode_row};
use mssql_bulk_codec::{CodecError, MessageAssembler, Packet, PacketStream};
use tds_wire::{
    ColMetaData, Done, DoneStatus, PacketHeader, PacketStatus, PacketType, ProtocolError,
    ServerError, TokenType, decode_sql_batch,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

/// Capacity of the in-process pipe returned by [`MockBulkServer::duplex`].
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet framing error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Malformed token stream.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Column metadata or row data the decoder rejected.
    #[error("bulk data error: {0}")]
    Bulk(#[from] mssql_bulk::Error),

    /// Unexpected request.
    #[error("unexpected request: {0}")]
    Unexpected(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// An error the server reports instead of succeeding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError {
    /// Error number.
    pub number: i32,
    /// Severity class.
    pub class: u8,
    /// Error message.
    pub message: String,
}

impl MockError {
    /// Create a severity 16 error.
    pub fn new(number: i32, message: impl Into<String>) -> Self {
        Self {
            number,
            class: 16,
            message: message.into(),
        }
    }

    fn to_server_error(&self, server_name: &str) -> ServerError {
        ServerError {
            number: self.number,
            state: 1,
            class: self.class,
            message: self.message.clone(),
            server: server_name.to_string(),
            procedure: String::new(),
            line: 1,
        }
    }
}

/// Mock server configuration.
#[derive(Debug, Clone, Default)]
pub struct MockServerConfig {
    /// Server name put in ERROR tokens.
    pub server_name: String,
    /// Reject every SQL batch with this error.
    pub statement_error: Option<MockError>,
    /// Reject every bulk load with this error after reading it.
    pub load_error: Option<MockError>,
    /// Row count to report instead of the number of rows received.
    pub reported_rows: Option<u64>,
}

/// Builder for creating a mock server.
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                server_name: "MockBulkServer".into(),
                ..Default::default()
            },
        }
    }

    /// Set the server name.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Fail every `INSERT BULK` statement.
    pub fn reject_statements(mut self, error: MockError) -> Self {
        self.config.statement_error = Some(error);
        self
    }

    /// Fail every bulk load once its data has arrived.
    pub fn reject_loads(mut self, error: MockError) -> Self {
        self.config.load_error = Some(error);
        self
    }

    /// Report `rows` affected regardless of what was received.
    pub fn report_rows(mut self, rows: u64) -> Self {
        self.config.reported_rows = Some(rows);
        self
    }

    /// Build and start the server.
    pub async fn build(self) -> Result<MockBulkServer> {
        MockBulkServer::start(self.config).await
    }
}

/// One bulk load the server accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoad {
    /// Table as written in the statement, quoting included.
    pub table: String,
    /// The `INSERT BULK` statement.
    pub statement: String,
    /// Columns decoded from COLMETADATA.
    pub columns: Vec<ColumnDescriptor>,
    /// Decoded rows.
    pub rows: Vec<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
struct Recorded {
    statements: Vec<String>,
    loads: Vec<BulkLoad>,
    attentions: usize,
}

/// Shared per-server state handed to each connection.
#[derive(Clone)]
struct Shared {
    config: Arc<MockServerConfig>,
    recorded: Arc<Mutex<Recorded>>,
    connection_count: Arc<AtomicUsize>,
}

/// Mock SQL Server bulk-load endpoint.
pub struct MockBulkServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    shared: Shared,
}

impl MockBulkServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let shared = Shared {
            config: Arc::new(config),
            recorded: Arc::new(Mutex::new(Recorded::default())),
            connection_count: Arc::new(AtomicUsize::new(0)),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => accept_shared.spawn_connection(stream),
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shutdown_tx,
            shared,
        })
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Open a TCP connection to the server.
    pub async fn connect(&self) -> Result<TcpStream> {
        Ok(TcpStream::connect(self.addr).await?)
    }

    /// Open an in-process connection to the server.
    pub fn duplex(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        self.shared.spawn_connection(server);
        client
    }

    /// Number of connections being served.
    pub fn connection_count(&self) -> usize {
        self.shared.connection_count.load(Ordering::Acquire)
    }

    /// SQL batches received, in order.
    pub async fn statements(&self) -> Vec<String> {
        self.shared.recorded.lock().await.statements.clone()
    }

    /// Bulk loads accepted, in order.
    pub async fn loads(&self) -> Vec<BulkLoad> {
        self.shared.recorded.lock().await.loads.clone()
    }

    /// Rows accepted into `table`, as written in the statement.
    pub async fn row_count(&self, table: &str) -> usize {
        self.shared
            .recorded
            .lock()
            .await
            .loads
            .iter()
            .filter(|load| load.table == table)
            .map(|load| load.rows.len())
            .sum()
    }

    /// Attention signals received.
    pub async fn attention_count(&self) -> usize {
        self.shared.recorded.lock().await.attentions
    }

    /// Forget everything recorded so far.
    pub async fn reset(&self) {
        *self.shared.recorded.lock().await = Recorded::default();
    }

    /// Stop accepting TCP connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockBulkServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MockBulkServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBulkServer")
            .field("addr", &self.addr)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn spawn_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let shared = self.clone();
        tokio::spawn(async move {
            shared.connection_count.fetch_add(1, Ordering::AcqRel);
            if let Err(e) = handle_connection(stream, &shared).await {
                tracing::debug!("Connection error: {}", e);
            }
            shared.connection_count.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

/// Serve one client until it disconnects.
async fn handle_connection<S>(stream: S, shared: &Shared) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = &shared.config;
    let mut packets = PacketStream::new(stream);
    let mut assembler = MessageAssembler::new();
    // Statement awaiting its BULK_LOAD data.
    let mut pending: Option<String> = None;

    while let Some(packet) = packets.next().await {
        let packet = packet?;

        if packet.header.packet_type == PacketType::Attention {
            tracing::debug!(partial = assembler.has_partial(), "attention received");
            assembler.clear();
            pending = None;
            shared.recorded.lock().await.attentions += 1;
            let status = DoneStatus {
                attn: true,
                ..Default::default()
            };
            let mut reply = BytesMut::new();
            Done {
                status,
                cur_cmd: 0,
                row_count: 0,
            }
            .encode(&mut reply);
            send_reply(&mut packets, reply).await?;
            continue;
        }

        let Some(message) = assembler.push(packet) else {
            continue;
        };

        let reply = match message.packet_type {
            PacketType::SqlBatch => {
                let sql = decode_sql_batch(message.payload)?;
                tracing::debug!(sql = %sql, "SQL batch");
                shared.recorded.lock().await.statements.push(sql.clone());

                match &config.statement_error {
                    Some(error) => error_reply(error, &config.server_name)?,
                    None => {
                        if is_insert_bulk(&sql) {
                            pending = Some(sql);
                        }
                        done_reply(Done::default())
                    }
                }
            }
            PacketType::BulkLoad => {
                let statement = pending.take().ok_or_else(|| {
                    MockServerError::Unexpected("bulk load data without INSERT BULK".into())
                })?;
                let load = parse_load(statement, message.payload)?;
                tracing::debug!(table = %load.table, rows = load.rows.len(), "bulk load");

                match &config.load_error {
                    Some(error) => error_reply(error, &config.server_name)?,
                    None => {
                        let rows = config.reported_rows.unwrap_or(load.rows.len() as u64);
                        shared.recorded.lock().await.loads.push(load);
                        done_reply(Done::with_count(rows))
                    }
                }
            }
            other => {
                return Err(MockServerError::Unexpected(format!("{other:?} message")));
            }
        };
        send_reply(&mut packets, reply).await?;
    }

    Ok(())
}

fn is_insert_bulk(sql: &str) -> bool {
    sql.get(..12)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("INSERT BULK "))
}

/// Table part of an `INSERT BULK` statement.
fn table_of(statement: &str) -> String {
    let rest = statement.get(12..).unwrap_or_default();
    rest.split(" (").next().unwrap_or_default().trim().to_string()
}

/// Decode a BULK_LOAD payload: COLMETADATA, ROW tokens, DONE.
fn parse_load(statement: String, mut payload: Bytes) -> Result<BulkLoad> {
    if !payload.has_remaining() || payload.get_u8() != TokenType::ColMetaData as u8 {
        return Err(MockServerError::Unexpected(
            "bulk load does not start with COLMETADATA".into(),
        ));
    }
    let metadata = ColMetaData::decode(&mut payload)?;
    let columns = metadata
        .columns
        .iter()
        .map(ColumnDescriptor::from_column_data)
        .collect::<mssql_bulk::Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    loop {
        if !payload.has_remaining() {
            return Err(ProtocolError::UnexpectedEof.into());
        }
        match payload.get_u8() {
            b if b == TokenType::Row as u8 => rows.push(decode_row(&columns, &mut payload)?),
            b if b == TokenType::Done as u8 => {
                Done::decode(&mut payload)?;
                break;
            }
            other => return Err(ProtocolError::InvalidTokenType(other).into()),
        }
    }

    Ok(BulkLoad {
        table: table_of(&statement),
        statement,
        columns,
        rows,
    })
}

fn done_reply(done: Done) -> BytesMut {
    let mut buf = BytesMut::new();
    done.encode(&mut buf);
    buf
}

fn error_reply(error: &MockError, server_name: &str) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    error
        .to_server_error(server_name)
        .encode_as(TokenType::Error, &mut buf)?;
    let status = DoneStatus {
        error: true,
        ..Default::default()
    };
    Done {
        status,
        cur_cmd: 0,
        row_count: 0,
    }
    .encode(&mut buf);
    Ok(buf)
}

async fn send_reply<S>(packets: &mut PacketStream<S>, payload: BytesMut) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = PacketHeader::new(PacketType::TabularResult, PacketStatus::END_OF_MESSAGE, 0);
    packets.send(Packet::new(header, payload)).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mssql_bulk::SqlType;
    use tds_wire::encode_sql_batch;

    #[test]
    fn test_table_of() {
        assert_eq!(table_of("INSERT BULK [dbo].[t] ([a] int)"), "[dbo].[t]");
        assert_eq!(table_of("INSERT BULK t"), "t");
        assert!(is_insert_bulk("insert bulk t"));
        assert!(!is_insert_bulk("SELECT 1"));
    }

    #[test]
    fn test_parse_load() {
        let column = ColumnDescriptor::new("id", SqlType::Int).unwrap();
        let mut payload = BytesMut::new();
        ColMetaData {
            columns: vec![column.to_column_data()],
        }
        .encode(&mut payload)
        .unwrap();
        for v in [1, 2] {
            payload.extend_from_slice(&[TokenType::Row as u8]);
            mssql_bulk::encode_row(
                std::slice::from_ref(&column),
                &[SqlValue::Int(v)],
                &mut payload,
            )
            .unwrap();
        }
        Done::default().encode(&mut payload);

        let load = parse_load("INSERT BULK [t] ([id] int)".into(), payload.freeze()).unwrap();
        assert_eq!(load.table, "[t]");
        assert_eq!(load.columns, vec![column]);
        assert_eq!(load.rows, vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]]);
    }

    #[test]
    fn test_parse_load_missing_done() {
        let mut payload = BytesMut::new();
        ColMetaData {
            columns: vec![ColumnDescriptor::new("id", SqlType::Int).unwrap().to_column_data()],
        }
        .encode(&mut payload)
        .unwrap();
        assert!(parse_load("INSERT BULK t".into(), payload.freeze()).is_err());
    }

    #[tokio::test]
    async fn test_server_starts() {
        let server = MockBulkServer::builder().build().await.unwrap();
        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.connection_count(), 0);
        server.stop();
    }

    #[tokio::test]
    async fn test_plain_batch_gets_done() {
        let server = MockBulkServer::builder().build().await.unwrap();
        let mut conn = mssql_bulk_codec::Connection::new(server.duplex());
        conn.send_message(PacketType::SqlBatch, encode_sql_batch("SELECT 1"))
            .await
            .unwrap();
        let reply = conn.read_message().await.unwrap().unwrap();
        assert_eq!(reply.packet_type, PacketType::TabularResult);
        assert_eq!(server.statements().await, vec!["SELECT 1".to_string()]);
    }
}
