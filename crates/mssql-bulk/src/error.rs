//! Bulk copy and TVP error types.

use thiserror::Error;

/// Errors raised by bulk copy sessions and TVP encoding.
///
/// Every failure is returned from the call that caused it. Nothing is
/// retried inside this crate: a failed session must be discarded and the
/// whole transfer restarted on a fresh one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A value or field type has no wire mapping.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A TVP type name does not match `[schema.]name` with optional brackets.
    #[error("invalid TVP type name: {0:?}")]
    InvalidName(String),

    /// Every field of a TVP record type is skipped.
    #[error("TVP record type {0} has no columns after skipping fields")]
    EmptySchema(String),

    /// A value could not be encoded for its column.
    #[error("column {column}: {source}")]
    Encoding {
        /// Name of the offending column.
        column: String,
        /// The underlying codec error.
        #[source]
        source: mssql_bulk_types::TypeError,
    },

    /// A row carries the wrong number of values.
    #[error("expected {expected} values, got {actual}")]
    ColumnCount {
        /// Number of columns in the transfer.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The protocol stream was malformed.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_wire::ProtocolError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] mssql_bulk_codec::CodecError),

    /// The server closed the connection before replying.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server answered with an ERROR token.
    #[error("server error {number}: {message}")]
    Server {
        /// Error number.
        number: i32,
        /// Error class/severity (0-25).
        class: u8,
        /// Error state.
        state: u8,
        /// Error message.
        message: String,
        /// Server name where the error occurred.
        server: Option<String>,
        /// Stored procedure name (if applicable).
        procedure: Option<String>,
        /// Line number in the batch.
        line: i32,
    },

    /// The session was used after it completed or failed.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The transfer was cancelled.
    #[error("bulk copy cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// SQL Server error numbers worth retrying the whole transfer for.
const TRANSIENT_SERVER_ERRORS: &[i32] = &[
    1205,  // deadlock victim
    1222,  // lock request timeout
    40197, // service error processing request
    40501, // service busy
    40613, // database unavailable
    49918, // not enough resources
];

impl Error {
    pub(crate) fn encoding(column: &str, source: mssql_bulk_types::TypeError) -> Self {
        Self::Encoding {
            column: column.to_string(),
            source,
        }
    }

    pub(crate) fn from_server(err: tds_wire::ServerError) -> Self {
        Self::Server {
            number: err.number,
            class: err.class,
            state: err.state,
            message: err.message,
            server: Some(err.server).filter(|s| !s.is_empty()),
            procedure: Some(err.procedure).filter(|s| !s.is_empty()),
            line: err.line,
        }
    }

    /// Whether an external retry policy could restart the transfer.
    ///
    /// Transport failures and a few server conditions (deadlock victim,
    /// lock timeout, service busy) are transient. Encoding and naming
    /// errors never are.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_io(),
            Self::ConnectionClosed => true,
            Self::Server { number, .. } => TRANSIENT_SERVER_ERRORS.contains(number),
            _ => false,
        }
    }

    /// Check if this is a server error with a specific number.
    #[must_use]
    pub fn is_server_error(&self, number: i32) -> bool {
        matches!(self, Self::Server { number: n, .. } if *n == number)
    }

    /// Get the error class/severity if this is a server error.
    #[must_use]
    pub fn class(&self) -> Option<u8> {
        match self {
            Self::Server { class, .. } => Some(*class),
            _ => None,
        }
    }
}

/// Result type for bulk copy and TVP operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server(number: i32) -> Error {
        Error::Server {
            number,
            class: 13,
            state: 1,
            message: "x".into(),
            server: None,
            procedure: None,
            line: 1,
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(server(1205).is_transient());
        assert!(!server(4815).is_transient());
        assert!(Error::ConnectionClosed.is_transient());
        assert!(!Error::InvalidName("1.2.3".into()).is_transient());
        assert!(!Error::EmptySchema("Skipped".into()).is_transient());
    }

    #[test]
    fn test_server_error_accessors() {
        let err = server(4815);
        assert!(err.is_server_error(4815));
        assert_eq!(err.class(), Some(13));
        assert_eq!(Error::Cancelled.class(), None);
    }
}
