//! # mssql-bulk-testing
//!
//! Test infrastructure for bulk copy sessions.
//!
//! Provides a mock TDS endpoint that accepts `INSERT BULK` statements and
//! BULK_LOAD messages, decodes the rows it receives and answers with the
//! DONE, ERROR and attention acknowledgement tokens a real server sends.
//! No Docker or SQL Server instance is needed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_bulk_testing::{MockBulkServer, MockError};
//!
//! #[tokio::test]
//! async fn test_rejected_load() {
//!     let server = MockBulkServer::builder()
//!         .reject_loads(MockError::new(2627, "Violation of PRIMARY KEY constraint"))
//!         .build()
//!         .await
//!         .unwrap();
//!     let conn = mssql_bulk::SessionConfig::new().connect(server.duplex());
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    BulkLoad, MockBulkServer, MockError, MockServerBuilder, MockServerConfig, MockServerError,
};
