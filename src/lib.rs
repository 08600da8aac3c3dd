//! # txpool
//!
//! A fixed-capacity database connection pool with exclusive per-slot
//! acquisition and scoped, exactly-once-finalized transactions.
//!
//! ## Core Types
//!
//! - **[`Database`]**: The pool. Owns a fixed array of connectors and a closed flag
//! - **[`Connector`]**: One pool slot holding one physical connection
//! - **[`Transaction`]**: Scoped handle over one acquired connector
//! - **[`Driver`]** / **[`Connection`]**: The boundary to the backing store
//! - **[`DatabaseConfig`]**: Pool size and timing
//! - **[`Error`]**: Error type separating caller misuse from environment faults
//!
//! ## Architecture
//!
//! - **Lock-free slots**: each connector is claimed with a compare-and-set on its ready flag
//! - **Poll, don't queue**: when every slot is busy, acquisition sleeps briefly and rescans
//! - **Lazy connections**: a slot opens its connection on first use and reopens it
//!   when the cached one fails a liveness probe
//! - **Exactly-once finalization**: a transaction commits or rolls back once and
//!   always returns its connector
//!
//! ## Usage
//!
//! ```no_run
//! use txpool::{Database, DatabaseConfig, Driver, Error, Properties};
//!
//! # async fn example<D: Driver>(driver: D) -> Result<(), Error> {
//! let config = DatabaseConfig {
//!     max_connections: 2,
//!     ..Default::default()
//! };
//! let db = Database::new(driver, "db://localhost/app", Properties::new(), Some(config))?;
//!
//! // Committed only if the closure returns Ok
//! db.transact_write(|tx| {
//!     Box::pin(async move {
//!         let _conn = tx.connection_mut()?;
//!         Ok::<_, Error>(())
//!     })
//! })
//! .await?;
//!
//! // Manual control
//! let mut tx = db.begin_read().await?;
//! tx.put("request_id", "abc-123".to_string());
//! tx.close().await?; // not committed, so rolled back
//!
//! db.close();
//! # Ok(())
//! # }
//! ```
//!
mod config;
mod connector;
mod database;
mod driver;
mod error;
mod transaction;

// Re-export public types
pub use config::DatabaseConfig;
pub use connector::Connector;
pub use database::Database;
pub use driver::{Connection, Driver, Properties};
pub use error::Error;
pub use transaction::Transaction;

// Re-exported so driver implementations can use the same macro as the traits
pub use async_trait::async_trait;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
