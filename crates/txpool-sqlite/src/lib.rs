//! # txpool-sqlite
//!
//! SQLite driver for [`txpool`], built on SQLx.
//!
//! ## Core Types
//!
//! - **[`SqliteDriver`]**: Opens SQLx SQLite connections from a URL and properties
//! - **[`SqliteConnection`]**: Pooled connection; derefs to [`sqlx::SqliteConnection`]
//!   so queries can be run against it directly
//!
//! ## Transactions
//!
//! - Read-write transactions start with `BEGIN IMMEDIATE`, so concurrent writers
//!   queue on SQLite's busy timeout instead of failing on lock upgrade
//! - Read-only transactions start with a deferred `BEGIN` and set
//!   `PRAGMA query_only`
//!
//! ## Usage
//!
//! ```no_run
//! use txpool::{Database, Error, Properties};
//! use txpool_sqlite::SqliteDriver;
//!
//! # async fn example() -> Result<(), Error> {
//! let mut properties = Properties::new();
//! properties.insert("create_if_missing".into(), "true".into());
//! properties.insert("journal_mode".into(), "WAL".into());
//!
//! let db = Database::new(SqliteDriver::new(), "sqlite://app.db", properties, None)?;
//!
//! db.transact_write(|tx| {
//!     Box::pin(async move {
//!         sqlx::query("INSERT INTO users (name) VALUES (?)")
//!             .bind("Alice")
//!             .execute(&mut **tx.connection_mut()?)
//!             .await
//!             .map_err(Error::driver)?;
//!         Ok::<_, Error>(())
//!     })
//! })
//! .await?;
//!
//! db.close();
//! # Ok(())
//! # }
//! ```
//!
mod connection;
mod driver;

pub use connection::SqliteConnection;
pub use driver::SqliteDriver;
