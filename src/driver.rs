//! The driver boundary: how the pool opens and finalizes physical connections
//!
//! The pool never issues SQL itself. Everything it needs from a backing store
//! is expressed by these two traits, so any store that can connect, probe,
//! switch auto-commit/read-only, commit, roll back and close can be pooled.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::time::Duration;

use crate::Result;

/// Connection properties handed to [`Driver::connect`], in insertion order.
pub type Properties = IndexMap<String, String>;

/// Factory for physical connections.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
   type Connection: Connection;

   /// Name of the SQL dialect spoken by this driver's connections.
   ///
   /// Opaque to the pool; passed through to whatever builds queries.
   fn dialect(&self) -> &str;

   /// Open a new connection to `url`.
   async fn connect(&self, url: &str, properties: &Properties) -> Result<Self::Connection>;
}

/// A single physical connection.
///
/// Connections are used by one transaction at a time and are never shared
/// between tasks concurrently, so the methods take `&mut self`.
#[async_trait]
pub trait Connection: Send + 'static {
   /// True once the connection is known to be unusable.
   fn is_closed(&self) -> bool;

   fn is_read_only(&self) -> bool;

   /// Liveness probe. Must give up and return `false` after `timeout`.
   async fn is_valid(&mut self, timeout: Duration) -> bool;

   /// With auto-commit off, statements run inside a transaction that ends
   /// only at [`commit`](Connection::commit) or [`rollback`](Connection::rollback).
   async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

   async fn set_read_only(&mut self, read_only: bool) -> Result<()>;

   async fn commit(&mut self) -> Result<()>;

   async fn rollback(&mut self) -> Result<()>;

   async fn close(self) -> Result<()>;
}
