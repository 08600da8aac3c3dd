//! Scoped transactions bound to one acquired connector

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::Result;
use crate::connector::Connector;
use crate::database::Database;
use crate::driver::{Connection, Driver};
use crate::error::Error;

type ContextValue = Box<dyn Any + Send + Sync>;

/// A transaction holding one connector of a [`Database`] for its whole lifetime.
///
/// The transaction moves through `open → committed? → closed`. Committing is
/// optional; closing is not. [`close`](Self::close) rolls back anything that
/// was not committed and always returns the connector to the pool, even when
/// the rollback fails. Each transaction is rolled back or committed at most
/// once and releases its connector exactly once.
///
/// A transaction dropped without being closed is finalized in the background
/// on the current tokio runtime. Close it explicitly to observe rollback
/// errors.
///
/// The context map carries caller metadata (request ids, user ids, ...)
/// through nested calls without threading it through every signature.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct Transaction<D: Driver> {
   id: Uuid,
   database: Arc<Database<D>>,
   connector: usize,
   connection: Option<D::Connection>,
   read_only: bool,
   context: IndexMap<String, ContextValue>,
   begin: OffsetDateTime,
   end: Option<OffsetDateTime>,
   committed: bool,
   closed: bool,
}

impl<D: Driver> Transaction<D> {
   pub(crate) async fn begin(database: Arc<Database<D>>, read_only: bool) -> Result<Self> {
      let (connector, connection) = database.acquire(read_only).await?;
      let id = Uuid::new_v4();

      debug!(
         "Transaction {} began on connector {} (read_only: {})",
         id, connector, read_only
      );

      Ok(Self {
         id,
         database,
         connector,
         connection: Some(connection),
         read_only,
         context: IndexMap::with_capacity(16),
         begin: OffsetDateTime::now_utc(),
         end: None,
         committed: false,
         closed: false,
      })
   }

   pub fn id(&self) -> Uuid {
      self.id
   }

   pub fn database(&self) -> &Arc<Database<D>> {
      &self.database
   }

   /// Index of the connector this transaction holds
   pub fn connector_index(&self) -> usize {
      self.connector
   }

   /// SQL dialect of the underlying connection
   pub fn dialect(&self) -> &str {
      self.database.dialect()
   }

   /// The live connection, for handing to a query builder.
   ///
   /// Fails with [`Error::TransactionClosed`] after [`close`](Self::close).
   pub fn connection(&self) -> Result<&D::Connection> {
      self.connection.as_ref().ok_or(Error::TransactionClosed)
   }

   /// Mutable access to the live connection.
   ///
   /// Fails with [`Error::TransactionClosed`] after [`close`](Self::close).
   pub fn connection_mut(&mut self) -> Result<&mut D::Connection> {
      self.connection.as_mut().ok_or(Error::TransactionClosed)
   }

   pub fn is_read_only(&self) -> bool {
      self.read_only
   }

   pub fn is_committed(&self) -> bool {
      self.committed
   }

   pub fn is_closed(&self) -> bool {
      self.closed
   }

   /// When the connector was acquired
   pub fn begin_time(&self) -> OffsetDateTime {
      self.begin
   }

   /// When the transaction was closed, `None` while it is still open
   pub fn end_time(&self) -> Option<OffsetDateTime> {
      self.end
   }

   /// Time between begin and close, `None` while still open
   pub fn duration(&self) -> Option<time::Duration> {
      self.end.map(|end| end - self.begin)
   }

   /// Look up a context value by key and type.
   ///
   /// Returns `None` when the key is missing or holds a different type.
   pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
      self.context.get(key).and_then(|v| v.downcast_ref::<T>())
   }

   pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
      self
         .context
         .get_mut(key)
         .and_then(|v| v.downcast_mut::<T>())
   }

   /// Store a context value, replacing and returning any previous value under
   /// the same key.
   pub fn put<T>(&mut self, key: impl Into<String>, value: T) -> Option<ContextValue>
   where
      T: Any + Send + Sync,
   {
      self.context.insert(key.into(), Box::new(value))
   }

   pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
      self.context.shift_remove(key)
   }

   /// Context keys in insertion order
   pub fn context_keys(&self) -> impl Iterator<Item = &str> {
      self.context.keys().map(String::as_str)
   }

   /// Commit the transaction.
   ///
   /// Committing twice, or after [`close`](Self::close), is a caller bug and
   /// fails with [`Error::TransactionCommitted`] or [`Error::TransactionClosed`].
   pub async fn commit(&mut self) -> Result<()> {
      if self.closed {
         return Err(Error::TransactionClosed);
      }
      if self.committed {
         return Err(Error::TransactionCommitted);
      }

      let conn = self.connection.as_mut().ok_or(Error::TransactionClosed)?;
      conn.commit().await?;
      self.committed = true;

      debug!("Transaction {} committed", self.id);
      Ok(())
   }

   /// Finalize the transaction and return its connector to the pool.
   ///
   /// Rolls back if [`commit`](Self::commit) was not called. The connector is
   /// released even if the rollback fails; in that case the connection is
   /// closed instead of being reused and the rollback error is returned.
   /// Closing an already closed transaction does nothing.
   pub async fn close(&mut self) -> Result<()> {
      if self.closed {
         return Ok(());
      }

      let mut connection = self.connection.take();
      let mut outcome = Ok(());

      if !self.committed
         && let Some(conn) = connection.as_mut()
      {
         match conn.rollback().await {
            Ok(()) => debug!("Transaction {} rolled back", self.id),
            Err(e) => {
               warn!("Transaction {} rollback failed: {}", self.id, e);
               if let Some(broken) = connection.take()
                  && let Err(close_err) = broken.close().await
               {
                  debug!("Closing connection after failed rollback: {}", close_err);
               }
               outcome = Err(e);
            }
         }
      }

      let released = self.connector_ref().release(connection);
      self.closed = true;
      self.end = Some(OffsetDateTime::now_utc());

      outcome.and(released)
   }

   fn connector_ref(&self) -> &Connector<D> {
      self.database.connector(self.connector)
   }
}

impl<D: Driver> Drop for Transaction<D> {
   fn drop(&mut self) {
      if self.closed {
         return;
      }
      self.closed = true;

      let connection = self.connection.take();
      let database = Arc::clone(&self.database);
      let index = self.connector;
      let id = self.id;

      let release = move |database: &Database<D>, connection: Option<D::Connection>| {
         if let Err(e) = database.connector(index).release(connection) {
            error!("Transaction {} failed to release connector: {}", id, e);
         }
      };

      match connection {
         Some(mut conn) if !self.committed => match Handle::try_current() {
            Ok(handle) => {
               debug!(
                  "Dropping open transaction {} (will rollback in background)",
                  id
               );
               handle.spawn(async move {
                  let conn = match conn.rollback().await {
                     Ok(()) => Some(conn),
                     Err(e) => {
                        warn!("Transaction {} rollback failed: {}", id, e);
                        None
                     }
                  };
                  release(&database, conn);
               });
            }
            Err(_) => {
               warn!(
                  "Dropping open transaction {} outside a runtime, discarding its connection",
                  id
               );
               drop(conn);
               release(&database, None);
            }
         },
         connection => release(&database, connection),
      }
   }
}

impl<D: Driver> fmt::Debug for Transaction<D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Transaction")
         .field("id", &self.id)
         .field("connector", &self.connector)
         .field("read_only", &self.read_only)
         .field("committed", &self.committed)
         .field("closed", &self.closed)
         .field("begin", &self.begin)
         .field("end", &self.end)
         .field("context_keys", &self.context.keys().collect::<Vec<_>>())
         .finish()
   }
}
