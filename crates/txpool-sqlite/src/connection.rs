//! Pooled SQLite connection

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use sqlx::Connection as _;
use sqlx::error::DatabaseError;
use tracing::debug;
use txpool::{Connection, Error, Result, async_trait};

/// A SQLite connection owned by a [`txpool::Connector`].
///
/// Derefs to [`sqlx::SqliteConnection`] so queries run directly against it:
///
/// ```no_run
/// # async fn example(tx: &mut txpool::Transaction<txpool_sqlite::SqliteDriver>) -> Result<(), txpool::Error> {
/// sqlx::query("DELETE FROM sessions")
///     .execute(&mut **tx.connection_mut()?)
///     .await
///     .map_err(txpool::Error::driver)?;
/// # Ok(())
/// # }
/// ```
///
/// Transaction boundaries are tracked here, so `BEGIN`, `COMMIT` and
/// `ROLLBACK` must go through the owning [`txpool::Transaction`] rather than
/// raw SQL. After a commit or rollback the connection is back in SQLite's
/// autocommit mode until it is acquired again.
#[derive(Debug)]
pub struct SqliteConnection {
   conn: sqlx::SqliteConnection,
   auto_commit: bool,
   read_only: bool,
   in_transaction: bool,

   /// Set when SQLite's worker or file handle failed; the pool reopens
   broken: bool,
}

impl SqliteConnection {
   pub(crate) fn new(conn: sqlx::SqliteConnection) -> Self {
      Self {
         conn,
         auto_commit: true,
         read_only: false,
         in_transaction: false,
         broken: false,
      }
   }

   pub fn is_auto_commit(&self) -> bool {
      self.auto_commit
   }

   /// True between `BEGIN` and the matching `COMMIT`/`ROLLBACK`
   pub fn in_transaction(&self) -> bool {
      self.in_transaction
   }

   async fn run(&mut self, sql: &'static str) -> Result<()> {
      self.exec(sql).await.map_err(Error::driver)
   }

   async fn exec(&mut self, sql: &'static str) -> std::result::Result<(), sqlx::Error> {
      match sqlx::query(sql).execute(&mut self.conn).await {
         Ok(_) => Ok(()),
         Err(e) => {
            if matches!(e, sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed) {
               self.broken = true;
            }
            Err(e)
         }
      }
   }

   async fn begin(&mut self) -> Result<()> {
      let sql = if self.read_only {
         "BEGIN"
      } else {
         "BEGIN IMMEDIATE"
      };
      self.run(sql).await?;
      self.in_transaction = true;
      Ok(())
   }
}

impl Deref for SqliteConnection {
   type Target = sqlx::SqliteConnection;

   fn deref(&self) -> &Self::Target {
      &self.conn
   }
}

impl DerefMut for SqliteConnection {
   fn deref_mut(&mut self) -> &mut Self::Target {
      &mut self.conn
   }
}

#[async_trait]
impl Connection for SqliteConnection {
   fn is_closed(&self) -> bool {
      self.broken
   }

   fn is_read_only(&self) -> bool {
      self.read_only
   }

   async fn is_valid(&mut self, timeout: Duration) -> bool {
      if self.broken {
         return false;
      }
      matches!(
         tokio::time::timeout(timeout, self.conn.ping()).await,
         Ok(Ok(()))
      )
   }

   async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
      if auto_commit {
         if self.in_transaction {
            self.commit().await?;
         }
      } else if !self.in_transaction {
         self.begin().await?;
      }
      self.auto_commit = auto_commit;
      Ok(())
   }

   async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
      if read_only == self.read_only {
         return Ok(());
      }
      let sql = if read_only {
         "PRAGMA query_only = ON"
      } else {
         "PRAGMA query_only = OFF"
      };
      self.run(sql).await?;
      self.read_only = read_only;
      Ok(())
   }

   async fn commit(&mut self) -> Result<()> {
      if self.in_transaction {
         self.run("COMMIT").await?;
         self.in_transaction = false;
      }
      Ok(())
   }

   async fn rollback(&mut self) -> Result<()> {
      if !self.in_transaction {
         return Ok(());
      }

      match self.exec("ROLLBACK").await {
         Ok(()) => {}
         // SQLite ends the transaction on its own after some errors (disk
         // full, I/O, interrupt), leaving nothing to roll back.
         Err(sqlx::Error::Database(db)) if is_no_active_transaction(db.as_ref()) => {
            debug!("Transaction was already rolled back by SQLite");
         }
         Err(e) => return Err(Error::driver(e)),
      }
      self.in_transaction = false;
      Ok(())
   }

   async fn close(self) -> Result<()> {
      self.conn.close().await.map_err(Error::driver)
   }
}

/// Error raised by `ROLLBACK` when no transaction is open
fn is_no_active_transaction(err: &dyn DatabaseError) -> bool {
   err.message().contains("no transaction is active")
}
