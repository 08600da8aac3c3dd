//! A single pool slot owning one physical connection

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::Result;
use crate::driver::{Connection, Driver, Properties};
use crate::error::Error;

/// One slot of a [`Database`](crate::Database) pool.
///
/// A connector is acquired by flipping its `ready` flag from `true` to `false`
/// with a compare-and-set; that flag is the only thing that keeps two callers
/// off the same slot. While acquired, the physical connection is owned by the
/// [`Transaction`](crate::Transaction) holding the slot. On release it is
/// parked here and validated again by the next acquirer.
pub struct Connector<D: Driver> {
   index: usize,
   driver: Arc<D>,
   url: Arc<str>,
   properties: Arc<Properties>,
   closed: Arc<AtomicBool>,
   ready: AtomicBool,
   idle: Mutex<Option<D::Connection>>,
   validation_timeout: Duration,
}

impl<D: Driver> Connector<D> {
   pub(crate) fn new(
      index: usize,
      driver: Arc<D>,
      url: Arc<str>,
      properties: Arc<Properties>,
      closed: Arc<AtomicBool>,
      validation_timeout: Duration,
   ) -> Self {
      Self {
         index,
         driver,
         url,
         properties,
         closed,
         ready: AtomicBool::new(true),
         idle: Mutex::new(None),
         validation_timeout,
      }
   }

   /// Position of this connector in the pool
   pub fn index(&self) -> usize {
      self.index
   }

   pub fn driver(&self) -> &D {
      &self.driver
   }

   pub fn url(&self) -> &str {
      &self.url
   }

   pub fn properties(&self) -> &Properties {
      &self.properties
   }

   /// True once the owning pool has been closed
   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// True when no transaction holds this connector
   pub fn is_ready(&self) -> bool {
      self.ready.load(Ordering::SeqCst)
   }

   /// True when a connection is parked here waiting to be reused
   pub fn has_idle_connection(&self) -> bool {
      self.idle_slot().is_some()
   }

   /// Try to take exclusive ownership of this slot.
   ///
   /// Returns `Ok(None)` without waiting when the pool is closed or another
   /// caller holds the slot. On success the returned connection is open,
   /// valid, has auto-commit off and read-only set to `read_only`.
   ///
   /// If opening or configuring the connection fails, or the returned future
   /// is dropped before it completes, the slot is made ready again.
   pub(crate) async fn acquire(&self, read_only: bool) -> Result<Option<D::Connection>> {
      if self.is_closed()
         || self
            .ready
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
      {
         return Ok(None);
      }

      let guard = ReadyGuard::new(self.index, &self.ready);
      match self.prepare(read_only).await {
         Ok(conn) => {
            guard.disarm();
            Ok(Some(conn))
         }
         Err(e) => {
            warn!(
               "Connector {} failed to provide a connection, restoring slot: {}",
               self.index, e
            );
            Err(e)
         }
      }
   }

   /// Put the slot back into the pool, parking `connection` for reuse.
   ///
   /// Pass `None` when the connection was discarded; the next acquirer will
   /// open a fresh one.
   pub(crate) fn release(&self, connection: Option<D::Connection>) -> Result<()> {
      if self.is_ready() {
         return Err(Error::ConnectorNotAcquired(self.index));
      }

      if let Some(conn) = connection {
         *self.idle_slot() = Some(conn);
      }

      self
         .ready
         .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
         .map(|_| ())
         .map_err(|_| Error::ConnectorNotAcquired(self.index))
   }

   async fn prepare(&self, read_only: bool) -> Result<D::Connection> {
      let cached = self.idle_slot().take();

      let mut conn = match cached {
         Some(mut conn) => {
            if !conn.is_closed() && conn.is_valid(self.validation_timeout).await {
               conn
            } else {
               debug!("Connector {} discarding stale connection", self.index);
               if let Err(e) = conn.close().await {
                  debug!("Closing stale connection failed: {}", e);
               }
               self.connect().await?
            }
         }
         None => self.connect().await?,
      };

      conn.set_read_only(read_only).await?;
      conn.set_auto_commit(false).await?;
      Ok(conn)
   }

   async fn connect(&self) -> Result<D::Connection> {
      debug!("Connector {} opening connection to {}", self.index, self.url);
      self.driver.connect(&self.url, &self.properties).await
   }

   fn idle_slot(&self) -> MutexGuard<'_, Option<D::Connection>> {
      self.idle.lock().unwrap_or_else(PoisonError::into_inner)
   }
}

/// Restores a claimed slot's `ready` flag unless disarmed.
///
/// Covers both a failed `prepare` and a caller that stops polling mid-acquire
/// (timeout, aborted task, losing `select!` branch). Any connection taken out
/// of the idle slot at that point is dropped with the future.
struct ReadyGuard<'a> {
   index: usize,
   ready: &'a AtomicBool,
   armed: bool,
}

impl<'a> ReadyGuard<'a> {
   fn new(index: usize, ready: &'a AtomicBool) -> Self {
      Self {
         index,
         ready,
         armed: true,
      }
   }

   fn disarm(mut self) {
      self.armed = false;
   }
}

impl Drop for ReadyGuard<'_> {
   fn drop(&mut self) {
      if self.armed {
         debug!("Connector {} acquisition did not complete, slot restored", self.index);
         self.ready.store(true, Ordering::SeqCst);
      }
   }
}

impl<D: Driver> fmt::Debug for Connector<D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Connector")
         .field("index", &self.index)
         .field("url", &self.url)
         .field("ready", &self.is_ready())
         .field("closed", &self.is_closed())
         .finish()
   }
}
