//! Fixed-capacity pool of connectors

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error};

use crate::Result;
use crate::config::DatabaseConfig;
use crate::connector::Connector;
use crate::driver::{Driver, Properties};
use crate::error::Error;
use crate::transaction::Transaction;

/// A fixed-size pool of [`Connector`]s sharing one driver, URL and set of
/// connection properties.
///
/// Work runs inside a [`Transaction`] that holds one connector for its whole
/// lifetime. When every connector is busy, acquisition rescans the pool after
/// a short sleep until one frees up or the pool is closed. There is no wait
/// queue, so a connector freed mid-scan goes to whichever caller polls next.
///
/// # Example
///
/// ```no_run
/// use txpool::{Database, Driver, Error, Properties};
///
/// # async fn example<D: Driver>(driver: D) -> Result<(), Error> {
/// let db = Database::new(driver, "db://localhost/app", Properties::new(), None)?;
///
/// let written = db
///    .transact_write(|tx| {
///       Box::pin(async move {
///          tx.put("request_id", 42u64);
///          let _conn = tx.connection_mut()?;
///          // ... hand the connection to a query builder ...
///          Ok::<_, Error>(1)
///       })
///    })
///    .await?;
/// assert_eq!(written, 1);
///
/// db.close();
/// # Ok(())
/// # }
/// ```
pub struct Database<D: Driver> {
   driver: Arc<D>,
   url: Arc<str>,
   properties: Arc<Properties>,
   config: DatabaseConfig,

   /// Shared with every connector so closing is visible to all of them at once
   closed: Arc<AtomicBool>,

   connectors: Box<[Connector<D>]>,
}

impl<D: Driver> Database<D> {
   /// Create a pool of `max_connections` connectors.
   ///
   /// No connection is opened here; each connector connects lazily on its
   /// first acquisition.
   ///
   /// # Arguments
   ///
   /// * `driver` - Factory for physical connections
   /// * `url` - Passed verbatim to [`Driver::connect`]
   /// * `properties` - Passed verbatim to [`Driver::connect`]
   /// * `custom_config` - Pass `None` to use defaults (4 connections, 100ms
   ///   poll interval, 10 second validation timeout)
   pub fn new(
      driver: D,
      url: impl Into<String>,
      properties: Properties,
      custom_config: Option<DatabaseConfig>,
   ) -> Result<Arc<Self>> {
      let config = custom_config.unwrap_or_default();
      config.validate()?;

      let driver = Arc::new(driver);
      let url: Arc<str> = Arc::from(url.into());
      let properties = Arc::new(properties);
      let closed = Arc::new(AtomicBool::new(false));

      let connectors = (0..config.max_connections as usize)
         .map(|index| {
            Connector::new(
               index,
               Arc::clone(&driver),
               Arc::clone(&url),
               Arc::clone(&properties),
               Arc::clone(&closed),
               config.validation_timeout(),
            )
         })
         .collect();

      debug!(
         "Created {} database pool with {} connectors for {}",
         driver.dialect(),
         config.max_connections,
         url
      );

      Ok(Arc::new(Self {
         driver,
         url,
         properties,
         config,
         closed,
         connectors,
      }))
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

   /// SQL dialect reported by the driver
   pub fn dialect(&self) -> &str {
      self.driver.dialect()
   }

   pub fn config(&self) -> &DatabaseConfig {
      &self.config
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   /// Number of connectors, fixed at construction
   pub fn count(&self) -> usize {
      self.connectors.len()
   }

   pub fn connectors(&self) -> &[Connector<D>] {
      &self.connectors
   }

   pub(crate) fn connector(&self, index: usize) -> &Connector<D> {
      &self.connectors[index]
   }

   /// Wait for a free connector and take it.
   ///
   /// Scans connectors in index order and sleeps for the configured poll
   /// interval between scans. Driver failures are returned at once rather than
   /// treated as a busy slot.
   pub(crate) async fn acquire(&self, read_only: bool) -> Result<(usize, D::Connection)> {
      while !self.is_closed() {
         for connector in self.connectors.iter() {
            if let Some(conn) = connector.acquire(read_only).await? {
               return Ok((connector.index(), conn));
            }
         }
         tokio::time::sleep(self.config.acquire_poll_interval()).await;
      }
      Err(Error::DatabaseClosed)
   }

   /// Begin a transaction, waiting until a connector is free.
   ///
   /// The caller is responsible for [`commit`](Transaction::commit) and
   /// [`close`](Transaction::close). Prefer [`transact_read`](Self::transact_read)
   /// and [`transact_write`](Self::transact_write), which do both.
   pub async fn begin(self: &Arc<Self>, read_only: bool) -> Result<Transaction<D>> {
      Transaction::begin(Arc::clone(self), read_only).await
   }

   pub async fn begin_read(self: &Arc<Self>) -> Result<Transaction<D>> {
      self.begin(true).await
   }

   pub async fn begin_write(self: &Arc<Self>) -> Result<Transaction<D>> {
      self.begin(false).await
   }

   /// Run `work` in a read-only transaction.
   ///
   /// See [`transact_write`](Self::transact_write).
   pub async fn transact_read<F, T, E>(self: &Arc<Self>, work: F) -> std::result::Result<T, E>
   where
      F: for<'t> FnOnce(&'t mut Transaction<D>) -> BoxFuture<'t, std::result::Result<T, E>>,
      E: From<Error>,
   {
      self.transact(true, work).await
   }

   /// Run `work` in a read-write transaction.
   ///
   /// The transaction is committed only if `work` returns `Ok`. Whatever
   /// happens, it is then closed, which rolls back anything uncommitted and
   /// returns the connector to the pool.
   ///
   /// `work` must not commit the transaction itself; a second commit is
   /// reported as [`Error::TransactionCommitted`].
   pub async fn transact_write<F, T, E>(self: &Arc<Self>, work: F) -> std::result::Result<T, E>
   where
      F: for<'t> FnOnce(&'t mut Transaction<D>) -> BoxFuture<'t, std::result::Result<T, E>>,
      E: From<Error>,
   {
      self.transact(false, work).await
   }

   async fn transact<F, T, E>(self: &Arc<Self>, read_only: bool, work: F) -> std::result::Result<T, E>
   where
      F: for<'t> FnOnce(&'t mut Transaction<D>) -> BoxFuture<'t, std::result::Result<T, E>>,
      E: From<Error>,
   {
      let mut tx = self.begin(read_only).await?;

      let result = work(&mut tx).await;
      let outcome = match result {
         Ok(value) => tx.commit().await.map(|()| value).map_err(E::from),
         Err(e) => Err(e),
      };

      match (outcome, tx.close().await) {
         (Ok(value), Ok(())) => Ok(value),
         (Ok(_), Err(close_err)) => Err(close_err.into()),
         (Err(e), Ok(())) => Err(e),
         (Err(e), Err(close_err)) => {
            error!(
               "Transaction {} could not be rolled back after its work failed: {}",
               tx.id(),
               close_err
            );
            Err(e)
         }
      }
   }

   /// Mark the pool closed.
   ///
   /// New acquisitions fail with [`Error::DatabaseClosed`]; callers already
   /// waiting for a connector fail on their next scan. Transactions already
   /// open are not interrupted and return their connectors as they finish.
   pub fn close(&self) {
      if !self.closed.swap(true, Ordering::SeqCst) {
         debug!("Closed database pool for {}", self.url);
      }
   }
}

impl<D: Driver> fmt::Debug for Database<D> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Database")
         .field("dialect", &self.dialect())
         .field("url", &self.url)
         .field("config", &self.config)
         .field("closed", &self.is_closed())
         .field("connectors", &self.connectors)
         .finish()
   }
}
