//! Scripted in-memory driver used by the integration tests.
//!
//! Rows written through a [`MockConnection`] stay pending until commit, so
//! tests can observe what a commit or rollback did to the shared store.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use txpool::{Connection, Database, DatabaseConfig, Driver, Error, Properties, Result, async_trait};

#[derive(Default)]
pub struct MockState {
   pub connect_attempts: AtomicUsize,
   pub connects: AtomicUsize,
   pub commits: AtomicUsize,
   pub rollbacks: AtomicUsize,
   pub closes: AtomicUsize,
   pub fail_connect: AtomicBool,
   pub fail_rollback: AtomicBool,
   /// Delay applied to every connect, in milliseconds
   pub connect_delay_ms: AtomicU64,
   invalid_before: AtomicUsize,
   store: Mutex<Vec<String>>,
}

impl MockState {
   /// Committed rows, in commit order
   pub fn rows(&self) -> Vec<String> {
      self.store.lock().unwrap().clone()
   }

   /// Make every connection opened so far fail its liveness probe
   pub fn invalidate_all(&self) {
      self
         .invalid_before
         .store(self.connects.load(Ordering::SeqCst), Ordering::SeqCst);
   }

   pub fn count(&self, counter: &AtomicUsize) -> usize {
      counter.load(Ordering::SeqCst)
   }
}

#[derive(Clone, Default)]
pub struct MockDriver {
   pub state: Arc<MockState>,
}

pub struct MockConnection {
   pub id: usize,
   pub auto_commit: bool,
   pub read_only: bool,
   pub closed: bool,
   pending: Vec<String>,
   state: Arc<MockState>,
}

impl MockConnection {
   pub fn insert(&mut self, row: &str) -> Result<()> {
      if self.read_only {
         return Err(Error::driver("attempt to write a readonly database"));
      }
      self.pending.push(row.to_string());
      Ok(())
   }
}

#[async_trait]
impl Driver for MockDriver {
   type Connection = MockConnection;

   fn dialect(&self) -> &str {
      "mock"
   }

   async fn connect(&self, url: &str, _properties: &Properties) -> Result<MockConnection> {
      self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
      let delay = self.state.connect_delay_ms.load(Ordering::SeqCst);
      if delay > 0 {
         tokio::time::sleep(Duration::from_millis(delay)).await;
      }
      if self.state.fail_connect.load(Ordering::SeqCst) {
         return Err(Error::driver(format!("cannot reach {url}")));
      }

      let id = self.state.connects.fetch_add(1, Ordering::SeqCst);
      Ok(MockConnection {
         id,
         auto_commit: true,
         read_only: false,
         closed: false,
         pending: Vec::new(),
         state: Arc::clone(&self.state),
      })
   }
}

#[async_trait]
impl Connection for MockConnection {
   fn is_closed(&self) -> bool {
      self.closed
   }

   fn is_read_only(&self) -> bool {
      self.read_only
   }

   async fn is_valid(&mut self, _timeout: Duration) -> bool {
      self.id >= self.state.invalid_before.load(Ordering::SeqCst)
   }

   async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
      self.auto_commit = auto_commit;
      Ok(())
   }

   async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
      self.read_only = read_only;
      Ok(())
   }

   async fn commit(&mut self) -> Result<()> {
      self.state.commits.fetch_add(1, Ordering::SeqCst);
      self
         .state
         .store
         .lock()
         .unwrap()
         .extend(self.pending.drain(..));
      Ok(())
   }

   async fn rollback(&mut self) -> Result<()> {
      if self.state.fail_rollback.load(Ordering::SeqCst) {
         return Err(Error::driver("connection reset during rollback"));
      }
      self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
      self.pending.clear();
      Ok(())
   }

   async fn close(self) -> Result<()> {
      self.state.closes.fetch_add(1, Ordering::SeqCst);
      Ok(())
   }
}

/// A pool of `size` connectors over a fresh mock store
pub fn create_test_pool(size: u32) -> (Arc<Database<MockDriver>>, Arc<MockState>) {
   let driver = MockDriver::default();
   let state = Arc::clone(&driver.state);
   let config = DatabaseConfig {
      max_connections: size,
      ..Default::default()
   };
   let db = Database::new(driver, "mock://test", Properties::new(), Some(config))
      .expect("Failed to create test pool");
   (db, state)
}
