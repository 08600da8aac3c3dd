//! Configuration for the connection pool

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;
use crate::error::Error;

/// Configuration for a [`Database`](crate::Database) pool
///
/// # Examples
///
/// ```
/// use txpool::DatabaseConfig;
///
/// // Use defaults
/// let config = DatabaseConfig::default();
///
/// // Override just one field
/// let config = DatabaseConfig {
///     max_connections: 8,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
   /// Number of connectors in the pool
   ///
   /// Fixed for the lifetime of the pool. At most this many transactions can
   /// be open at once.
   ///
   /// Default: 4
   pub max_connections: u32,

   /// Delay between scans of the pool while every connector is busy (in milliseconds)
   ///
   /// Default: 100
   pub acquire_poll_interval_ms: u64,

   /// Timeout for the liveness probe run on a cached connection before reuse (in seconds)
   ///
   /// Default: 10
   pub validation_timeout_secs: u64,
}

impl Default for DatabaseConfig {
   fn default() -> Self {
      Self {
         max_connections: 4,
         acquire_poll_interval_ms: 100,
         validation_timeout_secs: 10,
      }
   }
}

impl DatabaseConfig {
   pub fn acquire_poll_interval(&self) -> Duration {
      Duration::from_millis(self.acquire_poll_interval_ms)
   }

   pub fn validation_timeout(&self) -> Duration {
      Duration::from_secs(self.validation_timeout_secs)
   }

   pub(crate) fn validate(&self) -> Result<()> {
      if self.max_connections == 0 {
         return Err(Error::InvalidConfig(
            "max_connections must be at least 1".into(),
         ));
      }
      Ok(())
   }
}
