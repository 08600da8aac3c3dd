//! Driver that opens SQLx SQLite connections

use std::borrow::Cow;
use std::str::FromStr;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::debug;
use txpool::{Driver, Error, Properties, Result, async_trait};

use crate::connection::SqliteConnection;

const SQLITE_DIALECT: &str = "sqlite";

/// Opens SQLite connections for a [`txpool::Database`].
///
/// The URL is parsed by SQLx (`sqlite://path/to/file.db`, `sqlite::memory:`,
/// query parameters such as `?mode=rwc`). Properties are applied on top:
///
/// - `create_if_missing` (`true`/`false`) creates the database file
/// - `busy_timeout_ms` sets how long a statement waits on a locked database
/// - any other key is applied as `PRAGMA key = value` on connect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
   pub fn new() -> Self {
      Self
   }

   /// Build the SQLx connect options for `url` and `properties`.
   pub fn connect_options(url: &str, properties: &Properties) -> Result<SqliteConnectOptions> {
      let mut options = SqliteConnectOptions::from_str(url).map_err(Error::driver)?;

      for (key, value) in properties {
         options = match key.as_str() {
            "create_if_missing" => options.create_if_missing(parse_property(key, value)?),
            "busy_timeout_ms" => {
               options.busy_timeout(Duration::from_millis(parse_property(key, value)?))
            }
            _ => options.pragma(
               Cow::<'static, str>::Owned(key.clone()),
               Cow::<'static, str>::Owned(value.clone()),
            ),
         };
      }

      Ok(options)
   }
}

#[async_trait]
impl Driver for SqliteDriver {
   type Connection = SqliteConnection;

   fn dialect(&self) -> &str {
      SQLITE_DIALECT
   }

   async fn connect(&self, url: &str, properties: &Properties) -> Result<SqliteConnection> {
      let options = Self::connect_options(url, properties)?;
      let conn = options.connect().await.map_err(Error::driver)?;

      debug!("Opened SQLite connection to {}", url);
      Ok(SqliteConnection::new(conn))
   }
}

fn parse_property<T: FromStr>(key: &str, value: &str) -> Result<T> {
   value.parse().map_err(|_| {
      Error::InvalidConfig(format!(
         "connection property '{key}' has invalid value '{value}'"
      ))
   })
}
