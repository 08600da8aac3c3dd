//! Error types for txpool

use thiserror::Error;

/// Errors that may occur while acquiring connections or running transactions.
///
/// Variants fall into two groups. Environment faults ([`Error::Driver`],
/// [`Error::DatabaseClosed`], [`Error::InvalidConfig`]) mean the backing store
/// or the pool is unavailable. Misuse faults ([`Error::ConnectorNotAcquired`],
/// [`Error::TransactionCommitted`], [`Error::TransactionClosed`]) mean the
/// calling code broke the transaction protocol; use [`Error::is_misuse`] to
/// tell them apart.
#[derive(Error, Debug)]
pub enum Error {
   /// The driver failed to open, validate, configure, commit or roll back a
   /// connection.
   #[error("Driver error: {0}")]
   Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

   /// Database has been closed and no connector can be acquired
   #[error("Database has been closed")]
   DatabaseClosed,

   /// Pool configuration or connection properties are not usable
   #[error("Invalid configuration: {0}")]
   InvalidConfig(String),

   /// A connector was released without being acquired first
   #[error("Connector {0} is not acquired")]
   ConnectorNotAcquired(usize),

   /// `commit()` was called on a transaction that was already committed
   #[error("Transaction has already been committed")]
   TransactionCommitted,

   /// The transaction was used after its scoped close
   #[error("Transaction has already been closed")]
   TransactionClosed,
}

impl Error {
   /// Wrap an error raised by a driver implementation.
   pub fn driver<E>(err: E) -> Self
   where
      E: Into<Box<dyn std::error::Error + Send + Sync>>,
   {
      Error::Driver(err.into())
   }

   /// True when the error reports a caller bug rather than an unavailable
   /// backing store. These are not meant to be retried.
   pub fn is_misuse(&self) -> bool {
      matches!(
         self,
         Error::ConnectorNotAcquired(_) | Error::TransactionCommitted | Error::TransactionClosed
      )
   }

   /// Extract a structured error code from the error type.
   pub fn error_code(&self) -> &'static str {
      match self {
         Error::Driver(_) => "DRIVER_ERROR",
         Error::DatabaseClosed => "DATABASE_CLOSED",
         Error::InvalidConfig(_) => "INVALID_CONFIG",
         Error::ConnectorNotAcquired(_) => "CONNECTOR_NOT_ACQUIRED",
         Error::TransactionCommitted => "TRANSACTION_COMMITTED",
         Error::TransactionClosed => "TRANSACTION_CLOSED",
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_error_code_driver() {
      let err = Error::driver("connection refused");
      assert_eq!(err.error_code(), "DRIVER_ERROR");
      assert!(err.to_string().contains("connection refused"));
      assert!(!err.is_misuse());
   }

   #[test]
   fn test_driver_error_keeps_source() {
      use std::error::Error as _;

      let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
      let err = Error::driver(io);
      let source = err.source().expect("driver errors carry their source");
      assert_eq!(source.to_string(), "reset by peer");
   }

   #[test]
   fn test_error_code_database_closed() {
      assert_eq!(Error::DatabaseClosed.error_code(), "DATABASE_CLOSED");
      assert!(!Error::DatabaseClosed.is_misuse());
   }

   #[test]
   fn test_error_code_invalid_config() {
      let err = Error::InvalidConfig("max_connections must be at least 1".into());
      assert_eq!(err.error_code(), "INVALID_CONFIG");
      assert!(err.to_string().contains("max_connections"));
      assert!(!err.is_misuse());
   }

   #[test]
   fn test_misuse_faults() {
      let err = Error::ConnectorNotAcquired(3);
      assert_eq!(err.error_code(), "CONNECTOR_NOT_ACQUIRED");
      assert!(err.to_string().contains('3'));
      assert!(err.is_misuse());

      assert_eq!(
         Error::TransactionCommitted.error_code(),
         "TRANSACTION_COMMITTED"
      );
      assert!(Error::TransactionCommitted.is_misuse());

      assert_eq!(Error::TransactionClosed.error_code(), "TRANSACTION_CLOSED");
      assert!(Error::TransactionClosed.is_misuse());
   }
}
