use std::time::Duration;

use thiserror::Error;

/// Data store driver error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Store unreachable, bad credentials, missing database file
    #[error("Connection error: {0}")]
    Connection(String),
    /// Malformed query or store-side fault on a single statement
    #[error("Query error: {0}")]
    Query(String),
    /// Acquire attempted on a pool that has been closed
    #[error("Connection pool is closed")]
    PoolClosed,
    /// Operation exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl DriverError {
    pub fn is_connection(&self) -> bool {
        matches!(self, DriverError::Connection(_) | DriverError::PoolClosed)
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::NotADatabase
                        | ErrorCode::PermissionDenied
                        | ErrorCode::SystemIoFailure
                ) =>
            {
                DriverError::Connection(err.to_string())
            }
            rusqlite::Error::InvalidPath(_) => DriverError::Connection(err.to_string()),
            _ => DriverError::Query(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cannot_open_is_connection_error() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some("unable to open database file".to_string()),
        );
        assert!(DriverError::from(err).is_connection());
    }

    #[test]
    fn test_statement_failure_is_query_error() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some("no such table: users".to_string()),
        );
        assert!(matches!(DriverError::from(err), DriverError::Query(_)));
    }
}
