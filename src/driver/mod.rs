//! Data store driver seam
//!
//! The harness never talks to a database directly. It goes through two
//! small contracts:
//!
//! - [`Connector`] / [`Connection`]: blocking connect and lookup, used by the
//!   sequential and thread-pool strategies (one connection per operation).
//! - [`AsyncConnect`] / [`AsyncConnection`]: non-blocking connect and lookup,
//!   pooled through [`ConnectionPool`] for the cooperative strategy.
//!
//! Two backends ship with the crate: [`sqlite`] for real measurements and
//! [`memory`] for deterministic, latency-simulated runs.

use async_trait::async_trait;
use serde_json::Value;

pub mod error;
pub mod memory;
pub mod pool;
pub mod sqlite;

pub use error::DriverError;
pub use memory::MemoryStore;
pub use pool::{ConnectionPool, PooledConnection};
pub use sqlite::{PragmaProfile, SqliteConnector};

/// Lookup key. The workloads this harness drives are integer primary keys.
pub type Key = i64;

/// A fetched row: JSON object of column name to value.
pub type Row = Value;

pub type DriverResult<T> = Result<T, DriverError>;

/// Blocking connection factory
pub trait Connector: Send + Sync {
    type Conn: Connection;

    fn connect(&self) -> DriverResult<Self::Conn>;
}

/// Blocking connection
pub trait Connection: Send {
    /// `Ok(None)` is "no row", which is a valid measurement and not an error.
    fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>>;

    /// Run an arbitrary statement and drain its rows, returning the row count.
    fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DriverResult<usize> {
        let _ = (sql, params);
        Err(DriverError::Query(
            "ad-hoc statements are not supported by this backend".to_string(),
        ))
    }
}

/// Non-blocking connection factory
#[async_trait]
pub trait AsyncConnect: Send + Sync + 'static {
    type Conn: AsyncConnection;

    async fn connect(&self) -> DriverResult<Self::Conn>;
}

/// Non-blocking connection
#[async_trait]
pub trait AsyncConnection: Send + 'static {
    async fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>>;
}
