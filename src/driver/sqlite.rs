//! SQLite backend
//!
//! An environment is a database file plus the pragma profile applied to every
//! connection opened against it. Two environments pointing at copies of the
//! same data but different profiles are the "two deployments" under test.
//!
//! The async connection offloads each statement to the blocking pool so the
//! awaiting task suspends at the I/O boundary instead of stalling the
//! executor.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{
    AsyncConnect, AsyncConnection, Connection, Connector, DriverError, DriverResult, Key, Row,
};

/// Per-connection pragmas. Unset fields keep SQLite's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PragmaProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synchronous: Option<String>,
    /// Pages if positive, KiB if negative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmap_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

impl PragmaProfile {
    /// Profile tuned for read latency: WAL, large page cache, memory mapping.
    pub fn tuned() -> Self {
        Self {
            journal_mode: Some("WAL".to_string()),
            synchronous: Some("NORMAL".to_string()),
            cache_size: Some(-131_072),
            mmap_size: Some(268_435_456),
            temp_store: Some("MEMORY".to_string()),
            busy_timeout_ms: Some(5_000),
        }
    }

    /// Deliberately poor profile: rollback journal, full sync, tiny cache, no mmap.
    pub fn untuned() -> Self {
        Self {
            journal_mode: Some("DELETE".to_string()),
            synchronous: Some("FULL".to_string()),
            cache_size: Some(16),
            mmap_size: Some(0),
            temp_store: Some("FILE".to_string()),
            busy_timeout_ms: Some(5_000),
        }
    }

    pub fn apply(&self, conn: &rusqlite::Connection) -> DriverResult<()> {
        if let Some(ms) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        if let Some(mode) = &self.journal_mode {
            // Returns the resulting mode as a row
            conn.pragma_update_and_check(None, "journal_mode", mode, |row| row.get::<_, String>(0))?;
        }
        if let Some(sync) = &self.synchronous {
            conn.pragma_update(None, "synchronous", sync)?;
        }
        if let Some(pages) = self.cache_size {
            conn.pragma_update(None, "cache_size", pages)?;
        }
        if let Some(bytes) = self.mmap_size {
            conn.pragma_update(None, "mmap_size", bytes)?;
        }
        if let Some(store) = &self.temp_store {
            conn.pragma_update(None, "temp_store", store)?;
        }
        Ok(())
    }
}

/// Opens connections to one SQLite database file.
#[derive(Clone)]
pub struct SqliteConnector {
    target: Arc<SqliteTarget>,
}

struct SqliteTarget {
    path: PathBuf,
    pragmas: PragmaProfile,
    lookup_sql: Arc<str>,
}

impl SqliteConnector {
    pub fn new(
        path: impl Into<PathBuf>,
        table: &str,
        key_column: &str,
        pragmas: PragmaProfile,
    ) -> DriverResult<Self> {
        validate_identifier(table)?;
        validate_identifier(key_column)?;

        let lookup_sql = format!("SELECT * FROM {} WHERE {} = ?1", table, key_column);
        Ok(Self {
            target: Arc::new(SqliteTarget {
                path: path.into(),
                pragmas,
                lookup_sql: lookup_sql.into(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.target.path
    }

    pub fn pragmas(&self) -> &PragmaProfile {
        &self.target.pragmas
    }

    fn open(&self) -> DriverResult<SqliteConnection> {
        open_configured(&self.target.path, &self.target.pragmas).map(|conn| SqliteConnection {
            conn,
            lookup_sql: self.target.lookup_sql.clone(),
        })
    }
}

/// Never creates the database: a missing file is an unreachable store.
fn open_configured(path: &Path, pragmas: &PragmaProfile) -> DriverResult<rusqlite::Connection> {
    if !path.exists() {
        return Err(DriverError::Connection(format!(
            "database file not found: {}",
            path.display()
        )));
    }

    let conn = rusqlite::Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| DriverError::Connection(format!("failed to open {}: {}", path.display(), e)))?;

    pragmas.apply(&conn).map_err(|e| match e {
        DriverError::Query(msg) => DriverError::Connection(format!(
            "failed to configure {}: {}",
            path.display(),
            msg
        )),
        other => other,
    })?;

    Ok(conn)
}

fn validate_identifier(name: &str) -> DriverResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DriverError::Query(format!("invalid SQL identifier: '{}'", name)))
    }
}

fn lookup(conn: &rusqlite::Connection, sql: &str, key: Key) -> DriverResult<Option<Row>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let row = stmt
        .query_row(params![key], |row| row_to_json(&names, row))
        .optional()?;
    Ok(row)
}

fn row_to_json(names: &[String], row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut object = Map::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        };
        object.insert(name.clone(), value);
    }
    Ok(Value::Object(object))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

pub struct SqliteConnection {
    conn: rusqlite::Connection,
    lookup_sql: Arc<str>,
}

impl Connection for SqliteConnection {
    fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>> {
        lookup(&self.conn, &self.lookup_sql, key)
    }

    fn fetch_all(&mut self, sql: &str, params: &[Value]) -> DriverResult<usize> {
        let mut stmt = self.conn.prepare(sql)?;
        let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter()))?;

        let mut count = 0;
        while rows.next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

impl Connector for SqliteConnector {
    type Conn = SqliteConnection;

    fn connect(&self) -> DriverResult<SqliteConnection> {
        self.open()
    }
}

pub struct SqliteAsyncConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    lookup_sql: Arc<str>,
}

#[async_trait]
impl AsyncConnect for SqliteConnector {
    type Conn = SqliteAsyncConnection;

    async fn connect(&self) -> DriverResult<SqliteAsyncConnection> {
        let target = self.target.clone();
        let conn = tokio::task::spawn_blocking(move || open_configured(&target.path, &target.pragmas))
            .await
            .map_err(|e| DriverError::Connection(format!("connect task failed: {}", e)))??;

        Ok(SqliteAsyncConnection {
            conn: Arc::new(Mutex::new(conn)),
            lookup_sql: self.target.lookup_sql.clone(),
        })
    }
}

#[async_trait]
impl AsyncConnection for SqliteAsyncConnection {
    async fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>> {
        let conn = self.conn.clone();
        let sql = self.lookup_sql.clone();
        tokio::task::spawn_blocking(move || lookup(&conn.lock(), &sql, key))
            .await
            .map_err(|e| DriverError::Query(format!("lookup task failed: {}", e)))?
    }
}
