//! Latency-simulated in-memory store
//!
//! Rows live in a hash map. Every lookup sleeps for a configured latency
//! (per key if set, otherwise the default) so concurrent strategies have
//! something to overlap, and completion order can be forced in tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{
    AsyncConnect, AsyncConnection, Connection, Connector, DriverError, DriverResult, Key, Row,
};

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    rows: HashMap<Key, Row>,
    latency: Duration,
    key_latency: HashMap<Key, Duration>,
    failing: HashSet<Key>,
    unreachable: bool,
    connect_limit: Option<usize>,
    connections: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryStore {
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Connections opened so far, sync and async combined.
    pub fn connections_opened(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    /// Connections dropped so far.
    pub fn connections_closed(&self) -> usize {
        self.inner.closed.load(Ordering::Relaxed)
    }

    /// Highest number of lookups observed executing at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.inner.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.rows.is_empty()
    }

    fn open(&self) -> DriverResult<MemoryConnection> {
        if self.inner.unreachable {
            return Err(DriverError::Connection(
                "memory store is configured as unreachable".to_string(),
            ));
        }
        let opened = self.inner.connections.fetch_add(1, Ordering::Relaxed);
        if self.inner.connect_limit.is_some_and(|limit| opened >= limit) {
            self.inner.connections.fetch_sub(1, Ordering::Relaxed);
            return Err(DriverError::Connection(format!(
                "memory store refused connection after {} connects",
                opened
            )));
        }
        Ok(MemoryConnection {
            store: self.clone(),
        })
    }

    fn latency_for(&self, key: Key) -> Duration {
        self.inner
            .key_latency
            .get(&key)
            .copied()
            .unwrap_or(self.inner.latency)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlight { inner: &self.inner }
    }

    fn lookup(&self, key: Key) -> DriverResult<Option<Row>> {
        if self.inner.failing.contains(&key) {
            return Err(DriverError::Query(format!("simulated fault for key {}", key)));
        }
        Ok(self.inner.rows.get(&key).cloned())
    }
}

struct InFlight<'a> {
    inner: &'a MemoryInner,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
pub struct MemoryStoreBuilder {
    rows: HashMap<Key, Row>,
    latency: Duration,
    key_latency: HashMap<Key, Duration>,
    failing: HashSet<Key>,
    unreachable: bool,
    connect_limit: Option<usize>,
}

impl MemoryStoreBuilder {
    pub fn row(mut self, key: Key, row: Row) -> Self {
        self.rows.insert(key, row);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = (Key, Row)>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Simulated time spent inside every lookup
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Override the simulated latency for one key
    pub fn key_latency(mut self, key: Key, latency: Duration) -> Self {
        self.key_latency.insert(key, latency);
        self
    }

    /// Lookups of this key fail with a query error
    pub fn failing_key(mut self, key: Key) -> Self {
        self.failing.insert(key);
        self
    }

    /// Every connect attempt fails with a connection error
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Accept this many connects, then fail every later one with a
    /// connection error
    pub fn connect_limit(mut self, limit: usize) -> Self {
        self.connect_limit = Some(limit);
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore {
            inner: Arc::new(MemoryInner {
                rows: self.rows,
                latency: self.latency,
                key_latency: self.key_latency,
                failing: self.failing,
                unreachable: self.unreachable,
                connect_limit: self.connect_limit,
                connections: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }
}

pub struct MemoryConnection {
    store: MemoryStore,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.store.inner.closed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Connector for MemoryStore {
    type Conn = MemoryConnection;

    fn connect(&self) -> DriverResult<MemoryConnection> {
        self.open()
    }
}

impl Connection for MemoryConnection {
    fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>> {
        let _guard = self.store.enter();
        let latency = self.store.latency_for(key);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.store.lookup(key)
    }
}

#[async_trait]
impl AsyncConnect for MemoryStore {
    type Conn = MemoryConnection;

    async fn connect(&self) -> DriverResult<MemoryConnection> {
        self.open()
    }
}

#[async_trait]
impl AsyncConnection for MemoryConnection {
    async fn query_by_key(&mut self, key: Key) -> DriverResult<Option<Row>> {
        let _guard = self.store.enter();
        let latency = self.store.latency_for(key);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.store.lookup(key)
    }
}
