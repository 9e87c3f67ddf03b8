//! Bounded async connection pool
//!
//! Capacity is enforced by a semaphore: a caller holding a [`PooledConnection`]
//! owns one of `max_size` slots, so no two tasks ever drive the same
//! connection. Idle connections are kept for reuse and handed back when the
//! guard is dropped, unless the holder discards it. A discarded connection
//! frees its slot and the next acquire opens a fresh one.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

use super::{AsyncConnect, DriverError, DriverResult};

pub struct ConnectionPool<A: AsyncConnect> {
    connector: A,
    idle: Mutex<Vec<A::Conn>>,
    slots: Semaphore,
    max_size: usize,
    opened: AtomicUsize,
    discarded: AtomicUsize,
    closed: AtomicBool,
}

impl<A: AsyncConnect> ConnectionPool<A> {
    /// Open `min_size` connections eagerly and allow up to `max_size` at once.
    ///
    /// Fails with the connector's error if any of the eager connections
    /// cannot be opened, in which case no pool exists to close.
    pub async fn create(connector: A, min_size: usize, max_size: usize) -> DriverResult<Self> {
        let max_size = max_size.max(1);
        let min_size = min_size.min(max_size);

        let mut idle = Vec::with_capacity(max_size);
        for _ in 0..min_size {
            idle.push(connector.connect().await?);
        }

        tracing::debug!(min_size, max_size, "Connection pool created");

        Ok(Self {
            connector,
            opened: AtomicUsize::new(idle.len()),
            discarded: AtomicUsize::new(0),
            idle: Mutex::new(idle),
            slots: Semaphore::new(max_size),
            max_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Wait for a free slot, then hand out an idle connection or open a new one.
    pub async fn acquire(&self) -> DriverResult<PooledConnection<'_, A>> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| DriverError::PoolClosed)?;

        let reused = self.idle.lock().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = self.connector.connect().await?;
                self.opened.fetch_add(1, Ordering::Relaxed);
                conn
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    /// Reject further acquires and drop every idle connection.
    ///
    /// Connections still checked out are dropped when their guard is
    /// released. Calling this more than once is harmless.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.slots.close();
        let drained = std::mem::take(&mut *self.idle.lock());
        tracing::debug!(
            idle_dropped = drained.len(),
            opened = self.opened(),
            "Connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Total connections opened over the pool's lifetime.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    /// Connections dropped through [`PooledConnection::discard`].
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    fn release(&self, conn: A::Conn) {
        if self.is_closed() {
            return;
        }
        self.idle.lock().push(conn);
    }
}

/// Scoped checkout of a pooled connection
pub struct PooledConnection<'a, A: AsyncConnect> {
    conn: Option<A::Conn>,
    pool: &'a ConnectionPool<A>,
    _permit: SemaphorePermit<'a>,
}

impl<A: AsyncConnect> PooledConnection<'_, A> {
    /// Drop the connection instead of returning it to the idle list.
    ///
    /// For connections left in an unknown state, such as one whose statement
    /// was abandoned mid-flight and may still hold the connection busy.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discarded.fetch_add(1, Ordering::Relaxed);
            drop(conn);
            tracing::debug!(discarded = self.pool.discarded(), "Pooled connection discarded");
        }
    }
}

impl<A: AsyncConnect> Deref for PooledConnection<'_, A> {
    type Target = A::Conn;

    fn deref(&self) -> &Self::Target {
        // Only taken in Drop
        self.conn.as_ref().unwrap()
    }
}

impl<A: AsyncConnect> DerefMut for PooledConnection<'_, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().unwrap()
    }
}

impl<A: AsyncConnect> Drop for PooledConnection<'_, A> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
