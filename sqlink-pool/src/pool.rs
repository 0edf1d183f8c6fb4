//! A bounded pool of physical connections for one descriptor.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use sqlink_connect::{ConnError, ConnectionDescriptor, PoolOptions, SslOption};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::transport::{PhysicalConnection, Transport};

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, ConnError>;

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open physical connections.
    pub size: usize,
    /// Open connections waiting in the idle list.
    pub idle: usize,
    /// Connections currently borrowed.
    pub in_use: usize,
    /// Upper bound on `size`.
    pub max: usize,
}

struct IdleConnection {
    id: u64,
    conn: Box<dyn PhysicalConnection>,
}

/// Physical connections for a single [`ConnectionDescriptor`].
///
/// Connections are opened lazily by [`acquire`](Self::acquire). At most
/// `max_connections` exist at once; callers beyond that wait for a release
/// or for the acquire timeout.
pub struct Pool {
    descriptor: Arc<ConnectionDescriptor>,
    options: PoolOptions,
    transport: Arc<dyn Transport>,
    ssl_profiles: BTreeSet<String>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection>>,
    size: AtomicUsize,
    next_id: AtomicU64,
    destroyed: AtomicBool,
}

impl Pool {
    /// Create a pool. No connection is opened.
    ///
    /// `ssl_profiles` are the SSL profile names the dialect knows; a
    /// descriptor naming any other profile fails on every connection attempt.
    pub fn new(
        descriptor: Arc<ConnectionDescriptor>,
        options: PoolOptions,
        transport: Arc<dyn Transport>,
        ssl_profiles: BTreeSet<String>,
    ) -> Arc<Self> {
        let max = options.max_connections.max(1);
        info!(
            dialect = %descriptor.dialect,
            address = %descriptor.address(),
            database = ?descriptor.database,
            max_connections = max,
            "Connection pool created"
        );
        Arc::new(Self {
            descriptor,
            semaphore: Arc::new(Semaphore::new(max)),
            options,
            transport,
            ssl_profiles,
            idle: Mutex::new(Vec::with_capacity(max)),
            size: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Get the descriptor this pool connects with.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Get the pool options.
    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Check if [`destroy_all`](Self::destroy_all) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Get the current counters.
    pub fn status(&self) -> PoolStatus {
        let size = self.size.load(Ordering::Acquire);
        let idle = self.idle.lock().len();
        PoolStatus {
            size,
            idle,
            in_use: size.saturating_sub(idle),
            max: self.options.max_connections.max(1),
        }
    }

    /// Borrow a connection.
    ///
    /// Waits until a slot is free, then reuses an idle healthy connection or
    /// opens a new one. The acquire timeout covers the whole call, opening
    /// included. Dropping the returned future before it completes gives the
    /// slot back and never leaves a connection behind.
    pub async fn acquire(self: &Arc<Self>) -> PoolResult<PooledConnection> {
        if self.is_destroyed() {
            return Err(ConnError::PoolDestroyed);
        }

        let timeout = self.options.acquire_timeout;
        match tokio::time::timeout(timeout, self.acquire_within_deadline()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    address = %self.descriptor.address(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out acquiring a pooled connection"
                );
                Err(ConnError::AcquireTimeout(timeout))
            }
        }
    }

    async fn acquire_within_deadline(self: &Arc<Self>) -> PoolResult<PooledConnection> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ConnError::PoolDestroyed)?;

        if let Some(idle) = self.take_idle() {
            debug!(
                connection_id = idle.id,
                wait_us = started.elapsed().as_micros() as u64,
                "Reusing idle connection"
            );
            return Ok(PooledConnection::new(self.clone(), idle.id, idle.conn, permit));
        }

        let conn = self.open().await?;
        if self.is_destroyed() {
            conn.close();
            return Err(ConnError::PoolDestroyed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.size.fetch_add(1, Ordering::AcqRel);
        debug!(
            connection_id = id,
            wait_us = started.elapsed().as_micros() as u64,
            "Opened new connection"
        );
        Ok(PooledConnection::new(self.clone(), id, conn, permit))
    }

    /// Return a borrowed connection.
    ///
    /// A connection the borrower marked unhealthy, or that fails its own
    /// health check, is closed instead of recycled.
    pub fn release(&self, conn: PooledConnection) {
        if !std::ptr::eq(Arc::as_ptr(&conn.pool), self) {
            warn!(
                connection_id = conn.id,
                "Connection released to a pool that does not own it"
            );
        }
        drop(conn);
    }

    /// Close every idle connection and make the pool terminal.
    ///
    /// Pending and later acquires fail with [`ConnError::PoolDestroyed`];
    /// borrowed connections are closed when they come back.
    pub fn destroy_all(&self) {
        // The flag flips under the idle lock so `put_back` either sees it or
        // pushes before the drain.
        let drained: Vec<IdleConnection> = {
            let mut idle = self.idle.lock();
            if self.destroyed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *idle)
        };
        self.semaphore.close();

        let closed = drained.len();
        for idle in drained {
            idle.conn.close();
        }
        self.size.fetch_sub(closed, Ordering::AcqRel);

        info!(
            address = %self.descriptor.address(),
            closed,
            still_borrowed = self.size.load(Ordering::Acquire),
            "Connection pool destroyed"
        );
    }

    fn take_idle(&self) -> Option<IdleConnection> {
        loop {
            let idle = self.idle.lock().pop()?;
            if idle.conn.is_healthy() {
                return Some(idle);
            }
            debug!(connection_id = idle.id, "Discarding unhealthy idle connection");
            idle.conn.close();
            self.size.fetch_sub(1, Ordering::AcqRel);
        }
    }

    async fn open(&self) -> PoolResult<Box<dyn PhysicalConnection>> {
        if let SslOption::NamedProfile(name) = &self.descriptor.ssl {
            if !self.ssl_profiles.contains(name) {
                return Err(ConnError::UnknownSslProfile(name.clone()));
            }
        }

        self.transport
            .connect(&self.descriptor)
            .await
            .map_err(|e| {
                let err = e.into_conn_error(&self.descriptor);
                debug!(error = %err, "Connection attempt failed");
                err
            })
    }

    fn put_back(&self, id: u64, conn: Box<dyn PhysicalConnection>, healthy: bool) {
        let healthy = healthy && conn.is_healthy();
        let rejected = {
            let mut idle = self.idle.lock();
            if healthy && !self.is_destroyed() {
                idle.push(IdleConnection { id, conn });
                None
            } else {
                Some(conn)
            }
        };

        if let Some(conn) = rejected {
            debug!(connection_id = id, healthy, "Closing returned connection");
            conn.close();
            self.size.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("descriptor", &self.descriptor.to_string())
            .field("status", &self.status())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// A connection borrowed from a [`Pool`].
///
/// Dropping the guard returns the connection like [`Pool::release`].
pub struct PooledConnection {
    pool: Arc<Pool>,
    id: u64,
    conn: Option<Box<dyn PhysicalConnection>>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        pool: Arc<Pool>,
        id: u64,
        conn: Box<dyn PhysicalConnection>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            id,
            conn: Some(conn),
            healthy: true,
            _permit: permit,
        }
    }

    /// Pool-assigned id of the physical connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Flag the connection as broken so it is closed on release.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    /// Descriptor the connection was opened with.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        self.pool.descriptor()
    }

    /// The pool that owns this connection.
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }
}

impl Deref for PooledConnection {
    type Target = dyn PhysicalConnection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("connection is present until the guard is dropped")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is present until the guard is dropped")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(self.id, conn, self.healthy);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("healthy", &self.healthy)
            .finish()
    }
}
