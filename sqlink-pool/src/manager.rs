//! Registry of pools keyed by descriptor.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use sqlink_connect::{ConnectionDescriptor, DialectRegistry, PoolOptions};
use tracing::debug;

use crate::pool::{Pool, PoolResult, PooledConnection};
use crate::transport::{TcpTransport, Transport};

/// Owns the pools created through it.
///
/// Pools are keyed by descriptor *equality*: two descriptors built from
/// different but equal inputs share a pool, and any differing field
/// (password included) gets a pool of its own. Managers never share state
/// with each other.
///
/// [`destroy_all`](Self::destroy_all) is terminal: afterwards every pool
/// handed out is already destroyed.
pub struct PoolManager {
    registry: DialectRegistry,
    transport: Arc<dyn Transport>,
    options: PoolOptions,
    pools: Mutex<HashMap<ConnectionDescriptor, Arc<Pool>>>,
    destroyed: AtomicBool,
}

impl PoolManager {
    /// Create a manager using plain TCP and the built-in dialect rules.
    pub fn new(options: PoolOptions) -> Self {
        let transport = Arc::new(TcpTransport::new(options.connect_timeout));
        Self::with_transport(options, DialectRegistry::builtin(), transport)
    }

    /// Create a manager with a custom registry and transport.
    pub fn with_transport(
        options: PoolOptions,
        registry: DialectRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            transport,
            options,
            pools: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Get the live pool for `descriptor`, creating it if needed.
    ///
    /// Creating a pool opens no connection. A destroyed pool is replaced,
    /// unless the manager itself was destroyed: then the returned pool is
    /// destroyed too and is not registered.
    pub fn get_pool(&self, descriptor: &ConnectionDescriptor) -> Arc<Pool> {
        let mut pools = self.pools.lock();
        if self.is_destroyed() {
            let pool = self.new_pool(descriptor);
            pool.destroy_all();
            return pool;
        }
        if let Some(pool) = pools.get(descriptor) {
            if !pool.is_destroyed() {
                debug!(descriptor = %descriptor, "Reusing connection pool");
                return pool.clone();
            }
        }

        let pool = self.new_pool(descriptor);
        pools.insert(descriptor.clone(), pool.clone());
        pool
    }

    fn new_pool(&self, descriptor: &ConnectionDescriptor) -> Arc<Pool> {
        let ssl_profiles: BTreeSet<String> = self
            .registry
            .rules(descriptor.dialect)
            .map(|rules| rules.ssl_profiles.clone())
            .unwrap_or_default();
        Pool::new(
            Arc::new(descriptor.clone()),
            self.options.clone(),
            self.transport.clone(),
            ssl_profiles,
        )
    }

    /// Borrow a connection from the pool for `descriptor`.
    pub async fn acquire(&self, descriptor: &ConnectionDescriptor) -> PoolResult<PooledConnection> {
        self.get_pool(descriptor).acquire().await
    }

    /// Destroy every pool of this manager and stop creating live ones.
    pub fn destroy_all(&self) {
        let pools: Vec<Arc<Pool>> = {
            let mut pools = self.pools.lock();
            self.destroyed.store(true, Ordering::Release);
            pools.drain().map(|(_, p)| p).collect()
        };
        for pool in pools {
            pool.destroy_all();
        }
    }

    /// Check if [`destroy_all`](Self::destroy_all) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Number of pools currently registered.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Check if no pool is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the dialect registry.
    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.len())
            .field("options", &self.options)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
