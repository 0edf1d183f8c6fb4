//! Connection pooling for sqlink.
//!
//! Pools are created lazily by a [`PoolManager`] and keyed by
//! [`ConnectionDescriptor`](sqlink_connect::ConnectionDescriptor) equality.
//! Physical connections are opened through a [`Transport`]; the default
//! [`TcpTransport`] opens plain TCP sockets.
//!
//! ```rust,no_run
//! use sqlink_connect::{PoolOptions, parse};
//! use sqlink_pool::PoolManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PoolManager::new(PoolOptions::default());
//! let desc = parse("postgres://app@127.0.0.1/orders")?;
//!
//! let conn = manager.acquire(&desc).await?;
//! println!("borrowed connection {}", conn.id());
//! drop(conn);
//!
//! manager.destroy_all();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod manager;
pub mod pool;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::Client;
pub use manager::PoolManager;
pub use pool::{Pool, PoolResult, PoolStatus, PooledConnection};
pub use transport::{PhysicalConnection, TcpConnection, TcpTransport, Transport, TransportError};
