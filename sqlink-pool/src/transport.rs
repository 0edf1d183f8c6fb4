//! The seam between pools and the socket layer.
//!
//! Pools never look inside a connection: they only need to open one, ask
//! whether it is still usable, and close it.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use sqlink_connect::{ConnError, ConnectionDescriptor};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// A physical connection owned by a pool.
pub trait PhysicalConnection: Send + Sync + 'static {
    /// Whether the connection can be handed out again.
    fn is_healthy(&self) -> bool;

    /// Close the connection.
    fn close(self: Box<Self>) {}
}

/// Errors reported by a [`Transport`].
#[derive(Error, Debug)]
pub enum TransportError {
    /// Nothing is listening at the address.
    #[error("connection refused")]
    Refused,

    /// The connection was not established in time.
    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Convert to a [`ConnError`] that echoes the descriptor's address.
    pub fn into_conn_error(self, descriptor: &ConnectionDescriptor) -> ConnError {
        match self {
            Self::Refused => ConnError::ConnectionRefused {
                host: descriptor.host.clone(),
                port: descriptor.port,
            },
            Self::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                ConnError::ConnectionRefused {
                    host: descriptor.host.clone(),
                    port: descriptor.port,
                }
            }
            other => ConnError::Transport {
                host: descriptor.host.clone(),
                port: descriptor.port,
                message: other.to_string(),
            },
        }
    }
}

/// Opens physical connections for a descriptor.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection.
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn PhysicalConnection>, TransportError>;
}

/// Plain TCP transport.
///
/// TLS and the database handshake are left to the driver layered on top.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn PhysicalConnection>, TransportError> {
        debug!(address = %descriptor.address(), "Opening TCP connection");
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((descriptor.host.as_str(), descriptor.port)),
        )
        .await
        .map_err(|_| TransportError::TimedOut(self.connect_timeout))?
        .map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => TransportError::Refused,
            _ => TransportError::Io(e),
        })?;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(peer = %peer, "TCP connection established");
        Ok(Box::new(TcpConnection { stream, peer }))
    }
}

/// A TCP connection opened by [`TcpTransport`].
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpConnection {
    /// Address of the server.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The underlying stream.
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl PhysicalConnection for TcpConnection {
    fn is_healthy(&self) -> bool {
        matches!(self.stream.take_error(), Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlink_connect::Dialect;
    use tokio::net::TcpListener;

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_tcp_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let desc = ConnectionDescriptor::new(Dialect::MySql, "127.0.0.1", port);

        let conn = TcpTransport::default().connect(&desc).await.unwrap();
        assert!(conn.is_healthy());
    }

    #[tokio::test]
    async fn test_tcp_refused() {
        let port = closed_port().await;
        let desc = ConnectionDescriptor::new(Dialect::MySql, "127.0.0.1", port);

        let err = match TcpTransport::default().connect(&desc).await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail"),
        };
        assert!(matches!(err, TransportError::Refused));
        assert_eq!(
            err.into_conn_error(&desc),
            ConnError::ConnectionRefused {
                host: "127.0.0.1".to_string(),
                port,
            }
        );
    }

    #[test]
    fn test_other_errors_keep_address() {
        let desc = ConnectionDescriptor::new(Dialect::Postgres, "db", 5432);
        let err = TransportError::TimedOut(Duration::from_millis(10)).into_conn_error(&desc);
        assert_eq!(
            err,
            ConnError::Transport {
                host: "db".to_string(),
                port: 5432,
                message: "timed out after 10ms".to_string(),
            }
        );
    }
}
