//! Client configuration.
//!
//! A [`ClientConfig`] is what an application hands to a client: which
//! dialect to use, how to reach the server, and how large the pool may grow.
//! It deserializes from JSON or TOML in the same shape applications already
//! use for their query builder:
//!
//! ```rust
//! use std::time::Duration;
//! use sqlink_connect::{ClientConfig, RawConfig};
//!
//! let config = ClientConfig::from_toml_str(r#"
//!     client = "mysql2"
//!
//!     [connection]
//!     host = "127.0.0.1"
//!     port = 3306
//!     user = "root"
//!
//!     [pool]
//!     max = 4
//!     acquireConnectionTimeout = 2000
//! "#).unwrap();
//!
//! assert!(matches!(config.connection, RawConfig::Map(_)));
//! assert_eq!(config.pool.max_connections, 4);
//! assert_eq!(config.pool.acquire_timeout, Duration::from_secs(2));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::descriptor::ConnectionDescriptor;
use crate::env::{EnvExpander, EnvSource};
use crate::error::{ConnectError, ConnectResult};
use crate::normalize::{ConfigNormalizer, RawConfig};

/// Pool sizing and waiting options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of physical connections.
    #[serde(alias = "max")]
    pub max_connections: usize,
    /// How long `acquire` waits for a free slot.
    #[serde(
        alias = "acquireConnectionTimeout",
        alias = "acquireTimeoutMillis",
        with = "duration_ms"
    )]
    pub acquire_timeout: Duration,
    /// Timeout for opening one physical connection.
    #[serde(alias = "connectTimeout", with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolOptions {
    /// Create default pool options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max connections.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Set acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Configuration of one client instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Dialect or driver name (`mysql2`, `pg`, ...). Optional when
    /// `connection` is a URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Connection URI or mapping.
    pub connection: RawConfig,
    /// Pool options.
    #[serde(default)]
    pub pool: PoolOptions,
}

impl ClientConfig {
    /// Create a configuration from a connection URI.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            client: None,
            connection: RawConfig::Uri(url.into()),
            pool: PoolOptions::default(),
        }
    }

    /// Create a configuration for a dialect with any raw connection.
    pub fn new(client: impl Into<String>, connection: impl Into<RawConfig>) -> Self {
        Self {
            client: Some(client.into()),
            connection: connection.into(),
            pool: PoolOptions::default(),
        }
    }

    /// Set pool options.
    pub fn pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(input: &str) -> ConnectResult<Self> {
        let config: Self = toml::from_str(input)?;
        info!(
            client = ?config.client,
            uri = matches!(config.connection, RawConfig::Uri(_)),
            max_connections = config.pool.max_connections,
            "ClientConfig loaded from TOML"
        );
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json_str(input: &str) -> ConnectResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Create a configuration from the `DATABASE_URL` variable of `expander`'s
    /// source, expanding references inside it.
    pub fn from_env<S: EnvSource>(expander: &EnvExpander<S>) -> ConnectResult<Self> {
        info!("Loading connection configuration from DATABASE_URL");
        let url = expander.var("DATABASE_URL")?;
        Ok(Self::from_url(expander.expand(&url)?))
    }

    /// Return a copy with `${VAR}` references in the connection expanded.
    pub fn expand_env<S: EnvSource>(&self, expander: &EnvExpander<S>) -> ConnectResult<Self> {
        let connection = match &self.connection {
            RawConfig::Uri(uri) => RawConfig::Uri(expander.expand(uri)?),
            RawConfig::Map(map) => {
                let value = expander.expand_value(&serde_json::Value::Object(map.clone()))?;
                RawConfig::from_value(value)?
            }
        };
        Ok(Self {
            client: self.client.clone(),
            connection,
            pool: self.pool.clone(),
        })
    }

    /// Resolve the connection into a descriptor.
    pub fn descriptor(&self, normalizer: &ConfigNormalizer) -> ConnectResult<ConnectionDescriptor> {
        if self.pool.max_connections == 0 {
            return Err(ConnectError::Config(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }
        normalizer.normalize_raw(self.client.as_deref(), &self.connection)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
