//! Normalization of raw configuration into a [`ConnectionDescriptor`].
//!
//! The caller's configuration is only ever borrowed. Everything that ends
//! up in a descriptor is copied out of it, nested SSL mappings included,
//! so editing or reusing the input afterwards cannot reach a descriptor or
//! a pool keyed on one.
//!
//! ```rust
//! use serde_json::json;
//! use sqlink_connect::{ConfigNormalizer, RawConfig};
//!
//! let normalizer = ConfigNormalizer::default();
//! let raw = RawConfig::from_value(json!({
//!     "host": "127.0.0.1",
//!     "user": "root",
//!     "password": "test",
//!     "database": "test",
//! })).unwrap();
//!
//! let desc = normalizer.normalize_raw(Some("mysql2"), &raw).unwrap();
//! assert_eq!(desc.port, 3306);
//! assert_eq!(desc.database.as_deref(), Some("test"));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::descriptor::ConnectionDescriptor;
use crate::dialect::{DialectRegistry, DialectRules};
use crate::error::{ConnectError, ConnectResult, ParseError};
use crate::parser::ConnectionString;
use crate::ssl::{SslOption, resolve_ssl, resolve_ssl_str};

/// Caller-supplied connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawConfig {
    /// A connection URI.
    Uri(String),
    /// A structured mapping of `{host, port, user, password, database, ssl, ...}`.
    Map(Map<String, Value>),
}

impl RawConfig {
    /// Build a raw config from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        match value {
            Value::String(uri) => Ok(Self::Uri(uri)),
            Value::Object(map) => Ok(Self::Map(map)),
            other => Err(ParseError::invalid_field(
                "connection",
                format!("expected a URI string or an object, got {other}"),
            )),
        }
    }
}

impl From<&str> for RawConfig {
    fn from(uri: &str) -> Self {
        Self::Uri(uri.to_string())
    }
}

impl From<String> for RawConfig {
    fn from(uri: String) -> Self {
        Self::Uri(uri)
    }
}

impl From<Map<String, Value>> for RawConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self::Map(map)
    }
}

/// Keys of a mapping with a fixed meaning; everything else is a driver option.
const KNOWN_KEYS: &[&str] = &[
    "host",
    "port",
    "user",
    "username",
    "password",
    "database",
    "db",
    "ssl",
    "connectionString",
];

/// Turns raw configuration into descriptors using a dialect registry.
#[derive(Debug, Clone, Default)]
pub struct ConfigNormalizer {
    registry: DialectRegistry,
}

impl ConfigNormalizer {
    /// Create a normalizer over the given registry.
    pub fn new(registry: DialectRegistry) -> Self {
        Self { registry }
    }

    /// Get the registry.
    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }

    /// Normalize a structured mapping for the named dialect.
    ///
    /// Defaults fill only absent (or `null`) fields; explicit `0` and `""`
    /// are kept as given.
    pub fn normalize(
        &self,
        dialect: &str,
        raw: &Map<String, Value>,
    ) -> ConnectResult<ConnectionDescriptor> {
        let rules = self.registry.lookup(dialect)?;
        let mut fields = match raw.get("connectionString") {
            Some(Value::String(uri)) => {
                let conn = ConnectionString::parse_with(uri, &self.registry)?;
                check_same_dialect(rules, &conn)?;
                Fields::from_connection_string(&conn)
            }
            Some(Value::Null) | None => Fields::default(),
            Some(_) => {
                return Err(
                    ParseError::invalid_field("connectionString", "expected a string").into(),
                );
            }
        };
        fields.merge_map(raw)?;
        Ok(self.finish(rules, fields))
    }

    /// Normalize a parsed connection string.
    pub fn from_connection_string(
        &self,
        conn: &ConnectionString,
    ) -> ConnectResult<ConnectionDescriptor> {
        let rules = self.registry.rules(conn.dialect())?;
        Ok(self.finish(rules, Fields::from_connection_string(conn)))
    }

    /// Parse and normalize a connection URI.
    pub fn parse(&self, uri: &str) -> ConnectResult<ConnectionDescriptor> {
        let conn = ConnectionString::parse_with(uri, &self.registry)?;
        self.from_connection_string(&conn)
    }

    /// Normalize either form of raw configuration.
    ///
    /// For a URI the dialect comes from the scheme; `dialect`, when given,
    /// must name the same dialect. A mapping requires `dialect`.
    pub fn normalize_raw(
        &self,
        dialect: Option<&str>,
        raw: &RawConfig,
    ) -> ConnectResult<ConnectionDescriptor> {
        match raw {
            RawConfig::Uri(uri) => {
                let conn = ConnectionString::parse_with(uri, &self.registry)?;
                if let Some(name) = dialect {
                    check_same_dialect(self.registry.lookup(name)?, &conn)?;
                }
                self.from_connection_string(&conn)
            }
            RawConfig::Map(map) => {
                let name = dialect.ok_or_else(|| {
                    ParseError::invalid_field("client", "a dialect is required for a mapping")
                })?;
                self.normalize(name, map)
            }
        }
    }

    fn finish(&self, rules: &DialectRules, fields: Fields) -> ConnectionDescriptor {
        let desc = ConnectionDescriptor {
            dialect: rules.dialect,
            host: fields.host.unwrap_or_else(|| rules.default_host.clone()),
            port: fields.port.unwrap_or(rules.default_port),
            user: fields.user,
            password: fields.password,
            database: fields.database,
            ssl: fields.ssl.unwrap_or(SslOption::Disabled),
            options: fields.options,
        };
        debug!(descriptor = %desc, ssl_enabled = desc.ssl.is_enabled(), "Configuration normalized");
        desc
    }
}

/// Normalize a mapping against the built-in dialects.
pub fn normalize(dialect: &str, raw: &Map<String, Value>) -> ConnectResult<ConnectionDescriptor> {
    ConfigNormalizer::default().normalize(dialect, raw)
}

/// Parse a URI into a descriptor against the built-in dialects.
pub fn parse(uri: &str) -> ConnectResult<ConnectionDescriptor> {
    ConfigNormalizer::default().parse(uri)
}

fn check_same_dialect(rules: &DialectRules, conn: &ConnectionString) -> Result<(), ParseError> {
    if rules.dialect != conn.dialect() {
        return Err(ParseError::invalid_field(
            "client",
            format!(
                "client is {} but the connection string is for {}",
                rules.dialect,
                conn.dialect()
            ),
        ));
    }
    Ok(())
}

/// Fields gathered before defaults are applied.
#[derive(Debug, Default)]
struct Fields {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    ssl: Option<SslOption>,
    options: BTreeMap<String, String>,
}

impl Fields {
    fn from_connection_string(conn: &ConnectionString) -> Self {
        let parsed = conn.parsed();
        Self {
            host: Some(parsed.host.clone()),
            port: parsed.port,
            user: parsed.user.clone(),
            password: parsed.password.clone(),
            database: parsed.database.clone(),
            ssl: parsed.param("ssl").map(resolve_ssl_str),
            options: parsed
                .params
                .iter()
                .filter(|(k, _)| k.as_str() != "ssl")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn merge_map(&mut self, raw: &Map<String, Value>) -> Result<(), ConnectError> {
        if let Some(host) = string_field(raw, "host")? {
            self.host = Some(host);
        }
        if let Some(port) = port_field(raw)? {
            self.port = Some(port);
        }
        if let Some(user) = string_field(raw, "user")?.or(string_field(raw, "username")?) {
            self.user = Some(user);
        }
        if let Some(password) = string_field(raw, "password")? {
            self.password = Some(password);
        }
        if let Some(database) = string_field(raw, "database")?.or(string_field(raw, "db")?) {
            self.database = Some(database);
        }
        if raw.contains_key("ssl") {
            self.ssl = Some(resolve_ssl(raw.get("ssl"))?);
        }

        for (key, value) in raw {
            if KNOWN_KEYS.contains(&key.as_str()) {
                continue;
            }
            match value {
                Value::Null => {}
                Value::String(s) => {
                    self.options.insert(key.clone(), s.clone());
                }
                other => {
                    self.options.insert(key.clone(), other.to_string());
                }
            }
        }

        Ok(())
    }
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Result<Option<String>, ParseError> {
    match raw.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ParseError::invalid_field(
            key,
            format!("expected a string, got {other}"),
        )),
    }
}

fn port_field(raw: &Map<String, Value>) -> Result<Option<u16>, ParseError> {
    match raw.get("port") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .map(Some)
            .ok_or_else(|| ParseError::InvalidPort(n.to_string())),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ParseError::InvalidPort(s.clone())),
        Some(other) => Err(ParseError::InvalidPort(match other {
            Value::String(s) => s.clone(),
            v => v.to_string(),
        })),
    }
}
