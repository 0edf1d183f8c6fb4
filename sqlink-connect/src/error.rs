//! Error types for connection configuration and connection attempts.
//!
//! Errors are split by the layer that detects them:
//!
//! - [`ParseError`] - bad URI or mapping input, detected synchronously
//! - [`ResolveError`] - an `ssl` value of an unsupported shape
//! - [`ConnError`] - failures that only surface when a physical connection
//!   is attempted or a pool slot is requested
//!
//! [`ConnectError`] wraps all of them for callers that don't care which
//! layer failed.
//!
//! ```rust
//! use sqlink_connect::{ConnError, ParseError};
//!
//! let err = ConnError::ConnectionRefused { host: "127.0.0.1".into(), port: 601 };
//! assert_eq!(err.to_string(), "connect ECONNREFUSED 127.0.0.1:601");
//!
//! let err = ConnError::UnknownSslProfile("Knex Test".into());
//! assert_eq!(err.to_string(), "Unknown SSL profile 'Knex Test'");
//!
//! let err = ParseError::UnknownDialect("nosql".into());
//! assert!(err.to_string().contains("nosql"));
//! ```

use std::time::Duration;

use thiserror::Error;

/// Errors raised while parsing a connection URI or a configuration mapping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The URI scheme or client name does not name a known dialect.
    #[error("Unknown database dialect: {0}")]
    UnknownDialect(String),

    /// The URI could not be split into its components.
    #[error("Invalid connection URL: {0}")]
    MalformedUri(String),

    /// The port is not an unsigned 16-bit integer.
    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    /// A mapping field has the wrong type.
    #[error("Invalid option '{field}': {message}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// What was expected.
        message: String,
    },
}

impl ParseError {
    /// Create a malformed URI error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedUri(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while resolving structured `ssl` input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The `ssl` value is neither a boolean, a string, an object nor null.
    #[error("Invalid ssl option: expected a boolean, string or object, got {0}")]
    InvalidSslValue(String),
}

/// Errors raised when a physical connection is attempted or a pool slot
/// is requested.
///
/// None of these invalidate the pool: a later acquire may succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnError {
    /// Nothing was listening on the target address.
    #[error("connect ECONNREFUSED {host}:{port}")]
    ConnectionRefused {
        /// Host exactly as configured.
        host: String,
        /// Port exactly as configured.
        port: u16,
    },

    /// The named SSL profile is not registered for the dialect.
    #[error("Unknown SSL profile '{0}'")]
    UnknownSslProfile(String),

    /// No pool slot became free before the acquire timeout.
    #[error(
        "Timeout acquiring a connection after {}ms. The pool is probably full.",
        .0.as_millis()
    )]
    AcquireTimeout(Duration),

    /// The pool was destroyed.
    #[error("Connection pool has been destroyed")]
    PoolDestroyed,

    /// Any other transport failure.
    #[error("connect {host}:{port} failed: {message}")]
    Transport {
        /// Host exactly as configured.
        host: String,
        /// Port exactly as configured.
        port: u16,
        /// Transport error message.
        message: String,
    },
}

impl ConnError {
    /// Check if this is an acquire timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout(_))
    }

    /// Check if the pool was destroyed.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::PoolDestroyed)
    }
}

/// Any error produced by sqlink configuration or connection handling.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Parse error.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// SSL resolution error.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Connection error.
    #[error(transparent)]
    Conn(#[from] ConnError),

    /// Environment variable not found.
    #[error("Environment variable not found: {0}")]
    EnvNotFound(String),

    /// Invalid environment variable value.
    #[error("Invalid environment variable '{name}': {message}")]
    InvalidEnvValue {
        /// Variable name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConnectError {
    /// Get the parse error, if this is one.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }

    /// Get the connection error, if this is one.
    pub fn as_conn(&self) -> Option<&ConnError> {
        match self {
            Self::Conn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ConnectError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for configuration and connection operations.
pub type ConnectResult<T> = Result<T, ConnectError>;
