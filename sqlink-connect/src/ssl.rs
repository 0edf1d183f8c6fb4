//! SSL option resolution.
//!
//! URI query values are always strings, so `?ssl=...` is ambiguous: it may
//! carry inline JSON options or the name of an SSL profile the driver knows
//! about. A string is first parsed as a JSON object; only if that fails is it
//! taken as a profile name.
//!
//! ```rust
//! use serde_json::json;
//! use sqlink_connect::{SslOption, resolve_ssl_str};
//!
//! assert_eq!(
//!     resolve_ssl_str("Knex Test"),
//!     SslOption::NamedProfile("Knex Test".to_string())
//! );
//!
//! let inline = resolve_ssl_str(r#"{"rejectUnauthorized": false}"#);
//! assert_eq!(inline.inline_options().unwrap()["rejectUnauthorized"], json!(false));
//! ```

use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::ResolveError;

/// Resolved SSL setting of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SslOption {
    /// Not configured; the driver decides.
    None,
    /// TLS is off.
    #[default]
    Disabled,
    /// TLS with driver options given inline.
    InlineOptions(Map<String, Value>),
    /// TLS with a profile registered under this name.
    NamedProfile(String),
}

impl SslOption {
    /// Check if TLS is requested.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::InlineOptions(_) | Self::NamedProfile(_))
    }

    /// Get the inline options, if any.
    pub fn inline_options(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::InlineOptions(map) => Some(map),
            _ => None,
        }
    }

    /// Get the profile name, if any.
    pub fn profile_name(&self) -> Option<&str> {
        match self {
            Self::NamedProfile(name) => Some(name),
            _ => None,
        }
    }

    /// Render the option the way it would appear as a URI query value.
    ///
    /// Returns `None` when no `ssl` parameter is needed.
    pub fn to_query_value(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Disabled => Some("false".to_string()),
            Self::InlineOptions(map) => Some(Value::Object(map.clone()).to_string()),
            Self::NamedProfile(name) => Some(name.clone()),
        }
    }

    /// Like [`to_query_value`](Self::to_query_value), but inline option
    /// values are replaced by `****`. Key files and passphrases may appear
    /// there, so this is the form used for logs.
    pub fn to_masked_query_value(&self) -> Option<String> {
        match self {
            Self::InlineOptions(map) => {
                let masked: Map<String, Value> = map
                    .keys()
                    .map(|k| (k.clone(), Value::String("****".to_string())))
                    .collect();
                Some(Value::Object(masked).to_string())
            }
            other => other.to_query_value(),
        }
    }
}

impl Hash for SslOption {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::None | Self::Disabled => {}
            Self::InlineOptions(map) => hash_object(map, state),
            Self::NamedProfile(name) => name.hash(state),
        }
    }
}

// Entries are hashed in key order so the result does not depend on the
// map's iteration order.
fn hash_object<H: Hasher>(map: &Map<String, Value>, state: &mut H) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries.len().hash(state);
    for (key, value) in entries {
        key.hash(state);
        hash_value(value, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Number(n) => n.to_string().hash(state),
        Value::String(s) => s.hash(state),
        Value::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => hash_object(map, state),
    }
}

/// Resolve a raw `ssl` value taken from a URI query string.
///
/// Never fails: a string that isn't a JSON object is a profile name.
pub fn resolve_ssl_str(raw: &str) -> SslOption {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => {
            trace!(keys = map.len(), "ssl value parsed as inline options");
            SslOption::InlineOptions(map)
        }
        _ => {
            trace!("ssl value taken as profile name");
            SslOption::NamedProfile(raw.to_string())
        }
    }
}

/// Resolve a structured `ssl` value.
///
/// | input            | result                      |
/// |------------------|-----------------------------|
/// | absent, `false`  | [`SslOption::Disabled`]     |
/// | `null`           | [`SslOption::None`]         |
/// | `true`           | empty inline options        |
/// | object           | deep copy as inline options |
/// | string           | [`resolve_ssl_str`]         |
pub fn resolve_ssl(raw: Option<&Value>) -> Result<SslOption, ResolveError> {
    match raw {
        None | Some(Value::Bool(false)) => Ok(SslOption::Disabled),
        Some(Value::Null) => Ok(SslOption::None),
        Some(Value::Bool(true)) => Ok(SslOption::InlineOptions(Map::new())),
        Some(Value::Object(map)) => Ok(SslOption::InlineOptions(map.clone())),
        Some(Value::String(s)) => Ok(resolve_ssl_str(s)),
        Some(other @ (Value::Number(_) | Value::Array(_))) => {
            Err(ResolveError::InvalidSslValue(other.to_string()))
        }
    }
}
