//! Logging setup for applications using sqlink.
//!
//! Every sqlink crate logs through `tracing`. Nothing is printed unless a
//! subscriber is installed; with the `tracing-subscriber` feature,
//! [`init`] installs one configured from the environment:
//!
//! - `SQLINK_DEBUG=true|1|yes` - enable debug logging
//! - `SQLINK_LOG_LEVEL=trace|debug|info|warn|error` - set the level
//! - `SQLINK_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! sqlink::logging::init();
//! ```
//!
//! Passwords and inline SSL option values never appear in log fields:
//! descriptors are logged through their masked `Display` form or by
//! address only.

use std::sync::Once;

use sqlink_connect::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

impl LogFormat {
    /// Parse a format name, falling back to JSON.
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "pretty" => Self::Pretty,
            "compact" => Self::Compact,
            _ => Self::Json,
        }
    }

    /// Name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        }
    }
}

/// Logging settings read from `SQLINK_*` variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// `SQLINK_DEBUG` is set to a truthy value.
    pub debug: bool,
    /// Explicit `SQLINK_LOG_LEVEL`, if valid.
    pub level: Option<&'static str>,
    /// Output format.
    pub format: LogFormat,
}

impl LogSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_source(&StdEnvSource)
    }

    /// Read settings from any environment source.
    pub fn from_source(source: &impl EnvSource) -> Self {
        let debug = source
            .get("SQLINK_DEBUG")
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let level = source
            .get("SQLINK_LOG_LEVEL")
            .and_then(|v| match v.to_lowercase().as_str() {
                "trace" => Some("trace"),
                "debug" => Some("debug"),
                "info" => Some("info"),
                "warn" => Some("warn"),
                "error" => Some("error"),
                _ => None,
            });
        let format = source
            .get("SQLINK_LOG_FORMAT")
            .map(|f| LogFormat::from_name(&f))
            .unwrap_or_default();

        Self {
            debug,
            level,
            format,
        }
    }

    /// Whether any logging was requested.
    pub fn is_requested(&self) -> bool {
        self.debug || self.level.is_some()
    }

    /// Effective level: the explicit level, else `debug` when debugging,
    /// else `warn`.
    pub fn level(&self) -> &'static str {
        match (self.level, self.debug) {
            (Some(level), _) => level,
            (None, true) => "debug",
            (None, false) => "warn",
        }
    }

    /// `EnvFilter` directive covering every sqlink crate.
    pub fn filter_directive(&self) -> String {
        let level = self.level();
        format!("sqlink={level},sqlink_connect={level},sqlink_pool={level}")
    }
}

/// Check if `SQLINK_DEBUG` enables debug logging.
pub fn is_debug_enabled() -> bool {
    LogSettings::from_env().debug
}

/// Install the sqlink subscriber from the process environment.
///
/// Does nothing when neither `SQLINK_DEBUG` nor `SQLINK_LOG_LEVEL` is set,
/// or when the `tracing-subscriber` feature is off. Later calls are no-ops.
pub fn init() {
    init_with(LogSettings::from_env());
}

/// Install the sqlink subscriber with explicit settings.
pub fn init_with(settings: LogSettings) {
    INIT.call_once(|| {
        if !settings.is_requested() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(settings.filter_directive())
                .unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match settings.format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = settings.level(),
                    format = settings.format.as_str(),
                    "sqlink logging initialized"
                );
            }
        }
    });
}
