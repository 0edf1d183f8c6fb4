//! Dialects and their connection rules.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::ParseError;

/// Database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dialect {
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
    /// CockroachDB (PostgreSQL wire protocol)
    CockroachDb,
    /// Amazon Redshift (PostgreSQL wire protocol)
    Redshift,
    /// Microsoft SQL Server
    MsSql,
    /// Oracle Database
    Oracle,
}

impl Dialect {
    /// All built-in dialects.
    pub const ALL: [Dialect; 6] = [
        Self::MySql,
        Self::Postgres,
        Self::CockroachDb,
        Self::Redshift,
        Self::MsSql,
        Self::Oracle,
    ];

    /// Get the canonical dialect name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::CockroachDb => "cockroachdb",
            Self::Redshift => "redshift",
            Self::MsSql => "mssql",
            Self::Oracle => "oracle",
        }
    }

    /// Get the default port for this dialect.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::CockroachDb => 26257,
            Self::Redshift => 5439,
            Self::MsSql => 1433,
            Self::Oracle => 1521,
        }
    }

    /// Client names and URI schemes that select this dialect.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::MySql => &["mysql", "mysql2", "mariadb"],
            Self::Postgres => &["postgres", "postgresql", "pg", "pgnative"],
            Self::CockroachDb => &["cockroachdb", "cockroach"],
            Self::Redshift => &["redshift"],
            Self::MsSql => &["mssql", "sqlserver", "tedious"],
            Self::Oracle => &["oracle", "oracledb"],
        }
    }

    /// SSL profiles the dialect's driver ships with.
    fn builtin_ssl_profiles(&self) -> &'static [&'static str] {
        match self {
            Self::MySql => &["Amazon RDS"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Connection rules for one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectRules {
    /// The dialect these rules apply to.
    pub dialect: Dialect,
    /// Host used when the configuration has none.
    pub default_host: String,
    /// Port used when the configuration has none.
    pub default_port: u16,
    /// Client names and URI schemes (lowercase) mapping to these rules.
    pub aliases: Vec<String>,
    /// Named SSL profiles known to the driver.
    ///
    /// Only consulted when a connection is attempted; an unknown name is
    /// never rejected while normalizing.
    pub ssl_profiles: BTreeSet<String>,
}

impl DialectRules {
    /// Create the built-in rules for a dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            default_host: "localhost".to_string(),
            default_port: dialect.default_port(),
            aliases: dialect.aliases().iter().map(|a| a.to_string()).collect(),
            ssl_profiles: dialect
                .builtin_ssl_profiles()
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Set the default host.
    pub fn default_host(mut self, host: impl Into<String>) -> Self {
        self.default_host = host.into();
        self
    }

    /// Set the default port.
    pub fn default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Add a client name or URI scheme alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    /// Register a named SSL profile.
    pub fn ssl_profile(mut self, name: impl Into<String>) -> Self {
        self.ssl_profiles.insert(name.into());
        self
    }

    /// Check if a named SSL profile is known.
    pub fn has_ssl_profile(&self, name: &str) -> bool {
        self.ssl_profiles.contains(name)
    }
}

/// Maps dialect names and URI schemes to [`DialectRules`].
///
/// A registry is a plain value: every client owns its own copy, so
/// registering a profile in one never affects another.
///
/// ```rust
/// use sqlink_connect::{Dialect, DialectRegistry};
///
/// let registry = DialectRegistry::builtin();
/// assert_eq!(registry.lookup("mysql2").unwrap().dialect, Dialect::MySql);
/// assert_eq!(registry.lookup("PostgreSQL").unwrap().default_port, 5432);
/// assert!(registry.lookup("nosql").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DialectRegistry {
    rules: HashMap<Dialect, DialectRules>,
    aliases: HashMap<String, Dialect>,
}

impl DialectRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Create a registry holding the rules of every built-in dialect.
    pub fn builtin() -> Self {
        Dialect::ALL
            .iter()
            .fold(Self::empty(), |registry, d| {
                registry.with_rules(DialectRules::new(*d))
            })
    }

    /// Register rules, replacing any previous rules for the same dialect.
    pub fn register(&mut self, rules: DialectRules) {
        debug!(dialect = %rules.dialect, aliases = ?rules.aliases, "Registering dialect rules");
        self.aliases.retain(|_, d| *d != rules.dialect);
        for alias in &rules.aliases {
            self.aliases.insert(alias.to_lowercase(), rules.dialect);
        }
        self.rules.insert(rules.dialect, rules);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_rules(mut self, rules: DialectRules) -> Self {
        self.register(rules);
        self
    }

    /// Look up rules by client name or URI scheme (case-insensitive).
    pub fn lookup(&self, name: &str) -> Result<&DialectRules, ParseError> {
        self.aliases
            .get(&name.to_lowercase())
            .and_then(|d| self.rules.get(d))
            .ok_or_else(|| ParseError::UnknownDialect(name.to_string()))
    }

    /// Get the rules for a dialect.
    pub fn rules(&self, dialect: Dialect) -> Result<&DialectRules, ParseError> {
        self.rules
            .get(&dialect)
            .ok_or_else(|| ParseError::UnknownDialect(dialect.name().to_string()))
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
