//! Session configuration.

use crate::error::{DbError, DbResult};
use std::time::Duration;

/// What a session does when a statement fails during a raw query or a
/// builder terminal call.
///
/// Connection, transaction and timeout errors always propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure with `tracing::warn!` and return the empty/default
    /// result (no rows, `0`, `None`, `Value::Null`).
    #[default]
    Absorb,
    /// Return [`DbError::Query`].
    Propagate,
}

/// Configuration for [`Session::connect`](crate::Session::connect).
///
/// `host`, `username`, `password` and `database` are required; everything
/// else has a default.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Server port. Default: 5432.
    pub port: u16,
    /// Timeout for establishing the connection. `None` uses the driver default.
    pub connect_timeout: Option<Duration>,
    /// Default deadline for every statement. `None` means no timeout (default).
    pub query_timeout: Option<Duration>,
    /// Start with debug mode (query log) enabled.
    pub debug: bool,
    /// Statement failure handling.
    pub failure_policy: FailurePolicy,
    /// Reject UPDATE/DELETE without any WHERE entry. Default: `false`.
    pub guard_unfiltered_mutations: bool,
}

/// Environment variables read by [`SessionConfig::from_env`].
pub const ENV_HOST: &str = "FLUENTDB_HOST";
pub const ENV_USER: &str = "FLUENTDB_USER";
pub const ENV_PASSWORD: &str = "FLUENTDB_PASSWORD";
pub const ENV_DATABASE: &str = "FLUENTDB_DATABASE";
pub const ENV_PORT: &str = "FLUENTDB_PORT";

impl SessionConfig {
    /// Create a configuration from the four required options.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            database: database.into(),
            port: 5432,
            connect_timeout: None,
            query_timeout: None,
            debug: false,
            failure_policy: FailurePolicy::default(),
            guard_unfiltered_mutations: false,
        }
    }

    /// Read the configuration from `FLUENTDB_*` environment variables.
    ///
    /// `FLUENTDB_PASSWORD` may be empty; `FLUENTDB_PORT` is optional.
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| DbError::config(format!("{key} is not set")))
        };

        let mut config = Self::new(
            required(ENV_HOST)?,
            required(ENV_USER)?,
            lookup(ENV_PASSWORD).unwrap_or_default(),
            required(ENV_DATABASE)?,
        );
        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .parse()
                .map_err(|_| DbError::config(format!("{ENV_PORT} is not a port: '{port}'")))?;
        }
        Ok(config)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the default statement deadline.
    ///
    /// Statements exceeding it are cancelled and return [`DbError::Timeout`].
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Refuse UPDATE/DELETE statements that carry no WHERE entry.
    pub fn guard_unfiltered_mutations(mut self, enabled: bool) -> Self {
        self.guard_unfiltered_mutations = enabled;
        self
    }

    /// Check that every required option is present.
    pub fn validate(&self) -> DbResult<()> {
        for (name, value) in [
            ("host", &self.host),
            ("username", &self.username),
            ("database", &self.database),
        ] {
            if value.trim().is_empty() {
                return Err(DbError::config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Driver configuration for this session.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.host)
            .port(self.port)
            .user(&self.username)
            .password(&self.password)
            .dbname(&self.database)
            .application_name("fluentdb");
        if let Some(timeout) = self.connect_timeout {
            pg.connect_timeout(timeout);
        }
        pg
    }
}
