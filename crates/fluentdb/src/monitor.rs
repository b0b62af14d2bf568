//! Query log sinks.
//!
//! When debug mode is on, a [`Session`](crate::Session) appends every
//! statement to its in-memory log and hands a [`QueryEvent`] to its
//! [`QuerySink`]. Sinks are the pluggable observation channel:
//!
//! ```rust,ignore
//! use fluentdb::{QueryEvent, Session, TracingSink};
//!
//! let session = Session::connect(config).await?.with_sink(TracingSink::new());
//!
//! // Any closure works too.
//! let session = session.with_sink(|event: &QueryEvent| println!("{}", event.inline_sql));
//! ```

use std::fmt;
use tracing::Level;

/// The type of SQL operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    /// Anything else (DDL, `SHOW`, `BEGIN`, ...)
    Other,
}

impl QueryType {
    /// Detect the query type from the leading keyword.
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default();

        if keyword.eq_ignore_ascii_case("SELECT") {
            QueryType::Select
        } else if keyword.eq_ignore_ascii_case("INSERT") {
            QueryType::Insert
        } else if keyword.eq_ignore_ascii_case("UPDATE") {
            QueryType::Update
        } else if keyword.eq_ignore_ascii_case("DELETE") {
            QueryType::Delete
        } else {
            QueryType::Other
        }
    }
}

/// A logged statement.
#[derive(Debug, Clone)]
pub struct QueryEvent {
    /// The SQL text as executed (with `$n` placeholders).
    pub sql: String,
    /// The SQL with bound values substituted as literals, for display.
    pub inline_sql: String,
    /// Number of bound parameters.
    pub param_count: usize,
    /// Detected query type.
    pub query_type: QueryType,
}

impl QueryEvent {
    /// An event for SQL without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            query_type: QueryType::from_sql(&sql),
            inline_sql: sql.clone(),
            sql,
            param_count: 0,
        }
    }

    pub(crate) fn with_params(mut self, inline_sql: String, param_count: usize) -> Self {
        self.inline_sql = inline_sql;
        self.param_count = param_count;
        self
    }
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inline_sql)
    }
}

/// Receives every statement logged while debug mode is on.
pub trait QuerySink: Send + Sync {
    fn on_query(&self, event: &QueryEvent);
}

impl<F> QuerySink for F
where
    F: Fn(&QueryEvent) + Send + Sync,
{
    fn on_query(&self, event: &QueryEvent) {
        self(event)
    }
}

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl QuerySink for NoopSink {
    fn on_query(&self, _event: &QueryEvent) {}
}

fn truncate(sql: &str, max: Option<usize>) -> String {
    match max {
        Some(max) if sql.len() > max => {
            let mut end = max;
            while end > 0 && !sql.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &sql[..end])
        }
        _ => sql.to_string(),
    }
}

/// A sink that prints statements to stderr.
#[derive(Debug, Clone)]
pub struct LoggingSink {
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
    /// Prefix for log lines.
    pub prefix: String,
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self {
            max_sql_length: Some(200),
            prefix: "[fluentdb]".to_string(),
        }
    }
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub(crate) fn format(&self, event: &QueryEvent) -> String {
        format!(
            "{} [{:?}] {}",
            self.prefix,
            event.query_type,
            truncate(&event.inline_sql, self.max_sql_length)
        )
    }
}

impl QuerySink for LoggingSink {
    fn on_query(&self, event: &QueryEvent) {
        eprintln!("{}", self.format(event));
    }
}

/// A `tracing`-based sink emitting one event per statement on target
/// `fluentdb.sql`.
#[derive(Debug, Clone)]
pub struct TracingSink {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }
}

impl QuerySink for TracingSink {
    fn on_query(&self, event: &QueryEvent) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    _ => tracing::trace!($($field)*),
                }
            };
        }

        let sql = truncate(&event.sql, self.max_sql_length);
        emit_at_level!(
            self.level,
            target: "fluentdb.sql",
            query_type = ?event.query_type,
            param_count = event.param_count,
            sql = %sql,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn query_type_detection() {
        assert_eq!(QueryType::from_sql("SELECT * FROM users"), QueryType::Select);
        assert_eq!(QueryType::from_sql("  select COUNT(*) FROM users"), QueryType::Select);
        assert_eq!(
            QueryType::from_sql("INSERT INTO users (name) VALUES ($1)"),
            QueryType::Insert
        );
        assert_eq!(QueryType::from_sql("UPDATE users SET a = $1"), QueryType::Update);
        assert_eq!(QueryType::from_sql("DELETE FROM users"), QueryType::Delete);
        assert_eq!(QueryType::from_sql("CREATE TABLE t (id INT)"), QueryType::Other);
        assert_eq!(QueryType::from_sql(""), QueryType::Other);
    }

    #[test]
    fn logging_sink_truncates() {
        let sink = LoggingSink::new().max_sql_length(10).prefix("[db]");
        let line = sink.format(&QueryEvent::new("SELECT * FROM users"));
        assert_eq!(line, "[db] [Select] SELECT * F...");

        let line = LoggingSink::new().no_truncate().format(&QueryEvent::new("SELECT 1"));
        assert_eq!(line, "[fluentdb] [Select] SELECT 1");
    }

    #[test]
    fn closures_are_sinks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink = move |event: &QueryEvent| captured.lock().unwrap().push(event.sql.clone());

        sink.on_query(&QueryEvent::new("SELECT 1"));
        sink.on_query(&QueryEvent::new("SELECT 2"));
        assert_eq!(*seen.lock().unwrap(), ["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingSink::new()
            .level(Level::INFO)
            .on_query(&QueryEvent::new("DELETE FROM users"));
    }
}
