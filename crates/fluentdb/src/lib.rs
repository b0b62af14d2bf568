//! # fluentdb
//!
//! A small fluent query builder over a single PostgreSQL session.
//!
//! ## Features
//!
//! - **Table-scoped builder**: chain filters, ordering, grouping, limits and
//!   joins, then finish with one terminal call
//! - **Bound parameters**: values are never interpolated into SQL text
//! - **One session, one transaction slot**: explicit begin/commit/rollback
//! - **Query log**: debug mode records every statement and forwards it to a
//!   pluggable [`QuerySink`]
//!
//! ```ignore
//! use fluentdb::{record, Direction, Session, SessionConfig};
//!
//! let session = Session::connect(SessionConfig::from_env()?).await?;
//!
//! let id = session
//!     .table("users")
//!     .insert(record! { "name" => "Jane", "age" => 30 })
//!     .await?;
//!
//! let recent = session
//!     .table("users")
//!     .eq("status", "active")
//!     .order_by("created_at", Direction::Desc)
//!     .limit(10)
//!     .find_many()
//!     .await?;
//!
//! let adults = session.table("users").gte("age", 18).count().await?;
//! ```

pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod row;
pub mod session;
pub mod sql;
pub mod table;
pub mod transaction;
pub mod value;

pub use condition::{ClauseKind, Comparator, ConditionEntry, Direction};
pub use config::{FailurePolicy, SessionConfig};
pub use error::{DbError, DbResult};
pub use executor::Executor;
pub use monitor::{LoggingSink, NoopSink, QueryEvent, QuerySink, QueryType, TracingSink};
pub use row::Row;
pub use session::Session;
pub use sql::Sql;
pub use table::{Aggregate, Record, Table};
pub use value::{Value, coerce, literal};

/// Build a [`Record`] from `column => value` pairs, keeping their order.
///
/// ```ignore
/// let rec = fluentdb::record! { "name" => "Jane", "age" => 30 };
/// assert_eq!(rec[1].0, "age");
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($column:expr => $value:expr),+ $(,)?) => {
        ::std::vec![$((
            ::std::string::String::from($column),
            $crate::Value::from($value),
        )),+]
    };
}
