//! The execution seam between table builders and a database session.

use crate::error::DbResult;
use crate::row::Row;
use crate::sql::Sql;
use std::future::Future;
use std::time::Duration;

/// Something a [`Table`](crate::Table) builder can run its statements on.
///
/// [`Session`](crate::Session) is the production implementation: it logs the
/// statement, applies the deadline and the session's failure policy, then
/// executes it. Implementations must log before executing so that a failed
/// statement still shows up in the query log.
pub trait Executor: Send + Sync {
    /// Run a row-returning statement.
    ///
    /// `deadline` overrides the session's default statement timeout.
    fn fetch(
        &self,
        stmt: &Sql,
        deadline: Option<Duration>,
    ) -> impl Future<Output = DbResult<Vec<Row>>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        stmt: &Sql,
        deadline: Option<Duration>,
    ) -> impl Future<Output = DbResult<u64>> + Send;

    /// Name of the primary key column of `table`, or `None` when the table
    /// has no primary key (or does not exist).
    fn primary_key(
        &self,
        table: &str,
        deadline: Option<Duration>,
    ) -> impl Future<Output = DbResult<Option<String>>> + Send;

    /// Whether UPDATE/DELETE without any WHERE entry must be refused.
    fn guards_unfiltered_mutations(&self) -> bool {
        false
    }
}
