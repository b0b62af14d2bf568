//! The database session: one connection, one transaction slot, one query log.

use crate::config::{FailurePolicy, SessionConfig};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::monitor::{QueryEvent, QuerySink, TracingSink};
use crate::row::{Row, describe};
use crate::sql::Sql;
use crate::table::Table;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::NoTls;

/// Primary key lookup. Composite keys report their first column.
const PRIMARY_KEY_SQL: &str = "SELECT a.attname::text \
     FROM pg_index i \
     JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
     WHERE i.indrelid = $1::text::regclass AND i.indisprimary \
     ORDER BY array_position(i.indkey::int2[], a.attnum) \
     LIMIT 1";

/// A database session owning a single Postgres connection.
///
/// # Example
///
/// ```ignore
/// use fluentdb::{Comparator, Session, SessionConfig};
///
/// let session = Session::connect(SessionConfig::new("localhost", "app", "secret", "shop")).await?;
///
/// let active = session
///     .table("users")
///     .filter("status", Comparator::Eq, "active")
///     .find_many()
///     .await?;
///
/// session.close().await?;
/// ```
pub struct Session {
    client: tokio_postgres::Client,
    connection: JoinHandle<()>,
    config: SessionConfig,
    debug: AtomicBool,
    log: Mutex<Vec<String>>,
    sink: Arc<dyn QuerySink>,
    in_transaction: AtomicBool,
    /// Set when a statement fails inside the open transaction. Postgres
    /// aborts the transaction at that point and turns COMMIT into ROLLBACK.
    tx_failed: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("debug", &self.is_debug())
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the connection.
    ///
    /// Fails with [`DbError::Connection`] when the server cannot be reached
    /// or rejects the credentials, and with [`DbError::Config`] when a
    /// required option is empty.
    pub async fn connect(config: SessionConfig) -> DbResult<Self> {
        config.validate()?;

        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(DbError::from_connect_error)?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "fluentdb", error = %e, "connection closed with error");
            }
        });

        tracing::debug!(
            target: "fluentdb",
            host = %config.host,
            port = config.port,
            database = %config.database,
            "session connected"
        );

        Ok(Self {
            client,
            connection,
            debug: AtomicBool::new(config.debug),
            config,
            log: Mutex::new(Vec::new()),
            sink: Arc::new(TracingSink::new()),
            in_transaction: AtomicBool::new(false),
            tx_failed: AtomicBool::new(false),
        })
    }

    /// Replace the sink that receives logged statements.
    pub fn with_sink<S: QuerySink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Replace the sink from an `Arc`.
    pub fn set_sink(&mut self, sink: Arc<dyn QuerySink>) {
        self.sink = sink;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a query builder bound to `table`. Does not touch the connection.
    pub fn table(&self, table: impl Into<String>) -> Table<'_, Session> {
        Table::new(self, table)
    }

    /// Execute arbitrary SQL and return its rows.
    ///
    /// Statements without a result set (DDL, DML without `RETURNING`) return
    /// no rows. A failing statement also returns no rows unless the session
    /// uses [`FailurePolicy::Propagate`].
    pub async fn raw_query(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.fetch(&Sql::new(sql), None).await
    }

    // ==================== Transactions ====================

    /// Begin a transaction.
    ///
    /// Fails with [`DbError::Transaction`] if one is already open on this
    /// session or the server refuses.
    pub async fn begin_transaction(&self) -> DbResult<()> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(DbError::transaction("a transaction is already open"));
        }
        self.tx_failed.store(false, Ordering::SeqCst);
        if let Err(err) = self.control("BEGIN").await {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(())
    }

    /// Commit the open transaction. Without one, this does nothing.
    ///
    /// If a statement failed inside the transaction (even one whose error
    /// was absorbed), the transaction is rolled back instead and this
    /// returns [`DbError::Transaction`].
    pub async fn commit(&self) -> DbResult<()> {
        if !self.end_transaction("COMMIT") {
            return Ok(());
        }
        if self.tx_failed.swap(false, Ordering::SeqCst) {
            self.control("ROLLBACK").await?;
            return Err(DbError::transaction(
                "transaction aborted by a failed statement; rolled back",
            ));
        }
        self.control("COMMIT").await
    }

    /// Roll back the open transaction. Without one, this does nothing.
    pub async fn rollback(&self) -> DbResult<()> {
        if !self.end_transaction("ROLLBACK") {
            return Ok(());
        }
        self.tx_failed.store(false, Ordering::SeqCst);
        self.control("ROLLBACK").await
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Release the transaction slot; `false` when none was open.
    fn end_transaction(&self, statement: &str) -> bool {
        let open = self.in_transaction.swap(false, Ordering::SeqCst);
        if !open {
            tracing::warn!(target: "fluentdb", statement, "no open transaction; ignoring");
        }
        open
    }

    async fn control(&self, statement: &str) -> DbResult<()> {
        self.with_deadline(None, self.client.batch_execute(statement))
            .await
            .map_err(|err| match err {
                DbError::Query(e) => DbError::from_transaction_error(e),
                other => other,
            })
    }

    // ==================== Query log ====================

    /// Toggle debug mode. While on, statements are appended to the query log
    /// and sent to the sink.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    /// Record `sql` in the query log and emit it to the sink, if debug mode
    /// is on. Terminal calls and [`Session::raw_query`] are logged the same way.
    pub fn log_query(&self, sql: &str) {
        self.log_event(QueryEvent::new(sql));
    }

    fn log_statement(&self, stmt: &Sql) {
        if !self.is_debug() {
            return;
        }
        let sql = stmt.to_sql();
        let inline = stmt.to_inline_sql();
        self.log_event(QueryEvent::new(sql).with_params(inline, stmt.params().len()));
    }

    fn log_event(&self, event: QueryEvent) {
        if !self.is_debug() {
            return;
        }
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.inline_sql.clone());
        self.sink.on_query(&event);
    }

    /// Logged statements in execution order (bound values shown as literals).
    pub fn query_log(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close the connection and wait for the connection task to finish.
    pub async fn close(self) -> DbResult<()> {
        let Session {
            client, connection, ..
        } = self;
        drop(client);
        connection
            .await
            .map_err(|e| DbError::Connection(format!("connection task failed: {e}")))?;
        tracing::debug!(target: "fluentdb", "session closed");
        Ok(())
    }

    // ==================== Execution ====================

    async fn with_deadline<T>(
        &self,
        deadline: Option<Duration>,
        future: impl Future<Output = Result<T, tokio_postgres::Error>>,
    ) -> DbResult<T> {
        let Some(limit) = deadline.or(self.config.query_timeout) else {
            return future.await.map_err(DbError::Query);
        };

        match tokio::time::timeout(limit, future).await {
            Ok(result) => result.map_err(DbError::Query),
            Err(_) => {
                let cancel_token = self.client.cancel_token();
                tokio::spawn(async move {
                    let _ = cancel_token.cancel_query(NoTls).await;
                });
                Err(DbError::Timeout(limit))
            }
        }
    }

    fn absorb<T>(&self, result: DbResult<T>, sql: &str, default: impl FnOnce() -> T) -> DbResult<T> {
        if let Err(err) = &result {
            if (err.is_query() || err.is_timeout()) && self.in_transaction() {
                self.tx_failed.store(true, Ordering::SeqCst);
            }
        }
        match result {
            Err(err) if err.is_query() && self.config.failure_policy == FailurePolicy::Absorb => {
                tracing::warn!(target: "fluentdb", error = %err, sql = %sql, "statement failed");
                Ok(default())
            }
            other => other,
        }
    }
}

impl Executor for Session {
    async fn fetch(&self, stmt: &Sql, deadline: Option<Duration>) -> DbResult<Vec<Row>> {
        self.log_statement(stmt);
        let sql = stmt.to_sql();
        let params = stmt.params_ref();
        let rows = self
            .with_deadline(deadline, self.client.query(sql.as_str(), &params))
            .await;
        let rows = self.absorb(rows, &sql, Vec::new)?;
        rows.iter().map(Row::from_pg).collect()
    }

    async fn execute(&self, stmt: &Sql, deadline: Option<Duration>) -> DbResult<u64> {
        self.log_statement(stmt);
        let sql = stmt.to_sql();
        let params = stmt.params_ref();
        let affected = self
            .with_deadline(deadline, self.client.execute(sql.as_str(), &params))
            .await;
        self.absorb(affected, &sql, || 0)
    }

    async fn primary_key(
        &self,
        table: &str,
        deadline: Option<Duration>,
    ) -> DbResult<Option<String>> {
        let row = self
            .with_deadline(deadline, self.client.query_opt(PRIMARY_KEY_SQL, &[&table]))
            .await;
        let row = self.absorb(row, PRIMARY_KEY_SQL, || None)?;
        row.map(|r| r.try_get::<_, String>(0))
            .transpose()
            .map_err(|e| DbError::decode("attname", describe(&e)))
    }

    fn guards_unfiltered_mutations(&self) -> bool {
        self.config.guard_unfiltered_mutations
    }
}
