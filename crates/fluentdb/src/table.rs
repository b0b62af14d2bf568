//! Table-scoped fluent query builder.
//!
//! ```ignore
//! let adults = session
//!     .table("users")
//!     .select(["id", "name"])
//!     .gte("age", 18)
//!     .order_by("name", Direction::Asc)
//!     .limit(20)
//!     .find_many()
//!     .await?;
//! ```
//!
//! Modifiers consume and return the builder; terminal calls consume it and
//! run exactly one statement ([`Table::find`] and [`Table::insert`] first
//! look up the primary key). Table names, column names and join columns are
//! inserted verbatim and must come from trusted code. Values are always bound.

use crate::condition::{Comparator, ConditionEntry, Direction, push_conditions};
use crate::error::{DbError, DbResult};
use crate::executor::Executor;
use crate::row::Row;
use crate::session::Session;
use crate::sql::Sql;
use crate::value::{Value, coerce};
use std::fmt;
use std::time::Duration;

/// A column → value mapping for inserts and updates, in column order.
pub type Record = Vec<(String, Value)>;

/// Aggregate functions over a single column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Max,
    Avg,
    Sum,
}

impl Aggregate {
    pub fn as_sql(self) -> &'static str {
        match self {
            Aggregate::Max => "MAX",
            Aggregate::Avg => "AVG",
            Aggregate::Sum => "SUM",
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A query builder bound to one table and one executor.
#[must_use = "a table builder does nothing until a terminal method is awaited"]
pub struct Table<'e, E: Executor = Session> {
    executor: &'e E,
    name: String,
    columns: Option<Vec<String>>,
    entries: Vec<ConditionEntry>,
    timeout: Option<Duration>,
}

impl<E: Executor> fmt::Debug for Table<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("entries", &self.entries)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn into_record<K, V>(record: impl IntoIterator<Item = (K, V)>) -> Record
where
    K: Into<String>,
    V: Into<Value>,
{
    record
        .into_iter()
        .map(|(column, value)| (column.into(), coerce(value)))
        .collect()
}

fn with_conditions(mut sql: Sql, entries: &[ConditionEntry]) -> Sql {
    push_conditions(&mut sql, entries);
    sql
}

impl<'e, E: Executor> Table<'e, E> {
    /// Start a builder for `name` with no columns, no entries and no timeout.
    pub fn new(executor: &'e E, name: impl Into<String>) -> Self {
        Self {
            executor,
            name: name.into(),
            columns: None,
            entries: Vec::new(),
            timeout: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recorded condition entries in call order.
    pub fn entries(&self) -> &[ConditionEntry] {
        &self.entries
    }

    // ==================== Modifiers ====================

    /// Set the selected columns. Replaces any earlier selection; an empty
    /// list selects `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.columns = (!columns.is_empty()).then_some(columns);
        self
    }

    /// Add a `column <comparator> value` predicate. All predicates are ANDed.
    pub fn filter(
        mut self,
        column: impl Into<String>,
        comparator: impl Into<Comparator>,
        value: impl Into<Value>,
    ) -> Self {
        self.entries.push(ConditionEntry::Where {
            column: column.into(),
            comparator: comparator.into(),
            value: coerce(value),
        });
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Eq, value)
    }

    pub fn ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Neq, value)
    }

    pub fn gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Gt, value)
    }

    pub fn gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Gte, value)
    }

    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Lt, value)
    }

    pub fn lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Comparator::Lte, value)
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.entries.push(ConditionEntry::Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.entries.push(ConditionEntry::Group {
            column: column.into(),
        });
        self
    }

    /// Limit the result to `n` rows.
    pub fn limit(mut self, n: u64) -> Self {
        self.entries.push(ConditionEntry::Limit(n));
        self
    }

    /// `LIMIT 1`.
    pub fn limit_one(self) -> Self {
        self.limit(1)
    }

    /// Inner join `table` on `left = right`.
    pub fn join(
        mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.entries.push(ConditionEntry::Join {
            table: table.into(),
            left: left.into(),
            right: right.into(),
        });
        self
    }

    /// Deadline for the terminal statement, overriding the session default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    // ==================== Rendering ====================

    fn column_list(&self) -> String {
        match &self.columns {
            Some(columns) => columns.join(", "),
            None => "*".to_string(),
        }
    }

    /// `SELECT <columns> FROM <table> <conditions>`
    pub fn select_sql(&self) -> Sql {
        let sql = Sql::new(format!("SELECT {} FROM {}", self.column_list(), self.name));
        with_conditions(sql, &self.entries)
    }

    /// The statement [`Table::find`] runs once the primary key is known.
    ///
    /// The key predicate comes first and shares the single WHERE clause
    /// with any recorded predicates.
    pub fn find_sql(&self, primary_key: &str, id: impl Into<Value>) -> Sql {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.push(ConditionEntry::Where {
            column: primary_key.to_string(),
            comparator: Comparator::Eq,
            value: coerce(id),
        });
        entries.extend(self.entries.iter().cloned());

        let sql = Sql::new(format!("SELECT {} FROM {}", self.column_list(), self.name));
        with_conditions(sql, &entries)
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<vals>)` in record order.
    ///
    /// Recorded conditions are ignored. An empty record inserts
    /// `DEFAULT VALUES`.
    pub fn insert_sql(&self, record: &[(String, Value)]) -> Sql {
        if record.is_empty() {
            return Sql::new(format!("INSERT INTO {} DEFAULT VALUES", self.name));
        }

        let columns: Vec<&str> = record.iter().map(|(c, _)| c.as_str()).collect();
        let mut sql = Sql::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            self.name,
            columns.join(", ")
        ));
        sql.push_separated(record, ", ", |sql, (_, value)| {
            sql.push_bind(value.clone());
        })
        .push(")");
        sql
    }

    /// `UPDATE <table> SET c1 = v1, ... <conditions>`
    ///
    /// Without a WHERE entry this targets every row.
    pub fn update_sql(&self, record: &[(String, Value)]) -> Sql {
        let mut sql = Sql::new(format!("UPDATE {} SET ", self.name));
        sql.push_separated(record, ", ", |sql, (column, value)| {
            sql.push(column).push(" = ").push_bind(value.clone());
        });
        with_conditions(sql, &self.entries)
    }

    /// `DELETE FROM <table> <conditions>`
    ///
    /// Without a WHERE entry this targets every row.
    pub fn delete_sql(&self) -> Sql {
        let sql = Sql::new(format!("DELETE FROM {}", self.name));
        with_conditions(sql, &self.entries)
    }

    /// `SELECT <FN>(<column>) FROM <table> <conditions>`
    pub fn aggregate_sql(&self, function: Aggregate, column: &str) -> Sql {
        let sql = Sql::new(format!("SELECT {function}({column}) FROM {}", self.name));
        with_conditions(sql, &self.entries)
    }

    /// `SELECT COUNT(<columns>) FROM <table> <conditions>`, counting `*`
    /// when no columns are selected.
    pub fn count_sql(&self) -> Sql {
        let sql = Sql::new(format!(
            "SELECT COUNT({}) FROM {}",
            self.column_list(),
            self.name
        ));
        with_conditions(sql, &self.entries)
    }

    fn check_filtered(&self, stmt: &Sql) -> DbResult<()> {
        if self.executor.guards_unfiltered_mutations() && !self.entries.iter().any(|e| e.is_where())
        {
            return Err(DbError::UnfilteredMutation(stmt.to_inline_sql()));
        }
        Ok(())
    }

    // ==================== Terminals ====================

    /// Fetch the row whose primary key equals `id`.
    ///
    /// Returns `None` when the table has no primary key, when no row
    /// matches, or when the statement fails under the absorbing policy.
    pub async fn find(self, id: impl Into<Value>) -> DbResult<Option<Row>> {
        let Some(primary_key) = self.executor.primary_key(&self.name, self.timeout).await? else {
            tracing::debug!(target: "fluentdb", table = %self.name, "find: table has no primary key");
            return Ok(None);
        };
        let stmt = self.find_sql(&primary_key, id);
        let rows = self.executor.fetch(&stmt, self.timeout).await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch every matching row, in result order.
    pub async fn find_many(self) -> DbResult<Vec<Row>> {
        let stmt = self.select_sql();
        self.executor.fetch(&stmt, self.timeout).await
    }

    /// Insert one row and return its generated primary key.
    ///
    /// Returns [`Value::Null`] when the table has no primary key.
    ///
    /// ```ignore
    /// let id = session.table("users").insert(record! { "name" => "Jane", "age" => 30 }).await?;
    /// ```
    pub async fn insert<K, V>(self, record: impl IntoIterator<Item = (K, V)>) -> DbResult<Value>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let record = into_record(record);
        let mut stmt = self.insert_sql(&record);

        match self.executor.primary_key(&self.name, self.timeout).await? {
            Some(primary_key) => {
                stmt.push(" RETURNING ").push(&primary_key);
                let rows = self.executor.fetch(&stmt, self.timeout).await?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get_index(0))
                    .cloned()
                    .unwrap_or_default())
            }
            None => {
                self.executor.execute(&stmt, self.timeout).await?;
                Ok(Value::Null)
            }
        }
    }

    /// Update matching rows; returns the number of affected rows.
    pub async fn update<K, V>(self, record: impl IntoIterator<Item = (K, V)>) -> DbResult<u64>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let record = into_record(record);
        let stmt = self.update_sql(&record);
        self.check_filtered(&stmt)?;
        self.executor.execute(&stmt, self.timeout).await
    }

    /// Delete matching rows; returns the number of affected rows.
    pub async fn delete(self) -> DbResult<u64> {
        let stmt = self.delete_sql();
        self.check_filtered(&stmt)?;
        self.executor.execute(&stmt, self.timeout).await
    }

    /// Run an aggregate and return the raw result value.
    pub async fn aggregate(self, function: Aggregate, column: &str) -> DbResult<Value> {
        let stmt = self.aggregate_sql(function, column);
        let rows = self.executor.fetch(&stmt, self.timeout).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .cloned()
            .unwrap_or_default())
    }

    /// `MAX(column)` as a number; `0.0` over no rows.
    pub async fn max(self, column: &str) -> DbResult<f64> {
        Ok(self.aggregate(Aggregate::Max, column).await?.as_f64().unwrap_or(0.0))
    }

    /// `AVG(column)` as a number; `0.0` over no rows.
    pub async fn avg(self, column: &str) -> DbResult<f64> {
        Ok(self.aggregate(Aggregate::Avg, column).await?.as_f64().unwrap_or(0.0))
    }

    /// `SUM(column)` as a number; `0.0` over no rows.
    pub async fn sum(self, column: &str) -> DbResult<f64> {
        Ok(self.aggregate(Aggregate::Sum, column).await?.as_f64().unwrap_or(0.0))
    }

    /// Number of matching rows.
    pub async fn count(self) -> DbResult<i64> {
        let stmt = self.count_sql();
        let rows = self.executor.fetch(&stmt, self.timeout).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use std::sync::Mutex;

    /// Records statements and answers with canned results.
    #[derive(Default)]
    struct Recorder {
        statements: Mutex<Vec<String>>,
        lookup_deadlines: Mutex<Vec<Option<Duration>>>,
        primary_key: Option<String>,
        rows: Vec<Row>,
        affected: u64,
        guard: bool,
    }

    impl Recorder {
        fn with_pk(pk: &str) -> Self {
            Self {
                primary_key: Some(pk.to_string()),
                ..Self::default()
            }
        }

        fn returning(mut self, rows: Vec<Row>) -> Self {
            self.rows = rows;
            self
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl Executor for Recorder {
        async fn fetch(&self, stmt: &Sql, _: Option<Duration>) -> DbResult<Vec<Row>> {
            self.statements.lock().unwrap().push(stmt.to_inline_sql());
            Ok(self.rows.clone())
        }

        async fn execute(&self, stmt: &Sql, _: Option<Duration>) -> DbResult<u64> {
            self.statements.lock().unwrap().push(stmt.to_inline_sql());
            Ok(self.affected)
        }

        async fn primary_key(&self, _: &str, deadline: Option<Duration>) -> DbResult<Option<String>> {
            self.lookup_deadlines.lock().unwrap().push(deadline);
            Ok(self.primary_key.clone())
        }

        fn guards_unfiltered_mutations(&self) -> bool {
            self.guard
        }
    }

    fn single(column: &str, value: impl Into<Value>) -> Row {
        Row::new(vec![(column.to_string(), value.into())])
    }

    #[test]
    fn plain_select() {
        let db = Recorder::default();
        assert_eq!(Table::new(&db, "users").select_sql().to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn select_replaces_columns() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .select(["id"])
            .select(["id", "name"])
            .select_sql();
        assert_eq!(sql.to_sql(), "SELECT id, name FROM users");

        let empty: [&str; 0] = [];
        let sql = Table::new(&db, "users").select(["id"]).select(empty).select_sql();
        assert_eq!(sql.to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn filters_bind_coerced_values() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .eq("status", "active")
            .gt("age", "25")
            .select_sql();

        assert_eq!(sql.to_sql(), "SELECT * FROM users WHERE status = $1 AND age > $2");
        assert_eq!(sql.params(), &[Value::from("active"), Value::Int(25)]);
        assert_eq!(
            sql.to_inline_sql(),
            "SELECT * FROM users WHERE status = 'active' AND age > 25"
        );
    }

    #[test]
    fn comparator_names_are_accepted() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .filter("age", "GTE", 18)
            .filter("age", "LIKE", 99)
            .select_sql();
        assert_eq!(sql.to_inline_sql(), "SELECT * FROM users WHERE age >= 18 AND age = 99");
    }

    #[test]
    fn limit_one_and_order() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .order_by("created_at", Direction::Desc)
            .limit_one()
            .select_sql();
        assert_eq!(sql.to_sql(), "SELECT * FROM users ORDER BY created_at DESC LIMIT 1");
    }

    #[test]
    fn join_group_and_select() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .select(["users.name", "COUNT(orders.id) AS orders"])
            .join("orders", "orders.user_id", "users.id")
            .group_by("users.name")
            .select_sql();
        assert_eq!(
            sql.to_sql(),
            "SELECT users.name, COUNT(orders.id) AS orders FROM users \
             JOIN orders ON orders.user_id = users.id GROUP BY users.name"
        );
    }

    #[test]
    fn insert_keeps_record_order() {
        let db = Recorder::default();
        let table = Table::new(&db, "users");
        let record = into_record(record! { "name" => "Jane", "age" => 30 });
        let sql = table.insert_sql(&record);

        assert_eq!(sql.to_sql(), "INSERT INTO users (name, age) VALUES ($1, $2)");
        assert_eq!(
            sql.to_inline_sql(),
            "INSERT INTO users (name, age) VALUES ('Jane', 30)"
        );
        assert_eq!(table.insert_sql(&[]).to_sql(), "INSERT INTO users DEFAULT VALUES");
    }

    #[test]
    fn update_without_filter_targets_every_row() {
        let db = Recorder::default();
        let record = into_record(record! { "status" => "inactive" });

        let all = Table::new(&db, "users").update_sql(&record);
        assert_eq!(all.to_inline_sql(), "UPDATE users SET status = 'inactive'");

        let one = Table::new(&db, "users").eq("id", 7).update_sql(&record);
        assert_eq!(one.to_sql(), "UPDATE users SET status = $1 WHERE id = $2");
    }

    #[test]
    fn delete_and_aggregates() {
        let db = Recorder::default();
        assert_eq!(
            Table::new(&db, "users").lt("age", 18).delete_sql().to_sql(),
            "DELETE FROM users WHERE age < $1"
        );
        assert_eq!(
            Table::new(&db, "orders")
                .aggregate_sql(Aggregate::Avg, "total")
                .to_sql(),
            "SELECT AVG(total) FROM orders"
        );
    }

    #[test]
    fn count_uses_selected_columns() {
        let db = Recorder::default();
        assert_eq!(
            Table::new(&db, "users").count_sql().to_sql(),
            "SELECT COUNT(*) FROM users"
        );
        assert_eq!(
            Table::new(&db, "users").select(["a", "b"]).count_sql().to_sql(),
            "SELECT COUNT(a, b) FROM users"
        );
    }

    #[test]
    fn find_shares_the_where_clause() {
        let db = Recorder::default();
        let sql = Table::new(&db, "users")
            .eq("status", "active")
            .find_sql("id", "5");

        assert_eq!(sql.to_sql(), "SELECT * FROM users WHERE id = $1 AND status = $2");
        assert_eq!(sql.params()[0], Value::Int(5));
    }

    #[tokio::test]
    async fn find_returns_first_row() {
        let db = Recorder::with_pk("id").returning(vec![single("id", 5), single("id", 6)]);
        let row = Table::new(&db, "users").find(5).await.unwrap().unwrap();

        assert_eq!(row.get("id"), Some(&Value::Int(5)));
        assert_eq!(db.statements(), ["SELECT * FROM users WHERE id = 5"]);
    }

    #[tokio::test]
    async fn find_without_primary_key_runs_nothing() {
        let db = Recorder::default().returning(vec![single("id", 5)]);
        assert!(Table::new(&db, "logs").find(5).await.unwrap().is_none());
        assert!(db.statements().is_empty());
    }

    #[tokio::test]
    async fn key_lookup_honors_the_table_timeout() {
        let db = Recorder::with_pk("id").returning(vec![single("id", 5)]);
        let limit = Duration::from_millis(250);
        Table::new(&db, "users").timeout(limit).find(5).await.unwrap();
        Table::new(&db, "users").insert(record! { "name" => "x" }).await.unwrap();
        assert_eq!(
            *db.lookup_deadlines.lock().unwrap(),
            vec![Some(limit), None]
        );
    }

    #[tokio::test]
    async fn insert_returns_generated_key() {
        let db = Recorder::with_pk("id").returning(vec![single("id", 42)]);
        let id = Table::new(&db, "users")
            .insert(record! { "name" => "Jane" })
            .await
            .unwrap();

        assert_eq!(id, Value::Int(42));
        assert_eq!(
            db.statements(),
            ["INSERT INTO users (name) VALUES ('Jane') RETURNING id"]
        );
    }

    #[tokio::test]
    async fn insert_without_primary_key_returns_null() {
        let db = Recorder::default();
        let id = Table::new(&db, "logs")
            .insert([("message", "hello")])
            .await
            .unwrap();
        assert!(id.is_null());
        assert_eq!(db.statements(), ["INSERT INTO logs (message) VALUES ('hello')"]);
    }

    #[tokio::test]
    async fn mutations_report_affected_rows() {
        let db = Recorder {
            affected: 3,
            ..Recorder::default()
        };
        let updated = Table::new(&db, "users")
            .update(record! { "status" => "inactive" })
            .await
            .unwrap();
        let deleted = Table::new(&db, "users").eq("id", 1).delete().await.unwrap();

        assert_eq!((updated, deleted), (3, 3));
        assert_eq!(
            db.statements(),
            [
                "UPDATE users SET status = 'inactive'",
                "DELETE FROM users WHERE id = 1"
            ]
        );
    }

    #[tokio::test]
    async fn guarded_executor_refuses_unfiltered_mutations() {
        let db = Recorder {
            guard: true,
            ..Recorder::default()
        };
        let err = Table::new(&db, "users").delete().await.unwrap_err();
        assert!(matches!(err, DbError::UnfilteredMutation(ref sql) if sql == "DELETE FROM users"));

        Table::new(&db, "users").eq("id", 1).delete().await.unwrap();
        assert_eq!(db.statements(), ["DELETE FROM users WHERE id = 1"]);
    }

    #[tokio::test]
    async fn aggregates_default_to_zero() {
        let db = Recorder::default().returning(vec![single("max", Value::Null)]);
        assert_eq!(Table::new(&db, "users").max("age").await.unwrap(), 0.0);

        let db = Recorder::default();
        assert_eq!(Table::new(&db, "users").count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn aggregates_read_first_column() {
        let db = Recorder::default().returning(vec![single("avg", 31.5)]);
        assert_eq!(Table::new(&db, "users").avg("age").await.unwrap(), 31.5);

        let db = Recorder::default().returning(vec![single("count", 4)]);
        assert_eq!(Table::new(&db, "users").gt("age", 20).count().await.unwrap(), 4);
        assert_eq!(db.statements(), ["SELECT COUNT(*) FROM users WHERE age > 20"]);
    }
}
