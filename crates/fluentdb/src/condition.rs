//! Tagged condition entries and their rendering.
//!
//! A builder records every modifier call as a [`ConditionEntry`] in call
//! order. Rendering is a pure two-pass function over that list:
//!
//! 1. every `where` entry, joined by `AND` behind a single `WHERE`
//! 2. every other entry (join, order, group, limit), in insertion order,
//!    separated by single spaces
//!
//! Non-where clauses are emitted exactly as chained, so chaining `limit`
//! before `group_by` yields `LIMIT ... GROUP BY ...`.

use crate::sql::Sql;
use crate::value::Value;
use std::fmt;

/// Comparison operator for `where` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// `=`
    #[default]
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Comparator {
    /// SQL operator text.
    pub fn as_sql(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Neq => "!=",
            Comparator::Gt => ">",
            Comparator::Gte => ">=",
            Comparator::Lt => "<",
            Comparator::Lte => "<=",
        }
    }

    /// Parse a comparator name (`EQ`, `gte`, ...) or operator (`=`, `>=`, ...).
    ///
    /// Anything unrecognized falls back to [`Comparator::Eq`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEQ" | "NE" | "!=" | "<>" => Comparator::Neq,
            "GT" | ">" => Comparator::Gt,
            "GTE" | ">=" => Comparator::Gte,
            "LT" | "<" => Comparator::Lt,
            "LTE" | "<=" => Comparator::Lte,
            _ => Comparator::Eq,
        }
    }
}

impl From<&str> for Comparator {
    fn from(s: &str) -> Self {
        Comparator::parse(s)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Sort direction for `order_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// The tag of a condition entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Where,
    Order,
    Group,
    Limit,
    Join,
}

/// One recorded modifier call.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionEntry {
    /// `<column> <op> <value>`; the value is already coerced.
    Where {
        column: String,
        comparator: Comparator,
        value: Value,
    },
    /// `ORDER BY <column> <direction>`
    Order { column: String, direction: Direction },
    /// `GROUP BY <column>`
    Group { column: String },
    /// `LIMIT <n>`
    Limit(u64),
    /// `JOIN <table> ON <left> = <right>`
    Join {
        table: String,
        left: String,
        right: String,
    },
}

impl ConditionEntry {
    pub fn kind(&self) -> ClauseKind {
        match self {
            ConditionEntry::Where { .. } => ClauseKind::Where,
            ConditionEntry::Order { .. } => ClauseKind::Order,
            ConditionEntry::Group { .. } => ClauseKind::Group,
            ConditionEntry::Limit(_) => ClauseKind::Limit,
            ConditionEntry::Join { .. } => ClauseKind::Join,
        }
    }

    pub fn is_where(&self) -> bool {
        self.kind() == ClauseKind::Where
    }

    /// Append this entry's fragment (without leading keyword glue).
    pub fn append_to_sql(&self, sql: &mut Sql) {
        match self {
            ConditionEntry::Where {
                column,
                comparator,
                value,
            } => {
                sql.push(column)
                    .push(" ")
                    .push(comparator.as_sql())
                    .push(" ")
                    .push_bind(value.clone());
            }
            ConditionEntry::Order { column, direction } => {
                sql.push(&format!("ORDER BY {column} {direction}"));
            }
            ConditionEntry::Group { column } => {
                sql.push(&format!("GROUP BY {column}"));
            }
            ConditionEntry::Limit(n) => {
                sql.push(&format!("LIMIT {n}"));
            }
            ConditionEntry::Join { table, left, right } => {
                sql.push(&format!("JOIN {table} ON {left} = {right}"));
            }
        }
    }
}

/// Append the rendered condition list to `sql`.
///
/// Produces ` WHERE a AND b` (omitted without where entries) followed by
/// ` <other> <other> ...` in insertion order.
pub fn push_conditions(sql: &mut Sql, entries: &[ConditionEntry]) {
    let (wheres, others): (Vec<&ConditionEntry>, Vec<&ConditionEntry>) =
        entries.iter().partition(|e| e.is_where());

    if !wheres.is_empty() {
        sql.push(" WHERE ");
        sql.push_separated(wheres, " AND ", |sql, entry| entry.append_to_sql(sql));
    }

    if !others.is_empty() {
        sql.push(" ");
        sql.push_separated(others, " ", |sql, entry| entry.append_to_sql(sql));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(column: &str, comparator: Comparator, value: impl Into<Value>) -> ConditionEntry {
        ConditionEntry::Where {
            column: column.to_string(),
            comparator,
            value: value.into(),
        }
    }

    fn render(entries: &[ConditionEntry]) -> Sql {
        let mut sql = Sql::new("SELECT * FROM users");
        push_conditions(&mut sql, entries);
        sql
    }

    #[test]
    fn comparators_map_to_operators() {
        let ops: Vec<_> = [
            Comparator::Eq,
            Comparator::Neq,
            Comparator::Gt,
            Comparator::Gte,
            Comparator::Lt,
            Comparator::Lte,
        ]
        .iter()
        .map(|c| c.as_sql())
        .collect();
        assert_eq!(ops, ["=", "!=", ">", ">=", "<", "<="]);
    }

    #[test]
    fn unknown_comparator_falls_back_to_eq() {
        assert_eq!(Comparator::parse("LIKE"), Comparator::Eq);
        assert_eq!(Comparator::parse(""), Comparator::Eq);
        assert_eq!(Comparator::parse("gte"), Comparator::Gte);
        assert_eq!(Comparator::from("<>"), Comparator::Neq);
    }

    #[test]
    fn no_entries_renders_nothing() {
        assert_eq!(render(&[]).to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn single_where_clause_regardless_of_interleaving() {
        let entries = vec![
            filter("status", Comparator::Eq, "active"),
            ConditionEntry::Order {
                column: "created_at".into(),
                direction: Direction::Desc,
            },
            filter("age", Comparator::Gt, 25),
            ConditionEntry::Limit(10),
            filter("age", Comparator::Lt, 65),
        ];
        let sql = render(&entries).to_sql();

        assert_eq!(sql.matches("WHERE").count(), 1);
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE status = $1 AND age > $2 AND age < $3 \
             ORDER BY created_at DESC LIMIT 10"
        );
    }

    #[test]
    fn other_clauses_keep_call_order() {
        let entries = vec![
            ConditionEntry::Limit(5),
            ConditionEntry::Group {
                column: "status".into(),
            },
        ];
        assert_eq!(
            render(&entries).to_sql(),
            "SELECT * FROM users LIMIT 5 GROUP BY status"
        );
    }

    #[test]
    fn joins_render_with_on_clause() {
        let entries = vec![
            ConditionEntry::Join {
                table: "orders".into(),
                left: "orders.user_id".into(),
                right: "users.id".into(),
            },
            ConditionEntry::Group {
                column: "users.id".into(),
            },
        ];
        assert_eq!(
            render(&entries).to_sql(),
            "SELECT * FROM users JOIN orders ON orders.user_id = users.id GROUP BY users.id"
        );
    }

    #[test]
    fn kinds_are_tagged() {
        assert_eq!(filter("a", Comparator::Eq, 1).kind(), ClauseKind::Where);
        assert_eq!(ConditionEntry::Limit(1).kind(), ClauseKind::Limit);
    }
}
