//! Parameter-safe SQL statement assembly.
//!
//! `Sql` stores SQL pieces and bound [`Value`]s separately and generates
//! `$1, $2, ...` placeholders in the final SQL string, so builders never
//! interpolate literals into statement text.
//!
//! # Example
//!
//! ```ignore
//! use fluentdb::Sql;
//!
//! let mut q = Sql::new("SELECT * FROM users WHERE status = ");
//! q.push_bind("active").push(" AND age > ").push_bind(25);
//!
//! assert_eq!(q.to_sql(), "SELECT * FROM users WHERE status = $1 AND age > $2");
//! assert_eq!(q.to_inline_sql(), "SELECT * FROM users WHERE status = 'active' AND age > 25");
//! ```

use crate::value::Value;
use std::fmt::Write;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A SQL statement with its bound parameters.
#[derive(Debug, Clone, Default)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Value>,
}

impl Sql {
    /// Create a new statement with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
        }
    }

    /// Create an empty statement.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }

        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value.into());
        self
    }

    /// Append `items` separated by `sep`, rendering each with `f`.
    pub fn push_separated<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        sep: &str,
        mut f: impl FnMut(&mut Self, T),
    ) -> &mut Self {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            f(self, item);
        }
        self
    }

    /// Append another statement fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        for part in other.parts.drain(..) {
            match part {
                SqlPart::Raw(s) => {
                    self.push(&s);
                }
                SqlPart::Param => self.parts.push(SqlPart::Param),
            }
        }
        self.params.append(&mut other.params);
        self
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        self.render(|out, idx, _| {
            let _ = write!(out, "${idx}");
        })
    }

    /// Render SQL with every parameter replaced by its literal.
    ///
    /// For logs and previews only; statements are always executed with
    /// bound parameters.
    pub fn to_inline_sql(&self) -> String {
        self.render(|out, _, value| out.push_str(&value.to_literal()))
    }

    fn render(&self, mut param: impl FnMut(&mut String, usize, &Value)) -> String {
        let mut out = String::new();
        let mut idx: usize = 0;

        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    // push_bind keeps parts and params in step.
                    let value = self.params.get(idx - 1).unwrap_or(&Value::Null);
                    param(&mut out, idx, value);
                }
            }
        }
        out
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect()
    }
}
