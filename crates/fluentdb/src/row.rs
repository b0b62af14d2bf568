//! Result rows as ordered column → value mappings

use crate::error::{DbError, DbResult};
use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::error::Error;
use std::ops::Index;

/// One result row.
///
/// Columns keep the order of the underlying result set. Lookups by name
/// return the first column with that name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Build a row from `(column, value)` pairs.
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Decode every column of a driver row into [`Value`]s.
    pub fn from_pg(row: &tokio_postgres::Row) -> DbResult<Self> {
        let columns = row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                row.try_get::<_, Value>(idx)
                    .map(|v| (col.name().to_string(), v))
                    .map_err(|e| DbError::decode(col.name(), describe(&e)))
            })
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Value at a column position.
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.columns.get(idx).map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Column names in result-set order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_inner(self) -> Vec<(String, Value)> {
        self.columns
    }
}

impl Index<&str> for Row {
    type Output = Value;

    /// Panics if the column is missing, like indexing a map.
    fn index(&self, column: &str) -> &Value {
        match self.get(column) {
            Some(v) => v,
            None => panic!("no column named '{column}' in row"),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Driver errors wrap the decode failure; keep its cause in the message.
pub(crate) fn describe(err: &dyn Error) -> String {
    match err.source() {
        Some(cause) => format!("{err}: {cause}"),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapped;

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("error deserializing column 1")
        }
    }

    impl Error for Wrapped {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&Cause)
        }
    }

    #[derive(Debug)]
    struct Cause;

    impl fmt::Display for Cause {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("unsupported column type interval")
        }
    }

    impl Error for Cause {}

    #[test]
    fn decode_messages_keep_the_cause() {
        assert_eq!(
            describe(&Wrapped),
            "error deserializing column 1: unsupported column type interval"
        );
        assert_eq!(describe(&Cause), "unsupported column type interval");
    }

    fn sample() -> Row {
        Row::new(vec![
            ("id".to_string(), Value::Int(1)),
            ("status".to_string(), Value::from("active")),
            ("age".to_string(), Value::Int(30)),
        ])
    }

    #[test]
    fn keeps_result_set_order() {
        let row = sample();
        assert_eq!(row.column_names().collect::<Vec<_>>(), ["id", "status", "age"]);
        assert_eq!(row.get_index(1), Some(&Value::from("active")));
    }

    #[test]
    fn lookup_by_name() {
        let row = sample();
        assert_eq!(row["age"], Value::Int(30));
        assert!(row.get("missing").is_none());
        assert!(row.contains("status"));
    }

    #[test]
    fn serializes_as_object_in_column_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"id":1,"status":"active","age":30}"#);
    }
}
