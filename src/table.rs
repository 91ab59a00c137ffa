//! Canonical result table shared by every query engine.
//!
//! A `ResultTable` is the per-request output shape: an ordered list of
//! named columns plus an ordered list of rows of typed cells. It is
//! never persisted; transports (HTTP, MCP, CLI) encode it after the
//! request completes. A zero-row table is a valid answer, distinct
//! from a rejected request.

use serde::{Deserialize, Serialize};

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Real(f64),
    Int(i64),
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Render for CSV / terminal display. Null renders empty.
    pub fn display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Real(v) => format!("{v}"),
            Value::Int(v) => format!("{v}"),
            Value::Null => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered named columns + ordered rows of typed cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Panics in debug builds if the arity does not match
    /// the column count; engines construct rows positionally.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row arity mismatch");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column across all rows.
    pub fn column_values(&self, name: &str) -> Vec<&Value> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|r| &r[idx]).collect(),
            None => Vec::new(),
        }
    }

    /// Truncate to the first `k` rows, keeping order.
    pub fn truncate(&mut self, k: usize) {
        self.rows.truncate(k);
    }

    /// Rows as JSON records keyed by column name, the shape the HTTP
    /// layer returns by default.
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, cell)| {
                        let v = serde_json::to_value(cell).unwrap_or(serde_json::Value::Null);
                        (col.clone(), v)
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut t = ResultTable::new(["gene_name", "psi_mean"]);
        t.push_row(vec!["Alb".into(), 0.9.into()]);
        t.push_row(vec!["Gapdh".into(), 0.05.into()]);
        t
    }

    #[test]
    fn empty_table_is_a_valid_answer() {
        let t = ResultTable::new(["gene_name"]);
        assert!(t.is_empty());
        assert_eq!(t.columns(), ["gene_name"]);
        assert!(t.to_records().is_empty());
    }

    #[test]
    fn records_are_keyed_by_column_name() {
        let records = sample().to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["gene_name"], serde_json::json!("Alb"));
        assert_eq!(records[1]["psi_mean"], serde_json::json!(0.05));
    }

    #[test]
    fn column_lookup() {
        let t = sample();
        assert_eq!(t.column_index("psi_mean"), Some(1));
        assert_eq!(t.column_index("missing"), None);
        let genes: Vec<_> = t
            .column_values("gene_name")
            .into_iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(genes, ["Alb", "Gapdh"]);
    }

    #[test]
    fn null_cells_serialize_as_json_null() {
        let mut t = ResultTable::new(["gene_name", "block_rank"]);
        t.push_row(vec!["Alb".into(), Value::Null]);
        let records = t.to_records();
        assert_eq!(records[0]["block_rank"], serde_json::Value::Null);
    }
}
