//! In-memory tabular data used as sample input for generated queries.
//!
//! A [`DataFrame`] is a small row-major table of [`Value`] cells. It only
//! carries what the execution sink needs: named columns, rows, and cell
//! comparison rules that mirror how the target dataframe library compares
//! mixed-type cells.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::schema::Schema;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
}

/// Coarse classification of cells, named after the dtypes they emulate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    Date,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Int => "int64",
            ValueKind::Float => "float64",
            ValueKind::Str => "object",
            ValueKind::Date => "datetime64",
        })
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Date(_) => ValueKind::Date,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering between two cells, or `None` when the kinds cannot be ordered
    /// against each other (e.g. a number against a string).
    pub fn try_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            _ => None,
        }
    }

    /// Equality with numeric coercion; cells of unrelated kinds are never equal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.try_cmp(other) == Some(Ordering::Equal)
    }

    /// Canonical hashable form used to bucket join keys. Integral floats share
    /// the key of the matching integer.
    pub(crate) fn join_key(&self) -> String {
        match self {
            Value::Int(i) => format!("n:{i}"),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("n:{}", *f as i64),
            Value::Float(f) => format!("f:{f}"),
            Value::Str(s) => format!("s:{s}"),
            Value::Date(d) => format!("d:{d}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Str(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Row-major table with named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataFrame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        write!(f, "[{} rows x {} columns]", self.len(), self.width())
    }
}

/// Sample tables keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct SampleData {
    frames: IndexMap<String, DataFrame>,
}

impl SampleData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate `rows` rows (subject to primary-key capping) for every entity.
    pub fn generate(schema: &Schema, rows: usize, rng: &mut fastrand::Rng) -> Self {
        let frames = schema
            .entities()
            .map(|entity| (entity.name.clone(), entity.generate_dataframe(rows, rng)))
            .collect();
        Self { frames }
    }

    pub fn insert(&mut self, name: impl Into<String>, frame: DataFrame) {
        self.frames.insert(name.into(), frame);
    }

    pub fn get(&self, name: &str) -> Option<&DataFrame> {
        self.frames.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataFrame)> {
        self.frames.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<(String, DataFrame)> for SampleData {
    fn from_iter<T: IntoIterator<Item = (String, DataFrame)>>(iter: T) -> Self {
        Self { frames: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cells_compare_across_int_and_float() {
        assert_eq!(Value::Int(3).try_cmp(&Value::Float(3.5)), Some(Ordering::Less));
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert_eq!(Value::Int(2).join_key(), Value::Float(2.0).join_key());
    }

    #[test]
    fn test_unrelated_kinds_do_not_order() {
        assert_eq!(Value::Int(1).try_cmp(&Value::Str("1".into())), None);
        assert!(!Value::Int(1).loose_eq(&Value::Str("1".into())));
    }

    #[test]
    fn test_column_access_by_name() {
        let frame = DataFrame::from_rows(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Int(1), Value::Str("a".into())],
                vec![Value::Int(2), Value::Str("b".into())],
            ],
        );

        let ids: Vec<_> = frame.column("id").unwrap().cloned().collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(frame.get(1, "name"), Some(&Value::Str("b".into())));
        assert!(frame.column("missing").is_none());
        assert_eq!(frame.width(), 2);
    }

    #[test]
    fn test_display_renders_header_and_shape() {
        let frame = DataFrame::from_rows(vec!["x".into()], vec![vec![Value::Float(1.0)]]);
        let text = frame.to_string();
        assert!(text.starts_with("x\n1.0\n"));
        assert!(text.ends_with("[1 rows x 1 columns]"));
    }
}
