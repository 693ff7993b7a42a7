//! In-memory tabular model shared by the normalizer and the unifier.
//!
//! A [`Table`] is an ordered list of named, typed columns of equal length. Per-year
//! schemas differ in width and type; [`Schema`] is the declared column list that
//! inference produces for one year.

use crate::error::{EtlError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Date,
    Text,
}

impl ColumnType {
    /// The narrowest type both sides can be represented in without loss.
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        };
        f.write_str(s)
    }
}

/// Semantic role a column plays in the canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Year,
    Count,
    Date,
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub ty: ColumnType,
    pub role: ColumnRole,
}

/// Declared column list for one canonical year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn empty(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Integer => ColumnData::Integer(Vec::new()),
            ColumnType::Float => ColumnData::Float(Vec::new()),
            ColumnType::Date => ColumnData::Date(Vec::new()),
            ColumnType::Text => ColumnData::Text(Vec::new()),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Integer(_) => ColumnType::Integer,
            ColumnData::Float(_) => ColumnType::Float,
            ColumnData::Date(_) => ColumnType::Date,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Integer(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Float(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Date(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Appends `n` nulls.
    pub fn push_nulls(&mut self, n: usize) {
        match self {
            ColumnData::Integer(v) => v.extend(std::iter::repeat(None).take(n)),
            ColumnData::Float(v) => v.extend(std::iter::repeat(None).take(n)),
            ColumnData::Date(v) => v.extend(std::iter::repeat(None).take(n)),
            ColumnData::Text(v) => v.extend(std::iter::repeat(None).take(n)),
        }
    }

    /// Value at `row` rendered as text, `None` for null.
    pub fn render(&self, row: usize) -> Option<String> {
        match self {
            ColumnData::Integer(v) => v[row].map(|x| x.to_string()),
            ColumnData::Float(v) => v[row].map(|x| x.to_string()),
            ColumnData::Date(v) => v[row].map(|d| d.format("%Y-%m-%d").to_string()),
            ColumnData::Text(v) => v[row].clone(),
        }
    }

    /// Converts into `target`, which must be this type or a widening of it.
    pub fn cast(self, target: ColumnType) -> ColumnData {
        match (self, target) {
            (ColumnData::Integer(v), ColumnType::Float) => {
                ColumnData::Float(v.into_iter().map(|x| x.map(|i| i as f64)).collect())
            }
            (data, ColumnType::Text) if data.column_type() != ColumnType::Text => {
                ColumnData::Text((0..data.len()).map(|i| data.render(i)).collect())
            }
            (data, _) => data,
        }
    }

    /// Appends `other`, which must already have this column's type.
    pub fn append(&mut self, other: ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Integer(a), ColumnData::Integer(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            (a, b) => {
                return Err(EtlError::Concatenation(format!(
                    "cannot append {} values to a {} column",
                    b.column_type(),
                    a.column_type()
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<()> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(EtlError::DuplicateColumn(name));
        }
        if data.len() != self.rows {
            return Err(EtlError::ColumnLength {
                column: name,
                expected: self.rows,
                found: data.len(),
            });
        }
        self.columns.push(Column { name, data });
        Ok(())
    }

    /// Types of every column, roles left as `Free`.
    pub fn schema(&self) -> Schema {
        Schema {
            columns: self
                .columns
                .iter()
                .map(|c| ColumnSpec {
                    name: c.name.clone(),
                    ty: c.data.column_type(),
                    role: ColumnRole::Free,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_rules() {
        use ColumnType::*;
        assert_eq!(Integer.widen(Integer), Integer);
        assert_eq!(Integer.widen(Float), Float);
        assert_eq!(Float.widen(Integer), Float);
        assert_eq!(Date.widen(Integer), Text);
        assert_eq!(Text.widen(Date), Text);
    }

    #[test]
    fn push_column_rejects_duplicates_and_bad_lengths() {
        let mut t = Table::with_rows(2);
        t.push_column("a", ColumnData::Integer(vec![Some(1), None])).unwrap();
        assert!(matches!(
            t.push_column("a", ColumnData::Integer(vec![Some(1), None])),
            Err(EtlError::DuplicateColumn(_))
        ));
        assert!(matches!(
            t.push_column("b", ColumnData::Text(vec![None])),
            Err(EtlError::ColumnLength { .. })
        ));
    }

    #[test]
    fn cast_to_text_renders_values() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        let col = ColumnData::Date(vec![Some(d), None]).cast(ColumnType::Text);
        assert_eq!(col, ColumnData::Text(vec![Some("2021-03-04".into()), None]));

        let col = ColumnData::Integer(vec![Some(116)]).cast(ColumnType::Text);
        assert_eq!(col, ColumnData::Text(vec![Some("116".into())]));
    }

    #[test]
    fn cast_integer_to_float() {
        let col = ColumnData::Integer(vec![Some(2), None]).cast(ColumnType::Float);
        assert_eq!(col, ColumnData::Float(vec![Some(2.0), None]));
    }

    #[test]
    fn append_requires_matching_types() {
        let mut a = ColumnData::Text(vec![Some("x".into())]);
        a.append(ColumnData::Text(vec![None])).unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.append(ColumnData::Integer(vec![Some(1)])).is_err());
    }
}
