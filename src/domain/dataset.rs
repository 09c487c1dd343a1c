// Normalized, typed datasets ready for card binding
use super::table::{RawTable, Scalar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Number,
    Percentage,
    String,
    Date,
    Coordinate,
}

/// Typed cell; a cell that failed coercion keeps its original text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_scalar(&self) -> Scalar {
        match self {
            Value::Null => Scalar::Null,
            Value::Number(n) => Scalar::Number(*n),
            Value::Text(s) => Scalar::Text(s.clone()),
            Value::Date(d) => Scalar::Text(d.format(DATE_FORMAT).to_string()),
        }
    }

    /// Loose equality against a configured scalar (filters)
    pub fn matches(&self, scalar: &Scalar) -> bool {
        match (self, scalar) {
            (Value::Null, Scalar::Null) => true,
            (Value::Number(a), Scalar::Number(b)) => a == b,
            (Value::Text(a), Scalar::Text(b)) => a == b,
            (Value::Date(d), Scalar::Text(b)) => d.format(DATE_FORMAT).to_string() == *b,
            (Value::Number(a), Scalar::Text(b)) => b.trim().parse::<f64>().is_ok_and(|b| *a == b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub semantic: SemanticType,
}

/// A cell whose coercion failed and was left as-is
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizationSkip {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub target: SemanticType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedDataset {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<Vec<Value>>,
    #[serde(skip)]
    pub skipped: Vec<NormalizationSkip>,
}

impl NormalizedDataset {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn semantic(&self, name: &str) -> Option<SemanticType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.semantic)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Back to an untyped table, e.g. to re-run it through a rule set
    pub fn to_raw(&self) -> RawTable {
        RawTable::new(
            self.column_names(),
            self.rows
                .iter()
                .map(|row| row.iter().map(Value::to_scalar).collect())
                .collect(),
        )
    }
}
