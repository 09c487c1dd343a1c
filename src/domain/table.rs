// Raw tabular results as yielded by a source
use super::error::{DashboardError, DashboardResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Untyped cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    /// Empty or whitespace-only text reads as null
    pub fn from_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            Scalar::Null
        } else {
            Scalar::Text(trimmed.to_string())
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self { columns, rows }
    }

    /// Build a rectangular table: short rows are padded with nulls, long rows are rejected
    pub fn rectangular(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> DashboardResult<Self> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(DashboardError::malformed(format!(
                    "row {} has {} cells, header has {}",
                    index + 1,
                    row.len(),
                    width
                )));
            }
            row.resize(width, Scalar::Null);
            padded.push(row);
        }
        Ok(Self::new(columns, padded))
    }

    /// Fail with `SourceMalformed` when the column count differs from the expected one
    pub fn ensure_column_count(&self, expected: Option<usize>) -> DashboardResult<()> {
        match expected {
            Some(n) if n != self.columns.len() => Err(DashboardError::malformed(format!(
                "expected {} columns, got {}",
                n,
                self.columns.len()
            ))),
            _ => Ok(()),
        }
    }
}
