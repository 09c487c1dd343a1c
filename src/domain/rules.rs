// Per-card normalization rule sets
use super::dataset::SemanticType;
use super::error::{DashboardError, DashboardResult};
use super::table::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Cleaning rules applied to a raw table, in declared primitive order:
/// rename, coercion, null-row filtering, row filtering, aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRuleSet {
    /// Positional header override; must match the column count unless the
    /// headers already carry these names
    #[serde(default)]
    pub relabel: Vec<String>,
    #[serde(default)]
    pub rename: Vec<RenameRule>,
    /// Keep only these columns (after renaming); empty keeps all
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnRule>,
    #[serde(default)]
    pub percent_scale: PercentScale,
    #[serde(default)]
    pub required: Vec<String>,
    /// Geospatial cards drop rows with a null in any coordinate column
    #[serde(default)]
    pub geospatial: bool,
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    #[serde(default)]
    pub aggregate: Option<Aggregation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic: SemanticType,
}

/// How percentage strings map to numbers; declared per card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentScale {
    /// `"42.5%"` becomes `42.5`
    #[default]
    Points,
    /// `"42.5%"` becomes `0.425`
    Fraction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    Equals { value: Scalar },
    NotEquals { value: Scalar },
    OneOf { values: Vec<Scalar> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub group_by: Vec<String>,
    pub reducers: Vec<Reducer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reducer {
    pub column: String,
    #[serde(rename = "fn")]
    pub func: ReduceFn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceFn {
    Sum,
    First,
    Mean,
    Min,
    Max,
}

/// Header cleanup: trim, then replace `/` and spaces with `_`
pub fn sanitize_column_name(name: &str) -> String {
    name.trim().replace(['/', ' '], "_")
}

impl NormalizationRuleSet {
    /// Type declared for a sanitized column name; rule names are sanitized the same way
    pub fn declared_type(&self, column: &str) -> Option<SemanticType> {
        self.columns
            .iter()
            .find(|c| sanitize_column_name(&c.name) == column)
            .map(|c| c.semantic)
    }

    /// Structural checks run once at startup
    pub fn validate(&self) -> DashboardResult<()> {
        if self.relabel.iter().any(|l| l.trim().is_empty()) {
            return Err(DashboardError::configuration("relabel entries must not be blank"));
        }

        let sources: HashSet<String> = self
            .rename
            .iter()
            .map(|r| sanitize_column_name(&r.from))
            .collect();
        if sources.len() != self.rename.len() {
            return Err(DashboardError::configuration("a column is renamed more than once"));
        }
        for rule in &self.rename {
            let to = sanitize_column_name(&rule.to);
            if to.is_empty() {
                return Err(DashboardError::configuration(format!(
                    "rename of {:?} has an empty target",
                    rule.from
                )));
            }
            if sources.contains(&to) && to != sanitize_column_name(&rule.from) {
                return Err(DashboardError::configuration(format!(
                    "rename target {:?} is itself renamed",
                    to
                )));
            }
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(sanitize_column_name(&column.name)) {
                return Err(DashboardError::configuration(format!(
                    "column {:?} is typed twice",
                    column.name
                )));
            }
        }

        for filter in &self.filters {
            if filter.column.trim().is_empty() {
                return Err(DashboardError::configuration("filter without a column"));
            }
            if let FilterOp::OneOf { values } = &filter.op {
                if values.is_empty() {
                    return Err(DashboardError::configuration(format!(
                        "one_of filter on {:?} has no values",
                        filter.column
                    )));
                }
            }
        }

        if let Some(aggregation) = &self.aggregate {
            if aggregation.group_by.is_empty() {
                return Err(DashboardError::configuration("aggregation needs group_by columns"));
            }
            for reducer in &aggregation.reducers {
                if aggregation.group_by.contains(&reducer.column) {
                    return Err(DashboardError::configuration(format!(
                        "column {:?} is both grouped and reduced",
                        reducer.column
                    )));
                }
            }
        }

        Ok(())
    }
}
