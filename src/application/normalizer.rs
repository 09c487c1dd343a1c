// Data normalizer - turns a raw table into a typed dataset.
//
// Primitives run in a fixed order: rename, coercion, null-row filtering,
// row filtering, aggregation. The function is pure: same table and rules,
// same dataset.
use crate::domain::dataset::{
    ColumnSchema, DATE_FORMAT, NormalizationSkip, NormalizedDataset, SemanticType, Value,
};
use crate::domain::error::{DashboardError, DashboardResult};
use crate::domain::rules::{
    Aggregation, FilterOp, NormalizationRuleSet, PercentScale, ReduceFn, RowFilter,
    sanitize_column_name,
};
use crate::domain::table::{RawTable, Scalar};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

const DATE_INPUT_FORMATS: [&str; 3] = [DATE_FORMAT, "%m/%d/%Y", "%Y/%m/%d"];

pub fn normalize(raw: &RawTable, rules: &NormalizationRuleSet) -> DashboardResult<NormalizedDataset> {
    let (names, rows) = shape_columns(raw, rules)?;

    let mut skipped = Vec::new();
    let (columns, mut rows) = coerce(names, rows, rules, &mut skipped);

    // Rows already grouped under these rules passed every filter before
    // grouping; only the group keys are still checked
    let regrouping = rules
        .aggregate
        .as_ref()
        .filter(|aggregation| is_grouped(&columns, &rows, aggregation));
    let applies = |name: &str| match regrouping {
        Some(aggregation) => aggregation
            .group_by
            .iter()
            .any(|key| sanitize_column_name(key) == sanitize_column_name(name)),
        None => true,
    };

    let required = required_columns(&columns, rules, &applies)?;
    rows.retain(|row| required.iter().all(|&i| !row[i].is_null()));

    for filter in rules.filters.iter().filter(|f| applies(&f.column)) {
        let index = find_column(&columns, &filter.column)?;
        rows.retain(|row| filter_matches(filter, &row[index]));
    }

    let (columns, rows) = match &rules.aggregate {
        Some(aggregation) => aggregate(&columns, rows, aggregation)?,
        None => (columns, rows),
    };

    if !skipped.is_empty() {
        tracing::debug!(skipped = skipped.len(), "cells kept their original text");
    }

    Ok(NormalizedDataset {
        columns,
        rows,
        skipped,
    })
}

/// Relabel, sanitize, rename and select; returns rectangular rows
fn shape_columns(
    raw: &RawTable,
    rules: &NormalizationRuleSet,
) -> DashboardResult<(Vec<String>, Vec<Vec<Scalar>>)> {
    let renames: HashMap<String, String> = rules
        .rename
        .iter()
        .map(|r| (sanitize_column_name(&r.from), sanitize_column_name(&r.to)))
        .collect();
    let final_name = |label: &String| {
        let clean = sanitize_column_name(label);
        renames.get(&clean).cloned().unwrap_or(clean)
    };

    let labels = if rules.relabel.is_empty() || rules.relabel.len() == raw.columns.len() {
        if rules.relabel.is_empty() { &raw.columns } else { &rules.relabel }
    } else {
        // Headers that already carry the relabelled names were shaped by an earlier pass
        let targets: Vec<String> = rules.relabel.iter().map(final_name).collect();
        if !raw.columns.iter().all(|c| targets.contains(&final_name(c))) {
            return Err(DashboardError::malformed(format!(
                "relabel lists {} columns, source has {}",
                rules.relabel.len(),
                raw.columns.len()
            )));
        }
        &raw.columns
    };

    let names: Vec<String> = labels.iter().map(final_name).collect();

    let width = names.len();
    let rows = raw.rows.iter().map(|row| {
        let mut row = row.clone();
        row.resize(width, Scalar::Null);
        row
    });

    if rules.select.is_empty() {
        return Ok((names, rows.collect()));
    }

    let picks = rules
        .select
        .iter()
        .map(|wanted| {
            let wanted = sanitize_column_name(wanted);
            names
                .iter()
                .position(|n| *n == wanted)
                .ok_or_else(|| DashboardError::malformed(format!("selected column {:?} not found", wanted)))
        })
        .collect::<DashboardResult<Vec<usize>>>()?;

    let selected_names = picks.iter().map(|&i| names[i].clone()).collect();
    let selected_rows = rows
        .map(|row| picks.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok((selected_names, selected_rows))
}

fn coerce(
    names: Vec<String>,
    rows: Vec<Vec<Scalar>>,
    rules: &NormalizationRuleSet,
    skipped: &mut Vec<NormalizationSkip>,
) -> (Vec<ColumnSchema>, Vec<Vec<Value>>) {
    let columns: Vec<ColumnSchema> = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let semantic = rules
                .declared_type(&name)
                .unwrap_or_else(|| infer_type(rows.iter().map(|row| &row[index])));
            ColumnSchema { name, semantic }
        })
        .collect();

    let typed = rows
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            row.into_iter()
                .zip(&columns)
                .map(|(cell, column)| {
                    coerce_cell(&cell, column.semantic, rules.percent_scale).unwrap_or_else(|| {
                        skipped.push(NormalizationSkip {
                            row: row_index,
                            column: column.name.clone(),
                            value: cell.to_string(),
                            target: column.semantic,
                        });
                        pass_through(cell)
                    })
                })
                .collect()
        })
        .collect();

    (columns, typed)
}

/// Undeclared columns are numeric when every non-null cell is
fn infer_type<'a>(cells: impl Iterator<Item = &'a Scalar>) -> SemanticType {
    let mut seen = false;
    for cell in cells {
        match cell {
            Scalar::Null => {}
            Scalar::Number(_) => seen = true,
            Scalar::Text(text) => {
                if parse_number(text).is_none() {
                    return SemanticType::String;
                }
                seen = true;
            }
        }
    }
    if seen {
        SemanticType::Number
    } else {
        SemanticType::String
    }
}

fn pass_through(cell: Scalar) -> Value {
    match cell {
        Scalar::Null => Value::Null,
        Scalar::Number(n) => Value::Number(n),
        Scalar::Text(s) => Value::Text(s),
    }
}

/// `None` means the cell could not be coerced and keeps its original value
fn coerce_cell(cell: &Scalar, semantic: SemanticType, scale: PercentScale) -> Option<Value> {
    match (cell, semantic) {
        (Scalar::Null, _) => Some(Value::Null),
        (Scalar::Number(_), SemanticType::Date) => None,
        (Scalar::Number(n), _) => Some(Value::Number(*n)),
        (Scalar::Text(text), SemanticType::String) => Some(Value::Text(text.clone())),
        (Scalar::Text(text), SemanticType::Number | SemanticType::Coordinate) => {
            parse_number(text).map(Value::Number)
        }
        (Scalar::Text(text), SemanticType::Percentage) => parse_percentage(text, scale).map(Value::Number),
        (Scalar::Text(text), SemanticType::Date) => parse_date(text).map(Value::Date),
    }
}

/// Numeric-looking text: optional `$`, thousands separators allowed
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let amount = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let cleaned = amount.replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// `"42.5%"` under the card's convention; bare numbers are taken as already scaled
pub fn parse_percentage(text: &str, scale: PercentScale) -> Option<f64> {
    let trimmed = text.trim();
    match trimmed.strip_suffix('%') {
        Some(points) => {
            let value = parse_number(points)?;
            Some(match scale {
                PercentScale::Points => value,
                PercentScale::Fraction => value / 100.0,
            })
        }
        None => parse_number(trimmed),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

fn find_column(columns: &[ColumnSchema], name: &str) -> DashboardResult<usize> {
    let wanted = sanitize_column_name(name);
    columns
        .iter()
        .position(|c| c.name == wanted)
        .ok_or_else(|| DashboardError::malformed(format!("column {:?} not found", wanted)))
}

/// Declared required columns plus, for geospatial cards, every coordinate column
fn required_columns(
    columns: &[ColumnSchema],
    rules: &NormalizationRuleSet,
    applies: &dyn Fn(&str) -> bool,
) -> DashboardResult<Vec<usize>> {
    let mut required: Vec<usize> = rules
        .required
        .iter()
        .filter(|name| applies(name))
        .map(|name| find_column(columns, name))
        .collect::<DashboardResult<_>>()?;

    if rules.geospatial {
        required.extend(
            columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.semantic == SemanticType::Coordinate && applies(&c.name))
                .map(|(i, _)| i),
        );
    }
    Ok(required)
}

/// True when the table already has the aggregation's output shape:
/// exactly the key and reduced columns, one row per key
fn is_grouped(columns: &[ColumnSchema], rows: &[Vec<Value>], aggregation: &Aggregation) -> bool {
    let expected: Vec<String> = aggregation
        .group_by
        .iter()
        .chain(aggregation.reducers.iter().map(|r| &r.column))
        .map(|name| sanitize_column_name(name))
        .collect();
    if columns.len() != expected.len() || columns.iter().zip(&expected).any(|(c, e)| c.name != *e) {
        return false;
    }

    let width = aggregation.group_by.len();
    let mut keys = HashSet::new();
    rows.iter().all(|row| keys.insert(format!("{:?}", &row[..width])))
}

fn filter_matches(filter: &RowFilter, value: &Value) -> bool {
    match &filter.op {
        FilterOp::Equals { value: wanted } => value.matches(wanted),
        FilterOp::NotEquals { value: unwanted } => !value.matches(unwanted),
        FilterOp::OneOf { values } => values.iter().any(|wanted| value.matches(wanted)),
    }
}

fn aggregate(
    columns: &[ColumnSchema],
    rows: Vec<Vec<Value>>,
    aggregation: &Aggregation,
) -> DashboardResult<(Vec<ColumnSchema>, Vec<Vec<Value>>)> {
    let keys = aggregation
        .group_by
        .iter()
        .map(|name| find_column(columns, name))
        .collect::<DashboardResult<Vec<_>>>()?;
    let reduced = aggregation
        .reducers
        .iter()
        .map(|r| find_column(columns, &r.column).map(|i| (i, r.func)))
        .collect::<DashboardResult<Vec<_>>>()?;

    // Groups keep first-appearance order
    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut members: Vec<Vec<Vec<Value>>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in rows {
        let key: Vec<Value> = keys.iter().map(|&i| row[i].clone()).collect();
        let slot = *index.entry(format!("{:?}", key)).or_insert_with(|| {
            order.push(key);
            members.push(Vec::new());
            order.len() - 1
        });
        members[slot].push(row);
    }

    let out_columns = keys
        .iter()
        .chain(reduced.iter().map(|(i, _)| i))
        .map(|&i| columns[i].clone())
        .collect();

    let out_rows = order
        .into_iter()
        .zip(members)
        .map(|(mut key, group)| {
            key.extend(reduced.iter().map(|&(i, func)| reduce(&group, i, func)));
            key
        })
        .collect();

    Ok((out_columns, out_rows))
}

fn reduce(group: &[Vec<Value>], column: usize, func: ReduceFn) -> Value {
    let numbers: Vec<f64> = group.iter().filter_map(|row| row[column].as_f64()).collect();
    let result = match func {
        ReduceFn::First => {
            return group
                .iter()
                .map(|row| &row[column])
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null);
        }
        _ if numbers.is_empty() => return Value::Null,
        ReduceFn::Sum => numbers.iter().sum(),
        ReduceFn::Mean => numbers.iter().sum::<f64>() / numbers.len() as f64,
        ReduceFn::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        ReduceFn::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    Value::Number(result)
}
