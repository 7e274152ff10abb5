//! Evaluation of built queries against sample data.
//!
//! [`FrameExecutor`] interprets a query's operation tree directly over
//! [`SampleData`]. It trusts its input: queries are assumed to come from the
//! builder or from the caller's own code, and nothing here is sandboxed.
//! Semantics follow the dataframe library the rendered text targets, including
//! the error it would raise, so a query classifies the same way whether it is
//! run here or pasted into a notebook.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::frame::{DataFrame, SampleData, Value, ValueKind};
use crate::operation::{
    AggregationFunction, ComparisonOperator, Condition, GroupByAggregate, JoinKey, Literal,
    LogicalOperator, Operation, Projection, Selection,
};
use crate::query::Query;

/// Runtime failure of one query, rendered as the exception text the target
/// library would print.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("KeyError: '{0}'")]
    KeyError(String),

    #[error("NameError: name '{0}' is not defined")]
    UnknownRelation(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("ValueError: {0}")]
    ValueError(String),

    #[error("AttributeError: {0}")]
    AttributeError(String),
}

pub type ExecutionResult = std::result::Result<DataFrame, ExecutionError>;

/// Three-way classification of an execution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    NonEmpty,
    Empty,
    Error,
}

impl Outcome {
    pub fn of(result: &ExecutionResult) -> Self {
        match result {
            Ok(frame) if frame.is_empty() => Outcome::Empty,
            Ok(_) => Outcome::NonEmpty,
            Err(_) => Outcome::Error,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Outcome::NonEmpty => "non_empty",
            Outcome::Empty => "empty",
            Outcome::Error => "error",
        })
    }
}

pub trait Executor: Send + Sync {
    fn execute(&self, query: &Query, data: &SampleData) -> ExecutionResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameExecutor;

impl Executor for FrameExecutor {
    fn execute(&self, query: &Query, data: &SampleData) -> ExecutionResult {
        let mut frame = data
            .get(query.entity())
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownRelation(query.entity().to_string()))?;

        for op in query.operations() {
            frame = match op {
                Operation::Selection(selection) => select(&frame, selection)?,
                Operation::Projection(projection) => project(&frame, projection)?,
                Operation::Merge(merge) => {
                    let right = self.execute(&merge.right, data)?;
                    inner_merge(&frame, &right, &merge.left_on, &merge.right_on)?
                }
                Operation::GroupByAggregate(group_by) => aggregate(&frame, group_by)?,
            };
        }

        Ok(frame)
    }
}

fn column_index(frame: &DataFrame, column: &str) -> Result<usize, ExecutionError> {
    frame
        .column_index(column)
        .ok_or_else(|| ExecutionError::KeyError(column.to_string()))
}

/// Kind of a column, taken from its first cell.
fn column_kind(frame: &DataFrame, idx: usize) -> Option<ValueKind> {
    frame.rows().first().map(|row| row[idx].kind())
}

fn literal_type(literal: &Literal) -> &'static str {
    match literal {
        Literal::Int(_) => "int",
        Literal::Float(_) => "float",
        Literal::Str(_) => "str",
        Literal::Date(_) => "date",
        Literal::List(_) => "list",
    }
}

/// Ordering of a cell against a scalar literal. Date cells also compare
/// against ISO date strings.
fn compare(cell: &Value, literal: &Literal) -> Option<Ordering> {
    let rhs = match literal {
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Date(d) => Value::Date(*d),
        Literal::Str(s) => match cell {
            Value::Date(_) => Value::Date(s.parse().ok()?),
            _ => Value::Str(s.clone()),
        },
        Literal::List(_) => return None,
    };
    cell.try_cmp(&rhs)
}

fn condition_mask(frame: &DataFrame, condition: &Condition) -> Result<Vec<bool>, ExecutionError> {
    let idx = column_index(frame, &condition.column)?;
    let cells = frame.rows().iter().map(|row| &row[idx]);

    match (condition.operator, &condition.value) {
        (ComparisonOperator::StartsWith, Literal::Str(prefix)) => {
            match column_kind(frame, idx) {
                Some(ValueKind::Str) | None => {}
                Some(_) => {
                    return Err(ExecutionError::AttributeError(
                        "Can only use .str accessor with string values!".into(),
                    ))
                }
            }
            Ok(cells.map(|v| v.as_str().is_some_and(|s| s.starts_with(prefix.as_str()))).collect())
        }
        (ComparisonOperator::IsIn, Literal::List(values)) => Ok(cells
            .map(|v| v.as_str().is_some_and(|s| values.iter().any(|x| x == s)))
            .collect()),
        (ComparisonOperator::StartsWith | ComparisonOperator::IsIn, other) => {
            Err(ExecutionError::TypeError(format!(
                "{} does not accept a {} argument",
                condition.operator,
                literal_type(other)
            )))
        }
        (_, Literal::List(_)) => {
            Err(ExecutionError::ValueError("Lengths must match to compare".into()))
        }
        (op, literal) => {
            let mut mask = Vec::with_capacity(frame.len());
            for cell in cells {
                let ord = compare(cell, literal);
                let hit = match (op, ord) {
                    (ComparisonOperator::Eq, ord) => ord == Some(Ordering::Equal),
                    (ComparisonOperator::Ne, ord) => ord != Some(Ordering::Equal),
                    (_, None) => {
                        return Err(ExecutionError::TypeError(format!(
                            "Invalid comparison between dtype={} and {}",
                            cell.kind(),
                            literal_type(literal)
                        )))
                    }
                    (ComparisonOperator::Lt, Some(o)) => o == Ordering::Less,
                    (ComparisonOperator::Le, Some(o)) => o != Ordering::Greater,
                    (ComparisonOperator::Gt, Some(o)) => o == Ordering::Greater,
                    (ComparisonOperator::Ge, Some(o)) => o != Ordering::Less,
                    (ComparisonOperator::StartsWith | ComparisonOperator::IsIn, _) => false,
                };
                mask.push(hit);
            }
            Ok(mask)
        }
    }
}

/// `&` binds tighter than `|`: the selection is an OR of AND-chains.
fn select(frame: &DataFrame, selection: &Selection) -> Result<DataFrame, ExecutionError> {
    if selection.is_empty() {
        return Ok(frame.clone());
    }

    let mut result = vec![false; frame.len()];
    let mut chain: Option<Vec<bool>> = None;
    let mut joiner = LogicalOperator::And;

    for condition in &selection.conditions {
        let mask = condition_mask(frame, condition)?;
        chain = Some(match (chain.take(), joiner) {
            (Some(current), LogicalOperator::And) => {
                current.iter().zip(&mask).map(|(a, b)| *a && *b).collect()
            }
            (Some(current), LogicalOperator::Or) => {
                result.iter_mut().zip(&current).for_each(|(r, c)| *r |= *c);
                mask
            }
            (None, _) => mask,
        });
        joiner = condition.joiner;
    }
    if let Some(current) = chain {
        result.iter_mut().zip(&current).for_each(|(r, c)| *r |= *c);
    }

    let rows = frame
        .rows()
        .iter()
        .zip(&result)
        .filter(|(_, keep)| **keep)
        .map(|(row, _)| row.clone())
        .collect();
    Ok(DataFrame::from_rows(frame.columns().to_vec(), rows))
}

fn project(frame: &DataFrame, projection: &Projection) -> Result<DataFrame, ExecutionError> {
    let indices = projection
        .columns
        .iter()
        .map(|c| column_index(frame, c))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = frame
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(DataFrame::from_rows(projection.columns.clone(), rows))
}

fn kinds_compatible(a: ValueKind, b: ValueKind) -> bool {
    let numeric = |k: ValueKind| matches!(k, ValueKind::Int | ValueKind::Float);
    a == b || (numeric(a) && numeric(b))
}

/// Inner join preserving left row order. Key pairs with the same name on both
/// sides collapse into one column; other overlapping names get `_x`/`_y`.
fn inner_merge(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &JoinKey,
    right_on: &JoinKey,
) -> Result<DataFrame, ExecutionError> {
    let left_keys = left_on.columns();
    let right_keys = right_on.columns();
    if left_keys.len() != right_keys.len() {
        return Err(ExecutionError::ValueError(
            "len(right_on) must equal len(left_on)".into(),
        ));
    }

    let left_idx = left_keys
        .iter()
        .map(|c| column_index(left, c))
        .collect::<Result<Vec<_>, _>>()?;
    let right_idx = right_keys
        .iter()
        .map(|c| column_index(right, c))
        .collect::<Result<Vec<_>, _>>()?;

    for ((&l, &r), name) in left_idx.iter().zip(&right_idx).zip(&left_keys) {
        if let (Some(lk), Some(rk)) = (column_kind(left, l), column_kind(right, r)) {
            if !kinds_compatible(lk, rk) {
                return Err(ExecutionError::ValueError(format!(
                    "You are trying to merge on {lk} and {rk} columns for key '{name}'. \
                     If you wish to proceed you should use pd.concat"
                )));
            }
        }
    }

    let shared: Vec<&str> = left_keys
        .iter()
        .zip(&right_keys)
        .filter(|(l, r)| l == r)
        .map(|(l, _)| *l)
        .collect();
    let overlaps = |name: &str| {
        !shared.contains(&name)
            && left.columns().iter().any(|c| c == name)
            && right.columns().iter().any(|c| c == name)
    };

    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .map(|c| if overlaps(c) { format!("{c}_x") } else { c.clone() })
        .collect();
    let right_kept: Vec<usize> = (0..right.width())
        .filter(|&i| !shared.contains(&right.columns()[i].as_str()))
        .collect();
    columns.extend(right_kept.iter().map(|&i| {
        let c = &right.columns()[i];
        if overlaps(c) { format!("{c}_y") } else { c.clone() }
    }));

    let key_of = |row: &[Value], idx: &[usize]| -> String {
        idx.iter().map(|&i| row[i].join_key()).collect::<Vec<_>>().join("\u{1f}")
    };
    let mut lookup: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (i, row) in right.rows().iter().enumerate() {
        lookup.entry(key_of(row, &right_idx)).or_default().push(i);
    }

    let mut rows = Vec::new();
    for left_row in left.rows() {
        if let Some(matches) = lookup.get(&key_of(left_row, &left_idx)) {
            for &m in matches {
                let mut row = left_row.clone();
                row.extend(right_kept.iter().map(|&i| right.rows()[m][i].clone()));
                rows.push(row);
            }
        }
    }

    Ok(DataFrame::from_rows(columns, rows))
}

fn aggregate(frame: &DataFrame, group_by: &GroupByAggregate) -> Result<DataFrame, ExecutionError> {
    let group_idx = group_by
        .group_by
        .iter()
        .map(|c| column_index(frame, c))
        .collect::<Result<Vec<_>, _>>()?;
    let agg_idx = group_by
        .aggregations
        .iter()
        .map(|(c, f)| Ok((column_index(frame, c)?, *f)))
        .collect::<Result<Vec<_>, ExecutionError>>()?;
    if agg_idx.is_empty() {
        return Err(ExecutionError::ValueError("No objects to concatenate".into()));
    }

    for &(idx, func) in &agg_idx {
        if matches!(func, AggregationFunction::Mean | AggregationFunction::Sum) {
            if let Some(kind) = column_kind(frame, idx) {
                if !matches!(kind, ValueKind::Int | ValueKind::Float) {
                    return Err(ExecutionError::TypeError(format!(
                        "agg function failed [how->{func},dtype->{kind}]"
                    )));
                }
            }
        }
    }

    let mut groups: IndexMap<String, (Vec<Value>, Vec<usize>)> = IndexMap::new();
    for (i, row) in frame.rows().iter().enumerate() {
        let key: Vec<Value> = group_idx.iter().map(|&g| row[g].clone()).collect();
        let hash = key.iter().map(Value::join_key).collect::<Vec<_>>().join("\u{1f}");
        groups.entry(hash).or_insert_with(|| (key, Vec::new())).1.push(i);
    }

    let mut groups: Vec<(Vec<Value>, Vec<usize>)> = groups.into_values().collect();
    groups.sort_by(|(a, _), (b, _)| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.try_cmp(y).unwrap_or(Ordering::Equal))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    let mut columns = group_by.group_by.clone();
    columns.extend(group_by.aggregations.keys().cloned());

    let rows = groups
        .into_iter()
        .map(|(mut key, members)| {
            for &(idx, func) in &agg_idx {
                let cells: Vec<&Value> = members.iter().map(|&m| &frame.rows()[m][idx]).collect();
                key.push(apply_aggregation(func, &cells));
            }
            key
        })
        .collect();

    Ok(DataFrame::from_rows(columns, rows))
}

/// `cells` is non-empty and homogeneous; mean and sum only see numbers.
fn apply_aggregation(func: AggregationFunction, cells: &[&Value]) -> Value {
    let extreme = |wanted: Ordering| {
        cells
            .iter()
            .copied()
            .reduce(|best, v| if v.try_cmp(best) == Some(wanted) { v } else { best })
            .cloned()
            .unwrap_or(Value::Int(0))
    };

    match func {
        AggregationFunction::Count => Value::Int(cells.len() as i64),
        AggregationFunction::Min => extreme(Ordering::Less),
        AggregationFunction::Max => extreme(Ordering::Greater),
        AggregationFunction::Sum => {
            if cells.iter().all(|v| matches!(v, Value::Int(_))) {
                Value::Int(
                    cells
                        .iter()
                        .filter_map(|v| match v {
                            Value::Int(i) => Some(*i),
                            _ => None,
                        })
                        .sum(),
                )
            } else {
                Value::Float(cells.iter().filter_map(|v| v.as_f64()).sum())
            }
        }
        AggregationFunction::Mean => {
            let sum: f64 = cells.iter().filter_map(|v| v.as_f64()).sum();
            Value::Float(sum / cells.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Merge, Projection};
    use chrono::NaiveDate;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    fn data() -> SampleData {
        let customer = DataFrame::from_rows(
            vec!["id".into(), "name".into(), "age".into(), "country".into()],
            vec![
                vec![Value::Int(1), s("Ann"), Value::Int(30), s("fr")],
                vec![Value::Int(2), s("Bob"), Value::Int(17), s("de")],
                vec![Value::Int(3), s("Abe"), Value::Int(45), s("fr")],
            ],
        );
        let orders = DataFrame::from_rows(
            vec!["order_id".into(), "customer_id".into(), "total".into(), "name".into()],
            vec![
                vec![Value::Int(10), Value::Int(3), Value::Float(5.5), s("pen")],
                vec![Value::Int(11), Value::Int(1), Value::Float(2.0), s("ink")],
                vec![Value::Int(12), Value::Int(3), Value::Float(1.5), s("cap")],
            ],
        );
        [("customer".to_string(), customer), ("orders".to_string(), orders)]
            .into_iter()
            .collect()
    }

    fn cond(column: &str, op: ComparisonOperator, value: Literal, joiner: LogicalOperator) -> Condition {
        Condition::new(column, op, value, joiner)
    }

    fn run(query: Query) -> ExecutionResult {
        FrameExecutor.execute(&query, &data())
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        // age > 40 | age < 20 & name startswith 'A'  ==  age > 40 | (age < 20 & ...)
        let selection = Selection::new(vec![
            cond("age", ComparisonOperator::Gt, Literal::Int(40), LogicalOperator::Or),
            cond("age", ComparisonOperator::Lt, Literal::Int(20), LogicalOperator::And),
            cond("name", ComparisonOperator::StartsWith, Literal::Str("A".into()), LogicalOperator::And),
        ]);
        let frame = run(Query::new("customer", vec![selection.into()], false)).unwrap();
        let ids: Vec<_> = frame.column("id").unwrap().cloned().collect();
        assert_eq!(ids, vec![Value::Int(3)]);
    }

    #[test]
    fn test_unknown_column_is_key_error() {
        let selection = Selection::new(vec![cond(
            "height",
            ComparisonOperator::Eq,
            Literal::Int(1),
            LogicalOperator::And,
        )]);
        let err = run(Query::new("customer", vec![selection.into()], false)).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'height'");
    }

    #[test]
    fn test_unsatisfiable_selection_is_empty_not_error() {
        let selection = Selection::new(vec![
            cond("age", ComparisonOperator::Lt, Literal::Int(20), LogicalOperator::And),
            cond("age", ComparisonOperator::Gt, Literal::Int(30), LogicalOperator::And),
        ]);
        let result = run(Query::new("customer", vec![selection.into()], false));
        assert_eq!(Outcome::of(&result), Outcome::Empty);
        assert_eq!(result.unwrap().width(), 4);
    }

    #[test]
    fn test_ordering_across_types_is_type_error_but_equality_is_false() {
        let lt = Selection::new(vec![cond(
            "age",
            ComparisonOperator::Lt,
            Literal::Str("x".into()),
            LogicalOperator::And,
        )]);
        let err = run(Query::new("customer", vec![lt.into()], false)).unwrap_err();
        assert!(matches!(err, ExecutionError::TypeError(_)));

        let ne = Selection::new(vec![cond(
            "age",
            ComparisonOperator::Ne,
            Literal::Str("x".into()),
            LogicalOperator::And,
        )]);
        assert_eq!(run(Query::new("customer", vec![ne.into()], false)).unwrap().len(), 3);
    }

    #[test]
    fn test_string_accessor_on_numbers_fails() {
        let selection = Selection::new(vec![cond(
            "age",
            ComparisonOperator::StartsWith,
            Literal::Str("3".into()),
            LogicalOperator::And,
        )]);
        let result = run(Query::new("customer", vec![selection.into()], false));
        assert!(matches!(result, Err(ExecutionError::AttributeError(_))));
    }

    #[test]
    fn test_isin_filters_membership() {
        let selection = Selection::new(vec![cond(
            "country",
            ComparisonOperator::IsIn,
            Literal::List(vec!["de".into(), "it".into()]),
            LogicalOperator::And,
        )]);
        let frame = run(Query::new("customer", vec![selection.into()], false)).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get(0, "name"), Some(&s("Bob")));
    }

    #[test]
    fn test_projection_reorders_and_checks_columns() {
        let frame = run(Query::new("customer", vec![Projection::new(["name", "id"]).into()], false)).unwrap();
        assert_eq!(frame.columns(), &["name".to_string(), "id".to_string()]);

        let err = run(Query::new("customer", vec![Projection::new(["nope"]).into()], false)).unwrap_err();
        assert_eq!(err, ExecutionError::KeyError("nope".into()));
    }

    #[test]
    fn test_merge_keeps_left_order_and_suffixes_overlaps() {
        let merge = Merge::new(Query::new("orders", vec![], false), "id", "customer_id");
        let frame = run(Query::new("customer", vec![merge.into()], false)).unwrap();

        assert_eq!(
            frame.columns(),
            &[
                "id", "name_x", "age", "country", "order_id", "customer_id", "total", "name_y"
            ]
            .map(String::from)
        );
        let orders: Vec<_> = frame.column("order_id").unwrap().cloned().collect();
        assert_eq!(orders, vec![Value::Int(11), Value::Int(10), Value::Int(12)]);
    }

    #[test]
    fn test_same_named_keys_collapse() {
        let mut data = data();
        data.insert(
            "visits",
            DataFrame::from_rows(
                vec!["id".into(), "day".into()],
                vec![vec![Value::Int(2), Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())]],
            ),
        );
        let merge = Merge::new(Query::new("visits", vec![], false), "id", "id");
        let frame = FrameExecutor
            .execute(&Query::new("customer", vec![merge.into()], false), &data)
            .unwrap();
        assert_eq!(frame.width(), 5);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get(0, "name"), Some(&s("Bob")));
    }

    #[test]
    fn test_merge_on_incompatible_kinds_is_value_error() {
        let merge = Merge::new(Query::new("orders", vec![], false), "name", "customer_id");
        let err = run(Query::new("customer", vec![merge.into()], false)).unwrap_err();
        assert!(err.to_string().starts_with("ValueError: You are trying to merge on object and int64"));
    }

    #[test]
    fn test_groupby_sorts_groups_and_aggregates() {
        let mut aggs = IndexMap::new();
        aggs.insert("age".to_string(), AggregationFunction::Mean);
        aggs.insert("name".to_string(), AggregationFunction::Min);
        aggs.insert("id".to_string(), AggregationFunction::Count);
        let op = GroupByAggregate::new(["country"], aggs);
        let frame = run(Query::new("customer", vec![op.into()], false)).unwrap();

        assert_eq!(frame.columns(), &["country", "age", "name", "id"].map(String::from));
        assert_eq!(frame.rows()[0], vec![s("de"), Value::Float(17.0), s("Bob"), Value::Int(1)]);
        assert_eq!(frame.rows()[1], vec![s("fr"), Value::Float(37.5), s("Abe"), Value::Int(2)]);
    }

    #[test]
    fn test_mean_of_text_is_type_error() {
        let mut aggs = IndexMap::new();
        aggs.insert("name".to_string(), AggregationFunction::Mean);
        let op = GroupByAggregate::new(["country"], aggs);
        let err = run(Query::new("customer", vec![op.into()], false)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: agg function failed [how->mean,dtype->object]");
    }

    #[test]
    fn test_unknown_relation_is_reported() {
        let err = run(Query::new("ghost", vec![], false)).unwrap_err();
        assert_eq!(err.to_string(), "NameError: name 'ghost' is not defined");
        assert_eq!(Outcome::of(&Err(err)), Outcome::Error);
    }
}
