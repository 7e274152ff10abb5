//! Relational operations and their textual rendering.
//!
//! Every operation renders a fragment that is appended to the expression it is
//! applied to, so a query is its root relation followed by each fragment in
//! build order.

mod group_by;
mod merge;
mod projection;
mod selection;

use std::fmt;

pub use group_by::{AggregationFunction, GroupByAggregate};
pub use merge::{JoinKey, Merge};
pub use projection::Projection;
pub use selection::{ComparisonOperator, Condition, Literal, LogicalOperator, Selection};

/// Render an operation against a named relation.
pub trait Apply {
    fn apply(&self, relation: &str) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Selection(Selection),
    Projection(Projection),
    Merge(Merge),
    GroupByAggregate(GroupByAggregate),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Selection,
    Projection,
    Merge,
    GroupByAggregate,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            OperationKind::Selection => "selection",
            OperationKind::Projection => "projection",
            OperationKind::Merge => "merge",
            OperationKind::GroupByAggregate => "groupby",
        })
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Selection(_) => OperationKind::Selection,
            Operation::Projection(_) => OperationKind::Projection,
            Operation::Merge(_) => OperationKind::Merge,
            Operation::GroupByAggregate(_) => OperationKind::GroupByAggregate,
        }
    }

    /// Columns of the current relation this operation reads. For a merge these
    /// are the left join keys only.
    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            Operation::Selection(s) => s.conditions.iter().map(|c| c.column.as_str()).collect(),
            Operation::Projection(p) => p.columns.iter().map(String::as_str).collect(),
            Operation::Merge(m) => m.left_on.columns(),
            Operation::GroupByAggregate(g) => g
                .group_by
                .iter()
                .chain(g.aggregations.keys())
                .map(String::as_str)
                .collect(),
        }
    }
}

impl Apply for Operation {
    fn apply(&self, relation: &str) -> String {
        match self {
            Operation::Selection(op) => op.apply(relation),
            Operation::Projection(op) => op.apply(relation),
            Operation::Merge(op) => op.apply(relation),
            Operation::GroupByAggregate(op) => op.apply(relation),
        }
    }
}

impl From<Selection> for Operation {
    fn from(op: Selection) -> Self {
        Operation::Selection(op)
    }
}

impl From<Projection> for Operation {
    fn from(op: Projection) -> Self {
        Operation::Projection(op)
    }
}

impl From<Merge> for Operation {
    fn from(op: Merge) -> Self {
        Operation::Merge(op)
    }
}

impl From<GroupByAggregate> for Operation {
    fn from(op: GroupByAggregate) -> Self {
        Operation::GroupByAggregate(op)
    }
}

/// Single-quoted string literal with backslashes and quotes escaped.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// `['a', 'b']`
pub(crate) fn quote_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s.as_ref())).collect();
    format!("[{}]", quoted.join(", "))
}
