use std::fmt;

use chrono::NaiveDate;

use super::{quote, quote_list, Apply};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    StartsWith,
    IsIn,
}

impl ComparisonOperator {
    /// Operators valid for int, float and date columns.
    pub const ORDERED: [ComparisonOperator; 6] = [
        ComparisonOperator::Eq,
        ComparisonOperator::Ne,
        ComparisonOperator::Lt,
        ComparisonOperator::Le,
        ComparisonOperator::Gt,
        ComparisonOperator::Ge,
    ];
    pub const STRING: [ComparisonOperator; 3] =
        [ComparisonOperator::Eq, ComparisonOperator::Ne, ComparisonOperator::StartsWith];
    pub const ENUM: [ComparisonOperator; 3] =
        [ComparisonOperator::Eq, ComparisonOperator::Ne, ComparisonOperator::IsIn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::StartsWith => "startswith",
            ComparisonOperator::IsIn => "isin",
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Lt
                | ComparisonOperator::Le
                | ComparisonOperator::Gt
                | ComparisonOperator::Ge
        )
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Joins a condition to the one after it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl LogicalOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            LogicalOperator::And => "&",
            LogicalOperator::Or => "|",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    List(Vec<String>),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Str(s) => f.write_str(&quote(s)),
            Literal::Date(d) => f.write_str(&quote(&d.format("%Y-%m-%d").to_string())),
            Literal::List(items) => f.write_str(&quote_list(items)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub value: Literal,
    /// Ignored on the last condition of a selection.
    pub joiner: LogicalOperator,
}

impl Condition {
    pub fn new(
        column: impl Into<String>,
        operator: ComparisonOperator,
        value: Literal,
        joiner: LogicalOperator,
    ) -> Self {
        Self { column: column.into(), operator, value, joiner }
    }

    fn render(&self, relation: &str) -> String {
        let column = format!("{relation}[{}]", quote(&self.column));
        match self.operator {
            ComparisonOperator::StartsWith => format!("({column}.str.startswith({}))", self.value),
            ComparisonOperator::IsIn => format!("({column}.isin({}))", self.value),
            op => format!("({column} {op} {})", self.value),
        }
    }
}

/// Row filter over an ordered list of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub conditions: Vec<Condition>,
}

impl Selection {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl Apply for Selection {
    fn apply(&self, relation: &str) -> String {
        let Some((first, rest)) = self.conditions.split_first() else {
            return String::new();
        };

        let mut out = String::from("[");
        out.push_str(&first.render(relation));
        let mut joiner = first.joiner;
        for condition in rest {
            out.push_str(&format!(" {joiner} "));
            out.push_str(&condition.render(relation));
            joiner = condition.joiner;
        }
        out.push(']');
        out
    }
}
