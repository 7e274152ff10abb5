use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::schema::Property;

use super::{quote, quote_list, Apply};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Mean,
    Sum,
    Min,
    Max,
    Count,
}

impl AggregationFunction {
    pub const ALL: [AggregationFunction; 5] = [
        AggregationFunction::Mean,
        AggregationFunction::Sum,
        AggregationFunction::Min,
        AggregationFunction::Max,
        AggregationFunction::Count,
    ];

    const ORDERED_ONLY: [AggregationFunction; 3] =
        [AggregationFunction::Min, AggregationFunction::Max, AggregationFunction::Count];

    /// Functions that evaluate without error on a column of this property type.
    pub fn for_property(property: &Property) -> &'static [AggregationFunction] {
        if property.is_numeric() {
            &Self::ALL
        } else {
            &Self::ORDERED_ONLY
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationFunction::Mean => "mean",
            AggregationFunction::Sum => "sum",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Count => "count",
        }
    }
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group rows by `group_by` and aggregate every column in `aggregations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupByAggregate {
    pub group_by: Vec<String>,
    pub aggregations: IndexMap<String, AggregationFunction>,
}

impl GroupByAggregate {
    pub fn new<I, S>(group_by: I, aggregations: IndexMap<String, AggregationFunction>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { group_by: group_by.into_iter().map(Into::into).collect(), aggregations }
    }
}

impl Apply for GroupByAggregate {
    fn apply(&self, _relation: &str) -> String {
        let aggs: Vec<String> = self
            .aggregations
            .iter()
            .map(|(col, func)| format!("{}: {}", quote(col), quote(func.as_str())))
            .collect();
        format!(
            ".groupby(by={}).agg({{{}}})",
            quote_list(&self.group_by),
            aggs.join(", ")
        )
    }
}
