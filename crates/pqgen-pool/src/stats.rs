//! Aggregate statistics over a batch of queries and their executions.

use std::collections::BTreeMap;
use std::fmt;

use pqgen_core::{ExecutionResult, Operation, Outcome, Query};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryStatistics {
    pub total_queries: usize,
    /// Occurrences of each operation kind across all top-level operations.
    pub operations: BTreeMap<String, usize>,
    /// Number of operations in a merge's right-hand query -> merges.
    pub merge_right_operations: BTreeMap<usize, usize>,
    /// Top-level merges in a query -> queries.
    pub merges_per_query: BTreeMap<usize, usize>,
    /// Conditions in a selection -> selections.
    pub selection_conditions: BTreeMap<usize, usize>,
    /// Columns in a projection -> projections.
    pub projection_columns: BTreeMap<usize, usize>,
    /// Grouping columns in a group-by -> group-bys.
    pub groupby_columns: BTreeMap<usize, usize>,
    pub entity_usage: BTreeMap<String, usize>,
    pub average_operations: f64,
    /// Present once the batch has been executed.
    pub execution: Option<ExecutionStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionStatistics {
    pub successful: usize,
    pub failed: usize,
    pub non_empty: usize,
    pub empty: usize,
    pub success_rate: f64,
    pub non_empty_rate: f64,
    /// Error message -> occurrences.
    pub errors: BTreeMap<String, usize>,
}

impl QueryStatistics {
    pub fn collect(queries: &[Query], results: Option<&[ExecutionResult]>) -> Self {
        let mut stats = Self { total_queries: queries.len(), ..Self::default() };
        let mut total_operations = 0usize;

        for query in queries {
            *stats.entity_usage.entry(query.entity().to_string()).or_default() += 1;
            *stats.merges_per_query.entry(query.merge_count()).or_default() += 1;

            for op in query.operations() {
                total_operations += 1;
                *stats.operations.entry(op.kind().to_string()).or_default() += 1;

                let (histogram, size) = match op {
                    Operation::Merge(m) => (&mut stats.merge_right_operations, m.right.operations().len()),
                    Operation::Selection(s) => (&mut stats.selection_conditions, s.len()),
                    Operation::Projection(p) => (&mut stats.projection_columns, p.len()),
                    Operation::GroupByAggregate(g) => (&mut stats.groupby_columns, g.group_by.len()),
                };
                *histogram.entry(size).or_default() += 1;
            }
        }

        if !queries.is_empty() {
            stats.average_operations = total_operations as f64 / queries.len() as f64;
        }

        stats.execution = results.map(|results| {
            let mut execution = ExecutionStatistics::default();
            for result in results {
                match (Outcome::of(result), result) {
                    (_, Err(err)) => {
                        execution.failed += 1;
                        *execution.errors.entry(err.to_string()).or_default() += 1;
                    }
                    (Outcome::Empty, Ok(_)) => {
                        execution.successful += 1;
                        execution.empty += 1;
                    }
                    (_, Ok(_)) => {
                        execution.successful += 1;
                        execution.non_empty += 1;
                    }
                }
            }
            if !results.is_empty() {
                let total = results.len() as f64;
                execution.success_rate = execution.successful as f64 / total * 100.0;
                execution.non_empty_rate = execution.non_empty as f64 / total * 100.0;
            }
            execution
        });

        stats
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn write_histogram(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    unit: &str,
    histogram: &BTreeMap<usize, usize>,
) -> fmt::Result {
    writeln!(f, "\n{title}:")?;
    let total: usize = histogram.values().sum();
    for (size, count) in histogram {
        writeln!(f, "  {size} {unit}: {count} ({:.2}%)", percent(*count, total))?;
    }
    Ok(())
}

impl fmt::Display for QueryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total queries generated: {}", self.total_queries)?;
        writeln!(f, "Average operations per query: {:.2}", self.average_operations)?;

        writeln!(f, "\nOperation distribution:")?;
        for (op, count) in &self.operations {
            writeln!(f, "  {op}: {count} ({:.2}%)", percent(*count, self.total_queries))?;
        }

        write_histogram(f, "Merges per query", "merges", &self.merges_per_query)?;
        write_histogram(
            f,
            "Merge complexity (operations in right query)",
            "operations",
            &self.merge_right_operations,
        )?;
        write_histogram(f, "Selection complexity", "conditions", &self.selection_conditions)?;
        write_histogram(f, "Projection complexity", "columns", &self.projection_columns)?;
        write_histogram(f, "GroupBy complexity", "columns", &self.groupby_columns)?;

        writeln!(f, "\nEntity usage:")?;
        for (entity, count) in &self.entity_usage {
            writeln!(f, "  {entity}: {count} ({:.2}%)", percent(*count, self.total_queries))?;
        }

        if let Some(execution) = &self.execution {
            writeln!(f, "\nQuery execution results:")?;
            writeln!(
                f,
                "  Successful executions: {} ({:.2}%)",
                execution.successful, execution.success_rate
            )?;
            writeln!(f, "  Failed executions: {}", execution.failed)?;
            writeln!(
                f,
                "  Non-empty results: {} ({:.2}%)",
                execution.non_empty, execution.non_empty_rate
            )?;
            writeln!(f, "  Empty results: {}", execution.empty)?;
            if !execution.errors.is_empty() {
                writeln!(f, "\nErrors:")?;
                for (message, count) in &execution.errors {
                    writeln!(f, "  {count} x {message}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqgen_core::{
        ComparisonOperator, Condition, DataFrame, ExecutionError, Literal, LogicalOperator, Merge,
        Projection, Selection,
    };

    fn selection(n: usize) -> Operation {
        Selection::new(
            (0..n)
                .map(|i| Condition::new("age", ComparisonOperator::Gt, Literal::Int(i as i64), LogicalOperator::And))
                .collect(),
        )
        .into()
    }

    #[test]
    fn test_counts_operations_and_shapes() {
        let right = Query::new("orders", vec![selection(1)], false);
        let queries = vec![
            Query::new("customer", vec![selection(2), Projection::new(["age"]).into()], false),
            Query::new("customer", vec![Merge::new(right, "id", "customer_id").into()], false),
            Query::new("orders", vec![], false),
        ];

        let stats = QueryStatistics::collect(&queries, None);
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.operations["selection"], 1);
        assert_eq!(stats.operations["merge"], 1);
        assert_eq!(stats.selection_conditions[&2], 1);
        assert_eq!(stats.projection_columns[&1], 1);
        assert_eq!(stats.merge_right_operations[&1], 1);
        assert_eq!(stats.merges_per_query[&0], 2);
        assert_eq!(stats.entity_usage["customer"], 2);
        assert!((stats.average_operations - 1.0).abs() < f64::EPSILON);
        assert!(stats.execution.is_none());
    }

    #[test]
    fn test_execution_outcomes_are_tallied() {
        let queries = vec![Query::new("a", vec![], false); 3];
        let frame = DataFrame::from_rows(vec!["x".into()], vec![vec![pqgen_core::Value::Int(1)]]);
        let results = vec![
            Ok(frame),
            Ok(DataFrame::new(vec!["x".into()])),
            Err(ExecutionError::KeyError("y".into())),
        ];

        let stats = QueryStatistics::collect(&queries, Some(&results));
        let execution = stats.execution.clone().unwrap();
        assert_eq!((execution.successful, execution.failed), (2, 1));
        assert_eq!((execution.non_empty, execution.empty), (1, 1));
        assert_eq!(execution.errors["KeyError: 'y'"], 1);

        let report = stats.to_string();
        assert!(report.starts_with("Total queries generated: 3"));
        assert!(report.contains("Failed executions: 1"));
    }

    #[test]
    fn test_empty_batch_has_zero_average() {
        let stats = QueryStatistics::collect(&[], Some(&[]));
        assert_eq!(stats.average_operations, 0.0);
        assert_eq!(stats.execution.unwrap().success_rate, 0.0);
        assert!(serde_json::to_string(&QueryStatistics::default()).is_ok());
    }
}
