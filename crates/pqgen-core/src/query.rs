//! Built queries and their two textual forms.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::operation::{Apply, Operation};

/// A root relation and the operations applied to it, in order.
///
/// The rendered text and complexity are computed once at construction. Two
/// queries are equal when they render identically and have the same
/// complexity; they order by complexity first, then by rendered text.
#[derive(Debug, Clone)]
pub struct Query {
    entity: String,
    operations: Vec<Operation>,
    multi_line: bool,
    complexity: usize,
    rendered: String,
}

impl Query {
    pub fn new(entity: impl Into<String>, operations: Vec<Operation>, multi_line: bool) -> Self {
        let entity = entity.into();
        let complexity = complexity_of(&operations);
        let mut query = Self { entity, operations, multi_line, complexity, rendered: String::new() };
        query.rendered = if multi_line {
            query.multi_line_script(1).0
        } else {
            query.single_line()
        };
        query
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_multi_line(&self) -> bool {
        self.multi_line
    }

    /// Merge count weighted by nesting depth.
    pub fn complexity(&self) -> usize {
        self.complexity
    }

    /// The text selected by the `multi_line` flag.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Same operations rendered in the other mode.
    pub fn with_multi_line(&self, multi_line: bool) -> Self {
        Self::new(self.entity.clone(), self.operations.clone(), multi_line)
    }

    pub fn into_parts(self) -> (String, Vec<Operation>) {
        (self.entity, self.operations)
    }

    /// The query as one chained expression.
    pub fn single_line(&self) -> String {
        let mut out = self.entity.clone();
        for op in &self.operations {
            out.push_str(&op.apply(&self.entity));
        }
        out
    }

    /// The query as numbered assignments `df{start}`, `df{start+1}`, ...
    ///
    /// Returns the script and the next unused counter. A merge first emits the
    /// statements of its right-hand query, then a join statement that refers to
    /// the right-hand query's last intermediate (or to its bare relation name
    /// when it has no operations).
    pub fn multi_line_script(&self, start: usize) -> (String, usize) {
        let mut lines: Vec<String> = Vec::new();
        let mut counter = start;
        let mut current = self.entity.clone();

        for op in &self.operations {
            match op {
                Operation::Merge(merge) => {
                    let (right_script, right_next) = merge.right.multi_line_script(counter);
                    let right_name = if right_script.is_empty() {
                        merge.right.entity.clone()
                    } else {
                        lines.push(right_script);
                        format!("df{}", right_next - 1)
                    };
                    lines.push(format!(
                        "df{right_next} = {current}.merge({right_name}, left_on={}, right_on={})",
                        merge.left_on, merge.right_on
                    ));
                    current = format!("df{right_next}");
                    counter = right_next + 1;
                }
                other => {
                    lines.push(format!("df{counter} = {current}{}", other.apply(&current)));
                    current = format!("df{counter}");
                    counter += 1;
                }
            }
        }

        (lines.join("\n"), counter)
    }

    /// Number of top-level merge operations.
    pub fn merge_count(&self) -> usize {
        self.operations.iter().filter(|op| matches!(op, Operation::Merge(_))).count()
    }
}

fn complexity_of(operations: &[Operation]) -> usize {
    operations
        .iter()
        .map(|op| match op {
            Operation::Merge(merge) => 1 + merge.right.complexity,
            _ => 0,
        })
        .sum()
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.complexity == other.complexity && self.rendered == other.rendered
    }
}

impl Eq for Query {}

impl Hash for Query {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rendered.hash(state);
        self.complexity.hash(state);
    }
}

impl PartialOrd for Query {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Query {
    fn cmp(&self, other: &Self) -> Ordering {
        self.complexity
            .cmp(&other.complexity)
            .then_with(|| self.rendered.cmp(&other.rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{
        AggregationFunction, ComparisonOperator, Condition, GroupByAggregate, Literal,
        LogicalOperator, Merge, Projection, Selection,
    };
    use indexmap::IndexMap;

    fn select(column: &str, op: ComparisonOperator, value: Literal) -> Operation {
        Selection::new(vec![Condition::new(column, op, value, LogicalOperator::And)]).into()
    }

    fn age_at_least_25() -> Operation {
        select("age", ComparisonOperator::Ge, Literal::Int(25))
    }

    fn mean_age_by_country() -> Operation {
        let mut aggs = IndexMap::new();
        aggs.insert("age".to_string(), AggregationFunction::Mean);
        GroupByAggregate::new(["country"], aggs).into()
    }

    #[test]
    fn test_empty_query_is_entity_name() {
        let query = Query::new("customer", vec![], false);
        assert_eq!(query.to_string(), "customer");
        assert_eq!(query.complexity(), 0);
        assert_eq!(query.multi_line_script(1), (String::new(), 1));
    }

    #[test]
    fn test_single_line_concatenates_fragments() {
        let selection = age_at_least_25();
        let projection: Operation = Projection::new(["name", "age", "email"]).into();
        let query = Query::new("customer", vec![selection.clone(), projection.clone()], false);
        assert_eq!(
            query.to_string(),
            format!("customer{}{}", selection.apply("customer"), projection.apply("customer"))
        );
    }

    #[test]
    fn test_single_line_with_merge_then_projection() {
        let right = Query::new(
            "orders",
            vec![select("status", ComparisonOperator::Eq, Literal::Str("active".into()))],
            false,
        );
        let query = Query::new(
            "customer",
            vec![
                age_at_least_25(),
                Merge::new(right, "customer_id", "customer_id").into(),
                Projection::new(["name", "age", "email"]).into(),
            ],
            false,
        );
        assert_eq!(
            query.to_string(),
            "customer[(customer['age'] >= 25)]\
             .merge(orders[(orders['status'] == 'active')], left_on='customer_id', right_on='customer_id')\
             [['name', 'age', 'email']]"
        );
        assert_eq!(query.complexity(), 1);
    }

    #[test]
    fn test_multi_line_basic_chain() {
        let query = Query::new(
            "customer",
            vec![
                age_at_least_25(),
                Projection::new(["name", "email"]).into(),
                mean_age_by_country(),
            ],
            true,
        );

        let (script, next) = query.multi_line_script(1);
        assert_eq!(
            script,
            [
                "df1 = customer[(customer['age'] >= 25)]",
                "df2 = df1[['name', 'email']]",
                "df3 = df2.groupby(by=['country']).agg({'age': 'mean'})",
            ]
            .join("\n")
        );
        assert_eq!(next, 4);
        assert_eq!(query.to_string(), script);
    }

    #[test]
    fn test_multi_line_merge_emits_right_side_first() {
        let right = Query::new(
            "orders",
            vec![select("status", ComparisonOperator::Eq, Literal::Str("active".into()))],
            false,
        );
        let query = Query::new(
            "customer",
            vec![age_at_least_25(), Merge::new(right, "customer_id", "customer_id").into()],
            true,
        );

        let (script, next) = query.multi_line_script(1);
        assert_eq!(
            script,
            [
                "df1 = customer[(customer['age'] >= 25)]",
                "df2 = orders[(orders['status'] == 'active')]",
                "df3 = df1.merge(df2, left_on='customer_id', right_on='customer_id')",
            ]
            .join("\n")
        );
        assert_eq!(next, 4);
    }

    #[test]
    fn test_multi_line_nested_merges_thread_counter() {
        let inner = Query::new(
            "orders",
            vec![select("status", ComparisonOperator::Eq, Literal::Str("pending".into()))],
            false,
        );
        let middle = Query::new(
            "products",
            vec![Merge::new(inner, "order_id", "order_id").into()],
            false,
        );
        let query = Query::new(
            "customer",
            vec![
                select("active", ComparisonOperator::Eq, Literal::Int(1)),
                Merge::new(middle, "product_id", "product_id").into(),
            ],
            true,
        );

        let (script, next) = query.multi_line_script(1);
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(
            lines,
            vec![
                "df1 = customer[(customer['active'] == 1)]",
                "df2 = orders[(orders['status'] == 'pending')]",
                "df3 = products.merge(df2, left_on='order_id', right_on='order_id')",
                "df4 = df1.merge(df3, left_on='product_id', right_on='product_id')",
            ]
        );
        assert_eq!(next, 5);
        assert_eq!(query.complexity(), 2);
    }

    #[test]
    fn test_multi_line_merge_with_bare_right_side() {
        let query = Query::new(
            "customer",
            vec![
                age_at_least_25(),
                Merge::new(Query::new("orders", vec![], false), "id", "customer_id").into(),
            ],
            true,
        );
        let (script, next) = query.multi_line_script(1);
        assert_eq!(
            script,
            "df1 = customer[(customer['age'] >= 25)]\n\
             df2 = df1.merge(orders, left_on='id', right_on='customer_id')"
        );
        assert_eq!(next, 3);
    }

    #[test]
    fn test_multi_line_respects_start_counter() {
        let query = Query::new("customer", vec![age_at_least_25()], false);
        let (script, next) = query.multi_line_script(7);
        assert_eq!(script, "df7 = customer[(customer['age'] >= 25)]");
        assert_eq!(next, 8);
    }

    #[test]
    fn test_complexity_counts_nested_merges() {
        let leaf = Query::new("items", vec![], false);
        let mid = Query::new("orders", vec![Merge::new(leaf.clone(), "a", "b").into()], false);
        let one = Query::new("customer", vec![Merge::new(leaf.clone(), "a", "b").into()], false);
        let two = Query::new("customer", vec![Merge::new(mid.clone(), "a", "b").into()], false);
        let three = Query::new(
            "customer",
            vec![Merge::new(mid, "a", "b").into(), Merge::new(leaf, "a", "b").into()],
            false,
        );
        assert_eq!(one.complexity(), 1);
        assert_eq!(two.complexity(), 2);
        assert_eq!(three.complexity(), 3);
        assert_eq!(three.merge_count(), 2);
    }

    #[test]
    fn test_equality_ignores_structure_but_not_rendering() {
        let a = Query::new("customer", vec![Projection::new(["name"]).into()], false);
        let b = Query::new("customer", vec![Projection::new(["name"]).into()], false);
        assert_eq!(a, b);

        let multi = a.with_multi_line(true);
        assert_eq!(multi.to_string(), "df1 = customer[['name']]");
        assert_ne!(a, multi);
    }

    #[test]
    fn test_ordering_is_complexity_then_text() {
        let merged = Query::new(
            "a",
            vec![Merge::new(Query::new("b", vec![], false), "x", "y").into()],
            false,
        );
        let plain_z = Query::new("z", vec![], false);
        let plain_a = Query::new("a", vec![], false);

        let mut all = vec![merged.clone(), plain_z.clone(), plain_a.clone()];
        all.sort();
        assert_eq!(all, vec![plain_a, plain_z, merged]);
    }
}
