use std::fmt;

use crate::query::Query;

use super::{quote, quote_list, Apply};

/// One side of a join condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JoinKey {
    Single(String),
    Composite(Vec<String>),
}

impl JoinKey {
    /// Single column key for one name, composite otherwise.
    pub fn from_columns(mut columns: Vec<String>) -> Self {
        if columns.len() == 1 {
            JoinKey::Single(columns.remove(0))
        } else {
            JoinKey::Composite(columns)
        }
    }

    pub fn columns(&self) -> Vec<&str> {
        match self {
            JoinKey::Single(c) => vec![c.as_str()],
            JoinKey::Composite(cs) => cs.iter().map(String::as_str).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            JoinKey::Single(_) => 1,
            JoinKey::Composite(cs) => cs.len(),
        }
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKey::Single(c) => f.write_str(&quote(c)),
            JoinKey::Composite(cs) => f.write_str(&quote_list(cs)),
        }
    }
}

impl From<&str> for JoinKey {
    fn from(column: &str) -> Self {
        JoinKey::Single(column.to_string())
    }
}

/// Inner join of the current relation with a nested query.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub right: Query,
    pub left_on: JoinKey,
    pub right_on: JoinKey,
}

impl Merge {
    pub fn new(right: Query, left_on: impl Into<JoinKey>, right_on: impl Into<JoinKey>) -> Self {
        Self { right, left_on: left_on.into(), right_on: right_on.into() }
    }
}

impl Apply for Merge {
    fn apply(&self, _relation: &str) -> String {
        format!(
            ".merge({}, left_on={}, right_on={})",
            self.right.single_line(),
            self.left_on,
            self.right_on
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{
        ComparisonOperator, Condition, Literal, LogicalOperator, Projection, Selection,
    };

    fn active_selection() -> Selection {
        Selection::new(vec![
            Condition::new("age", ComparisonOperator::Ge, Literal::Int(25), LogicalOperator::And),
            Condition::new(
                "status",
                ComparisonOperator::Eq,
                Literal::Str("active".into()),
                LogicalOperator::Or,
            ),
        ])
    }

    #[test]
    fn test_merge_with_filtered_right_side() {
        let right = Query::new("orders", vec![active_selection().into()], false);
        let merge = Merge::new(right, "customer_id", "customer_id");
        assert_eq!(
            merge.apply("customer"),
            ".merge(orders[(orders['age'] >= 25) & (orders['status'] == 'active')], \
             left_on='customer_id', right_on='customer_id')"
        );
    }

    #[test]
    fn test_merge_with_selection_and_projection() {
        let right = Query::new(
            "orders",
            vec![active_selection().into(), Projection::new(["name", "age", "email"]).into()],
            false,
        );
        let merge = Merge::new(right, "customer_id", "order_id");
        assert_eq!(
            merge.apply("customer"),
            ".merge(orders[(orders['age'] >= 25) & (orders['status'] == 'active')]\
             [['name', 'age', 'email']], left_on='customer_id', right_on='order_id')"
        );
    }

    #[test]
    fn test_nested_merges_render_inside_out() {
        let items = Query::new("items", vec![active_selection().into()], false);
        let orders = Query::new(
            "orders",
            vec![Merge::new(items, "order_id", "item_id").into()],
            false,
        );
        let outer = Merge::new(orders, "customer_id", "order_id");
        assert_eq!(
            outer.apply("customer"),
            ".merge(orders.merge(items[(items['age'] >= 25) & (items['status'] == 'active')], \
             left_on='order_id', right_on='item_id'), left_on='customer_id', right_on='order_id')"
        );
    }

    #[test]
    fn test_empty_right_query_is_bare_relation() {
        let merge = Merge::new(Query::new("orders", vec![], false), "customer_id", "order_id");
        assert_eq!(merge.apply("customer"), ".merge(orders, left_on='customer_id', right_on='order_id')");
    }

    #[test]
    fn test_composite_keys_render_as_lists() {
        let merge = Merge::new(
            Query::new("orders", vec![], false),
            JoinKey::Composite(vec!["customer_id".into(), "region_id".into()]),
            JoinKey::Composite(vec!["order_customer_id".into(), "order_region_id".into()]),
        );
        assert_eq!(
            merge.apply("customer"),
            ".merge(orders, left_on=['customer_id', 'region_id'], \
             right_on=['order_customer_id', 'order_region_id'])"
        );
        assert_eq!(merge.left_on.arity(), 2);
    }

    #[test]
    fn test_right_side_is_single_line_even_when_multi_line() {
        let right = Query::new("orders", vec![Projection::new(["total"]).into()], true);
        let merge = Merge::new(right, "id", "customer_id");
        assert_eq!(
            merge.apply("customer"),
            ".merge(orders[['total']], left_on='id', right_on='customer_id')"
        );
    }

    #[test]
    fn test_join_key_from_columns() {
        assert_eq!(JoinKey::from_columns(vec!["id".into()]), JoinKey::Single("id".into()));
        assert_eq!(JoinKey::from_columns(vec!["a".into(), "b".into()]).to_string(), "['a', 'b']");
    }
}
