//! Optional pass that removes self-contradicting selection conditions.
//!
//! Conditions are grouped into AND-chains separated by `|`. Within a chain,
//! each condition is checked against the earlier conditions on the same
//! column; one that would make the chain unsatisfiable (`age < 20 & age > 30`)
//! is dropped and its joiner moves onto the previous kept condition, so the
//! chain boundaries stay where they were.

use std::collections::HashMap;

use tracing::trace;

use crate::operation::{ComparisonOperator, Condition, Literal, LogicalOperator};

pub fn eliminate_contradictions(conditions: Vec<Condition>) -> Vec<Condition> {
    let mut kept: Vec<Condition> = Vec::with_capacity(conditions.len());
    let mut chain: HashMap<String, Constraint> = HashMap::new();

    for condition in conditions {
        if kept.last().is_some_and(|c| c.joiner == LogicalOperator::Or) {
            chain.clear();
        }

        if admit(&mut chain, &condition) {
            kept.push(condition);
        } else {
            trace!(column = %condition.column, operator = %condition.operator, "Dropping contradicting condition");
            if let Some(prev) = kept.last_mut() {
                prev.joiner = condition.joiner;
            }
        }
    }

    kept
}

/// Record `condition` in the chain if it keeps the chain satisfiable.
fn admit(chain: &mut HashMap<String, Constraint>, condition: &Condition) -> bool {
    let mut constraint = match chain.get(&condition.column) {
        Some(existing) => existing.clone(),
        None => Constraint::for_literal(&condition.value),
    };

    if !constraint.apply(condition.operator, &condition.value) {
        return true;
    }
    if !constraint.is_satisfiable() {
        return false;
    }
    chain.insert(condition.column.clone(), constraint);
    true
}

#[derive(Debug, Clone)]
enum Constraint {
    Range(Interval),
    Text(TextDomain),
}

impl Constraint {
    fn for_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Int(_) | Literal::Date(_) => Constraint::Range(Interval::new(true)),
            Literal::Float(_) => Constraint::Range(Interval::new(false)),
            Literal::Str(_) | Literal::List(_) => Constraint::Text(TextDomain::default()),
        }
    }

    /// Returns false when the condition is not modeled by this constraint.
    fn apply(&mut self, op: ComparisonOperator, literal: &Literal) -> bool {
        match self {
            Constraint::Range(interval) => match numeric(literal) {
                Some(v) => interval.apply(op, v),
                None => false,
            },
            Constraint::Text(text) => text.apply(op, literal),
        }
    }

    fn is_satisfiable(&self) -> bool {
        match self {
            Constraint::Range(interval) => interval.is_satisfiable(),
            Constraint::Text(text) => text.is_satisfiable(),
        }
    }
}

fn numeric(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Int(i) => Some(*i as f64),
        Literal::Float(f) => Some(*f),
        Literal::Date(d) => Some(chrono::Datelike::num_days_from_ce(d) as f64),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Interval {
    lo: f64,
    lo_inclusive: bool,
    hi: f64,
    hi_inclusive: bool,
    excluded: Vec<f64>,
    /// Integer and date columns only hold whole values.
    integral: bool,
}

impl Interval {
    fn new(integral: bool) -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            lo_inclusive: false,
            hi: f64::INFINITY,
            hi_inclusive: false,
            excluded: Vec::new(),
            integral,
        }
    }

    fn raise_lo(&mut self, v: f64, inclusive: bool) {
        if v > self.lo || (v == self.lo && !inclusive) {
            self.lo = v;
            self.lo_inclusive = inclusive;
        }
    }

    fn lower_hi(&mut self, v: f64, inclusive: bool) {
        if v < self.hi || (v == self.hi && !inclusive) {
            self.hi = v;
            self.hi_inclusive = inclusive;
        }
    }

    fn apply(&mut self, op: ComparisonOperator, v: f64) -> bool {
        match op {
            ComparisonOperator::Eq => {
                self.raise_lo(v, true);
                self.lower_hi(v, true);
            }
            ComparisonOperator::Ne => self.excluded.push(v),
            ComparisonOperator::Lt => self.lower_hi(v, false),
            ComparisonOperator::Le => self.lower_hi(v, true),
            ComparisonOperator::Gt => self.raise_lo(v, false),
            ComparisonOperator::Ge => self.raise_lo(v, true),
            ComparisonOperator::StartsWith | ComparisonOperator::IsIn => return false,
        }
        true
    }

    fn is_satisfiable(&self) -> bool {
        if !self.integral {
            if self.lo < self.hi {
                return true;
            }
            return self.lo == self.hi
                && self.lo_inclusive
                && self.hi_inclusive
                && !self.excluded.contains(&self.lo);
        }

        let lo = match (self.lo.is_finite(), self.lo_inclusive) {
            (false, _) => self.lo,
            (true, true) => self.lo.ceil(),
            (true, false) => self.lo.floor() + 1.0,
        };
        let hi = match (self.hi.is_finite(), self.hi_inclusive) {
            (false, _) => self.hi,
            (true, true) => self.hi.floor(),
            (true, false) => self.hi.ceil() - 1.0,
        };
        if lo > hi {
            return false;
        }
        if !(lo.is_finite() && hi.is_finite()) {
            return true;
        }

        let mut excluded: Vec<f64> = self
            .excluded
            .iter()
            .copied()
            .filter(|v| v.fract() == 0.0 && *v >= lo && *v <= hi)
            .collect();
        excluded.sort_by(f64::total_cmp);
        excluded.dedup();
        hi - lo + 1.0 > excluded.len() as f64
    }
}

#[derive(Debug, Clone, Default)]
struct TextDomain {
    equal: Option<String>,
    not_equal: Vec<String>,
    allowed: Option<Vec<String>>,
    prefixes: Vec<String>,
    conflict: bool,
}

impl TextDomain {
    fn apply(&mut self, op: ComparisonOperator, literal: &Literal) -> bool {
        match (op, literal) {
            (ComparisonOperator::Eq, Literal::Str(s)) => {
                if self.equal.as_ref().is_some_and(|e| e != s) {
                    self.conflict = true;
                }
                self.equal = Some(s.clone());
            }
            (ComparisonOperator::Ne, Literal::Str(s)) => self.not_equal.push(s.clone()),
            (ComparisonOperator::StartsWith, Literal::Str(s)) => self.prefixes.push(s.clone()),
            (ComparisonOperator::IsIn, Literal::List(values)) => {
                self.allowed = Some(match self.allowed.take() {
                    Some(current) => current.into_iter().filter(|v| values.contains(v)).collect(),
                    None => values.clone(),
                });
            }
            _ => return false,
        }
        true
    }

    fn admits_value(&self, value: &str) -> bool {
        !self.not_equal.iter().any(|n| n == value)
            && self.allowed.as_ref().map_or(true, |a| a.iter().any(|v| v == value))
            && self.prefixes.iter().all(|p| value.starts_with(p.as_str()))
    }

    fn is_satisfiable(&self) -> bool {
        if self.conflict {
            return false;
        }
        if let Some(value) = &self.equal {
            return self.admits_value(value);
        }
        if let Some(allowed) = &self.allowed {
            return allowed.iter().any(|v| self.admits_value(v));
        }
        match self.prefixes.iter().max_by_key(|p| p.len()) {
            Some(longest) => self.prefixes.iter().all(|p| longest.starts_with(p.as_str())),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::operation::ComparisonOperator::*;
    use crate::operation::LogicalOperator::{And, Or};

    fn int(column: &str, op: ComparisonOperator, v: i64, joiner: LogicalOperator) -> Condition {
        Condition::new(column, op, Literal::Int(v), joiner)
    }

    fn text(column: &str, op: ComparisonOperator, v: &str, joiner: LogicalOperator) -> Condition {
        Condition::new(column, op, Literal::Str(v.into()), joiner)
    }

    #[test]
    fn test_drops_contradiction_within_and_chain() {
        let kept = eliminate_contradictions(vec![
            int("age", Lt, 20, And),
            int("age", Gt, 30, And),
            int("score", Ge, 1, And),
        ]);
        assert_eq!(kept, vec![int("age", Lt, 20, And), int("score", Ge, 1, And)]);
    }

    #[test]
    fn test_keeps_contradiction_across_or() {
        let input = vec![int("age", Lt, 20, Or), int("age", Gt, 30, And)];
        assert_eq!(eliminate_contradictions(input.clone()), input);
    }

    #[test]
    fn test_dropped_joiner_moves_to_previous_condition() {
        let kept = eliminate_contradictions(vec![
            int("age", Eq, 10, And),
            int("age", Eq, 11, Or),
            int("age", Eq, 11, And),
        ]);
        assert_eq!(kept, vec![int("age", Eq, 10, Or), int("age", Eq, 11, And)]);
    }

    #[test]
    fn test_integer_gaps_are_unsatisfiable() {
        let kept = eliminate_contradictions(vec![int("n", Gt, 5, And), int("n", Lt, 6, And)]);
        assert_eq!(kept.len(), 1);

        let kept = eliminate_contradictions(vec![
            int("n", Ge, 5, And),
            int("n", Le, 5, And),
            int("n", Ne, 5, And),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_float_open_interval_is_satisfiable() {
        let kept = eliminate_contradictions(vec![
            Condition::new("x", Gt, Literal::Float(5.0), And),
            Condition::new("x", Lt, Literal::Float(5.5), And),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_date_bounds_are_checked() {
        let d = |day| Literal::Date(NaiveDate::from_ymd_opt(2023, 1, day).unwrap());
        let kept = eliminate_contradictions(vec![
            Condition::new("placed", Ge, d(10), And),
            Condition::new("placed", Lt, d(10), And),
        ]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_text_equality_and_membership() {
        let kept = eliminate_contradictions(vec![
            text("tier", Eq, "gold", And),
            text("tier", Ne, "gold", And),
            Condition::new("tier", IsIn, Literal::List(vec!["silver".into()]), And),
            Condition::new("tier", IsIn, Literal::List(vec!["gold".into(), "silver".into()]), And),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].operator, IsIn);
    }

    #[test]
    fn test_incompatible_prefixes_are_dropped() {
        let kept = eliminate_contradictions(vec![
            text("name", StartsWith, "A", And),
            text("name", StartsWith, "Ab", And),
            text("name", StartsWith, "B", And),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].value, Literal::Str("Ab".into()));
    }

    #[test]
    fn test_different_columns_never_conflict() {
        let input = vec![int("a", Lt, 1, And), int("b", Gt, 100, And)];
        assert_eq!(eliminate_contradictions(input.clone()), input);
    }
}
