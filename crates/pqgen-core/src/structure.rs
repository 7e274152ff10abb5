//! Generation constraints read by the query builder.

use serde::{Deserialize, Serialize};

use crate::error::{PqgenError, Result};
use crate::schema::Validate;

/// Bounds and probabilities for one builder scope. All `max_*` bounds are
/// inclusive upper limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryStructure {
    pub selection_probability: f64,
    pub projection_probability: f64,
    /// Zero disables group-by aggregation.
    pub groupby_aggregation_probability: f64,
    pub max_selection_conditions: usize,
    pub max_projection_columns: usize,
    pub max_groupby_columns: usize,
    pub max_merges: usize,
    /// Drop selection conditions that contradict earlier ones in the same
    /// AND-chain.
    pub consistent_selections: bool,
    /// Only aggregate with functions valid for the column's type.
    pub type_aware_aggregation: bool,
}

impl Default for QueryStructure {
    fn default() -> Self {
        Self {
            selection_probability: 0.5,
            projection_probability: 0.5,
            groupby_aggregation_probability: 0.5,
            max_selection_conditions: 3,
            max_projection_columns: 4,
            max_groupby_columns: 2,
            max_merges: 2,
            consistent_selections: false,
            type_aware_aggregation: false,
        }
    }
}

impl QueryStructure {
    pub fn with_max_merges(mut self, max_merges: usize) -> Self {
        self.max_merges = max_merges;
        self
    }

    pub fn with_probabilities(mut self, selection: f64, projection: f64, groupby: f64) -> Self {
        self.selection_probability = selection;
        self.projection_probability = projection;
        self.groupby_aggregation_probability = groupby;
        self
    }

    pub fn with_consistent_selections(mut self, enabled: bool) -> Self {
        self.consistent_selections = enabled;
        self
    }

    pub fn with_type_aware_aggregation(mut self, enabled: bool) -> Self {
        self.type_aware_aggregation = enabled;
        self
    }

    pub fn allows_groupby(&self) -> bool {
        self.groupby_aggregation_probability > 0.0 && self.max_groupby_columns > 0
    }

    /// Constraints for the right-hand side of a merge: no group-by and one
    /// merge less.
    pub fn for_merge_subquery(&self) -> Self {
        Self {
            groupby_aggregation_probability: 0.0,
            max_merges: self.max_merges.saturating_sub(1),
            ..self.clone()
        }
    }
}

impl Validate for QueryStructure {
    fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("selection_probability", self.selection_probability),
            ("projection_probability", self.projection_probability),
            ("groupby_aggregation_probability", self.groupby_aggregation_probability),
        ] {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(PqgenError::ConfigError(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}
