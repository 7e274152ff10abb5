//! Recursive random query construction.
//!
//! A build picks a root entity and walks a fixed pipeline: an optional
//! selection, an optional projection, zero or more merges and an optional
//! group-by. Each merge recursively builds its right-hand query with a
//! structure that has group-by disabled and one merge less, which bounds the
//! recursion even when the foreign-key graph has cycles.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::consistency::eliminate_contradictions;
use crate::error::{PqgenError, Result};
use crate::operation::{
    AggregationFunction, ComparisonOperator, Condition, GroupByAggregate, JoinKey, Literal,
    LogicalOperator, Merge, Projection, Selection,
};
use crate::query::Query;
use crate::schema::{Entity, Property, Schema};
use crate::structure::QueryStructure;

pub struct QueryBuilder<'a> {
    schema: &'a Schema,
    structure: QueryStructure,
    multi_line: bool,
    rng: fastrand::Rng,
}

/// A column of the frame a scope produces.
#[derive(Debug, Clone, PartialEq)]
struct FrameColumn {
    /// Name in the frame, after any merge suffixes.
    name: String,
    entity: String,
    property: String,
}

/// Working state of one (sub-)query build.
struct Scope<'a> {
    entity: &'a Entity,
    operations: Vec<crate::operation::Operation>,
    /// Selectable columns of the root entity, narrowed by a projection.
    available_columns: Vec<String>,
    /// Columns of the working frame, in pandas order.
    frame: Vec<FrameColumn>,
}

/// A join edge: left key as named in the frame, right key as property names
/// of the entity to build on the right.
type JoinCandidate<'a> = (JoinKey, Vec<String>, &'a Entity);

impl<'a> Scope<'a> {
    fn new(entity: &'a Entity) -> Self {
        let mut scope = Self {
            entity,
            operations: Vec::new(),
            available_columns: Vec::new(),
            frame: Vec::new(),
        };
        scope.narrow(entity.column_names());
        scope
    }

    fn narrow(&mut self, columns: Vec<String>) {
        self.frame = columns
            .iter()
            .map(|c| FrameColumn {
                name: c.clone(),
                entity: self.entity.name.clone(),
                property: c.clone(),
            })
            .collect();
        self.available_columns = columns;
    }

    /// Frame columns whose name is unique, so they can be referenced.
    fn usable(&self) -> Vec<&FrameColumn> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for column in &self.frame {
            *counts.entry(column.name.as_str()).or_default() += 1;
        }
        self.frame
            .iter()
            .filter(|c| counts.get(c.name.as_str()) == Some(&1))
            .collect()
    }

    /// Frame name of `entity.property`, first occurrence wins.
    fn locate(&self, entity: &str, property: &str) -> Option<String> {
        self.usable()
            .into_iter()
            .find(|c| c.entity == entity && c.property == property)
            .map(|c| c.name.clone())
    }

    /// Entities contributing to the frame, root first.
    fn owners(&self) -> Vec<&str> {
        let mut owners: Vec<&str> = vec![self.entity.name.as_str()];
        for column in &self.frame {
            if !owners.contains(&column.entity.as_str()) {
                owners.push(column.entity.as_str());
            }
        }
        owners
    }

    /// Apply pandas inner-merge naming: key pairs with equal names collapse
    /// into the left column, other shared names get `_x` and `_y`.
    fn absorb(&mut self, left_on: &JoinKey, right_on: &JoinKey, right: Vec<FrameColumn>) {
        let shared: Vec<String> = left_on
            .columns()
            .into_iter()
            .zip(right_on.columns())
            .filter(|(l, r)| l == r)
            .map(|(l, _)| l.to_string())
            .collect();
        let left_names: Vec<String> = self.frame.iter().map(|c| c.name.clone()).collect();
        let overlaps = |name: &str| {
            !shared.iter().any(|s| s == name)
                && left_names.iter().any(|c| c == name)
                && right.iter().any(|c| c.name == name)
        };

        let mut merged: Vec<FrameColumn> = self
            .frame
            .iter()
            .map(|c| FrameColumn {
                name: if overlaps(&c.name) { format!("{}_x", c.name) } else { c.name.clone() },
                ..c.clone()
            })
            .collect();
        merged.extend(
            right
                .iter()
                .filter(|c| !shared.contains(&c.name))
                .map(|c| FrameColumn {
                    name: if overlaps(&c.name) { format!("{}_y", c.name) } else { c.name.clone() },
                    ..c.clone()
                }),
        );
        self.frame = merged;
    }
}

impl<'a> QueryBuilder<'a> {
    pub fn new(schema: &'a Schema, structure: QueryStructure, multi_line: bool) -> Self {
        Self::with_rng(schema, structure, multi_line, fastrand::Rng::new())
    }

    /// Deterministic builder for reproducible workloads and tests.
    pub fn with_seed(schema: &'a Schema, structure: QueryStructure, multi_line: bool, seed: u64) -> Self {
        Self::with_rng(schema, structure, multi_line, fastrand::Rng::with_seed(seed))
    }

    pub fn with_rng(
        schema: &'a Schema,
        structure: QueryStructure,
        multi_line: bool,
        rng: fastrand::Rng,
    ) -> Self {
        Self { schema, structure, multi_line, rng }
    }

    pub fn structure(&self) -> &QueryStructure {
        &self.structure
    }

    /// Build one query rooted at a uniformly chosen entity.
    pub fn build(&mut self) -> Result<Query> {
        let schema = self.schema;
        if schema.is_empty() {
            return Err(PqgenError::EmptySchema);
        }
        let index = self.rng.usize(..schema.len());
        let entity = schema
            .entity_at(index)
            .ok_or_else(|| PqgenError::InternalError(format!("no entity at index {index}")))?;
        self.build_rooted(entity)
    }

    /// Build one query rooted at `entity`.
    pub fn build_from(&mut self, entity: &str) -> Result<Query> {
        let schema = self.schema;
        let entity = schema
            .entity(entity)
            .ok_or_else(|| PqgenError::InvalidSchema(format!("unknown entity `{entity}`")))?;
        self.build_rooted(entity)
    }

    fn build_rooted(&mut self, entity: &'a Entity) -> Result<Query> {
        let structure = self.structure.clone();
        let scope = self.build_scope(entity, &structure, &[])?;
        let query = Query::new(entity.name.clone(), scope.operations, self.multi_line);
        debug!(
            entity = %query.entity(),
            operations = query.operations().len(),
            complexity = query.complexity(),
            "Built query"
        );
        Ok(query)
    }

    /// `pinned` columns survive any projection so a parent merge can join on
    /// them. When merges are allowed the primary key is pinned as well, which
    /// keeps the primary-key fallback join valid.
    fn build_scope(
        &mut self,
        entity: &'a Entity,
        structure: &QueryStructure,
        pinned: &[String],
    ) -> Result<Scope<'a>> {
        let mut scope = Scope::new(entity);
        let mut pinned = pinned.to_vec();
        if structure.max_merges > 0 {
            if let Some(pk) = &entity.primary_key {
                for column in pk.columns() {
                    if !pinned.iter().any(|c| c == column) {
                        pinned.push(column.to_string());
                    }
                }
            }
        }

        if self.rng.f64() < structure.selection_probability {
            if let Some(selection) = self.generate_selection(&scope, structure)? {
                scope.operations.push(selection.into());
            }
        }

        if self.rng.f64() < structure.projection_probability {
            if let Some(projection) = self.generate_projection(&mut scope, structure, &pinned) {
                scope.operations.push(projection.into());
            }
        }

        let merges = self.rng.usize(..=structure.max_merges);
        for _ in 0..merges {
            let merge = self.generate_merge(&mut scope, structure)?;
            scope.operations.push(merge.into());
        }

        if structure.allows_groupby() && self.rng.f64() < structure.groupby_aggregation_probability {
            if let Some(group_by) = self.generate_group_by(&scope, structure)? {
                scope.operations.push(group_by.into());
            }
        }

        Ok(scope)
    }

    fn generate_selection(
        &mut self,
        scope: &Scope<'a>,
        structure: &QueryStructure,
    ) -> Result<Option<Selection>> {
        if scope.available_columns.is_empty() || structure.max_selection_conditions == 0 {
            return Ok(None);
        }

        let count = self.rng.usize(1..=structure.max_selection_conditions);
        let mut conditions = Vec::with_capacity(count);

        for _ in 0..count {
            let column = choose(&mut self.rng, &scope.available_columns);
            let property = scope.entity.property(column).ok_or_else(|| {
                PqgenError::InternalError(format!(
                    "column `{column}` is not a property of `{}`",
                    scope.entity.name
                ))
            })?;
            let (operator, value) = self.random_predicate(property);
            let joiner = if self.rng.bool() { LogicalOperator::And } else { LogicalOperator::Or };
            conditions.push(Condition::new(column.clone(), operator, value, joiner));
        }

        if structure.consistent_selections {
            conditions = eliminate_contradictions(conditions);
        }

        Ok(Some(Selection::new(conditions)))
    }

    fn random_predicate(&mut self, property: &Property) -> (ComparisonOperator, Literal) {
        let rng = &mut self.rng;
        match property {
            Property::Int { min, max } => {
                (*choose(rng, &ComparisonOperator::ORDERED), Literal::Int(rng.i64(*min..=*max)))
            }
            Property::Float { min, max } => {
                let operator = *choose(rng, &ComparisonOperator::ORDERED);
                let value = min + rng.f64() * (max - min);
                (operator, Literal::Float((value * 100.0).round() / 100.0))
            }
            Property::String { starting_character } => {
                let operator = *choose(rng, &ComparisonOperator::STRING);
                (operator, Literal::Str(choose(rng, starting_character).clone()))
            }
            Property::Enum { values } => match *choose(rng, &ComparisonOperator::ENUM) {
                ComparisonOperator::IsIn => {
                    let count = rng.usize(1..=values.len());
                    (ComparisonOperator::IsIn, Literal::List(sample(rng, values, count)))
                }
                operator => (operator, Literal::Str(choose(rng, values).clone())),
            },
            Property::Date { min, max } => {
                let operator = *choose(rng, &ComparisonOperator::ORDERED);
                (operator, Literal::Date(if rng.bool() { *min } else { *max }))
            }
        }
    }

    fn generate_projection(
        &mut self,
        scope: &mut Scope<'a>,
        structure: &QueryStructure,
        pinned: &[String],
    ) -> Option<Projection> {
        if scope.available_columns.is_empty() || structure.max_projection_columns == 0 {
            return None;
        }

        let count = self
            .rng
            .usize(1..=structure.max_projection_columns)
            .min(scope.available_columns.len());
        let mut columns = sample(&mut self.rng, &scope.available_columns, count);

        for column in pinned {
            if !scope.available_columns.contains(column) || columns.contains(column) {
                continue;
            }
            match columns.iter().rposition(|c| !pinned.contains(c)) {
                Some(slot) => columns[slot] = column.clone(),
                None => columns.push(column.clone()),
            }
        }

        scope.narrow(columns.clone());
        Some(Projection::new(columns))
    }

    fn generate_merge(&mut self, scope: &mut Scope<'a>, structure: &QueryStructure) -> Result<Merge> {
        let candidates = self.join_candidates(scope);
        let (left_on, right_key, right_entity) = if candidates.is_empty() {
            self.primary_key_join(scope)?
        } else {
            let index = self.rng.usize(..candidates.len());
            candidates.into_iter().nth(index).ok_or_else(|| {
                PqgenError::InternalError("join candidate index out of range".into())
            })?
        };

        let right_scope = self.build_scope(right_entity, &structure.for_merge_subquery(), &right_key)?;
        let right_on = right_key
            .iter()
            .map(|property| {
                right_scope.locate(&right_entity.name, property).ok_or_else(|| {
                    PqgenError::InternalError(format!(
                        "join column `{}.{property}` is not addressable",
                        right_entity.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(JoinKey::from_columns)?;
        let right = Query::new(right_entity.name.clone(), right_scope.operations, self.multi_line);

        trace!(
            left = %scope.entity.name,
            right = %right_entity.name,
            %left_on,
            %right_on,
            "Generated merge"
        );

        scope.absorb(&left_on, &right_on, right_scope.frame);
        Ok(Merge { right, left_on, right_on })
    }

    /// Foreign-key edges usable from the scope: keys declared on a reachable
    /// entity whose local column is addressable, and keys on any entity that
    /// point back at an addressable column of a reachable entity.
    fn join_candidates(&self, scope: &Scope<'a>) -> Vec<JoinCandidate<'a>> {
        let schema = self.schema;
        let mut candidates = Vec::new();
        for owner_name in scope.owners() {
            let Some(owner) = schema.entity(owner_name) else {
                continue;
            };

            for (local, fk) in &owner.foreign_keys {
                let (Some(left), Some(target)) =
                    (scope.locate(owner_name, local), schema.entity(&fk.entity))
                else {
                    continue;
                };
                candidates.push((JoinKey::Single(left), vec![fk.column.clone()], target));
            }

            for other in schema.entities() {
                for (local, fk) in &other.foreign_keys {
                    if fk.entity != owner_name {
                        continue;
                    }
                    if let Some(left) = scope.locate(owner_name, &fk.column) {
                        candidates.push((JoinKey::Single(left), vec![local.clone()], other));
                    }
                }
            }
        }
        candidates
    }

    /// Join another entity on primary keys. The scope's own key is preferred,
    /// then the key of an entity merged earlier. Without a key of matching
    /// arity on the left, the right key is matched against arbitrary frame
    /// columns. Fails only when no other entity exists.
    fn primary_key_join(&mut self, scope: &Scope<'a>) -> Result<JoinCandidate<'a>> {
        let schema = self.schema;
        let no_merge = || PqgenError::NoMergeableEntity { entity: scope.entity.name.clone() };

        let others: Vec<&'a Entity> = schema
            .entities()
            .filter(|e| e.name != scope.entity.name && !e.properties.is_empty())
            .collect();
        if others.is_empty() {
            return Err(no_merge());
        }

        let left_keys: Vec<Vec<String>> = scope
            .owners()
            .into_iter()
            .filter_map(|owner| {
                let key = schema.entity(owner)?.primary_key.as_ref()?;
                key.columns().into_iter().map(|c| scope.locate(owner, c)).collect()
            })
            .collect();

        let mut pairs: Vec<(&Vec<String>, &'a Entity)> = Vec::new();
        for left in &left_keys {
            for &right in &others {
                if right.primary_key.as_ref().is_some_and(|pk| pk.columns().len() == left.len()) {
                    pairs.push((left, right));
                }
            }
            if !pairs.is_empty() {
                break;
            }
        }

        if !pairs.is_empty() {
            let (left, right) = *choose(&mut self.rng, &pairs);
            let right_key = primary_key_columns(right);
            return Ok((JoinKey::from_columns(left.clone()), right_key, right));
        }

        let right = *choose(&mut self.rng, &others);
        let right_key = primary_key_columns(right);
        let usable: Vec<String> = scope.usable().into_iter().map(|c| c.name.clone()).collect();
        if usable.len() < right_key.len() {
            return Err(no_merge());
        }
        let left = sample(&mut self.rng, &usable, right_key.len());
        Ok((JoinKey::from_columns(left), right_key, right))
    }

    fn generate_group_by(
        &mut self,
        scope: &Scope<'a>,
        structure: &QueryStructure,
    ) -> Result<Option<GroupByAggregate>> {
        let usable = scope.usable();
        if usable.len() < 2 || structure.max_groupby_columns == 0 {
            return Ok(None);
        }

        let count = self.rng.usize(1..=structure.max_groupby_columns.min(usable.len() - 1));
        let group: Vec<&FrameColumn> = sample(&mut self.rng, &usable, count);

        let mut aggregations = IndexMap::new();
        for column in &usable {
            if group.iter().any(|g| g.name == column.name) {
                continue;
            }
            let function = if structure.type_aware_aggregation {
                let property = self
                    .schema
                    .entity(&column.entity)
                    .and_then(|e| e.property(&column.property))
                    .ok_or_else(|| {
                        PqgenError::InternalError(format!(
                            "unknown column `{}.{}`",
                            column.entity, column.property
                        ))
                    })?;
                *choose(&mut self.rng, AggregationFunction::for_property(property))
            } else {
                *choose(&mut self.rng, &AggregationFunction::ALL)
            };
            aggregations.insert(column.name.clone(), function);
        }

        Ok(Some(GroupByAggregate::new(
            group.into_iter().map(|c| c.name.as_str()),
            aggregations,
        )))
    }
}

/// Primary key columns, or the first column for an entity without one.
fn primary_key_columns(entity: &Entity) -> Vec<String> {
    match &entity.primary_key {
        Some(pk) => pk.columns().into_iter().map(String::from).collect(),
        None => entity.column_names().into_iter().take(1).collect(),
    }
}

/// Uniform pick from a non-empty slice.
fn choose<'t, T>(rng: &mut fastrand::Rng, items: &'t [T]) -> &'t T {
    &items[rng.usize(..items.len())]
}

/// `count` distinct items in random order.
fn sample<T: Clone>(rng: &mut fastrand::Rng, items: &[T], count: usize) -> Vec<T> {
    let mut picked = items.to_vec();
    rng.shuffle(&mut picked);
    picked.truncate(count);
    picked
}
