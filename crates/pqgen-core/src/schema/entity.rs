use std::fmt;

use chrono::Duration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::frame::{DataFrame, Value};

use super::Property;

/// Length of the random tail appended to a string property's prefix.
const STRING_TAIL_LEN: usize = 9;

/// Primary key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(c) => vec![c.as_str()],
            PrimaryKey::Composite(cs) => cs.iter().map(String::as_str).collect(),
        }
    }
}

/// Referenced side of a foreign key, declared as `[column, entity]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ForeignKey {
    pub column: String,
    pub entity: String,
}

impl ForeignKey {
    pub fn new(column: impl Into<String>, entity: impl Into<String>) -> Self {
        Self { column: column.into(), entity: entity.into() }
    }
}

impl From<(String, String)> for ForeignKey {
    fn from((column, entity): (String, String)) -> Self {
        Self { column, entity }
    }
}

impl From<ForeignKey> for (String, String) {
    fn from(fk: ForeignKey) -> Self {
        (fk.column, fk.entity)
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.column)
    }
}

/// A named relation: ordered typed columns plus key metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    /// Insertion order is column order.
    pub properties: IndexMap<String, Property>,
    pub primary_key: Option<PrimaryKey>,
    /// Local column -> referenced column/entity.
    pub foreign_keys: IndexMap<String, ForeignKey>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
            primary_key: None,
            foreign_keys: IndexMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(PrimaryKey::Single(column.into()));
        self
    }

    pub fn with_composite_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(PrimaryKey::Composite(columns.into_iter().map(Into::into).collect()));
        self
    }

    pub fn with_foreign_key(
        mut self,
        local: impl Into<String>,
        column: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        self.foreign_keys.insert(local.into(), ForeignKey::new(column, entity));
        self
    }

    pub fn property(&self, column: &str) -> Option<&Property> {
        self.properties.get(column)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    /// The primary key column when the key is a single column.
    pub fn unique_primary_key(&self) -> Option<&str> {
        match &self.primary_key {
            Some(PrimaryKey::Single(c)) => Some(c),
            _ => None,
        }
    }

    /// Printable domain of every property, in column order.
    pub fn data_ranges(&self) -> IndexMap<String, String> {
        self.properties
            .iter()
            .map(|(name, prop)| (name.clone(), prop.to_string()))
            .collect()
    }

    /// Generate a sample table for this entity.
    ///
    /// With a single integer primary key the row count is capped at the size
    /// of the key range, and when the whole range is used the keys are
    /// assigned sequentially from `min` so they never collide.
    pub fn generate_dataframe(&self, num_rows: usize, rng: &mut fastrand::Rng) -> DataFrame {
        let mut num_rows = num_rows;
        let mut sequential_key = None;

        if let Some(pk) = self.unique_primary_key() {
            if let Some(Property::Int { min, max }) = self.properties.get(pk) {
                let span = (*max as i128 - *min as i128 + 1) as u128;
                if span <= num_rows as u128 {
                    num_rows = span as usize;
                    sequential_key = Some((pk, *min));
                }
            }
        }

        let mut frame = DataFrame::new(self.column_names());

        for i in 0..num_rows {
            let row = self
                .properties
                .iter()
                .map(|(name, prop)| match sequential_key {
                    Some((pk, min)) if pk == name => Value::Int(min + i as i64),
                    _ => sample_value(prop, rng),
                })
                .collect();
            frame.push_row(row);
        }

        frame
    }
}

fn sample_value(property: &Property, rng: &mut fastrand::Rng) -> Value {
    match property {
        Property::Int { min, max } => Value::Int(rng.i64(*min..=*max)),
        Property::Float { min, max } => {
            let v = min + rng.f64() * (max - min);
            Value::Float((v * 100.0).round() / 100.0)
        }
        Property::Enum { values } => Value::Str(values[rng.usize(..values.len())].clone()),
        Property::String { starting_character } => {
            let mut s = starting_character[rng.usize(..starting_character.len())].clone();
            s.extend((0..STRING_TAIL_LEN).map(|_| rng.alphabetic()));
            Value::Str(s)
        }
        Property::Date { min, max } => {
            let days = (*max - *min).num_days();
            Value::Date(*min + Duration::days(rng.i64(0..=days)))
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for (name, prop) in &self.properties {
            write!(f, "  {name}: {prop}")?;
            if self.primary_key.as_ref().is_some_and(|pk| pk.columns().contains(&name.as_str())) {
                write!(f, " [PK]")?;
            }
            if let Some(fk) = self.foreign_keys.get(name) {
                write!(f, " -> {fk}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
