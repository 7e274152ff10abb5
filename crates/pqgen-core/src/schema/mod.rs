//! Relational schema model and loader.
//!
//! A [`Schema`] is an ordered set of [`Entity`] values. It is loaded from a JSON
//! description and validated eagerly; every other component receives it by
//! reference and never mutates it.

mod entity;
mod property;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{PqgenError, Result};

pub use entity::{Entity, ForeignKey, PrimaryKey};
pub use property::Property;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

#[derive(Deserialize)]
struct RawSchema {
    entities: IndexMap<String, RawEntity>,
}

#[derive(Deserialize)]
struct RawEntity {
    #[serde(default)]
    properties: IndexMap<String, JsonValue>,
    #[serde(default)]
    primary_key: Option<PrimaryKey>,
    #[serde(default)]
    foreign_keys: IndexMap<String, ForeignKey>,
}

/// Entity name -> entity, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    entities: IndexMap<String, Entity>,
}

impl Schema {
    /// Build a schema from already constructed entities, validating it.
    pub fn new<I>(entities: I) -> Result<Self>
    where
        I: IntoIterator<Item = Entity>,
    {
        let schema = Schema {
            entities: entities.into_iter().map(|e| (e.name.clone(), e)).collect(),
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a schema from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PqgenError::ConfigError(format!("cannot read schema `{}`: {e}", path.display()))
        })?;
        let schema = Self::from_json_str(&content)?;
        debug!(path = %path.display(), entities = schema.len(), "Loaded schema");
        Ok(schema)
    }

    /// Parses straight into the raw model so entities and properties keep
    /// their declaration order.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_raw(serde_json::from_str(content)?)
    }

    pub fn from_value(value: JsonValue) -> Result<Self> {
        Self::from_raw(serde_json::from_value(value)?)
    }

    fn from_raw(raw: RawSchema) -> Result<Self> {
        let mut entities = Vec::with_capacity(raw.entities.len());
        for (name, raw_entity) in raw.entities {
            let mut properties = IndexMap::with_capacity(raw_entity.properties.len());
            for (column, descriptor) in raw_entity.properties {
                let property = Property::from_descriptor(descriptor).map_err(|e| match e {
                    PqgenError::InvalidSchema(msg) => {
                        PqgenError::InvalidSchema(format!("{name}.{column}: {msg}"))
                    }
                    other => other,
                })?;
                properties.insert(column, property);
            }

            entities.push(Entity {
                name,
                properties,
                primary_key: raw_entity.primary_key,
                foreign_keys: raw_entity.foreign_keys,
            });
        }

        Self::new(entities)
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Entity at a declaration position.
    pub fn entity_at(&self, index: usize) -> Option<&Entity> {
        self.entities.get_index(index).map(|(_, e)| e)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Validate for Schema {
    fn validate(&self) -> Result<()> {
        for entity in self.entities.values() {
            for property in entity.properties.values() {
                property.validate()?;
            }

            if let Some(pk) = &entity.primary_key {
                for column in pk.columns() {
                    if !entity.properties.contains_key(column) {
                        return Err(PqgenError::InvalidSchema(format!(
                            "primary key `{column}` is not a property of `{}`",
                            entity.name
                        )));
                    }
                }
            }

            for (local, fk) in &entity.foreign_keys {
                if !entity.properties.contains_key(local) {
                    return Err(PqgenError::InvalidSchema(format!(
                        "foreign key column `{local}` is not a property of `{}`",
                        entity.name
                    )));
                }
                let target = self.entities.get(&fk.entity).ok_or_else(|| {
                    PqgenError::InvalidSchema(format!(
                        "foreign key `{}.{local}` references unknown entity `{}`",
                        entity.name, fk.entity
                    ))
                })?;
                if !target.properties.contains_key(&fk.column) {
                    return Err(PqgenError::InvalidSchema(format!(
                        "foreign key `{}.{local}` references unknown column `{fk}`",
                        entity.name
                    )));
                }
            }
        }
        Ok(())
    }
}
