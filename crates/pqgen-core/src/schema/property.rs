use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{PqgenError, Result};

use super::Validate;

const KNOWN_TYPES: [&str; 5] = ["int", "float", "enum", "string", "date"];

/// Type and value domain of a single entity column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Property {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Enum { values: Vec<String> },
    /// Strings are one of `starting_character` followed by random letters.
    /// A "character" may be a multi-character prefix such as `"25-"`.
    String { starting_character: Vec<String> },
    Date { min: NaiveDate, max: NaiveDate },
}

impl Property {
    /// Parse a property descriptor such as `{"type": "int", "min": 1, "max": 9}`.
    ///
    /// Unknown `type` tags are rejected before the descriptor is decoded so the
    /// error names the offending tag instead of serde's variant list.
    pub fn from_descriptor(descriptor: JsonValue) -> Result<Self> {
        let ty = descriptor
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| PqgenError::InvalidSchema("property descriptor without `type`".into()))?;

        if !KNOWN_TYPES.contains(&ty) {
            return Err(PqgenError::InvalidSchema(format!(
                "unknown property type `{ty}`"
            )));
        }

        let property: Property = serde_json::from_value(descriptor)?;
        property.validate()?;
        Ok(property)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Property::Int { .. } => "int",
            Property::Float { .. } => "float",
            Property::Enum { .. } => "enum",
            Property::String { .. } => "string",
            Property::Date { .. } => "date",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Property::Int { .. } | Property::Float { .. })
    }
}

impl Validate for Property {
    fn validate(&self) -> Result<()> {
        match self {
            Property::Int { min, max } if min > max => Err(PqgenError::InvalidSchema(format!(
                "int range min {min} exceeds max {max}"
            ))),
            Property::Float { min, max } if !(min.is_finite() && max.is_finite()) => Err(
                PqgenError::InvalidSchema("float range bounds must be finite".into()),
            ),
            Property::Float { min, max } if min > max => Err(PqgenError::InvalidSchema(format!(
                "float range min {min} exceeds max {max}"
            ))),
            Property::Date { min, max } if min > max => Err(PqgenError::InvalidSchema(format!(
                "date range min {min} is after max {max}"
            ))),
            Property::Enum { values } if values.is_empty() => Err(PqgenError::InvalidSchema(
                "enum property needs at least one value".into(),
            )),
            Property::String { starting_character } if starting_character.is_empty() => Err(
                PqgenError::InvalidSchema("string property needs at least one starting character".into()),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Int { min, max } => write!(f, "int [{min}, {max}]"),
            Property::Float { min, max } => write!(f, "float [{min}, {max}]"),
            Property::Enum { values } => write!(f, "enum {{{}}}", values.join(", ")),
            Property::String { starting_character } => {
                write!(f, "string starting with {}", starting_character.join("|"))
            }
            Property::Date { min, max } => write!(f, "date [{min}, {max}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_every_known_type() {
        let int = Property::from_descriptor(json!({"type": "int", "min": 1, "max": 50})).unwrap();
        assert_eq!(int, Property::Int { min: 1, max: 50 });

        let float =
            Property::from_descriptor(json!({"type": "float", "min": -1.5, "max": 2.0})).unwrap();
        assert!(float.is_numeric());

        let en = Property::from_descriptor(json!({"type": "enum", "values": ["a", "b"]})).unwrap();
        assert_eq!(en.type_name(), "enum");

        let s = Property::from_descriptor(
            json!({"type": "string", "starting_character": ["A", "25-"]}),
        )
        .unwrap();
        assert_eq!(
            s,
            Property::String { starting_character: vec!["A".into(), "25-".into()] }
        );

        let d = Property::from_descriptor(
            json!({"type": "date", "min": "2022-11-20", "max": "2022-12-18"}),
        )
        .unwrap();
        assert_eq!(
            d,
            Property::Date {
                min: NaiveDate::from_ymd_opt(2022, 11, 20).unwrap(),
                max: NaiveDate::from_ymd_opt(2022, 12, 18).unwrap(),
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = Property::from_descriptor(json!({"type": "uuid"})).unwrap_err();
        assert!(err.to_string().contains("unknown property type `uuid`"));
    }

    #[test]
    fn test_inverted_ranges_are_rejected() {
        assert!(Property::from_descriptor(json!({"type": "int", "min": 5, "max": 1})).is_err());
        assert!(Property::from_descriptor(
            json!({"type": "date", "min": "2023-01-02", "max": "2023-01-01"})
        )
        .is_err());
    }

    #[test]
    fn test_empty_domains_are_rejected() {
        assert!(Property::from_descriptor(json!({"type": "enum", "values": []})).is_err());
        assert!(
            Property::from_descriptor(json!({"type": "string", "starting_character": []})).is_err()
        );
    }

    #[test]
    fn test_missing_bounds_are_serialization_errors() {
        let err = Property::from_descriptor(json!({"type": "int", "min": 1})).unwrap_err();
        assert!(matches!(err, PqgenError::SerializationError(_)));
    }
}
