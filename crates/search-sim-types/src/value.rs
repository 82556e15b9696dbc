//! The dynamic value model accepted at the ingestion boundary.
//!
//! Incoming documents are heterogeneous JSON-shaped payloads. [`Value`] is
//! the tagged sum type they are parsed into before being coerced against a
//! field's declared [`crate::schema::FieldType`]; nothing downstream of
//! ingestion deals with raw JSON again.

use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};
use crate::schema::FieldType;

/// A single ingested value, before type coercion against a schema field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a `serde_json::Value` into the engine's own `Value`.
    ///
    /// `Number` decomposes into `Int` when it fits exactly, else `Float`;
    /// objects are rejected (the ingest boundary only accepts field-shaped
    /// scalars, arrays, and nulls — nested objects are not a declared field
    /// type in this core).
    pub fn from_json(json: &serde_json::Value) -> SearchResult<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(SearchError::InvalidQuery(format!("unrepresentable number: {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Self::String(s.clone())),
            serde_json::Value::Array(items) => {
                let converted = items.iter().map(Self::from_json).collect::<SearchResult<Vec<_>>>()?;
                Ok(Self::Array(converted))
            }
            serde_json::Value::Object(_) => {
                Err(SearchError::InvalidQuery("nested objects are not a supported field value".into()))
            }
        }
    }

    /// Coerces this value to the declared field type, returning a
    /// normalized [`Value`] or a validation error. Mixed-precision math is
    /// never performed here: numeric coercion only ever widens (int -> f64)
    /// or narrows exactly, never silently truncates a float to an int.
    pub fn coerce(&self, field_type: FieldType, field_name: &str) -> SearchResult<Self> {
        if self.is_null() {
            return Ok(Self::Null);
        }
        match field_type {
            FieldType::String | FieldType::DateTimeOffset | FieldType::Boolean => match self {
                Self::String(_) => Ok(self.clone()),
                Self::Bool(b) if field_type == FieldType::Boolean => Ok(Self::Bool(*b)),
                other => Err(type_error(field_name, field_type, other)),
            },
            FieldType::Int32 | FieldType::Int64 => match self {
                Self::Int(i) => Ok(Self::Int(*i)),
                other => Err(type_error(field_name, field_type, other)),
            },
            FieldType::Double | FieldType::Single => match self {
                Self::Int(i) => Ok(Self::Float(*i as f64)),
                Self::Float(f) => Ok(Self::Float(*f)),
                other => Err(type_error(field_name, field_type, other)),
            },
            FieldType::GeoPoint => match self {
                Self::Array(items) if items.len() == 2 => Ok(self.clone()),
                other => Err(type_error(field_name, field_type, other)),
            },
            FieldType::CollectionOfString => match self {
                Self::Array(items) if items.iter().all(|v| matches!(v, Self::String(_) | Self::Null)) => {
                    Ok(self.clone())
                }
                other => Err(type_error(field_name, field_type, other)),
            },
            FieldType::CollectionOfSingle { dimension } => match self {
                Self::Array(items) => {
                    let vector = values_to_f32_vector(items, field_name)?;
                    if vector.len() != dimension as usize {
                        return Err(SearchError::SchemaViolation(format!(
                            "field '{field_name}' expects vectors of dimension {dimension}, got {}",
                            vector.len()
                        )));
                    }
                    Ok(self.clone())
                }
                other => Err(type_error(field_name, field_type, other)),
            },
        }
    }

    /// Extracts this value as a float32 vector. Duck-typed: integer, float,
    /// and string-encoded-as-number arrays are all accepted and converted
    /// to float32 at this boundary, per the "duck-typed vectors" design
    /// note — but never mixed precision beyond this single conversion.
    pub fn as_f32_vector(&self, field_name: &str) -> SearchResult<Vec<f32>> {
        match self {
            Self::Array(items) => values_to_f32_vector(items, field_name),
            other => Err(type_error(
                field_name,
                FieldType::CollectionOfSingle { dimension: 0 },
                other,
            )),
        }
    }
}

fn values_to_f32_vector(items: &[Value], field_name: &str) -> SearchResult<Vec<f32>> {
    items
        .iter()
        .map(|item| match item {
            Value::Int(i) => Ok(*i as f32),
            Value::Float(f) => Ok(*f as f32),
            other => Err(type_error(field_name, FieldType::CollectionOfSingle { dimension: 0 }, other)),
        })
        .collect()
}

fn type_error(field_name: &str, expected: FieldType, got: &Value) -> SearchError {
    SearchError::SchemaViolation(format!(
        "field '{field_name}' expected {expected:?}, got {got:?}"
    ))
}
