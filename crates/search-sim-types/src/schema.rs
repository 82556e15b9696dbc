//! Index schema: fields, their semantic types, flags, and validation.

use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

/// The semantic type of a field, per spec §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FieldType {
    String,
    Int32,
    Int64,
    Double,
    Single,
    Boolean,
    DateTimeOffset,
    GeoPoint,
    CollectionOfString,
    /// A fixed-dimension float32 vector field.
    CollectionOfSingle { dimension: u32 },
}

impl FieldType {
    #[must_use]
    pub const fn is_vector(self) -> bool {
        matches!(self, Self::CollectionOfSingle { .. })
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Double | Self::Single)
    }
}

/// Per-field capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub sortable: bool,
    pub facetable: bool,
    pub retrievable: bool,
}

/// Analyzer selection for searchable text fields, per spec §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Analyzer {
    Standard,
    Simple,
    Whitespace,
    Keyword,
    Stop,
    English,
    French,
    German,
}

/// A single field definition within an [`IndexSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub flags: FieldFlags,
    pub analyzer: Option<Analyzer>,
    /// Normalizer applies only to filter/sort/facet paths of string fields
    /// and never alters the retrievable stored value.
    pub normalizer_ascii_fold: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            field_type,
            flags,
            analyzer: None,
            normalizer_ascii_fold: false,
        }
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

/// A named set of field definitions, validated per the schema invariants in
/// spec §3.1. Installed once before any document is ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<Field>,
}

impl IndexSchema {
    /// Validates the schema invariants from spec §3.1:
    /// - exactly one key field, which must be a string;
    /// - a field cannot be both vector and searchable/filterable/sortable/facetable;
    /// - sortable/filterable/facetable are only meaningful on scalar or
    ///   collection-of-string fields (vector fields excluded, geo-point only
    ///   stored-and-retrievable);
    /// - analyzer only on searchable string/collection-of-string fields.
    pub fn validate(&self) -> SearchResult<()> {
        let key_fields: Vec<&Field> = self.fields.iter().filter(|f| f.flags.key).collect();
        match key_fields.as_slice() {
            [] => return Err(SearchError::SchemaViolation("schema must declare exactly one key field".into())),
            [key] if key.field_type != FieldType::String => {
                return Err(SearchError::SchemaViolation(format!(
                    "key field '{}' must be of type string",
                    key.name
                )));
            }
            [_] => {}
            _ => return Err(SearchError::SchemaViolation("schema must declare exactly one key field".into())),
        }

        for field in &self.fields {
            if field.field_type.is_vector()
                && (field.flags.searchable || field.flags.filterable || field.flags.sortable || field.flags.facetable)
            {
                return Err(SearchError::SchemaViolation(format!(
                    "field '{}' is a vector field and cannot be searchable/filterable/sortable/facetable",
                    field.name
                )));
            }

            let scalar_or_collection_string = matches!(
                field.field_type,
                FieldType::String
                    | FieldType::Int32
                    | FieldType::Int64
                    | FieldType::Double
                    | FieldType::Single
                    | FieldType::Boolean
                    | FieldType::DateTimeOffset
                    | FieldType::CollectionOfString
            );
            if (field.flags.sortable || field.flags.filterable || field.flags.facetable)
                && !scalar_or_collection_string
                && !field.field_type.is_vector()
            {
                return Err(SearchError::SchemaViolation(format!(
                    "field '{}' of type {:?} cannot be sortable/filterable/facetable",
                    field.name, field.field_type
                )));
            }

            if field.analyzer.is_some()
                && !matches!(field.field_type, FieldType::String | FieldType::CollectionOfString)
            {
                return Err(SearchError::SchemaViolation(format!(
                    "field '{}' has an analyzer but is not a searchable string type",
                    field.name
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn key_field(&self) -> &Field {
        self.fields
            .iter()
            .find(|f| f.flags.key)
            .expect("validate() guarantees exactly one key field")
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}
