//! Schema provider: the external collaborator spec §6 calls out as
//! "consumed" rather than owned by the engine — something that answers
//! "what is the installed schema for index X". Generalizes the teacher's
//! `DocumentSource` trait (`engine.rs`: an abstract way to fetch documents,
//! DB being one impl) to the analogous question for schemas, with an
//! in-memory implementation standing in for whatever catalog/metadata store
//! a real deployment would consult.

use std::collections::HashMap;

use parking_lot::RwLock;
use search_sim_types::{IndexSchema, SearchError, SearchResult};

/// Supplies the installed [`IndexSchema`] for a named index.
pub trait SchemaProvider: Send + Sync {
    /// # Errors
    /// Returns [`SearchError::IndexNotFound`] if no schema is installed
    /// under `index_name`.
    fn get_schema(&self, index_name: &str) -> SearchResult<IndexSchema>;
}

/// An in-memory [`SchemaProvider`] backed by a name -> schema map, suitable
/// for embedding this engine directly in a process that manages its own
/// schema catalog.
#[derive(Debug, Default)]
pub struct StaticSchemaProvider {
    schemas: RwLock<HashMap<String, IndexSchema>>,
}

impl StaticSchemaProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the schema for `schema.name`.
    pub fn register(&self, schema: IndexSchema) {
        self.schemas.write().insert(schema.name.clone(), schema);
    }

    pub fn remove(&self, index_name: &str) {
        self.schemas.write().remove(index_name);
    }

    #[must_use]
    pub fn contains(&self, index_name: &str) -> bool {
        self.schemas.read().contains_key(index_name)
    }
}

impl SchemaProvider for StaticSchemaProvider {
    fn get_schema(&self, index_name: &str) -> SearchResult<IndexSchema> {
        self.schemas
            .read()
            .get(index_name)
            .cloned()
            .ok_or_else(|| SearchError::IndexNotFound(index_name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sim_types::{Field, FieldFlags, FieldType};

    fn sample_schema(name: &str) -> IndexSchema {
        IndexSchema {
            name: name.to_owned(),
            fields: vec![Field::new(
                "id",
                FieldType::String,
                FieldFlags { key: true, retrievable: true, ..Default::default() },
            )],
        }
    }

    #[test]
    fn unknown_index_is_not_found() {
        let provider = StaticSchemaProvider::new();
        let err = provider.get_schema("hotels").unwrap_err();
        assert_eq!(err.error_type(), "INDEX_NOT_FOUND");
    }

    #[test]
    fn register_then_fetch_roundtrips() {
        let provider = StaticSchemaProvider::new();
        provider.register(sample_schema("hotels"));
        assert!(provider.contains("hotels"));
        let schema = provider.get_schema("hotels").unwrap();
        assert_eq!(schema.name, "hotels");
    }

    #[test]
    fn remove_drops_schema() {
        let provider = StaticSchemaProvider::new();
        provider.register(sample_schema("hotels"));
        provider.remove("hotels");
        assert!(!provider.contains("hotels"));
    }
}
