//! On-disk directory layout and schema hashing.
//!
//! Realizes the disk layout mandated by spec §6:
//!
//! ```text
//! <root>/<indexName>/segments/        # Tantivy inverted-index files
//! <root>/<indexName>/hnsw/<field>/    # HNSW graph + backing vectors, per vector field
//! <root>/<indexName>/stored/          # stored-raw payloads
//! ```
//!
//! Two engine instances must never share the same `indexRoot` concurrently
//! (spec §6); this module only manages paths and atomic activation, it does
//! not itself enforce single-instance ownership.

use std::path::{Path, PathBuf};

use search_sim_types::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Schema version derived from a content hash of the index field definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaHash(pub String);

impl SchemaHash {
    #[must_use]
    pub fn compute(fields: &[SchemaField]) -> Self {
        let mut sorted: Vec<String> = fields
            .iter()
            .map(|f| format!("{}:{}:{}", f.name, f.field_type, f.indexed))
            .collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        for entry in &sorted {
            hasher.update(entry.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub field_type: String,
    pub indexed: bool,
}

/// Manages the on-disk layout for a single named index.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    root: PathBuf,
    index_name: String,
}

impl IndexLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, index_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            index_name: index_name.into(),
        }
    }

    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.root.join(&self.index_name)
    }

    #[must_use]
    pub fn segments_dir(&self) -> PathBuf {
        self.index_dir().join("segments")
    }

    #[must_use]
    pub fn hnsw_dir(&self, field_name: &str) -> PathBuf {
        self.index_dir().join("hnsw").join(field_name)
    }

    #[must_use]
    pub fn stored_dir(&self) -> PathBuf {
        self.index_dir().join("stored")
    }

    /// Creates every directory this index needs, including per-field HNSW
    /// subdirectories.
    pub fn ensure_dirs(&self, vector_field_names: &[String]) -> SearchResult<()> {
        std::fs::create_dir_all(self.segments_dir())?;
        std::fs::create_dir_all(self.stored_dir())?;
        for field_name in vector_field_names {
            std::fs::create_dir_all(self.hnsw_dir(field_name))?;
        }
        Ok(())
    }

    /// Removes the entire on-disk directory for this index (`deleteIndex`,
    /// spec §6).
    pub fn remove_all(&self) -> SearchResult<()> {
        let dir = self.index_dir();
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Verifies the root directory exists; the engine refuses to start
/// otherwise (spec §6 `indexRoot`).
pub fn verify_index_root(root: &Path) -> SearchResult<()> {
    if !root.is_dir() {
        return Err(SearchError::Internal(format!(
            "indexRoot '{}' does not exist or is not a directory",
            root.display()
        )));
    }
    Ok(())
}
