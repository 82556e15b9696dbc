//! In-memory brute-force vector store, keyed by document key within a
//! single (index, field).
//!
//! Grounded on the `(index, field) -> key -> Vec<f32>` model of spec §4.5;
//! one `VectorStore` instance covers one vector field of one index, the
//! same granularity the HNSW graph in [`crate::hnsw`] uses.

use std::collections::{HashMap, HashSet};

use search_sim_types::{SearchError, SearchResult};

use crate::document::DocKey;

/// A brute-force nearest-neighbour store for one vector field of one index.
///
/// Supports add, delete, get, clear, and a full linear scan computing cosine
/// similarity against a probe vector (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    dimension: u32,
    vectors: HashMap<DocKey, Vec<f32>>,
}

impl VectorStore {
    #[must_use]
    pub fn new(dimension: u32) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Inserts or overwrites the vector for `key`. Rejects a dimension
    /// mismatch against the field's declared dimensionality (spec §4.5:
    /// vector-length mismatch is a schema violation, not a silent coercion).
    pub fn upsert(&mut self, key: DocKey, vector: Vec<f32>) -> SearchResult<()> {
        if vector.len() as u32 != self.dimension {
            return Err(SearchError::SchemaViolation(format!(
                "vector for key '{key}' has dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        self.vectors.insert(key, vector);
        Ok(())
    }

    /// Removes the vector for `key`, if present. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.vectors.remove(key).is_some()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.vectors.get(key).map(Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vectors.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    #[must_use]
    pub fn keys(&self) -> impl Iterator<Item = &DocKey> {
        self.vectors.keys()
    }

    /// Full linear scan, scoring every stored vector against `probe` by
    /// cosine similarity and returning the top-`k` (key, similarity) pairs
    /// sorted descending. `candidates`, when given, is a set-membership
    /// pre-check restricting the scan rather than a post-filter.
    pub fn search(
        &self,
        probe: &[f32],
        k: usize,
        candidates: Option<&HashSet<DocKey>>,
    ) -> SearchResult<Vec<(DocKey, f32)>> {
        if probe.len() as u32 != self.dimension {
            return Err(SearchError::SchemaViolation(format!(
                "probe vector has dimension {}, expected {}",
                probe.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(DocKey, f32)> = self
            .vectors
            .iter()
            .filter(|(key, _)| candidates.is_none_or(|set| set.contains(key.as_str())))
            .map(|(key, vector)| (key.clone(), cosine_similarity(probe, vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity: dot product over the product of L2 norms. Either norm
/// being zero yields 0 rather than `NaN` (spec §4.5).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_yields_zero_not_nan() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(sim, 0.0);
    }

    #[test]
    fn upsert_rejects_dimension_mismatch() {
        let mut store = VectorStore::new(3);
        let err = store.upsert("doc1".to_owned(), vec![1.0, 2.0]).unwrap_err();
        assert_eq!(err.error_type(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn search_returns_top_k_sorted_descending() {
        let mut store = VectorStore::new(2);
        store.upsert("a".to_owned(), vec![1.0, 0.0]).unwrap();
        store.upsert("b".to_owned(), vec![0.9, 0.1]).unwrap();
        store.upsert("c".to_owned(), vec![0.0, 1.0]).unwrap();

        let results = store.search(&[1.0, 0.0], 2, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "b");
        assert!(results[0].1 >= results[1].1);
    }

    #[test]
    fn search_honours_candidate_filter() {
        let mut store = VectorStore::new(2);
        store.upsert("a".to_owned(), vec![1.0, 0.0]).unwrap();
        store.upsert("b".to_owned(), vec![0.9, 0.1]).unwrap();

        let allowed: HashSet<DocKey> = ["b".to_owned()].into_iter().collect();
        let results = store.search(&[1.0, 0.0], 5, Some(&allowed)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "b");
    }

    #[test]
    fn delete_removes_and_reports_existence() {
        let mut store = VectorStore::new(2);
        store.upsert("a".to_owned(), vec![1.0, 0.0]).unwrap();
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn search_rejects_probe_dimension_mismatch() {
        let store = VectorStore::new(3);
        let err = store.search(&[1.0, 0.0], 1, None).unwrap_err();
        assert_eq!(err.error_type(), "SCHEMA_VIOLATION");
    }
}
