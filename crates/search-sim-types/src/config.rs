//! Engine configuration, per spec §6's recognized configuration keys.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fusion strategy for hybrid (text + vector) search, per spec §4.3/§9: the
/// primary/default path is a fixed 0.5/0.5 weighted sum; RRF is an optional
/// alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionKind {
    Weighted,
    Rrf,
}

/// Lexical similarity kind, per spec §4.3 Ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityKind {
    Bm25,
    Classic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub oversample_multiplier: usize,
    pub random_seed: u64,
    /// Fraction of tombstoned nodes that triggers a background rebuild.
    pub rebuild_tombstone_fraction: f64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            oversample_multiplier: 2,
            random_seed: 0x5EA2_C411_0000_0001,
            rebuild_tombstone_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    pub fusion: FusionKind,
    pub text_weight: f32,
    pub vector_weight: f32,
    pub rrf_k: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            fusion: FusionKind::Weighted,
            text_weight: 0.5,
            vector_weight: 0.5,
            rrf_k: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    pub kind: SimilarityKind,
    pub k1: f32,
    pub b: f32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            kind: SimilarityKind::Bm25,
            k1: 1.2,
            b: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorsConfig {
    pub use_hnsw: bool,
    pub hnsw: HnswConfig,
    pub hybrid: HybridConfig,
}

impl Default for VectorsConfig {
    fn default() -> Self {
        Self {
            use_hnsw: true,
            hnsw: HnswConfig::default(),
            hybrid: HybridConfig::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Absolute path; engine refuses to start if missing.
    pub index_root: PathBuf,
    pub ram_buffer_mb: usize,
    pub commit_every_seconds: u64,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub vectors: VectorsConfig,
    pub similarity: SimilarityConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn new(index_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            ..Self::defaults_without_root()
        }
    }

    fn defaults_without_root() -> Self {
        Self {
            index_root: PathBuf::new(),
            ram_buffer_mb: 64,
            commit_every_seconds: 5,
            default_page_size: 50,
            max_page_size: 1000,
            vectors: VectorsConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }

    #[must_use]
    pub fn with_similarity(mut self, similarity: SimilarityConfig) -> Self {
        self.similarity = similarity;
        self
    }

    #[must_use]
    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.vectors.hybrid = hybrid;
        self
    }

    #[must_use]
    pub fn with_hnsw(mut self, hnsw: HnswConfig) -> Self {
        self.vectors.hnsw = hnsw;
        self
    }

    #[must_use]
    pub fn without_hnsw(mut self) -> Self {
        self.vectors.use_hnsw = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::new("/tmp/search-sim");
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.similarity.k1, 1.2);
        assert_eq!(config.similarity.b, 0.75);
        assert_eq!(config.vectors.hybrid.text_weight, 0.5);
        assert_eq!(config.vectors.hybrid.vector_weight, 0.5);
        assert!(matches!(config.vectors.hybrid.fusion, FusionKind::Weighted));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = EngineConfig::new("/tmp/search-sim")
            .with_hybrid(HybridConfig {
                fusion: FusionKind::Rrf,
                ..HybridConfig::default()
            })
            .without_hnsw();
        assert!(matches!(config.vectors.hybrid.fusion, FusionKind::Rrf));
        assert!(!config.vectors.use_hnsw);
    }
}
