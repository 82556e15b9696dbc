//! Local simulator of a cloud AI search service: a schema-driven ingestion
//! pipeline, an inverted-index/vector/hybrid query engine, facets, filters,
//! highlighting, and scoring profiles, fronted by one concrete [`engine::Engine`].

pub mod cache;
pub mod document;
pub mod engine;
pub mod error;
pub mod facets;
pub mod filters;
pub mod fusion;
pub mod highlight;
pub mod hnsw;
pub mod index_layout;
pub mod ingest;
pub mod planner;
pub mod query;
pub mod ranking;
pub mod results;
pub mod schema_provider;
pub mod scoring_profile;
pub mod suggest;
pub mod tantivy_index;
pub mod vector_store;

pub use cache::{
    CacheConfig, CacheEntry, CacheInvalidator, CacheMetrics, InvalidationEvent, InvalidationTrigger, QueryCache, QueryCacheKey,
};
pub use document::{DocChange, DocKey, Document};
pub use engine::{Engine, Outcome};
pub use error::{SearchError, SearchResult};
pub use facets::{compute_facet, FacetBucket, FacetResult};
pub use filters::{compile_filter, CompiledFilters};
pub use fusion::{combine_candidates, fuse, FusedHit, HybridCandidate, SourceRank};
pub use highlight::highlight_fragments;
pub use hnsw::HnswIndex;
pub use index_layout::{IndexLayout, SchemaField, SchemaHash};
pub use ingest::{DocumentResult, IngestionCoordinator};
pub use planner::execute;
pub use query::{FacetSpec, QueryType, ScoringParameter, SearchRequest, SortDirection, SortKey, VectorQuery};
pub use results::{HitDebugInfo, SearchHit, SearchResponse};
pub use schema_provider::{SchemaProvider, StaticSchemaProvider};
pub use scoring_profile::{Aggregation, FunctionKind, Interpolation, ScoringFunction, ScoringProfile};
pub use suggest::{suggest, DEFAULT_TOP as DEFAULT_SUGGEST_TOP};
pub use tantivy_index::{build_tantivy_schema, register_tokenizers, TantivyIndexSchema};
pub use vector_store::{cosine_similarity, VectorStore};
