//! Top-level engine (spec §6): the concrete type fronting the whole crate.
//!
//! Owns one [`IndexHandle`] per named index (tantivy index/writer/reader,
//! per-field vector stores and HNSW graphs, scoring profiles, and a query
//! cache), lazily opened from whatever [`SchemaProvider`] the caller
//! supplies. Generalizes the teacher's `SearchEngine`/`IndexLifecycle`/
//! `DocumentSource` traits (`mcp-agent-mail-search-core/src/engine.rs`) —
//! each a thin interface over a document-source-backed mail index — into
//! one concrete type whose index lifecycle, ingestion, and query paths are
//! all driven by a schema the caller installs rather than hardcoded mail
//! fields.
//!
//! Concurrency model (spec §5): one [`parking_lot::Mutex`]-guarded
//! [`tantivy::IndexWriter`] per index serializes writes; reads go through a
//! manually-reloaded [`tantivy::IndexReader`] snapshot, republished by
//! `reload()` right after each committing batch; per-field vector stores and
//! HNSW graphs sit behind their own [`parking_lot::RwLock`]s so a read never
//! blocks on another field's write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use search_sim_types::config::{HnswConfig, HybridConfig, SimilarityKind};
use search_sim_types::{CancellationToken, Clock, EngineConfig, IndexSchema, SearchError, SearchResult, SystemClock};
use tantivy::directory::MmapDirectory;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{info, warn};

use crate::cache::{CacheInvalidator, InvalidationTrigger, QueryCache, QueryCacheKey};
use crate::document::Document;
use crate::hnsw::HnswIndex;
use crate::index_layout::IndexLayout;
use crate::ingest::{parse_batch, DocumentResult, IngestionCoordinator};
use crate::planner::{execute, find_doc_address_by_key, load_document, QueryContext};
use crate::query::SearchRequest;
use crate::results::SearchResponse;
use crate::schema_provider::SchemaProvider;
use crate::scoring_profile::ScoringProfile;
use crate::tantivy_index::{build_tantivy_schema, register_tokenizers, TantivyIndexSchema};
use crate::vector_store::VectorStore;

/// The outcome of a cancellable operation (spec §5/§9 Design Note
/// "Exceptions for control flow": cancellation is a dedicated outcome, not a
/// failure and not folded into the success payload).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }
}

fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}

/// One open index's live state: the tantivy index/writer/reader, the
/// per-field vector stores and HNSW graphs, registered scoring profiles, and
/// a query-result cache (spec §6 disk layout, §4.5 vector store, §4.7
/// scoring profiles, §5 "Caching").
struct IndexHandle {
    declared_schema: IndexSchema,
    tantivy_schema: TantivyIndexSchema,
    layout: IndexLayout,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    vector_stores: RwLock<HashMap<String, VectorStore>>,
    hnsw_indexes: RwLock<HashMap<String, HnswIndex>>,
    scoring_profiles: RwLock<HashMap<String, ScoringProfile>>,
    use_hnsw: bool,
    hnsw_config: HnswConfig,
    similarity: SimilarityKind,
    hybrid: HybridConfig,
    max_page_size: usize,
    cache: CacheInvalidator<SearchResponse>,
}

impl IndexHandle {
    fn open(config: &EngineConfig, schema: IndexSchema) -> SearchResult<Self> {
        schema.validate()?;

        let layout = IndexLayout::new(&config.index_root, &schema.name);
        let vector_field_names: Vec<String> =
            schema.fields.iter().filter(|f| f.field_type.is_vector()).map(|f| f.name.clone()).collect();
        layout.ensure_dirs(&vector_field_names)?;

        let tantivy_schema = build_tantivy_schema(&schema)?;
        let directory = MmapDirectory::open(layout.segments_dir())
            .map_err(|e| SearchError::Internal(format!("failed to open index directory: {e}")))?;
        let index = Index::open_or_create(directory, tantivy_schema.schema.clone()).map_err(tantivy_err)?;
        register_tokenizers(&index);

        let heap_bytes = config.ram_buffer_mb.max(16) * 1_000_000;
        let writer = index.writer(heap_bytes).map_err(tantivy_err)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(tantivy_err)?;

        let mut vector_stores = HashMap::new();
        let mut hnsw_indexes = HashMap::new();
        for field in &schema.fields {
            let search_sim_types::FieldType::CollectionOfSingle { dimension } = field.field_type else {
                continue;
            };
            vector_stores.insert(field.name.clone(), VectorStore::new(dimension));

            if config.vectors.use_hnsw {
                let hnsw_dir = layout.hnsw_dir(&field.name);
                let graph = match HnswIndex::load_from_dir(&hnsw_dir, config.vectors.hnsw.clone()) {
                    Ok(graph) => graph,
                    Err(_) => HnswIndex::new(dimension, config.vectors.hnsw.clone()),
                };
                hnsw_indexes.insert(field.name.clone(), graph);
            }
        }

        Ok(Self {
            declared_schema: schema,
            tantivy_schema,
            layout,
            writer: Mutex::new(writer),
            reader,
            vector_stores: RwLock::new(vector_stores),
            hnsw_indexes: RwLock::new(hnsw_indexes),
            scoring_profiles: RwLock::new(HashMap::new()),
            use_hnsw: config.vectors.use_hnsw,
            hnsw_config: config.vectors.hnsw.clone(),
            similarity: config.similarity.kind,
            hybrid: config.vectors.hybrid.clone(),
            max_page_size: config.max_page_size,
            cache: CacheInvalidator::new(Arc::new(QueryCache::with_defaults()), 50),
        })
    }

    fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn reload(&self) -> SearchResult<()> {
        self.reader.reload().map_err(tantivy_err)
    }

    fn lookup_existing(&self, key: &str) -> SearchResult<Option<Document>> {
        let searcher = self.reader.searcher();
        match find_doc_address_by_key(&searcher, self.tantivy_schema.key_field, key)? {
            Some(addr) => Ok(Some(load_document(&searcher, &self.tantivy_schema, &self.declared_schema, addr)?)),
            None => Ok(None),
        }
    }

    /// Rebuilds any HNSW graph whose tombstone fraction has crossed the
    /// configured threshold, then persists the (possibly rebuilt) graphs
    /// (spec §4.5 "a background rebuild triggers when tombstone fraction
    /// crosses a configured threshold" and "Persistence").
    fn maintain_vector_indexes(&self) {
        if !self.use_hnsw {
            return;
        }
        let mut hnsw_indexes = self.hnsw_indexes.write();
        for (field, graph) in hnsw_indexes.iter_mut() {
            if graph.should_rebuild() {
                if let Err(err) = graph.rebuild() {
                    warn!(field = %field, error = %err, "hnsw rebuild failed");
                    continue;
                }
                info!(field = %field, "hnsw graph rebuilt");
            }
            if let Err(err) = graph.save_to_dir(&self.layout.hnsw_dir(field)) {
                warn!(field = %field, error = %err, "hnsw persistence failed");
            }
        }
    }
}

/// The concrete search engine: a per-index state map plus a schema provider
/// consulted on first use of each index (spec §6 "Schema provider").
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    schema_provider: Arc<dyn SchemaProvider>,
    indexes: RwLock<HashMap<String, Arc<IndexHandle>>>,
    closed: AtomicBool,
}

impl Engine {
    /// Opens the engine against `config`, refusing to start if
    /// `config.index_root` is missing (spec §6 `indexRoot`).
    ///
    /// # Errors
    /// Returns [`SearchError::Internal`] if `indexRoot` does not exist.
    pub fn open(config: EngineConfig, schema_provider: Arc<dyn SchemaProvider>) -> SearchResult<Self> {
        crate::index_layout::verify_index_root(&config.index_root)?;
        Ok(Self {
            config,
            clock: Arc::new(SystemClock),
            schema_provider,
            indexes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Overrides the ambient clock (tests inject [`search_sim_types::FixedClock`]
    /// for deterministic freshness-scoring assertions, per spec §9).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Marks the engine disposed; every subsequent public call returns
    /// [`SearchError::EngineUnavailable`] (spec §7 "Unavailable (503)").
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> SearchResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SearchError::EngineUnavailable("engine is closed".into()));
        }
        Ok(())
    }

    /// Fetches (and lazily opens, or re-opens on schema change) the index
    /// named `index_name`. Rejects a schema change against an index that
    /// already holds documents (spec §7 "Conflict (409)").
    fn ensure_index(&self, index_name: &str) -> SearchResult<Arc<IndexHandle>> {
        self.ensure_open()?;
        let schema = self.schema_provider.get_schema(index_name)?;

        if let Some(handle) = self.indexes.read().get(index_name).cloned() {
            if crate::tantivy_index::schema_content_hash(&schema)
                == crate::tantivy_index::schema_content_hash(&handle.declared_schema)
            {
                return Ok(handle);
            }
            if handle.doc_count() > 0 {
                return Err(SearchError::SchemaFrozen(format!(
                    "index '{index_name}' schema cannot change once documents exist"
                )));
            }
            let rebuilt = Arc::new(IndexHandle::open(&self.config, schema)?);
            self.indexes.write().insert(index_name.to_owned(), Arc::clone(&rebuilt));
            return Ok(rebuilt);
        }

        let handle = Arc::new(IndexHandle::open(&self.config, schema)?);
        self.indexes.write().insert(index_name.to_owned(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Installs a named scoring profile against `index_name` (spec §4.7).
    ///
    /// # Errors
    /// Propagates [`SearchError::IndexNotFound`] if the index's schema is
    /// not installed with the schema provider.
    pub fn register_scoring_profile(&self, index_name: &str, profile: ScoringProfile) -> SearchResult<()> {
        let handle = self.ensure_index(index_name)?;
        handle.scoring_profiles.write().insert(profile.name.clone(), profile);
        Ok(())
    }

    /// `indexBatch` (spec §6/§4.1): applies `actions` against `index_name`,
    /// committing once at the end if any action succeeded.
    ///
    /// # Errors
    /// Returns an error if the index's schema cannot be resolved/opened, or
    /// if the batch fails to parse against it; per-document failures are
    /// reported within the returned [`DocumentResult`] list instead.
    pub fn index_batch(
        &self,
        index_name: &str,
        actions: &[serde_json::Value],
        cancellation: Option<&CancellationToken>,
    ) -> SearchResult<Outcome<Vec<DocumentResult>>> {
        if is_cancelled(cancellation) {
            return Ok(Outcome::Cancelled);
        }

        let handle = self.ensure_index(index_name)?;
        let parsed = parse_batch(actions, &handle.declared_schema)?;

        // Writes abort only before a commit; once staged below, the batch
        // runs to completion (spec §5 "Cancellation and timeouts").
        if is_cancelled(cancellation) {
            return Ok(Outcome::Cancelled);
        }

        let results = {
            let mut writer = handle.writer.lock();
            let mut vector_stores = handle.vector_stores.write();
            let mut hnsw_indexes = handle.hnsw_indexes.write();
            let mut coordinator = IngestionCoordinator::new(
                &handle.declared_schema,
                &handle.tantivy_schema,
                &mut writer,
                &mut vector_stores,
                &mut hnsw_indexes,
            );
            coordinator.apply_batch(parsed, |key| handle.lookup_existing(key))?
        };

        if results.iter().any(|r| r.succeeded) {
            handle.reload()?;
            handle.cache.invalidate(InvalidationTrigger::IndexUpdate);
            handle.maintain_vector_indexes();
        }

        Ok(Outcome::Completed(results))
    }

    /// `search` (spec §6/§4.3).
    ///
    /// # Errors
    /// Returns [`SearchError::InvalidQuery`] if `request.top` exceeds the
    /// configured `maxPageSize`, plus whatever [`crate::planner::execute`]
    /// reports for a malformed filter/query/vector probe.
    pub fn search(
        &self,
        index_name: &str,
        request: &SearchRequest,
        cancellation: Option<&CancellationToken>,
    ) -> SearchResult<Outcome<SearchResponse>> {
        if is_cancelled(cancellation) {
            return Ok(Outcome::Cancelled);
        }

        let handle = self.ensure_index(index_name)?;
        if request.top > handle.max_page_size {
            return Err(SearchError::InvalidQuery(format!(
                "top {} exceeds maxPageSize {}",
                request.top, handle.max_page_size
            )));
        }

        let epoch = handle.cache.cache().current_epoch();
        let cache_key = QueryCacheKey::new(index_name, request, epoch);
        if let Some(cached) = handle.cache.cache().get(&cache_key) {
            return Ok(Outcome::Completed(cached));
        }

        // Reads abort between phases; this is the boundary between planning
        // (cache lookup, schema resolution) and the actual retrieval/fusion
        // work (spec §5 "Cancellation and timeouts").
        if is_cancelled(cancellation) {
            return Ok(Outcome::Cancelled);
        }

        let searcher = handle.reader.searcher();
        let vector_stores = handle.vector_stores.read();
        let hnsw_indexes = handle.hnsw_indexes.read();
        let scoring_profiles = handle.scoring_profiles.read();
        let ctx = QueryContext {
            searcher: &searcher,
            declared_schema: &handle.declared_schema,
            tantivy_schema: &handle.tantivy_schema,
            vector_stores: &vector_stores,
            hnsw_indexes: &hnsw_indexes,
            use_hnsw: handle.use_hnsw,
            scoring_profiles: &scoring_profiles,
            similarity: handle.similarity,
            hybrid: &handle.hybrid,
            max_page_size: handle.max_page_size,
            now: self.clock.now(),
        };

        let response = execute(&ctx, request)?;
        handle.cache.cache().put(cache_key, response.clone());
        Ok(Outcome::Completed(response))
    }

    /// `suggest` (spec §4.3 "Suggest and Autocomplete"): prefix queries
    /// against `field_name`'s term dictionary, deduplicated by term and
    /// capped by `top` (default [`crate::suggest::DEFAULT_TOP`]).
    ///
    /// # Errors
    /// Returns [`SearchError::SchemaViolation`] if `field_name` is not a
    /// declared searchable text field.
    pub fn suggest(
        &self,
        index_name: &str,
        field_name: &str,
        prefix: &str,
        top: Option<usize>,
        cancellation: Option<&CancellationToken>,
    ) -> SearchResult<Outcome<Vec<String>>> {
        if is_cancelled(cancellation) {
            return Ok(Outcome::Cancelled);
        }

        let handle = self.ensure_index(index_name)?;
        let field = handle
            .tantivy_schema
            .handle(field_name)
            .and_then(|h| h.text)
            .ok_or_else(|| SearchError::SchemaViolation(format!("field '{field_name}' is not a searchable text field")))?;

        let searcher = handle.reader.searcher();
        let hits = crate::suggest::suggest(&searcher, field, prefix, top)?;
        Ok(Outcome::Completed(hits))
    }

    /// `getDocument` (spec §6).
    ///
    /// # Errors
    /// Returns [`SearchError::DocumentNotFound`] if `key` does not exist.
    pub fn get_document(&self, index_name: &str, key: &str, select: &[String]) -> SearchResult<serde_json::Value> {
        let handle = self.ensure_index(index_name)?;
        let searcher = handle.reader.searcher();
        let addr = find_doc_address_by_key(&searcher, handle.tantivy_schema.key_field, key)?
            .ok_or_else(|| SearchError::DocumentNotFound(key.to_owned()))?;
        let document = load_document(&searcher, &handle.tantivy_schema, &handle.declared_schema, addr)?;
        Ok(document.project(select))
    }

    /// `countDocuments` (spec §6).
    ///
    /// # Errors
    /// Propagates [`SearchError::IndexNotFound`] if the schema provider does
    /// not recognize `index_name`.
    pub fn count_documents(&self, index_name: &str) -> SearchResult<u64> {
        Ok(self.ensure_index(index_name)?.doc_count())
    }

    /// `clearIndex` (spec §6): drops every document, vector, and HNSW node
    /// but keeps the installed schema and on-disk directory.
    ///
    /// # Errors
    /// Propagates a tantivy commit failure as [`SearchError::Internal`].
    pub fn clear_index(&self, index_name: &str) -> SearchResult<()> {
        let handle = self.ensure_index(index_name)?;

        {
            let mut writer = handle.writer.lock();
            writer.delete_all_documents().map_err(tantivy_err)?;
            writer.commit().map_err(tantivy_err)?;
        }
        handle.reload()?;

        {
            let mut vector_stores = handle.vector_stores.write();
            let mut hnsw_indexes = handle.hnsw_indexes.write();
            for (field, store) in vector_stores.iter_mut() {
                store.clear();
                if let Some(graph) = hnsw_indexes.get_mut(field) {
                    *graph = HnswIndex::new(store.dimension(), handle.hnsw_config.clone());
                }
            }
        }

        handle.cache.invalidate(InvalidationTrigger::IndexUpdate);
        info!(index = index_name, "index cleared");
        Ok(())
    }

    /// `deleteIndex` (spec §6): drops the engine's in-memory state for
    /// `index_name` and removes its on-disk directory, regardless of
    /// whether this engine instance has ever opened it.
    ///
    /// # Errors
    /// Propagates an I/O failure while removing the on-disk directory.
    pub fn delete_index(&self, index_name: &str) -> SearchResult<()> {
        self.ensure_open()?;
        let removed = self.indexes.write().remove(index_name);
        drop(removed);
        IndexLayout::new(&self.config.index_root, index_name).remove_all()?;
        info!(index = index_name, "index deleted");
        Ok(())
    }
}
