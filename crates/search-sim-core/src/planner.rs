//! Query planner/executor (spec §4.3): compiles one [`SearchRequest`] into
//! lexical and vector candidate sets, fuses them, applies a scoring profile,
//! sorts, pages, and projects — the six-step plan spec §4.3 describes (base
//! set, vector set, combine, sort, page, project), tying together
//! [`crate::filters`], [`crate::ranking`], [`crate::vector_store`]/
//! [`crate::hnsw`], [`crate::fusion`], [`crate::scoring_profile`],
//! [`crate::facets`], and [`crate::highlight`].
//!
//! New module; the teacher's query path (`search_tantivy.rs`) only ever ran
//! one lexical query against a fixed schema with no vector/hybrid/facet/
//! scoring-profile concepts, so this executor is assembled directly from
//! spec §4.3/§4.4/§4.5/§4.7, reusing the teacher's `TopDocs`/`QueryParser`
//! idiom where it still applies.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use search_sim_types::config::{HybridConfig, SimilarityKind};
use search_sim_types::{Field as SchemaField, FieldType, IndexSchema, SearchError, SearchResult, Value};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value as TantivyValue};
use tantivy::{DocAddress, Searcher, TantivyDocument, Term};

use crate::document::{DocKey, Document};
use crate::facets::{compute_facet, FacetResult};
use crate::fusion::{combine_candidates, fuse};
use crate::hnsw::HnswIndex;
use crate::query::{QueryType, SearchRequest, SortDirection, SortKey};
use crate::ranking::rank;
use crate::results::{HitDebugInfo, SearchHit, SearchResponse};
use crate::scoring_profile::ScoringProfile;
use crate::tantivy_index::TantivyIndexSchema;
use crate::vector_store::VectorStore;

/// Everything [`execute`] needs about one index to plan and run a query,
/// borrowed from whatever owns the index's live state (spec §6: the
/// concrete [`crate::engine::Engine`]).
pub struct QueryContext<'a> {
    pub searcher: &'a Searcher,
    pub declared_schema: &'a IndexSchema,
    pub tantivy_schema: &'a TantivyIndexSchema,
    pub vector_stores: &'a HashMap<String, VectorStore>,
    pub hnsw_indexes: &'a HashMap<String, HnswIndex>,
    pub use_hnsw: bool,
    pub scoring_profiles: &'a HashMap<String, ScoringProfile>,
    pub similarity: SimilarityKind,
    pub hybrid: &'a HybridConfig,
    pub max_page_size: usize,
    pub now: DateTime<Utc>,
}

/// One candidate surviving to the combine/sort/page stages, carrying enough
/// to build its final [`SearchHit`] without re-fetching from tantivy.
struct ScoredHit {
    key: DocKey,
    document: Document,
    text_score: Option<f64>,
    vector_scores: HashMap<String, f64>,
    fused_score: f64,
    multiplier: f64,
    final_score: f64,
}

/// Executes `request` against `ctx`, returning the full response envelope
/// (spec §4.3/§4.4/§6).
///
/// # Errors
/// Returns [`SearchError::InvalidQuery`] for a malformed filter/query text,
/// [`SearchError::SchemaViolation`] for a filter against a non-filterable
/// field or a vector-dimension mismatch, and
/// [`SearchError::ScoringProfileNotFound`] if `request.scoring_profile`
/// names an unknown profile.
pub fn execute(ctx: &QueryContext, request: &SearchRequest) -> SearchResult<SearchResponse> {
    let scoring_profile = match &request.scoring_profile {
        Some(name) => Some(
            ctx.scoring_profiles
                .get(name)
                .ok_or_else(|| SearchError::ScoringProfileNotFound(name.clone()))?,
        ),
        None => None,
    };

    let text_query = build_text_query(ctx.searcher, ctx.declared_schema, ctx.tantivy_schema, request, scoring_profile)?;
    let highlight_query = text_query.clone();
    let compiled_filters = crate::filters::compile_filter(request.filter.as_deref().unwrap_or(""), ctx.declared_schema, ctx.tantivy_schema)?;
    let base_query = compiled_filters.apply_to(text_query);

    let base_doc_addrs: Vec<DocAddress> = ctx
        .searcher
        .search(&*base_query, &DocSetCollector)
        .map_err(tantivy_err)?
        .into_iter()
        .collect();

    let key_to_addr = build_key_to_addr(ctx.searcher, ctx.tantivy_schema.key_field, &base_doc_addrs)?;

    let has_text = !request.is_vector_only();
    let has_vector = request.is_hybrid();

    let text_score_by_key: HashMap<DocKey, f32> = if has_text {
        let limit = base_doc_addrs.len().max(1);
        let classic_terms = classic_terms_for(ctx, request);
        rank(ctx.searcher, &*base_query, ctx.tantivy_schema.key_field, limit, ctx.similarity, &classic_terms)?
            .into_iter()
            .map(|hit| (hit.key, hit.score))
            .collect()
    } else {
        HashMap::new()
    };

    let permitted_keys: Option<HashSet<DocKey>> =
        (!compiled_filters_is_trivial(request)).then(|| key_to_addr.keys().cloned().collect());

    let vector_scores_by_key = search_vector_probes(ctx, request, permitted_keys.as_ref())?;
    let vector_merged_by_key: HashMap<DocKey, f32> = vector_scores_by_key
        .iter()
        .map(|(key, per_field)| (key.clone(), per_field.values().sum()))
        .collect();

    let fused_by_key: HashMap<DocKey, f32> = if has_text && has_vector {
        let text_hits: Vec<(DocKey, f32)> = text_score_by_key.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let vector_hits: Vec<(DocKey, f32)> = vector_merged_by_key.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let candidates = combine_candidates(&text_hits, &vector_hits);
        fuse(&candidates, ctx.hybrid).into_iter().map(|hit| (hit.key, hit.score)).collect()
    } else if has_vector {
        vector_merged_by_key.clone()
    } else {
        text_score_by_key.clone()
    };

    let mut scored_hits = Vec::with_capacity(fused_by_key.len());
    for (key, fused_score) in &fused_by_key {
        let Some(&addr) = key_to_addr.get(key) else {
            // A vector-only hit outside the filtered base set (no filter was
            // given, so every lexical doc is already in `key_to_addr`); if
            // it's still missing the document was deleted mid-query, skip it.
            continue;
        };
        let document = load_document(ctx.searcher, ctx.tantivy_schema, ctx.declared_schema, addr)?;
        let multiplier = match scoring_profile {
            Some(profile) => profile.evaluate(&document.fields, &request.scoring_parameters, ctx.now)?,
            None => 1.0,
        };
        let final_score = f64::from(*fused_score) * multiplier;
        scored_hits.push(ScoredHit {
            key: key.clone(),
            document,
            text_score: text_score_by_key.get(key).map(|s| f64::from(*s)),
            vector_scores: vector_scores_by_key
                .get(key)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), f64::from(*v))).collect())
                .unwrap_or_default(),
            fused_score: f64::from(*fused_score),
            multiplier,
            final_score,
        });
    }

    sort_hits(&mut scored_hits, &request.order_by);

    let top = request.top.min(ctx.max_page_size.max(1));
    let page: Vec<SearchHit> = scored_hits
        .into_iter()
        .skip(request.skip)
        .take(top)
        .map(|hit| to_search_hit(hit, request, ctx.searcher, highlight_query.as_ref(), ctx.tantivy_schema))
        .collect::<SearchResult<Vec<_>>>()?;

    let mut facets = HashMap::new();
    for spec in &request.facets {
        let Some(handle) = ctx.tantivy_schema.handle(&spec.field) else {
            continue;
        };
        if let Some(result) = compute_facet(ctx.searcher, &base_doc_addrs, handle, spec)? {
            facets.insert(spec.field.clone(), result);
        }
    }
    let facets: HashMap<String, FacetResult> = facets;

    Ok(SearchResponse {
        value: page,
        count: request.count.then(|| base_doc_addrs.len() as u64),
        facets,
        coverage: request.minimum_coverage.is_some().then_some(100.0),
    })
}

fn compiled_filters_is_trivial(request: &SearchRequest) -> bool {
    request.filter.as_deref().unwrap_or("").trim().is_empty()
}

fn to_search_hit(
    hit: ScoredHit,
    request: &SearchRequest,
    searcher: &Searcher,
    query: &dyn Query,
    tantivy_schema: &TantivyIndexSchema,
) -> SearchResult<SearchHit> {
    let document = hit.document.project(&request.select);
    let highlights = build_highlights(searcher, query, tantivy_schema, &hit.document, request)?;
    let debug = request.debug.then(|| HitDebugInfo {
        text_score: hit.text_score,
        vector_scores: hit.vector_scores,
        fused_score: hit.fused_score,
        scoring_profile_multiplier: hit.multiplier,
    });
    Ok(SearchHit { key: hit.key, score: hit.final_score, highlights, debug, document })
}

fn build_highlights(
    searcher: &Searcher,
    query: &dyn Query,
    tantivy_schema: &TantivyIndexSchema,
    document: &Document,
    request: &SearchRequest,
) -> SearchResult<HashMap<String, Vec<String>>> {
    if request.highlight_fields.is_empty() || request.is_match_all() {
        return Ok(HashMap::new());
    }

    let mut highlights = HashMap::new();
    for field_name in &request.highlight_fields {
        let Some(value) = document.fields.get(field_name) else {
            continue;
        };
        let Some(text_field) = tantivy_schema.handle(field_name).and_then(|h| h.text) else {
            continue;
        };
        let texts: Vec<&str> = match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| if let Value::String(s) = v { Some(s.as_str()) } else { None })
                .collect(),
            _ => Vec::new(),
        };

        let mut fragments = Vec::new();
        for text in texts {
            fragments.extend(crate::highlight::highlight_fragments(
                searcher,
                query,
                text_field,
                text,
                &request.highlight_pre_tag,
                &request.highlight_post_tag,
            )?);
        }
        if !fragments.is_empty() {
            highlights.insert(field_name.clone(), fragments);
        }
    }
    Ok(highlights)
}

/// Sorts by `order_by`'s multi-key lexicographic order, falling back to
/// combined score descending, and always breaking remaining ties on key
/// ascending (spec §4.3 step 4).
fn sort_hits(hits: &mut [ScoredHit], order_by: &[SortKey]) {
    hits.sort_by(|a, b| {
        if order_by.is_empty() {
            return b
                .final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key));
        }
        for key in order_by {
            let ascending = match key {
                SortKey::Score(_) => a.final_score.partial_cmp(&b.final_score).unwrap_or(Ordering::Equal),
                SortKey::Field(name, _) => value_cmp(a.document.fields.get(name), b.document.fields.get(name)),
            };
            let direction = match key {
                SortKey::Score(d) | SortKey::Field(_, d) => *d,
            };
            let ord = match direction {
                SortDirection::Asc => ascending,
                SortDirection::Desc => ascending.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.key.cmp(&b.key)
    });
}

fn value_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
            (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}

fn build_key_to_addr(searcher: &Searcher, key_field: Field, addrs: &[DocAddress]) -> SearchResult<HashMap<DocKey, DocAddress>> {
    let mut map = HashMap::with_capacity(addrs.len());
    for &addr in addrs {
        let doc: TantivyDocument = searcher.doc(addr).map_err(tantivy_err)?;
        if let Some(key) = doc.get_first(key_field).and_then(TantivyValue::as_str) {
            map.insert(key.to_owned(), addr);
        }
    }
    Ok(map)
}

/// Runs every `vectorQueries[]` probe (spec §4.5), routing to HNSW when
/// enabled and present for that field, else the brute-force
/// [`VectorStore`], falling back to the brute-force store on any HNSW
/// error. Multiple probes against the same key accumulate into separate
/// per-field entries so [`HitDebugInfo::vector_scores`] can report each.
fn search_vector_probes(
    ctx: &QueryContext,
    request: &SearchRequest,
    permitted: Option<&HashSet<DocKey>>,
) -> SearchResult<HashMap<DocKey, HashMap<String, f32>>> {
    let mut by_key: HashMap<DocKey, HashMap<String, f32>> = HashMap::new();
    for probe in &request.vector_queries {
        let hits = search_one_probe(ctx, probe, permitted)?;
        for (key, score) in hits {
            by_key.entry(key).or_default().insert(probe.field.clone(), score);
        }
    }
    Ok(by_key)
}

fn search_one_probe(
    ctx: &QueryContext,
    probe: &crate::query::VectorQuery,
    permitted: Option<&HashSet<DocKey>>,
) -> SearchResult<Vec<(DocKey, f32)>> {
    if ctx.use_hnsw {
        if let Some(hnsw) = ctx.hnsw_indexes.get(&probe.field) {
            let result = match permitted {
                Some(set) => hnsw.search_filtered(&probe.vector, probe.k, set),
                None => hnsw.search(&probe.vector, probe.k),
            };
            if let Ok(hits) = result {
                return Ok(hits);
            }
        }
    }
    match ctx.vector_stores.get(&probe.field) {
        Some(store) => store.search(&probe.vector, probe.k, permitted),
        None => Ok(Vec::new()),
    }
}

fn classic_terms_for(ctx: &QueryContext, request: &SearchRequest) -> Vec<Term> {
    if !matches!(ctx.similarity, SimilarityKind::Classic) || request.is_match_all() {
        return Vec::new();
    }
    let field_names = search_field_names(ctx.declared_schema, request);
    let fields: Vec<Field> = field_names
        .iter()
        .filter_map(|name| ctx.tantivy_schema.handle(name).and_then(|h| h.text))
        .collect();
    let tokens: Vec<String> = request.search.split_whitespace().map(str::to_lowercase).collect();

    let mut terms = Vec::with_capacity(tokens.len() * fields.len());
    for field in fields {
        for token in &tokens {
            terms.push(Term::from_field_text(field, token));
        }
    }
    terms
}

fn search_field_names<'a>(declared_schema: &'a IndexSchema, request: &'a SearchRequest) -> Vec<&'a String> {
    if request.search_fields.is_empty() {
        declared_schema.fields.iter().filter(|f: &&SchemaField| f.flags.searchable).map(|f| &f.name).collect()
    } else {
        request.search_fields.iter().collect()
    }
}

/// Builds the lexical query for `request.search` (spec §4.3 "Query
/// parsing"): `"*"`/empty means match-all; `simple` escapes Lucene-special
/// characters and defaults to OR between terms; `full` preserves operator
/// syntax and defaults to AND. Per-field boosts come from the active
/// scoring profile's `textWeights`, if any.
fn build_text_query(
    searcher: &Searcher,
    declared_schema: &IndexSchema,
    tantivy_schema: &TantivyIndexSchema,
    request: &SearchRequest,
    scoring_profile: Option<&ScoringProfile>,
) -> SearchResult<Box<dyn Query>> {
    if request.is_match_all() {
        return Ok(Box::new(AllQuery));
    }

    let field_names = search_field_names(declared_schema, request);
    let default_fields: Vec<Field> = field_names
        .iter()
        .filter_map(|name| tantivy_schema.handle(name).and_then(|h| h.text))
        .collect();
    if default_fields.is_empty() {
        return Err(SearchError::InvalidQuery("no searchable text fields available for this query".into()));
    }

    let mut parser = QueryParser::for_index(searcher.index(), default_fields.clone());
    if matches!(request.query_type, QueryType::Full) {
        parser.set_conjunction_by_default();
    }
    if let Some(profile) = scoring_profile {
        for name in &field_names {
            if let (Some(handle), Some(&boost)) = (tantivy_schema.handle(name), profile.text_weights.get(name.as_str())) {
                if let Some(text_field) = handle.text {
                    parser.set_field_boost(text_field, boost);
                }
            }
        }
    }

    let query_text = match request.query_type {
        QueryType::Simple => escape_query_syntax(&request.search),
        QueryType::Full => request.search.clone(),
    };
    parser.parse_query(&query_text).map_err(|e| SearchError::InvalidQuery(format!("query parse error: {e}")))
}

fn escape_query_syntax(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '~' | '*' | '?' | ':' | '\\' | '/'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}

/// Reconstructs a [`Document`] from its stored `_key`/`_raw` fields,
/// re-coercing every declared field the same way ingestion did. Used both
/// by [`execute`] (to fetch per-hit field values) and by
/// [`crate::engine::Engine`] (to satisfy `merge`'s existing-document
/// lookup).
///
/// # Errors
/// Returns [`SearchError::Internal`] if the stored document is missing its
/// key field, or a coercion/JSON error if `_raw` was corrupted.
pub fn load_document(
    searcher: &Searcher,
    tantivy_schema: &TantivyIndexSchema,
    declared_schema: &IndexSchema,
    addr: DocAddress,
) -> SearchResult<Document> {
    let tantivy_doc: TantivyDocument = searcher.doc(addr).map_err(tantivy_err)?;
    let key = tantivy_doc
        .get_first(tantivy_schema.key_field)
        .and_then(TantivyValue::as_str)
        .ok_or_else(|| SearchError::Internal("stored document is missing its key field".into()))?
        .to_owned();
    let raw_text = tantivy_doc.get_first(tantivy_schema.raw_field).and_then(TantivyValue::as_str).unwrap_or("{}");
    let raw: serde_json::Value = serde_json::from_str(raw_text)?;

    let mut fields = HashMap::new();
    if let serde_json::Value::Object(map) = &raw {
        for declared in &declared_schema.fields {
            if let Some(json_value) = map.get(&declared.name) {
                let value = Value::from_json(json_value)?;
                fields.insert(declared.name.clone(), value.coerce(declared.field_type, &declared.name)?);
            }
        }
    }
    Ok(Document::new(key, fields, raw))
}

/// Looks up the live [`DocAddress`] for `key`, if any (spec §4.1 merge's
/// existing-document lookup).
///
/// # Errors
/// Propagates a tantivy search failure as [`SearchError::Internal`].
pub fn find_doc_address_by_key(searcher: &Searcher, key_field: Field, key: &str) -> SearchResult<Option<DocAddress>> {
    let term = Term::from_field_text(key_field, key);
    let query = TermQuery::new(term, IndexRecordOption::Basic);
    let top_docs = searcher.search(&query, &TopDocs::with_limit(1)).map_err(tantivy_err)?;
    Ok(top_docs.into_iter().next().map(|(_, addr)| addr))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use search_sim_types::config::EngineConfig;
    use search_sim_types::{Field as TestField, FieldFlags};
    use tantivy::Index;

    use super::*;
    use crate::ingest::{parse_batch, IngestionCoordinator};
    use crate::tantivy_index::{build_tantivy_schema, register_tokenizers};

    fn sample_schema() -> IndexSchema {
        IndexSchema {
            name: "hotels".into(),
            fields: vec![
                TestField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                TestField::new(
                    "name",
                    FieldType::String,
                    FieldFlags { searchable: true, retrievable: true, ..Default::default() },
                ),
                TestField::new(
                    "category",
                    FieldType::String,
                    FieldFlags { filterable: true, facetable: true, retrievable: true, ..Default::default() },
                ),
                TestField::new(
                    "rating",
                    FieldType::Double,
                    FieldFlags { filterable: true, sortable: true, retrievable: true, ..Default::default() },
                ),
                TestField::new("embedding", FieldType::CollectionOfSingle { dimension: 2 }, FieldFlags::default()),
            ],
        }
    }

    struct Fixture {
        index: Index,
        tantivy_schema: TantivyIndexSchema,
        declared: IndexSchema,
        vector_stores: StdHashMap<String, VectorStore>,
        hnsw_indexes: StdHashMap<String, HnswIndex>,
    }

    fn fixture_with_documents(docs: &[serde_json::Value]) -> Fixture {
        let declared = sample_schema();
        let tantivy_schema = build_tantivy_schema(&declared).unwrap();
        let index = Index::create_in_ram(tantivy_schema.schema.clone());
        register_tokenizers(&index);
        let mut writer = index.writer(15_000_000).unwrap();
        let mut vector_stores = StdHashMap::new();
        vector_stores.insert("embedding".to_owned(), VectorStore::new(2));
        let mut hnsw_indexes = StdHashMap::new();

        let parsed = parse_batch(docs, &declared).unwrap();
        let mut coordinator =
            IngestionCoordinator::new(&declared, &tantivy_schema, &mut writer, &mut vector_stores, &mut hnsw_indexes);
        let results = coordinator.apply_batch(parsed, |_| Ok(None)).unwrap();
        assert!(results.iter().all(|r| r.succeeded), "{results:?}");

        Fixture { index, tantivy_schema, declared, vector_stores, hnsw_indexes }
    }

    fn context<'a>(fx: &'a Fixture, searcher: &'a Searcher, scoring_profiles: &'a HashMap<String, ScoringProfile>) -> QueryContext<'a> {
        QueryContext {
            searcher,
            declared_schema: &fx.declared,
            tantivy_schema: &fx.tantivy_schema,
            vector_stores: &fx.vector_stores,
            hnsw_indexes: &fx.hnsw_indexes,
            use_hnsw: false,
            scoring_profiles,
            similarity: SimilarityKind::Bm25,
            hybrid: &HybridConfig::default(),
            max_page_size: EngineConfig::new(".").max_page_size,
            now: Utc::now(),
        }
    }

    fn hotel(id: &str, name: &str, category: &str, rating: f64, embedding: [f32; 2]) -> serde_json::Value {
        serde_json::json!({
            "id": id, "name": name, "category": category, "rating": rating,
            "embedding": [embedding[0], embedding[1]],
        })
    }

    #[test]
    fn match_all_returns_every_document() {
        let fx = fixture_with_documents(&[
            hotel("1", "Grand Hotel", "Luxury", 4.5, [1.0, 0.0]),
            hotel("2", "Budget Inn", "Budget", 3.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let response = execute(&ctx, &SearchRequest::new("*")).unwrap();
        assert_eq!(response.value.len(), 2);
    }

    #[test]
    fn text_search_finds_matching_document_and_ranks_by_score() {
        let fx = fixture_with_documents(&[
            hotel("1", "Grand Luxury Hotel", "Luxury", 4.5, [1.0, 0.0]),
            hotel("2", "Budget Inn", "Budget", 3.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let response = execute(&ctx, &SearchRequest::new("luxury")).unwrap();
        assert_eq!(response.value.len(), 1);
        assert_eq!(response.value[0].key, "1");
    }

    #[test]
    fn filter_restricts_base_set() {
        let fx = fixture_with_documents(&[
            hotel("1", "Grand Hotel", "Luxury", 4.5, [1.0, 0.0]),
            hotel("2", "Budget Inn", "Budget", 3.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let request = SearchRequest::new("*").with_filter("category eq 'Budget'");
        let response = execute(&ctx, &request).unwrap();
        assert_eq!(response.value.len(), 1);
        assert_eq!(response.value[0].key, "2");
    }

    #[test]
    fn order_by_field_overrides_score_order() {
        let fx = fixture_with_documents(&[
            hotel("1", "Hotel One", "Luxury", 3.0, [1.0, 0.0]),
            hotel("2", "Hotel Two", "Luxury", 5.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let request = SearchRequest::new("*").with_order_by("rating desc");
        let response = execute(&ctx, &request).unwrap();
        assert_eq!(response.value[0].key, "2");
        assert_eq!(response.value[1].key, "1");
    }

    #[test]
    fn paging_respects_skip_and_top() {
        let docs: Vec<serde_json::Value> = (0..5)
            .map(|i| hotel(&i.to_string(), &format!("Hotel {i}"), "Luxury", i as f64, [1.0, 0.0]))
            .collect();
        let fx = fixture_with_documents(&docs);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let request = SearchRequest::new("*").with_order_by("rating asc").with_top(2).with_skip(1);
        let response = execute(&ctx, &request).unwrap();
        assert_eq!(response.value.len(), 2);
        assert_eq!(response.value[0].key, "1");
        assert_eq!(response.value[1].key, "2");
    }

    #[test]
    fn vector_only_query_ranks_by_cosine_similarity() {
        let fx = fixture_with_documents(&[
            hotel("1", "Hotel One", "Luxury", 4.0, [1.0, 0.0]),
            hotel("2", "Hotel Two", "Luxury", 4.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let mut request = SearchRequest::new("");
        request.vector_queries.push(crate::query::VectorQuery { field: "embedding".into(), vector: vec![1.0, 0.0], k: 5, kind: None });
        let response = execute(&ctx, &request).unwrap();
        assert_eq!(response.value[0].key, "1");
    }

    #[test]
    fn count_reflects_base_set_size() {
        let fx = fixture_with_documents(&[
            hotel("1", "Hotel One", "Luxury", 4.0, [1.0, 0.0]),
            hotel("2", "Hotel Two", "Budget", 3.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let mut request = SearchRequest::new("*");
        request.count = true;
        request.filter = Some("category eq 'Luxury'".into());
        let response = execute(&ctx, &request).unwrap();
        assert_eq!(response.count, Some(1));
    }

    #[test]
    fn facet_is_computed_over_base_set() {
        let fx = fixture_with_documents(&[
            hotel("1", "Hotel One", "Luxury", 4.0, [1.0, 0.0]),
            hotel("2", "Hotel Two", "Luxury", 3.0, [0.0, 1.0]),
            hotel("3", "Hotel Three", "Budget", 2.0, [0.0, 1.0]),
        ]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let mut request = SearchRequest::new("*");
        request.facets = vec![crate::query::FacetSpec { field: "category".into(), count: None, interval: None }];
        let response = execute(&ctx, &request).unwrap();
        let facet = &response.facets["category"];
        assert_eq!(facet.buckets.len(), 2);
    }

    #[test]
    fn unknown_scoring_profile_is_rejected() {
        let fx = fixture_with_documents(&[hotel("1", "Hotel One", "Luxury", 4.0, [1.0, 0.0])]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let mut request = SearchRequest::new("*");
        request.scoring_profile = Some("missing".into());
        let err = execute(&ctx, &request).unwrap_err();
        assert_eq!(err.error_type(), "SCORING_PROFILE_NOT_FOUND");
    }

    #[test]
    fn highlight_fields_populate_search_hit_highlights() {
        let fx = fixture_with_documents(&[hotel("1", "Grand Luxury Hotel", "Luxury", 4.0, [1.0, 0.0])]);
        let reader = fx.index.reader().unwrap();
        let searcher = reader.searcher();
        let profiles = HashMap::new();
        let ctx = context(&fx, &searcher, &profiles);

        let mut request = SearchRequest::new("luxury");
        request.highlight_fields = vec!["name".into()];
        let response = execute(&ctx, &request).unwrap();
        assert!(response.value[0].highlights["name"][0].contains("<em>"));
    }
}
