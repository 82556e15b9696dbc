//! Search request model
//!
//! [`SearchRequest`] is the primary input to the query planner/executor; it
//! covers the full option table in spec.md §4.3, generalizing the teacher's
//! fixed `SearchQuery`/`SearchFilter` shape (mode + five hardcoded mail
//! fields) into a schema-agnostic request that any declared index can
//! accept.

use serde::{Deserialize, Serialize};

/// `queryType` — how the text query is parsed (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Escapes Lucene-special characters, OR-default between terms.
    #[default]
    Simple,
    /// Preserves operator grammar, AND-default, allows leading wildcard.
    Full,
}

/// Direction for an `orderBy` key or a `search.score()` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One key in an `orderBy` CSV: either a stored field or `search.score()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortKey {
    Field(String, SortDirection),
    Score(SortDirection),
}

impl SortKey {
    /// Parses a single `orderBy` token, e.g. `"rating desc"` or
    /// `"search.score() asc"`. Defaults to ascending if no direction word
    /// is given.
    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let mut parts = token.split_whitespace();
        let field = parts.next()?;
        let direction = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            Some("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        if field.eq_ignore_ascii_case("search.score()") {
            Some(Self::Score(direction))
        } else {
            Some(Self::Field(field.to_string(), direction))
        }
    }
}

/// Parses an `orderBy` CSV into an ordered multi-key sort, per spec.md
/// §4.3 ("multi-key lexicographic").
#[must_use]
pub fn parse_order_by(csv: &str) -> Vec<SortKey> {
    csv.split(',').filter_map(SortKey::parse).collect()
}

/// One vector probe within `vectorQueries[]` (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorQuery {
    pub field: String,
    pub vector: Vec<f32>,
    #[serde(default = "default_vector_k")]
    pub k: usize,
    /// Optional per-probe similarity override; falls back to the index's
    /// configured `vectors.similarity.kind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<search_sim_types::SimilarityKind>,
}

const fn default_vector_k() -> usize {
    10
}

/// One entry of `facets`: `fieldName[,count:N][,interval:X]` (spec.md
/// §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSpec {
    pub field: String,
    pub count: Option<usize>,
    pub interval: Option<f64>,
}

impl FacetSpec {
    /// # Errors
    /// Returns [`search_sim_types::SearchError::InvalidQuery`] if `count`
    /// or `interval` parameters don't parse as numbers.
    pub fn parse(raw: &str) -> search_sim_types::SearchResult<Self> {
        let mut parts = raw.split(',').map(str::trim);
        let field = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| search_sim_types::SearchError::InvalidQuery(format!("empty facet spec: '{raw}'")))?
            .to_string();
        let mut count = None;
        let mut interval = None;
        for part in parts {
            if let Some(value) = part.strip_prefix("count:") {
                count = Some(value.trim().parse::<usize>().map_err(|_| {
                    search_sim_types::SearchError::InvalidQuery(format!("invalid facet count in '{raw}'"))
                })?);
            } else if let Some(value) = part.strip_prefix("interval:") {
                interval = Some(value.trim().parse::<f64>().map_err(|_| {
                    search_sim_types::SearchError::InvalidQuery(format!("invalid facet interval in '{raw}'"))
                })?);
            }
        }
        Ok(Self { field, count, interval })
    }

    #[must_use]
    pub fn effective_count(&self) -> usize {
        self.count.unwrap_or(10)
    }
}

/// One `scoringParameters` entry: `name-value`, split on the *first* `-`
/// so negative-coordinate geo literals parse correctly (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringParameter {
    pub name: String,
    pub value: String,
}

impl ScoringParameter {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (name, value) = raw.split_once('-')?;
        if name.is_empty() {
            return None;
        }
        Some(Self { name: name.to_string(), value: value.to_string() })
    }
}

/// A search request against a single named index, covering every option
/// in spec.md §4.3's recognized-options table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Text query, or `"*"` for match-all.
    #[serde(default = "default_search_text")]
    pub search: String,
    #[serde(default)]
    pub query_type: QueryType,
    /// Restricts the text query to this field subset; empty means "all
    /// searchable fields".
    #[serde(default)]
    pub search_fields: Vec<String>,
    /// OData-subset predicate, compiled by [`crate::filters`].
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub order_by: Vec<SortKey>,
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub skip: usize,
    /// Stored-field projection; empty means "every retrievable field".
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub facets: Vec<FacetSpec>,
    #[serde(default)]
    pub highlight_fields: Vec<String>,
    #[serde(default = "default_pre_tag")]
    pub highlight_pre_tag: String,
    #[serde(default = "default_post_tag")]
    pub highlight_post_tag: String,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub vector_queries: Vec<VectorQuery>,
    #[serde(default)]
    pub scoring_profile: Option<String>,
    #[serde(default)]
    pub scoring_parameters: Vec<ScoringParameter>,
    #[serde(default)]
    pub minimum_coverage: Option<f64>,
    #[serde(default)]
    pub debug: bool,
}

fn default_search_text() -> String {
    "*".to_string()
}

const fn default_top() -> usize {
    50
}

fn default_pre_tag() -> String {
    "<em>".to_string()
}

fn default_post_tag() -> String {
    "</em>".to_string()
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search: default_search_text(),
            query_type: QueryType::default(),
            search_fields: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            top: default_top(),
            skip: 0,
            select: Vec::new(),
            facets: Vec::new(),
            highlight_fields: Vec::new(),
            highlight_pre_tag: default_pre_tag(),
            highlight_post_tag: default_post_tag(),
            count: false,
            vector_queries: Vec::new(),
            scoring_profile: None,
            scoring_parameters: Vec::new(),
            minimum_coverage: None,
            debug: false,
        }
    }
}

impl SearchRequest {
    #[must_use]
    pub fn new(search: impl Into<String>) -> Self {
        Self { search: search.into(), ..Self::default() }
    }

    #[must_use]
    pub const fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    #[must_use]
    pub const fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_order_by(mut self, csv: &str) -> Self {
        self.order_by = parse_order_by(csv);
        self
    }

    #[must_use]
    pub fn with_vector_query(mut self, probe: VectorQuery) -> Self {
        self.vector_queries.push(probe);
        self
    }

    #[must_use]
    pub const fn is_vector_only(&self) -> bool {
        !self.vector_queries.is_empty() && self.search.is_empty()
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.search == "*" || self.search.is_empty()
    }

    #[must_use]
    pub const fn is_hybrid(&self) -> bool {
        !self.vector_queries.is_empty()
    }
}
