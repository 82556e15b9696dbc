//! Search response model (spec §6's response contract): a `value[]` of
//! hits, each carrying a score and optional per-field highlights, plus the
//! optional `@odata.count`/`@search.facets`/`@search.coverage` envelope
//! fields. Generalizes the teacher's `SearchHit`/`SearchResults` shape from
//! a fixed mail-document hit to a schema-agnostic one backed by the
//! projected JSON payload, and trims the teacher's multi-stage explain
//! apparatus (`ExplainStage`/`ExplainReasonCode`/`StageExplanation` and the
//! rest — built for a lexical/semantic/rerank pipeline this engine doesn't
//! have) down to the flat per-hit score breakdown spec §4.3's `debug`
//! option actually asks for.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::DocKey;
use crate::facets::{FacetBucket, FacetResult};

/// Per-hit score breakdown, populated only when the request asked for
/// `debug` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitDebugInfo {
    /// The lexical (BM25/classic) score, if the text query contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_score: Option<f64>,
    /// Per-vector-field similarity, if any vector probes contributed.
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub vector_scores: HashMap<String, f64>,
    /// The score after hybrid fusion, before the scoring-profile multiplier.
    pub fused_score: f64,
    /// The scoring-profile multiplier applied (`1.0` if no profile ran).
    pub scoring_profile_multiplier: f64,
}

/// One scored, projected, highlighted search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: DocKey,
    #[serde(rename = "@search.score")]
    pub score: f64,
    #[serde(rename = "@search.highlights", skip_serializing_if = "HashMap::is_empty", default)]
    pub highlights: HashMap<String, Vec<String>>,
    #[serde(rename = "@search.debug", skip_serializing_if = "Option::is_none")]
    pub debug: Option<HitDebugInfo>,
    /// The projected document fields, flattened into the hit at
    /// serialization time (Azure-style hit shape: score/highlight metadata
    /// alongside the document's own fields, not nested under a sub-key).
    #[serde(flatten)]
    pub document: serde_json::Value,
}

/// The full response envelope for one [`crate::query::SearchRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub value: Vec<SearchHit>,
    #[serde(rename = "@odata.count", skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(rename = "@search.facets", skip_serializing_if = "HashMap::is_empty", default)]
    pub facets: HashMap<String, FacetResult>,
    #[serde(rename = "@search.coverage", skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

impl FacetBucket {
    /// Renders one bucket the way spec §4.4/§6 describes the facet
    /// response shape: `{"value": ..., "count": N}` or
    /// `{"from": ..., "to": ..., "count": N}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Value { value, count } => serde_json::json!({"value": value, "count": count}),
            Self::Range { from, to, count } => serde_json::json!({"from": from, "to": to, "count": count}),
        }
    }
}

impl Serialize for FacetBucket {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FacetBucket {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let count = raw.get("count").and_then(serde_json::Value::as_u64).unwrap_or(0);
        if let Some(value) = raw.get("value").and_then(serde_json::Value::as_str) {
            Ok(Self::Value { value: value.to_owned(), count })
        } else {
            let from = raw.get("from").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            let to = raw.get("to").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            Ok(Self::Range { from, to, count })
        }
    }
}

impl Serialize for FacetResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.buckets.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FacetResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let buckets = Vec::<FacetBucket>::deserialize(deserializer)?;
        Ok(Self { field: String::new(), buckets })
    }
}
