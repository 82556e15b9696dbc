//! Document model for the search index.
//!
//! A document is a logical mapping from field name to value, plus a
//! synthetic `_raw` artifact that preserves the original submitted payload
//! so projection (`select`) can return fields exactly as submitted,
//! regardless of index-time analyzer/normalizer transforms (spec §3.1).

use std::collections::HashMap;

use search_sim_types::Value;
use serde::{Deserialize, Serialize};

/// A document's key value (always a string, per the schema invariant that
/// the key field is of type string).
pub type DocKey = String;

/// A document to be indexed: field name -> coerced [`Value`], plus the raw
/// submitted JSON payload for faithful retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// The document's key (duplicated from `fields` for convenient access).
    pub key: DocKey,
    /// Coerced field values, normalized against the installed schema.
    pub fields: HashMap<String, Value>,
    /// The exact original payload as submitted, used for `select` projection.
    pub raw: serde_json::Value,
}

impl Document {
    #[must_use]
    pub fn new(key: impl Into<String>, fields: HashMap<String, Value>, raw: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            fields,
            raw,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Projects this document down to the requested `select` field list; an
    /// empty `select` returns every retrievable field present in `raw`.
    #[must_use]
    pub fn project(&self, select: &[String]) -> serde_json::Value {
        let serde_json::Value::Object(map) = &self.raw else {
            return self.raw.clone();
        };
        if select.is_empty() {
            return self.raw.clone();
        }
        let mut projected = serde_json::Map::new();
        for field_name in select {
            if let Some(value) = map.get(field_name) {
                projected.insert(field_name.clone(), value.clone());
            }
        }
        serde_json::Value::Object(projected)
    }
}

/// Describes a per-document action within an ingestion batch, per spec §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DocChange {
    /// `upload` — replace-or-create by key.
    Upload(Document),
    /// `merge` — shallow field-level merge onto an existing document; fails
    /// (per-document) if the key is absent.
    Merge(Document),
    /// `mergeOrUpload` — merge if present, else upload.
    MergeOrUpload(Document),
    /// `delete` — remove by key; no-op (success) if absent.
    Delete(DocKey),
}

impl DocChange {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Upload(doc) | Self::Merge(doc) | Self::MergeOrUpload(doc) => &doc.key,
            Self::Delete(key) => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        let mut fields = HashMap::new();
        fields.insert("title".to_string(), Value::String("Hello".into()));
        fields.insert("rating".to_string(), Value::Float(4.5));
        Document::new(
            "doc-1",
            fields,
            serde_json::json!({"id": "doc-1", "title": "Hello", "rating": 4.5, "internal": "secret"}),
        )
    }

    #[test]
    fn project_with_empty_select_returns_full_raw() {
        let doc = sample_document();
        assert_eq!(doc.project(&[]), doc.raw);
    }

    #[test]
    fn project_with_select_returns_only_requested_fields() {
        let doc = sample_document();
        let projected = doc.project(&["title".to_string(), "rating".to_string()]);
        assert_eq!(projected, serde_json::json!({"title": "Hello", "rating": 4.5}));
    }

    #[test]
    fn project_silently_drops_unknown_select_fields() {
        let doc = sample_document();
        let projected = doc.project(&["nope".to_string()]);
        assert_eq!(projected, serde_json::json!({}));
    }

    #[test]
    fn doc_change_key_extraction() {
        let doc = sample_document();
        assert_eq!(DocChange::Upload(doc.clone()).key(), "doc-1");
        assert_eq!(DocChange::Merge(doc.clone()).key(), "doc-1");
        assert_eq!(DocChange::MergeOrUpload(doc).key(), "doc-1");
        assert_eq!(DocChange::Delete("doc-2".into()).key(), "doc-2");
    }

    #[test]
    fn serde_roundtrip() {
        let doc = sample_document();
        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key, doc.key);
        assert_eq!(back.fields.len(), doc.fields.len());
    }
}
