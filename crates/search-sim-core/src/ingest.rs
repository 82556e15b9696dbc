//! Ingestion coordinator (spec §4.1): turns a batch of raw JSON actions
//! (`upload`/`merge`/`mergeOrUpload`/`delete`) into per-document mutations
//! against one index's tantivy writer, vector stores, and HNSW graphs, with
//! per-document atomicity and a single batch-level commit.
//!
//! New module; no teacher file owns anything like a batch action processor
//! (the teacher's `engine.rs` only sketches an `IndexLifecycle::
//! update_incremental` trait, never a concrete coordinator), so the action
//! kinds, the schema drop rule, and the atomicity/commit contract below are
//! built directly from spec §4.1.

use std::collections::HashMap;

use search_sim_types::{FieldType, IndexSchema, SearchError, SearchResult, Value};
use tantivy::{IndexWriter, TantivyDocument, Term};
use tracing::{debug, info};

use crate::document::{DocChange, DocKey, Document};
use crate::hnsw::HnswIndex;
use crate::tantivy_index::{ascii_fold, FieldHandle, TantivyIndexSchema};
use crate::vector_store::VectorStore;

/// The field name carrying the per-action verb in a raw ingestion payload,
/// mirroring the source system's `@search.action` convention.
pub const ACTION_FIELD: &str = "@search.action";

/// Outcome of one document's action within a batch (spec §4.1: every action
/// reports its own key, success, and an HTTP-like status/message on
/// failure, independent of the rest of the batch).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentResult {
    pub key: DocKey,
    pub succeeded: bool,
    pub http_like_status: u16,
    pub error_message: Option<String>,
}

impl DocumentResult {
    fn ok(key: DocKey) -> Self {
        Self { key, succeeded: true, http_like_status: 200, error_message: None }
    }

    fn err(key: DocKey, error: &SearchError) -> Self {
        Self {
            key,
            succeeded: false,
            http_like_status: error.http_like_status(),
            error_message: Some(error.to_string()),
        }
    }
}

/// Parses raw ingestion payloads into [`DocChange`]s against `schema`,
/// pairing each with a best-effort key so a malformed action can still be
/// reported against something identifiable. Fields absent from `schema` are
/// silently dropped (spec §4.1 "schema drop rule"); fields present but
/// mistyped surface as a per-action [`SearchError::SchemaViolation`] rather
/// than failing the whole batch.
///
/// # Errors
/// Returns an error only if `schema` itself does not pass
/// [`IndexSchema::validate`]; per-action failures are reported inline in the
/// returned vector instead.
pub fn parse_batch(raw_actions: &[serde_json::Value], schema: &IndexSchema) -> SearchResult<Vec<(DocKey, SearchResult<DocChange>)>> {
    schema.validate()?;
    let key_field_name = schema.key_field().name.clone();
    Ok(raw_actions
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let key_guess = raw
                .as_object()
                .and_then(|map| map.get(&key_field_name))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("<missing-key-{index}>"));
            (key_guess, parse_one(raw, schema, &key_field_name))
        })
        .collect())
}

fn parse_one(raw: &serde_json::Value, schema: &IndexSchema, key_field_name: &str) -> SearchResult<DocChange> {
    let serde_json::Value::Object(map) = raw else {
        return Err(SearchError::InvalidQuery("ingestion action must be a JSON object".into()));
    };
    let action = map.get(ACTION_FIELD).and_then(serde_json::Value::as_str).unwrap_or("upload").to_owned();
    let key = map
        .get(key_field_name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SearchError::InvalidQuery(format!("action is missing key field '{key_field_name}'")))?
        .to_owned();

    if action.eq_ignore_ascii_case("delete") {
        return Ok(DocChange::Delete(key));
    }

    let (raw_payload, fields) = partition_declared_fields(map, schema)?;
    let document = Document::new(key, fields, serde_json::Value::Object(raw_payload));

    match action.to_ascii_lowercase().as_str() {
        "upload" => Ok(DocChange::Upload(document)),
        "merge" => Ok(DocChange::Merge(document)),
        "mergeorupload" => Ok(DocChange::MergeOrUpload(document)),
        other => Err(SearchError::InvalidQuery(format!("unknown ingestion action '{other}'"))),
    }
}

/// Splits a raw action's JSON object into the schema-declared subset: a
/// trimmed stored payload (nulls excluded, so projection never surfaces a
/// cleared field) and the coerced field map (nulls retained, so merge can
/// tell "absent" from "explicitly cleared").
fn partition_declared_fields(
    map: &serde_json::Map<String, serde_json::Value>,
    schema: &IndexSchema,
) -> SearchResult<(serde_json::Map<String, serde_json::Value>, HashMap<String, Value>)> {
    let mut raw_payload = serde_json::Map::new();
    let mut fields = HashMap::with_capacity(map.len());
    for declared in &schema.fields {
        let Some(json_value) = map.get(&declared.name) else {
            continue;
        };
        let value = Value::from_json(json_value)?;
        let coerced = value.coerce(declared.field_type, &declared.name)?;
        if !json_value.is_null() {
            raw_payload.insert(declared.name.clone(), json_value.clone());
        }
        fields.insert(declared.name.clone(), coerced);
    }
    Ok((raw_payload, fields))
}

/// Merges `incoming` onto `existing` per spec §4.1 merge semantics: a key
/// absent from `incoming` leaves the existing value untouched, an explicit
/// null clears it, and anything else (including collection/vector fields)
/// replaces the existing value wholesale.
fn merge_documents(mut existing: Document, incoming: Document) -> Document {
    let mut raw_map = match existing.raw {
        serde_json::Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };
    let incoming_raw = match incoming.raw {
        serde_json::Value::Object(m) => m,
        _ => serde_json::Map::new(),
    };

    for (name, value) in incoming.fields {
        if value.is_null() {
            existing.fields.remove(&name);
            raw_map.remove(&name);
        } else {
            if let Some(json_value) = incoming_raw.get(&name) {
                raw_map.insert(name.clone(), json_value.clone());
            }
            existing.fields.insert(name, value);
        }
    }

    Document::new(existing.key, existing.fields, serde_json::Value::Object(raw_map))
}

/// Applies document actions against one index's tantivy writer and its
/// per-field vector stores/HNSW graphs (spec §4.1).
pub struct IngestionCoordinator<'a> {
    declared_schema: &'a IndexSchema,
    tantivy_schema: &'a TantivyIndexSchema,
    writer: &'a mut IndexWriter,
    vector_stores: &'a mut HashMap<String, VectorStore>,
    hnsw_indexes: &'a mut HashMap<String, HnswIndex>,
}

impl<'a> IngestionCoordinator<'a> {
    pub fn new(
        declared_schema: &'a IndexSchema,
        tantivy_schema: &'a TantivyIndexSchema,
        writer: &'a mut IndexWriter,
        vector_stores: &'a mut HashMap<String, VectorStore>,
        hnsw_indexes: &'a mut HashMap<String, HnswIndex>,
    ) -> Self {
        Self { declared_schema, tantivy_schema, writer, vector_stores, hnsw_indexes }
    }

    /// Applies every parsed action, committing once at the end if at least
    /// one action succeeded (spec §4.1 "Guarantees": no partial commits, a
    /// wholly-failed batch leaves the writer's buffer uncommitted).
    ///
    /// # Errors
    /// Returns an error only if the final `commit()` itself fails;
    /// per-document failures are reported in the returned vector.
    pub fn apply_batch(
        &mut self,
        parsed: Vec<(DocKey, SearchResult<DocChange>)>,
        existing_lookup: impl Fn(&str) -> SearchResult<Option<Document>>,
    ) -> SearchResult<Vec<DocumentResult>> {
        let mut results = Vec::with_capacity(parsed.len());
        let mut any_succeeded = false;

        for (key, change) in parsed {
            let outcome = match change {
                Ok(change) => self.apply_one(change, &existing_lookup),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {
                    any_succeeded = true;
                    results.push(DocumentResult::ok(key));
                }
                Err(err) => {
                    debug!(key = %key, error = %err, "ingestion action failed");
                    results.push(DocumentResult::err(key, &err));
                }
            }
        }

        if any_succeeded {
            self.writer.commit().map_err(|e| SearchError::Internal(format!("tantivy commit failed: {e}")))?;
            info!(
                batch_size = results.len(),
                succeeded = results.iter().filter(|r| r.succeeded).count(),
                "ingestion batch committed"
            );
        }

        Ok(results)
    }

    fn apply_one(&mut self, change: DocChange, existing_lookup: &impl Fn(&str) -> SearchResult<Option<Document>>) -> SearchResult<()> {
        match change {
            DocChange::Upload(doc) => self.apply_upload(doc),
            DocChange::Merge(doc) => self.apply_merge(doc, false, existing_lookup),
            DocChange::MergeOrUpload(doc) => self.apply_merge(doc, true, existing_lookup),
            DocChange::Delete(key) => self.apply_delete(&key),
        }
    }

    fn apply_merge(
        &mut self,
        doc: Document,
        create_if_absent: bool,
        existing_lookup: &impl Fn(&str) -> SearchResult<Option<Document>>,
    ) -> SearchResult<()> {
        match existing_lookup(&doc.key)? {
            Some(existing) => self.apply_upload(merge_documents(existing, doc)),
            None if create_if_absent => self.apply_upload(doc),
            None => Err(SearchError::DocumentNotFound(doc.key)),
        }
    }

    /// Replaces `doc` wholesale: a field absent from `doc.fields` clears any
    /// prior vector/lexical value for it, matching full-document upload
    /// semantics (and, when called from a merge, the merged document has
    /// already folded forward whatever the caller chose to keep).
    fn apply_upload(&mut self, doc: Document) -> SearchResult<()> {
        let tantivy_doc = self.build_tantivy_document(&doc)?;

        let mut vector_updates: Vec<(String, Option<Vec<f32>>)> = Vec::new();
        for declared in &self.declared_schema.fields {
            if !declared.field_type.is_vector() {
                continue;
            }
            let update = match doc.fields.get(&declared.name) {
                Some(value) if !value.is_null() => Some(value.as_f32_vector(&declared.name)?),
                _ => None,
            };
            vector_updates.push((declared.name.clone(), update));
        }

        // Validate every vector's dimension up front so a bad vector never
        // leaves the writer or the vector stores partially updated.
        for (field_name, update) in &vector_updates {
            if let Some(vector) = update {
                if let Some(store) = self.vector_stores.get(field_name) {
                    if vector.len() as u32 != store.dimension() {
                        return Err(SearchError::SchemaViolation(format!(
                            "vector for field '{field_name}' has dimension {}, expected {}",
                            vector.len(),
                            store.dimension()
                        )));
                    }
                }
            }
        }

        for (field_name, update) in vector_updates {
            match update {
                Some(vector) => {
                    if let Some(store) = self.vector_stores.get_mut(&field_name) {
                        store.upsert(doc.key.clone(), vector.clone())?;
                    }
                    if let Some(hnsw) = self.hnsw_indexes.get_mut(&field_name) {
                        hnsw.insert(doc.key.clone(), vector)?;
                    }
                }
                None => {
                    if let Some(store) = self.vector_stores.get_mut(&field_name) {
                        store.delete(&doc.key);
                    }
                    if let Some(hnsw) = self.hnsw_indexes.get_mut(&field_name) {
                        hnsw.delete(&doc.key);
                    }
                }
            }
        }

        self.writer.delete_term(Term::from_field_text(self.tantivy_schema.key_field, &doc.key));
        self.writer
            .add_document(tantivy_doc)
            .map_err(|e| SearchError::Internal(format!("tantivy add_document failed: {e}")))?;
        Ok(())
    }

    fn apply_delete(&mut self, key: &str) -> SearchResult<()> {
        self.writer.delete_term(Term::from_field_text(self.tantivy_schema.key_field, key));
        for declared in &self.declared_schema.fields {
            if !declared.field_type.is_vector() {
                continue;
            }
            if let Some(store) = self.vector_stores.get_mut(&declared.name) {
                store.delete(key);
            }
            if let Some(hnsw) = self.hnsw_indexes.get_mut(&declared.name) {
                hnsw.delete(key);
            }
        }
        Ok(())
    }

    fn build_tantivy_document(&self, doc: &Document) -> SearchResult<TantivyDocument> {
        let mut tantivy_doc = TantivyDocument::default();
        tantivy_doc.add_text(self.tantivy_schema.key_field, &doc.key);
        tantivy_doc.add_text(self.tantivy_schema.raw_field, doc.raw.to_string());

        for declared in &self.declared_schema.fields {
            if declared.flags.key || declared.field_type.is_vector() {
                continue;
            }
            let Some(value) = doc.fields.get(&declared.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(handle) = self.tantivy_schema.handle(&declared.name) else {
                continue;
            };
            add_value_to_document(&mut tantivy_doc, handle, declared.field_type, value, declared.normalizer_ascii_fold)?;
        }

        Ok(tantivy_doc)
    }
}

fn add_value_to_document(
    tantivy_doc: &mut TantivyDocument,
    handle: &FieldHandle,
    field_type: FieldType,
    value: &Value,
    fold_ascii: bool,
) -> SearchResult<()> {
    let normalize = |text: &str| if fold_ascii { ascii_fold(text) } else { text.to_owned() };

    match field_type {
        FieldType::String => {
            let Value::String(text) = value else {
                return Err(SearchError::SchemaViolation("expected string value".into()));
            };
            if let Some(text_field) = handle.text {
                tantivy_doc.add_text(text_field, text);
            }
            if let Some(exact_field) = handle.exact {
                tantivy_doc.add_text(exact_field, normalize(text));
            }
        }
        FieldType::CollectionOfString => {
            let Value::Array(items) = value else {
                return Err(SearchError::SchemaViolation("expected array value".into()));
            };
            for item in items {
                let Value::String(text) = item else { continue };
                if let Some(text_field) = handle.text {
                    tantivy_doc.add_text(text_field, text);
                }
                if let Some(exact_field) = handle.exact {
                    tantivy_doc.add_text(exact_field, normalize(text));
                }
            }
        }
        FieldType::Int32 | FieldType::Int64 => {
            let Value::Int(i) = value else {
                return Err(SearchError::SchemaViolation("expected integer value".into()));
            };
            if let Some(exact_field) = handle.exact {
                tantivy_doc.add_i64(exact_field, *i);
            }
        }
        FieldType::DateTimeOffset => {
            let Value::String(text) = value else {
                return Err(SearchError::SchemaViolation("expected datetime string".into()));
            };
            let parsed: chrono::DateTime<chrono::Utc> =
                text.parse().map_err(|_| SearchError::SchemaViolation(format!("invalid datetime literal '{text}'")))?;
            if let Some(exact_field) = handle.exact {
                tantivy_doc.add_i64(exact_field, parsed.timestamp_micros());
            }
        }
        FieldType::Double | FieldType::Single => {
            let number = match value {
                Value::Float(f) => *f,
                Value::Int(i) => *i as f64,
                _ => return Err(SearchError::SchemaViolation("expected numeric value".into())),
            };
            if let Some(exact_field) = handle.exact {
                tantivy_doc.add_f64(exact_field, number);
            }
        }
        FieldType::Boolean => {
            let Value::Bool(b) = value else {
                return Err(SearchError::SchemaViolation("expected boolean value".into()));
            };
            if let Some(exact_field) = handle.exact {
                tantivy_doc.add_bool(exact_field, *b);
            }
        }
        FieldType::GeoPoint | FieldType::CollectionOfSingle { .. } => {
            // Geo-points are stored-only via `_raw`; vector fields route to
            // the vector store/HNSW graph instead of the lexical document.
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use search_sim_types::{Field as SchemaField, FieldFlags};
    use tantivy::Index;

    use super::*;
    use crate::tantivy_index::build_tantivy_schema;

    fn sample_schema() -> IndexSchema {
        IndexSchema {
            name: "hotels".into(),
            fields: vec![
                SchemaField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                SchemaField::new(
                    "name",
                    FieldType::String,
                    FieldFlags { searchable: true, retrievable: true, ..Default::default() },
                ),
                SchemaField::new(
                    "rating",
                    FieldType::Double,
                    FieldFlags { filterable: true, retrievable: true, ..Default::default() },
                ),
                SchemaField::new("embedding", FieldType::CollectionOfSingle { dimension: 2 }, FieldFlags::default()),
            ],
        }
    }

    struct Fixture {
        index: Index,
        writer: IndexWriter,
        tantivy_schema: TantivyIndexSchema,
        declared: IndexSchema,
        vector_stores: StdHashMap<String, VectorStore>,
        hnsw_indexes: StdHashMap<String, HnswIndex>,
    }

    fn fixture() -> Fixture {
        let declared = sample_schema();
        let tantivy_schema = build_tantivy_schema(&declared).unwrap();
        let index = Index::create_in_ram(tantivy_schema.schema.clone());
        crate::tantivy_index::register_tokenizers(&index);
        let writer = index.writer(15_000_000).unwrap();
        let mut vector_stores = StdHashMap::new();
        vector_stores.insert("embedding".to_owned(), VectorStore::new(2));
        Fixture { index, writer, tantivy_schema, declared, vector_stores, hnsw_indexes: StdHashMap::new() }
    }

    fn no_existing(_key: &str) -> SearchResult<Option<Document>> {
        Ok(None)
    }

    #[test]
    fn upload_then_search_finds_document() {
        let mut fx = fixture();
        let raw = serde_json::json!([
            {"id": "1", "name": "Grand Hotel", "rating": 4.5, "embedding": [0.1, 0.2]},
        ]);
        let parsed = parse_batch(raw.as_array().unwrap(), &fx.declared).unwrap();
        let mut coordinator =
            IngestionCoordinator::new(&fx.declared, &fx.tantivy_schema, &mut fx.writer, &mut fx.vector_stores, &mut fx.hnsw_indexes);
        let results = coordinator.apply_batch(parsed, no_existing).unwrap();
        assert_eq!(results, vec![DocumentResult::ok("1".to_owned())]);

        let reader = fx.index.reader().unwrap();
        assert_eq!(reader.searcher().num_docs(), 1);
        assert_eq!(fx.vector_stores["embedding"].get("1"), Some([0.1_f32, 0.2].as_slice()));
    }

    #[test]
    fn schema_drop_rule_ignores_unknown_fields() {
        let schema = sample_schema();
        let raw = serde_json::json!([{"id": "1", "name": "X", "not_declared": "ignored"}]);
        let parsed = parse_batch(raw.as_array().unwrap(), &schema).unwrap();
        let (_, change) = &parsed[0];
        let DocChange::Upload(doc) = change.as_ref().unwrap() else { panic!("expected upload") };
        assert!(!doc.raw.as_object().unwrap().contains_key("not_declared"));
        assert!(!doc.fields.contains_key("not_declared"));
    }

    #[test]
    fn mistyped_field_fails_as_schema_violation_without_aborting_batch() {
        let schema = sample_schema();
        let raw = serde_json::json!([
            {"id": "1", "rating": "not-a-number"},
            {"id": "2", "name": "ok"},
        ]);
        let parsed = parse_batch(raw.as_array().unwrap(), &schema).unwrap();
        assert!(parsed[0].1.is_err());
        assert!(parsed[1].1.is_ok());
    }

    #[test]
    fn delete_action_parses_without_requiring_other_fields() {
        let schema = sample_schema();
        let raw = serde_json::json!([{"id": "1", "@search.action": "delete"}]);
        let parsed = parse_batch(raw.as_array().unwrap(), &schema).unwrap();
        assert_eq!(parsed[0].1.as_ref().unwrap(), &DocChange::Delete("1".to_owned()));
    }

    #[test]
    fn delete_is_idempotent_and_always_succeeds() {
        let mut fx = fixture();
        let parsed = vec![("ghost".to_owned(), Ok(DocChange::Delete("ghost".to_owned())))];
        let mut coordinator =
            IngestionCoordinator::new(&fx.declared, &fx.tantivy_schema, &mut fx.writer, &mut fx.vector_stores, &mut fx.hnsw_indexes);
        let results = coordinator.apply_batch(parsed, no_existing).unwrap();
        assert!(results[0].succeeded);
    }

    #[test]
    fn merge_without_create_and_missing_key_is_document_not_found() {
        let mut fx = fixture();
        let mut fields = StdHashMap::new();
        fields.insert("name".to_owned(), Value::String("Updated".into()));
        let doc = Document::new("missing", fields, serde_json::json!({"name": "Updated"}));
        let parsed = vec![("missing".to_owned(), Ok(DocChange::Merge(doc)))];
        let mut coordinator =
            IngestionCoordinator::new(&fx.declared, &fx.tantivy_schema, &mut fx.writer, &mut fx.vector_stores, &mut fx.hnsw_indexes);
        let results = coordinator.apply_batch(parsed, no_existing).unwrap();
        assert!(!results[0].succeeded);
        assert_eq!(results[0].http_like_status, 404);
    }

    #[test]
    fn merge_or_upload_creates_when_absent() {
        let mut fx = fixture();
        let mut fields = StdHashMap::new();
        fields.insert("name".to_owned(), Value::String("Created".into()));
        let doc = Document::new("new-doc", fields, serde_json::json!({"name": "Created"}));
        let parsed = vec![("new-doc".to_owned(), Ok(DocChange::MergeOrUpload(doc)))];
        let mut coordinator =
            IngestionCoordinator::new(&fx.declared, &fx.tantivy_schema, &mut fx.writer, &mut fx.vector_stores, &mut fx.hnsw_indexes);
        let results = coordinator.apply_batch(parsed, no_existing).unwrap();
        assert!(results[0].succeeded);
    }

    #[test]
    fn merge_leaves_untouched_fields_and_clears_null_fields() {
        let mut existing_fields = StdHashMap::new();
        existing_fields.insert("name".to_owned(), Value::String("Old Name".into()));
        existing_fields.insert("rating".to_owned(), Value::Float(3.0));
        let existing = Document::new(
            "1",
            existing_fields,
            serde_json::json!({"name": "Old Name", "rating": 3.0}),
        );

        let mut incoming_fields = StdHashMap::new();
        incoming_fields.insert("rating".to_owned(), Value::Null);
        let incoming = Document::new("1", incoming_fields, serde_json::json!({"rating": null}));

        let merged = merge_documents(existing, incoming);
        assert_eq!(merged.fields.get("name"), Some(&Value::String("Old Name".into())));
        assert!(!merged.fields.contains_key("rating"));
        assert!(!merged.raw.as_object().unwrap().contains_key("rating"));
    }

    #[test]
    fn vector_dimension_mismatch_is_rejected_before_mutating_store() {
        let mut fx = fixture();
        let mut fields = StdHashMap::new();
        fields.insert("embedding".to_owned(), Value::Array(vec![Value::Float(1.0)]));
        let doc = Document::new("1", fields, serde_json::json!({"embedding": [1.0]}));
        let parsed = vec![("1".to_owned(), Ok(DocChange::Upload(doc)))];
        let mut coordinator =
            IngestionCoordinator::new(&fx.declared, &fx.tantivy_schema, &mut fx.writer, &mut fx.vector_stores, &mut fx.hnsw_indexes);
        let results = coordinator.apply_batch(parsed, no_existing).unwrap();
        assert!(!results[0].succeeded);
        assert_eq!(results[0].http_like_status, 400);
        assert!(fx.vector_stores["embedding"].is_empty());
    }

    #[test]
    fn upload_replaces_existing_document_by_key() {
        let mut fx = fixture();
        for (name, rating) in [("First", 3.0), ("Second", 4.0)] {
            let mut fields = StdHashMap::new();
            fields.insert("name".to_owned(), Value::String(name.into()));
            fields.insert("rating".to_owned(), Value::Float(rating));
            let doc = Document::new("1", fields, serde_json::json!({"name": name, "rating": rating}));
            let parsed = vec![("1".to_owned(), Ok(DocChange::Upload(doc)))];
            let mut coordinator = IngestionCoordinator::new(
                &fx.declared,
                &fx.tantivy_schema,
                &mut fx.writer,
                &mut fx.vector_stores,
                &mut fx.hnsw_indexes,
            );
            coordinator.apply_batch(parsed, no_existing).unwrap();
        }

        let reader = fx.index.reader().unwrap();
        assert_eq!(reader.searcher().num_docs(), 1);
    }
}
