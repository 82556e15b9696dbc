//! Suggest and autocomplete (spec §4.3 "Suggest and Autocomplete"): a
//! prefix query directly against a searchable field's term dictionary,
//! rather than an analyzed full-text query — tantivy's term dictionary is
//! already a sorted structure, so a prefix scan is just a range stream over
//! it, deduplicated by term and capped by `top`.

use std::collections::BTreeSet;

use search_sim_types::{SearchError, SearchResult};
use tantivy::schema::Field;
use tantivy::Searcher;

/// Default number of suggestions returned when the caller does not specify
/// `top` (spec §4.3).
pub const DEFAULT_TOP: usize = 5;

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}

/// Returns up to `top` distinct terms from `field`'s term dictionary that
/// start with `prefix`, lower-cased and in lexical order, deduplicated
/// across segments.
///
/// # Errors
/// Returns [`SearchError::Internal`] if a segment's term dictionary cannot
/// be opened or streamed.
pub fn suggest(searcher: &Searcher, field: Field, prefix: &str, top: Option<usize>) -> SearchResult<Vec<String>> {
    let top = top.unwrap_or(DEFAULT_TOP).max(1);
    let prefix = prefix.to_lowercase();
    if prefix.is_empty() {
        return Ok(Vec::new());
    }

    let mut terms = BTreeSet::new();
    for segment_reader in searcher.segment_readers() {
        let inverted_index = segment_reader.inverted_index(field).map_err(tantivy_err)?;
        let term_dict = inverted_index.terms();
        let mut stream = term_dict.range().ge(prefix.as_bytes()).into_stream().map_err(tantivy_err)?;

        while stream.advance() {
            let term_bytes = stream.key();
            if !term_bytes.starts_with(prefix.as_bytes()) {
                break;
            }
            if let Ok(term) = std::str::from_utf8(term_bytes) {
                terms.insert(term.to_owned());
            }
        }
    }

    Ok(terms.into_iter().take(top).collect())
}

#[cfg(test)]
mod tests {
    use search_sim_types::{Field as SchemaField, FieldFlags, FieldType, IndexSchema};
    use tantivy::Index;

    use super::*;
    use crate::tantivy_index::{build_tantivy_schema, register_tokenizers};

    fn schema() -> IndexSchema {
        IndexSchema {
            name: "articles".into(),
            fields: vec![
                SchemaField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                SchemaField::new(
                    "title",
                    FieldType::String,
                    FieldFlags { searchable: true, retrievable: true, ..Default::default() },
                ),
            ],
        }
    }

    fn index_with(titles: &[&str]) -> (Index, Field) {
        let declared = schema();
        let tantivy_schema = build_tantivy_schema(&declared).unwrap();
        let index = Index::create_in_ram(tantivy_schema.schema.clone());
        register_tokenizers(&index);
        let title_field = tantivy_schema.handle("title").unwrap().text.unwrap();

        let mut writer = index.writer(15_000_000).unwrap();
        for (i, title) in titles.iter().enumerate() {
            writer
                .add_document(tantivy::doc!(
                    tantivy_schema.key_field => i.to_string(),
                    title_field => *title,
                ))
                .unwrap();
        }
        writer.commit().unwrap();
        (index, title_field)
    }

    #[test]
    fn matches_prefix_case_insensitively() {
        let (index, field) = index_with(&["Rust programming", "Ruby on rails", "Python basics"]);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();

        let hits = suggest(&searcher, field, "ru", None).unwrap();
        assert_eq!(hits, vec!["ruby".to_owned(), "rust".to_owned()]);
    }

    #[test]
    fn dedups_terms_repeated_across_documents() {
        let (index, field) = index_with(&["rust is great", "rust is fast"]);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();

        let hits = suggest(&searcher, field, "rust", None).unwrap();
        assert_eq!(hits, vec!["rust".to_owned()]);
    }

    #[test]
    fn caps_results_at_top() {
        let (index, field) = index_with(&["alpha", "alpine", "alloy", "album"]);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();

        let hits = suggest(&searcher, field, "al", Some(2)).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn defaults_to_five_when_top_not_specified() {
        let (index, field) = index_with(&["one", "onward", "onset", "only", "online", "onyx"]);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();

        let hits = suggest(&searcher, field, "on", None).unwrap();
        assert_eq!(hits.len(), DEFAULT_TOP);
    }

    #[test]
    fn no_match_returns_empty() {
        let (index, field) = index_with(&["rust programming"]);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();

        let hits = suggest(&searcher, field, "zzz", None).unwrap();
        assert!(hits.is_empty());
    }
}
