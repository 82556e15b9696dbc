//! Lexical ranking (spec §4.3 "Ranking").
//!
//! Tantivy's native scorer already implements BM25 with the spec's default
//! parameters (`k1 = 1.2`, `b = 0.75`), so the `Bm25` similarity path is a
//! thin wrapper around `Searcher::search` with `TopDocs` — grounded on the
//! `execute_search`/`TopDocs::with_limit` pattern the teacher uses in
//! `search_tantivy.rs`/`lexical_response.rs`. The `Classic` alternative
//! (spec §9: "a 'classic' similarity option may be configured per index")
//! re-scores the same candidate set with a Lucene-style TF-IDF formula read
//! directly off segment postings, since tantivy itself does not expose a
//! pluggable classic similarity.

use std::collections::HashMap;

use search_sim_types::config::SimilarityKind;
use search_sim_types::{SearchError, SearchResult as EngineResult};
use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{DocAddress, Searcher, TantivyDocument, Term};

use crate::document::DocKey;

/// One scored document from the lexical ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedHit {
    pub key: DocKey,
    pub score: f32,
}

/// Runs `query` against `searcher`, returning up to `limit` hits ranked by
/// the requested [`SimilarityKind`]. A query that produces no score at all
/// (e.g. a filter-only `AllQuery`) reports `1.0`, never `NaN` (spec §4.3).
pub fn rank(
    searcher: &Searcher,
    query: &dyn Query,
    key_field: Field,
    limit: usize,
    similarity: SimilarityKind,
    classic_terms: &[Term],
) -> EngineResult<Vec<RankedHit>> {
    let top_docs = searcher
        .search(query, &TopDocs::with_limit(limit.max(1)))
        .map_err(tantivy_err)?;

    let classic_scores = match similarity {
        SimilarityKind::Bm25 => None,
        SimilarityKind::Classic => Some(classic_scores(searcher, &top_docs, classic_terms)?),
    };

    let mut hits = Vec::with_capacity(top_docs.len());
    for (native_score, doc_addr) in &top_docs {
        let doc: TantivyDocument = searcher.doc(*doc_addr).map_err(tantivy_err)?;
        let Some(key) = key_of(&doc, key_field) else {
            continue;
        };
        let score = match &classic_scores {
            Some(scores) => scores.get(doc_addr).copied().unwrap_or(0.0),
            None => {
                if native_score.is_finite() && *native_score > 0.0 {
                    *native_score
                } else {
                    1.0
                }
            }
        };
        hits.push(RankedHit { key, score });
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    Ok(hits)
}

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}

fn key_of(doc: &TantivyDocument, key_field: Field) -> Option<DocKey> {
    doc.get_first(key_field)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Classic Lucene-style TF-IDF: for each candidate doc, sum over query
/// terms of `sqrt(term_freq) * (ln(N / (doc_freq + 1)) + 1)`.
fn classic_scores(
    searcher: &Searcher,
    candidates: &[(f32, DocAddress)],
    terms: &[Term],
) -> EngineResult<HashMap<DocAddress, f32>> {
    let total_docs = searcher.num_docs().max(1) as f64;
    let mut idf_by_term = Vec::with_capacity(terms.len());
    for term in terms {
        let doc_freq = searcher.doc_freq(term).map_err(tantivy_err)? as f64;
        let idf = (total_docs / (doc_freq + 1.0)).ln() + 1.0;
        idf_by_term.push(idf);
    }

    let mut scores = HashMap::with_capacity(candidates.len());
    for (_, doc_addr) in candidates {
        let segment_reader = searcher.segment_reader(doc_addr.segment_ord);
        let mut total = 0.0_f64;
        for (term, idf) in terms.iter().zip(&idf_by_term) {
            let Ok(inverted) = segment_reader.inverted_index(term.field()) else {
                continue;
            };
            let Ok(Some(mut postings)) =
                inverted.read_postings(term, IndexRecordOption::WithFreqs)
            else {
                continue;
            };
            if postings.seek(doc_addr.doc_id) == doc_addr.doc_id {
                let tf = f64::from(postings.term_freq()).sqrt();
                total += tf * idf;
            }
        }
        scores.insert(*doc_addr, total as f32);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::doc;
    use tantivy::query::AllQuery;
    use tantivy::schema::{Schema, STORED, STRING, TEXT};
    use tantivy::Index;

    fn build_index() -> (Index, Field, Field) {
        let mut builder = Schema::builder();
        let key_field = builder.add_text_field("_key", STRING | STORED);
        let body_field = builder.add_text_field("body", TEXT);
        let schema = builder.build();
        let index = Index::create_in_ram(schema);
        let mut writer = index.writer(15_000_000).unwrap();
        writer
            .add_document(doc!(key_field => "doc1", body_field => "rust search engine"))
            .unwrap();
        writer
            .add_document(doc!(key_field => "doc2", body_field => "rust rust rust engine"))
            .unwrap();
        writer.commit().unwrap();
        (index, key_field, body_field)
    }

    #[test]
    fn filter_only_query_scores_one_never_nan() {
        let (index, key_field, _body) = build_index();
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let hits = rank(&searcher, &AllQuery, key_field, 10, SimilarityKind::Bm25, &[]).unwrap();
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert_eq!(hit.score, 1.0);
        }
    }

    #[test]
    fn bm25_ranks_higher_term_frequency_first() {
        let (index, key_field, body_field) = build_index();
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let term = Term::from_field_text(body_field, "rust");
        let query = tantivy::query::TermQuery::new(term, IndexRecordOption::WithFreqs);
        let hits = rank(&searcher, &query, key_field, 10, SimilarityKind::Bm25, &[]).unwrap();
        assert_eq!(hits[0].key, "doc2");
    }

    #[test]
    fn classic_similarity_also_ranks_higher_term_frequency_first() {
        let (index, key_field, body_field) = build_index();
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let term = Term::from_field_text(body_field, "rust");
        let query = tantivy::query::TermQuery::new(term.clone(), IndexRecordOption::WithFreqs);
        let hits = rank(
            &searcher,
            &query,
            key_field,
            10,
            SimilarityKind::Classic,
            &[term],
        )
        .unwrap();
        assert_eq!(hits[0].key, "doc2");
        assert!(hits[0].score > hits[1].score);
    }
}
