//! Facet engine (spec §4.4): value and interval bucket facets computed over
//! the current query's base set C, reading each facetable field's stored
//! exact-path value out of the documents in C (the same stored exact field
//! [`crate::tantivy_index`] marks `STORED | FAST` for filter/sort/facet).

use std::collections::HashMap;

use search_sim_types::{FieldType, SearchError, SearchResult};
use tantivy::schema::{Field, Value};
use tantivy::{DocAddress, Searcher, TantivyDocument};

use crate::query::FacetSpec;
use crate::tantivy_index::FieldHandle;

/// One facet bucket: either a discrete value with its count, or a numeric
/// half-open range with its count.
#[derive(Debug, Clone, PartialEq)]
pub enum FacetBucket {
    Value { value: String, count: u64 },
    Range { from: f64, to: f64, count: u64 },
}

/// The computed buckets for one requested facet field.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetResult {
    pub field: String,
    pub buckets: Vec<FacetBucket>,
}

/// Computes one [`FacetResult`] for `spec` over the base-set documents
/// `doc_addrs`. Returns `Ok(None)` when the field is not facetable (spec
/// §4.4: "the spec is ignored", not an error).
pub fn compute_facet(
    searcher: &Searcher,
    doc_addrs: &[DocAddress],
    handle: &FieldHandle,
    spec: &FacetSpec,
) -> SearchResult<Option<FacetResult>> {
    let Some(exact_field) = handle.exact else {
        return Ok(None);
    };

    match spec.interval {
        Some(interval) if handle.field_type.is_numeric() => {
            Ok(Some(compute_interval_facet(searcher, doc_addrs, exact_field, spec, interval)?))
        }
        Some(_) => Ok(None),
        None => Ok(Some(compute_value_facet(searcher, doc_addrs, exact_field, spec)?)),
    }
}

fn compute_value_facet(
    searcher: &Searcher,
    doc_addrs: &[DocAddress],
    exact_field: Field,
    spec: &FacetSpec,
) -> SearchResult<FacetResult> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for addr in doc_addrs {
        let doc: TantivyDocument = searcher.doc(*addr).map_err(tantivy_err)?;
        for value in doc.get_all(exact_field) {
            if let Some(text) = value.as_str() {
                *counts.entry(text.to_owned()).or_insert(0) += 1;
            } else if let Some(b) = value.as_bool() {
                *counts.entry(b.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    buckets.truncate(spec.effective_count());

    Ok(FacetResult {
        field: spec.field.clone(),
        buckets: buckets
            .into_iter()
            .map(|(value, count)| FacetBucket::Value { value, count })
            .collect(),
    })
}

/// Buckets by half-open `[start, start+interval)` ranges starting at
/// `floor(min/interval)*interval`, emitting only non-empty buckets up to
/// `count` (spec §4.4).
fn compute_interval_facet(
    searcher: &Searcher,
    doc_addrs: &[DocAddress],
    exact_field: Field,
    spec: &FacetSpec,
    interval: f64,
) -> SearchResult<FacetResult> {
    if interval <= 0.0 {
        return Err(SearchError::InvalidQuery(format!(
            "facet interval must be positive, got {interval}"
        )));
    }

    let mut values = Vec::with_capacity(doc_addrs.len());
    for addr in doc_addrs {
        let doc: TantivyDocument = searcher.doc(*addr).map_err(tantivy_err)?;
        if let Some(value) = doc.get_first(exact_field) {
            if let Some(v) = value.as_i64() {
                values.push(v as f64);
            } else if let Some(v) = value.as_f64() {
                values.push(v);
            }
        }
    }

    if values.is_empty() {
        return Ok(FacetResult {
            field: spec.field.clone(),
            buckets: Vec::new(),
        });
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let base = (min / interval).floor() * interval;

    let mut counts: HashMap<i64, u64> = HashMap::new();
    for value in &values {
        let bucket_index = ((value - base) / interval).floor() as i64;
        *counts.entry(bucket_index).or_insert(0) += 1;
    }

    let mut bucket_indices: Vec<i64> = counts.keys().copied().collect();
    bucket_indices.sort_unstable();
    bucket_indices.truncate(spec.effective_count());

    let buckets = bucket_indices
        .into_iter()
        .map(|index| {
            let from = base + index as f64 * interval;
            FacetBucket::Range {
                from,
                to: from + interval,
                count: counts[&index],
            }
        })
        .collect();

    Ok(FacetResult {
        field: spec.field.clone(),
        buckets,
    })
}

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}
