//! OData-subset filter parsing and compilation to Tantivy queries.
//!
//! Implements exactly the grammar in spec §4.2/§4.6:
//! `field eq|ne|gt|ge|lt|le literal`, `search.in(field, 'v1,v2,...')`,
//! composed only by ` and ` (case-insensitive). Parentheses and ` or ` are
//! not supported in this core (spec §9 Open Question — full OData support
//! is future work).
//!
//! Directly generalized from the teacher's `filter_compiler.rs`, which
//! compiled a fixed mail `SearchFilter` struct into `CompiledFilters`; here
//! the same `CompiledFilters`-wrapping-a-`BooleanQuery` shape compiles an
//! arbitrary OData-subset string against a schema-driven field set.

use std::ops::Bound;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use search_sim_types::{FieldType, IndexSchema, SearchError, SearchResult};
use tantivy::query::{BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::Term;

use crate::tantivy_index::TantivyIndexSchema;

/// A filter expression compiled into a list of Tantivy query clauses, all
/// composed with `Occur::Must` (AND) per spec §4.6.
pub struct CompiledFilters {
    clauses: Vec<(Occur, Box<dyn Query>)>,
}

impl CompiledFilters {
    #[must_use]
    pub fn empty() -> Self {
        Self { clauses: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    #[must_use]
    pub fn into_clauses(self) -> Vec<(Occur, Box<dyn Query>)> {
        self.clauses
    }

    /// Wraps `base_query` in a `BooleanQuery` requiring all compiled
    /// clauses; a no-op if there are no clauses.
    #[must_use]
    pub fn apply_to(self, base_query: Box<dyn Query>) -> Box<dyn Query> {
        if self.clauses.is_empty() {
            return base_query;
        }
        let mut clauses = self.clauses;
        clauses.push((Occur::Must, base_query));
        Box::new(BooleanQuery::new(clauses))
    }
}

#[derive(Debug, PartialEq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, PartialEq)]
enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

fn and_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+and\s+").expect("static regex"))
}

fn clause_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*([A-Za-z_][A-Za-z0-9_]*)\s+(eq|ne|gt|ge|lt|le)\s+(.+?)\s*$")
            .expect("static regex")
    })
}

fn search_in_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*search\.in\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*,\s*'([^']*)'\s*\)\s*$")
            .expect("static regex")
    })
}

fn parse_literal(raw: &str) -> Literal {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return Literal::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Literal::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Literal::Bool(false);
    }
    if trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2 {
        return Literal::String(trimmed[1..trimmed.len() - 1].to_string());
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Literal::Number(n);
    }
    Literal::String(trimmed.to_string())
}

/// Parses an ISO-8601 datetime literal into UTC microsecond ticks.
fn parse_date_literal(literal: &str) -> SearchResult<i64> {
    let parsed: DateTime<Utc> = literal
        .parse()
        .map_err(|_| SearchError::InvalidQuery(format!("invalid ISO-8601 date literal: {literal}")))?;
    Ok(parsed.timestamp_micros())
}

/// Compiles an OData-subset filter expression against the given schema.
///
/// # Errors
/// Returns [`SearchError::InvalidQuery`] for malformed clauses, and
/// [`SearchError::SchemaViolation`] for filters against non-filterable
/// fields (spec §4.6: "equality on a searchable-only field without a
/// filter-exact path is lossy and must be rejected (400) rather than
/// silently match-all").
pub fn compile_filter(
    expr: &str,
    declared_schema: &IndexSchema,
    tantivy_schema: &TantivyIndexSchema,
) -> SearchResult<CompiledFilters> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(CompiledFilters::empty());
    }

    let mut clauses = Vec::new();
    for raw_clause in and_splitter().split(expr) {
        let raw_clause = raw_clause.trim();
        if raw_clause.is_empty() {
            continue;
        }
        if let Some(caps) = search_in_regex().captures(raw_clause) {
            let field_name = &caps[1];
            let values: Vec<&str> = caps[2].split(',').map(str::trim).filter(|v| !v.is_empty()).collect();
            clauses.push(compile_search_in(field_name, &values, declared_schema, tantivy_schema)?);
            continue;
        }
        let Some(caps) = clause_regex().captures(raw_clause) else {
            return Err(SearchError::InvalidQuery(format!("unrecognized filter clause: '{raw_clause}'")));
        };
        let field_name = &caps[1];
        let op = match caps[2].to_ascii_lowercase().as_str() {
            "eq" => Op::Eq,
            "ne" => Op::Ne,
            "gt" => Op::Gt,
            "ge" => Op::Ge,
            "lt" => Op::Lt,
            "le" => Op::Le,
            other => return Err(SearchError::InvalidQuery(format!("unknown filter operator: {other}"))),
        };
        let literal = parse_literal(&caps[3]);
        clauses.push(compile_clause(field_name, &op, &literal, declared_schema, tantivy_schema)?);
    }

    Ok(CompiledFilters { clauses })
}

fn require_filterable<'a>(field_name: &str, declared_schema: &'a IndexSchema) -> SearchResult<&'a search_sim_types::Field> {
    let field = declared_schema
        .field(field_name)
        .ok_or_else(|| SearchError::SchemaViolation(format!("unknown filter field '{field_name}'")))?;
    if !field.flags.filterable {
        return Err(SearchError::SchemaViolation(format!("field '{field_name}' is not filterable")));
    }
    Ok(field)
}

fn compile_clause(
    field_name: &str,
    op: &Op,
    literal: &Literal,
    declared_schema: &IndexSchema,
    tantivy_schema: &TantivyIndexSchema,
) -> SearchResult<(Occur, Box<dyn Query>)> {
    let declared = require_filterable(field_name, declared_schema)?;
    let handle = tantivy_schema
        .handle(field_name)
        .ok_or_else(|| SearchError::SchemaViolation(format!("field '{field_name}' has no filter path")))?;
    let exact_field = handle
        .exact
        .ok_or_else(|| SearchError::SchemaViolation(format!("field '{field_name}' has no exact filter path")))?;

    match declared.field_type {
        FieldType::String | FieldType::CollectionOfString | FieldType::Boolean => {
            if matches!(literal, Literal::Null) {
                return Ok((Occur::MustNot, Box::new(tantivy::query::AllQuery)));
            }
            let term = match literal {
                Literal::String(s) => Term::from_field_text(exact_field, &s.to_lowercase()),
                Literal::Bool(b) => Term::from_field_bool(exact_field, *b),
                Literal::Number(n) => Term::from_field_text(exact_field, &n.to_string()),
                Literal::Null => unreachable!("handled above"),
            };
            let query: Box<dyn Query> = Box::new(TermQuery::new(term, IndexRecordOption::Basic));
            match op {
                Op::Eq => Ok((Occur::Must, query)),
                Op::Ne => Ok((Occur::MustNot, query)),
                _ => Err(SearchError::InvalidQuery(format!(
                    "operator not supported on string/boolean field '{field_name}'"
                ))),
            }
        }
        FieldType::Int32 | FieldType::Int64 | FieldType::DateTimeOffset => {
            let ticks = match (declared.field_type, literal) {
                (FieldType::DateTimeOffset, Literal::String(s)) => parse_date_literal(s)?,
                (_, Literal::Number(n)) => *n as i64,
                _ => return Err(SearchError::InvalidQuery(format!("invalid literal for field '{field_name}'"))),
            };
            Ok((Occur::Must, numeric_clause_query(exact_field, op, ticks as f64, true)))
        }
        FieldType::Double | FieldType::Single => {
            let value = match literal {
                Literal::Number(n) => *n,
                _ => return Err(SearchError::InvalidQuery(format!("invalid numeric literal for field '{field_name}'"))),
            };
            Ok((Occur::Must, numeric_clause_query(exact_field, op, value, false)))
        }
        FieldType::GeoPoint | FieldType::CollectionOfSingle { .. } => {
            Err(SearchError::SchemaViolation(format!("field '{field_name}' cannot be filtered")))
        }
    }
}

fn make_term(field: tantivy::schema::Field, is_i64: bool, value: f64) -> Term {
    if is_i64 {
        Term::from_field_i64(field, value as i64)
    } else {
        Term::from_field_f64(field, value)
    }
}

fn numeric_clause_query(field: tantivy::schema::Field, op: &Op, value: f64, is_i64: bool) -> Box<dyn Query> {
    match op {
        Op::Eq => Box::new(TermQuery::new(make_term(field, is_i64, value), IndexRecordOption::Basic)),
        Op::Ne => {
            let eq_query: Box<dyn Query> =
                Box::new(TermQuery::new(make_term(field, is_i64, value), IndexRecordOption::Basic));
            Box::new(BooleanQuery::new(vec![
                (Occur::MustNot, eq_query),
                (Occur::Must, Box::new(tantivy::query::AllQuery)),
            ]))
        }
        Op::Gt => range_query(field, is_i64, Bound::Excluded(value), Bound::Unbounded),
        Op::Ge => range_query(field, is_i64, Bound::Included(value), Bound::Unbounded),
        Op::Lt => range_query(field, is_i64, Bound::Unbounded, Bound::Excluded(value)),
        Op::Le => range_query(field, is_i64, Bound::Unbounded, Bound::Included(value)),
    }
}

fn range_query(field: tantivy::schema::Field, is_i64: bool, lower: Bound<f64>, upper: Bound<f64>) -> Box<dyn Query> {
    let map_bound = |b: Bound<f64>| -> Bound<Term> {
        match b {
            Bound::Included(v) => Bound::Included(make_term(field, is_i64, v)),
            Bound::Excluded(v) => Bound::Excluded(make_term(field, is_i64, v)),
            Bound::Unbounded => Bound::Unbounded,
        }
    };
    Box::new(RangeQuery::new(map_bound(lower), map_bound(upper)))
}

fn compile_search_in(
    field_name: &str,
    values: &[&str],
    declared_schema: &IndexSchema,
    tantivy_schema: &TantivyIndexSchema,
) -> SearchResult<(Occur, Box<dyn Query>)> {
    let declared = require_filterable(field_name, declared_schema)?;
    let handle = tantivy_schema
        .handle(field_name)
        .ok_or_else(|| SearchError::SchemaViolation(format!("field '{field_name}' has no filter path")))?;
    let exact_field = handle
        .exact
        .ok_or_else(|| SearchError::SchemaViolation(format!("field '{field_name}' has no exact filter path")))?;

    let should_clauses: Vec<(Occur, Box<dyn Query>)> = values
        .iter()
        .map(|v| -> SearchResult<(Occur, Box<dyn Query>)> {
            let term = match declared.field_type {
                FieldType::String | FieldType::CollectionOfString => Term::from_field_text(exact_field, &v.to_lowercase()),
                FieldType::Int32 | FieldType::Int64 => {
                    let n: i64 = v.parse().map_err(|_| SearchError::InvalidQuery(format!("invalid integer '{v}'")))?;
                    Term::from_field_i64(exact_field, n)
                }
                _ => return Err(SearchError::InvalidQuery(format!("search.in unsupported on field '{field_name}'"))),
            };
            Ok((Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>))
        })
        .collect::<SearchResult<_>>()?;

    Ok((Occur::Must, Box::new(BooleanQuery::new(should_clauses))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_sim_types::{Field as SchemaField, FieldFlags};

    fn schema() -> (IndexSchema, TantivyIndexSchema) {
        let declared = IndexSchema {
            name: "hotels".into(),
            fields: vec![
                SchemaField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                SchemaField::new(
                    "category",
                    FieldType::String,
                    FieldFlags { filterable: true, facetable: true, retrievable: true, ..Default::default() },
                ),
                SchemaField::new(
                    "rating",
                    FieldType::Double,
                    FieldFlags { filterable: true, sortable: true, retrievable: true, ..Default::default() },
                ),
            ],
        };
        let built = crate::tantivy_index::build_tantivy_schema(&declared).unwrap();
        (declared, built)
    }

    #[test]
    fn empty_filter_compiles_to_no_clauses() {
        let (declared, built) = schema();
        let compiled = compile_filter("", &declared, &built).unwrap();
        assert!(compiled.is_empty());
    }

    #[test]
    fn single_eq_clause_compiles() {
        let (declared, built) = schema();
        let compiled = compile_filter("category eq 'Luxury'", &declared, &built).unwrap();
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn numeric_ge_clause_compiles() {
        let (declared, built) = schema();
        let compiled = compile_filter("rating ge 4.0", &declared, &built).unwrap();
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn and_conjunction_compiles_both_clauses() {
        let (declared, built) = schema();
        let compiled = compile_filter("rating ge 4.0 and category eq 'Luxury'", &declared, &built).unwrap();
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn and_is_case_insensitive() {
        let (declared, built) = schema();
        let compiled = compile_filter("rating ge 4.0 AND category eq 'Luxury'", &declared, &built).unwrap();
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn search_in_compiles() {
        let (declared, built) = schema();
        let compiled = compile_filter("search.in(category, 'Luxury,Budget')", &declared, &built).unwrap();
        assert_eq!(compiled.len(), 1);
    }

    #[test]
    fn filter_on_non_filterable_field_rejected() {
        let declared = IndexSchema {
            name: "hotels".into(),
            fields: vec![
                SchemaField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                SchemaField::new("name", FieldType::String, FieldFlags { searchable: true, retrievable: true, ..Default::default() }),
            ],
        };
        let built = crate::tantivy_index::build_tantivy_schema(&declared).unwrap();
        let err = compile_filter("name eq 'x'", &declared, &built).unwrap_err();
        assert_eq!(err.error_type(), "SCHEMA_VIOLATION");
    }

    #[test]
    fn malformed_clause_rejected() {
        let (declared, built) = schema();
        let err = compile_filter("not even close to valid", &declared, &built).unwrap_err();
        assert_eq!(err.error_type(), "INVALID_QUERY");
    }

    #[test]
    fn unknown_field_rejected() {
        let (declared, built) = schema();
        let err = compile_filter("nope eq 'x'", &declared, &built).unwrap_err();
        assert_eq!(err.error_type(), "SCHEMA_VIOLATION");
    }
}
