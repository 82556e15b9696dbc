//! Dynamic Tantivy schema construction, tokenizer chain registration, and
//! schema-version hashing.
//!
//! Builds a per-index Tantivy schema from an installed [`IndexSchema`],
//! generalizing the teacher's fixed mail-message schema into one driven by
//! an arbitrary declared field list (spec §3.1/§4.2 field mapping table).

use std::collections::HashMap;

use search_sim_types::{Analyzer, FieldType, IndexSchema, SearchError, SearchResult};
use sha2::{Digest, Sha256};
use tantivy::schema::{
    FAST, Field, INDEXED, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing, TextOptions,
};
use tantivy::tokenizer::{LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;
use unicode_normalization::UnicodeNormalization;

/// Tokenizer name for the exact-match filter/sort/facet path: lower-cased,
/// untokenized (a normalizer, never altering the retrievable stored value).
pub const EXACT_TOKENIZER_NAME: &str = "search_sim_exact";

const SCHEMA_VERSION: &str = "v1";

/// The key field's physical name in the Tantivy schema.
pub const KEY_FIELD_NAME: &str = "_key";
/// The raw-payload stored field's physical name.
pub const RAW_FIELD_NAME: &str = "_raw";

/// A single declared field's physical Tantivy representation.
///
/// String/collection-of-string fields may have *both* an analyzed text path
/// (searchable) and a normalized exact-term path (filter/sort/facet),
/// realized as two separate physical Tantivy fields since a single Tantivy
/// text field carries exactly one `TextOptions`.
#[derive(Debug, Clone, Copy)]
pub struct FieldHandle {
    pub text: Option<Field>,
    pub exact: Option<Field>,
    pub field_type: FieldType,
}

/// All field handles for an index, keyed by declared field name.
#[derive(Debug, Clone)]
pub struct TantivyIndexSchema {
    pub schema: Schema,
    pub key_field: Field,
    pub raw_field: Field,
    pub fields: HashMap<String, FieldHandle>,
}

impl TantivyIndexSchema {
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&FieldHandle> {
        self.fields.get(name)
    }
}

fn analyzer_tokenizer_name(analyzer: Analyzer) -> &'static str {
    match analyzer {
        Analyzer::Standard => "search_sim_standard",
        Analyzer::Simple => "search_sim_simple",
        Analyzer::Whitespace => "search_sim_whitespace",
        Analyzer::Keyword => "search_sim_keyword",
        Analyzer::Stop => "search_sim_stop",
        Analyzer::English => "search_sim_english",
        Analyzer::French => "search_sim_french",
        Analyzer::German => "search_sim_german",
    }
}

/// Builds the dynamic Tantivy schema for an installed [`IndexSchema`].
///
/// # Errors
/// Returns [`SearchError::SchemaViolation`] if a vector field is
/// encountered (vector fields never enter the lexical schema — they are
/// routed to the vector store per spec §4.5) or if the schema has not been
/// validated.
pub fn build_tantivy_schema(schema: &IndexSchema) -> SearchResult<TantivyIndexSchema> {
    schema.validate()?;

    let mut builder = SchemaBuilder::new();
    let key_field = builder.add_text_field(KEY_FIELD_NAME, STRING | STORED | FAST);
    let raw_field = builder.add_text_field(RAW_FIELD_NAME, STORED);

    let mut fields = HashMap::new();

    for declared in &schema.fields {
        if declared.flags.key {
            fields.insert(
                declared.name.clone(),
                FieldHandle {
                    text: None,
                    exact: Some(key_field),
                    field_type: declared.field_type,
                },
            );
            continue;
        }

        if declared.field_type.is_vector() {
            // Vector fields never enter the lexical schema.
            continue;
        }

        let mut handle = FieldHandle {
            text: None,
            exact: None,
            field_type: declared.field_type,
        };

        match declared.field_type {
            FieldType::String | FieldType::CollectionOfString => {
                if declared.flags.searchable {
                    let tokenizer = analyzer_tokenizer_name(declared.analyzer.unwrap_or(Analyzer::Standard));
                    let text_options = TextOptions::default().set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer(tokenizer)
                            .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
                    );
                    let text_options = if declared.flags.retrievable {
                        text_options | STORED
                    } else {
                        text_options
                    };
                    handle.text = Some(builder.add_text_field(&format!("{}__text", declared.name), text_options));
                }
                if declared.flags.filterable || declared.flags.sortable || declared.flags.facetable {
                    let exact_options = TextOptions::default().set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer(EXACT_TOKENIZER_NAME)
                            .set_index_option(tantivy::schema::IndexRecordOption::Basic),
                    ) | STORED
                        | FAST;
                    handle.exact = Some(builder.add_text_field(&format!("{}__exact", declared.name), exact_options));
                }
            }
            FieldType::Int32 | FieldType::Int64 | FieldType::DateTimeOffset => {
                handle.exact = Some(builder.add_i64_field(&format!("{}__exact", declared.name), INDEXED | STORED | FAST));
            }
            FieldType::Double | FieldType::Single => {
                handle.exact = Some(builder.add_f64_field(&format!("{}__exact", declared.name), INDEXED | STORED | FAST));
            }
            FieldType::Boolean => {
                handle.exact = Some(builder.add_bool_field(&format!("{}__exact", declared.name), INDEXED | STORED | FAST));
            }
            FieldType::GeoPoint => {
                // Stored-only: no spatial index in this core (spec §4.2).
            }
            FieldType::CollectionOfSingle { .. } => unreachable!("vector fields are skipped above"),
        }

        fields.insert(declared.name.clone(), handle);
    }

    Ok(TantivyIndexSchema {
        schema: builder.build(),
        key_field,
        raw_field,
        fields,
    })
}

/// Registers every analyzer tokenizer chain this core supports (spec
/// §4.2): standard, simple, whitespace, keyword, stop, and the three
/// stemmed language analyzers.
pub fn register_tokenizers(index: &Index) {
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::Standard),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(RemoveLongFilter::limit(256))
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::Simple),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::Whitespace),
        TextAnalyzer::builder(WhitespaceTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::Keyword),
        TextAnalyzer::builder(RawTokenizer::default()).build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::Stop),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(tantivy::tokenizer::StopWordFilter::new(tantivy::tokenizer::Language::English).unwrap())
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::English),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(tantivy::tokenizer::StopWordFilter::new(tantivy::tokenizer::Language::English).unwrap())
            .filter(tantivy::tokenizer::Stemmer::new(tantivy::tokenizer::Language::English))
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::French),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(tantivy::tokenizer::StopWordFilter::new(tantivy::tokenizer::Language::French).unwrap())
            .filter(tantivy::tokenizer::Stemmer::new(tantivy::tokenizer::Language::French))
            .build(),
    );
    index.tokenizers().register(
        analyzer_tokenizer_name(Analyzer::German),
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(tantivy::tokenizer::StopWordFilter::new(tantivy::tokenizer::Language::German).unwrap())
            .filter(tantivy::tokenizer::Stemmer::new(tantivy::tokenizer::Language::German))
            .build(),
    );
    // The exact-match normalizer used by every filter/sort/facet path.
    index.tokenizers().register(
        EXACT_TOKENIZER_NAME,
        TextAnalyzer::builder(RawTokenizer::default()).filter(LowerCaser).build(),
    );
}

/// Applies the optional ASCII-fold half of the exact-path normalizer (spec
/// §4.2: "Normalizers for filter/sort are case-fold + optional ASCII-fold;
/// they never alter the retrievable stored value"): decomposes to NFD and
/// drops combining marks and any remaining non-ASCII codepoint, e.g. `"café"`
/// -> `"cafe"`. Case-folding itself is left to the `EXACT_TOKENIZER_NAME`
/// tokenizer's `LowerCaser`, so callers apply this before indexing/querying
/// the exact path and otherwise leave the text untouched.
#[must_use]
pub fn ascii_fold(text: &str) -> String {
    text.nfd().filter(char::is_ascii).collect()
}

/// Computes a deterministic hash of the declared schema, used to detect
/// schema drift that requires a full rebuild (spec §3.2).
#[must_use]
pub fn schema_content_hash(schema: &IndexSchema) -> String {
    let mut entries: Vec<String> = schema
        .fields
        .iter()
        .map(|f| format!("{}:{:?}:{:?}", f.name, f.field_type, f.flags))
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    hasher.update(SCHEMA_VERSION.as_bytes());
    hasher.update(b"\n");
    for entry in &entries {
        hasher.update(entry.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}
