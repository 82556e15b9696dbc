//! Highlight fragment generation (spec §4.3 "Highlights"), realized via
//! [`tantivy::snippet::SnippetGenerator`] rather than a hand-rolled
//! fragmenter — tantivy already scores candidate windows, picks the best
//! one, and snaps it to char boundaries, so this module's job is just to
//! loop the generator over a field's stored text to pull out up to
//! [`MAX_FRAGMENTS`] fragments and re-render each with the request's
//! configured pre/post tags (`Snippet::to_html` only knows `<b>`/`</b>`).

use search_sim_types::{SearchError, SearchResult};
use tantivy::query::Query;
use tantivy::schema::Field;
use tantivy::snippet::{Snippet, SnippetGenerator};
use tantivy::Searcher;

const FRAGMENT_CHARS: usize = 150;
const MAX_FRAGMENTS: usize = 3;

fn tantivy_err(err: tantivy::TantivyError) -> SearchError {
    SearchError::Internal(format!("tantivy error: {err}"))
}

/// Produces up to [`MAX_FRAGMENTS`] highlighted fragments of `text` for
/// `query` over `field`, wrapping each match with `pre_tag`/`post_tag`.
/// Returns an empty vec if no term occurs in `text`.
///
/// # Errors
/// Returns [`SearchError::Internal`] if tantivy fails to build the snippet
/// generator for `query`/`field`.
pub fn highlight_fragments(
    searcher: &Searcher,
    query: &dyn Query,
    field: Field,
    text: &str,
    pre_tag: &str,
    post_tag: &str,
) -> SearchResult<Vec<String>> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut generator = SnippetGenerator::create(searcher, query, field).map_err(tantivy_err)?;
    generator.set_max_num_chars(FRAGMENT_CHARS);

    let mut fragments = Vec::new();
    let mut remaining = text.to_owned();
    for _ in 0..MAX_FRAGMENTS {
        let snippet = generator.snippet(&remaining);
        if snippet.highlighted().is_empty() {
            break;
        }
        fragments.push(render_snippet(&snippet, pre_tag, post_tag));
        remaining = mask_fragment(&remaining, &snippet);
    }
    Ok(fragments)
}

/// Renders one tantivy-selected fragment, swapping its built-in `<b>`/`</b>`
/// wrapping for the request's configured pre/post tags.
fn render_snippet(snippet: &Snippet, pre_tag: &str, post_tag: &str) -> String {
    let fragment = snippet.fragments();
    let mut out = String::with_capacity(fragment.len() + 32);
    let mut cursor = 0;
    for section in snippet.highlighted() {
        out.push_str(&fragment[cursor..section.start()]);
        out.push_str(pre_tag);
        out.push_str(&fragment[section.start()..section.stop()]);
        out.push_str(post_tag);
        cursor = section.stop();
    }
    out.push_str(&fragment[cursor..]);
    out
}

/// Blanks out the text tantivy just picked so the next `snippet()` call
/// surfaces a different match instead of the same one — tantivy's generator
/// always returns its single highest-scoring window per call.
fn mask_fragment(remaining: &str, snippet: &Snippet) -> String {
    let fragment = snippet.fragments();
    match remaining.find(fragment) {
        Some(pos) => {
            let mut masked = remaining.to_owned();
            masked.replace_range(pos..pos + fragment.len(), &" ".repeat(fragment.len()));
            masked
        }
        None => remaining.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use search_sim_types::{Field as SchemaField, FieldFlags, FieldType, IndexSchema};
    use tantivy::query::QueryParser;
    use tantivy::Index;

    use super::*;
    use crate::tantivy_index::{build_tantivy_schema, register_tokenizers};

    fn schema() -> IndexSchema {
        IndexSchema {
            name: "articles".into(),
            fields: vec![
                SchemaField::new("id", FieldType::String, FieldFlags { key: true, retrievable: true, ..Default::default() }),
                SchemaField::new(
                    "body",
                    FieldType::String,
                    FieldFlags { searchable: true, retrievable: true, ..Default::default() },
                ),
            ],
        }
    }

    fn index_with(body: &str) -> (Index, tantivy::schema::Field) {
        let declared = schema();
        let tantivy_schema = build_tantivy_schema(&declared).unwrap();
        let index = Index::create_in_ram(tantivy_schema.schema.clone());
        register_tokenizers(&index);
        let mut writer = index.writer(15_000_000).unwrap();
        writer
            .add_document(tantivy::doc!(
                tantivy_schema.key_field => "1",
                tantivy_schema.handle("body").unwrap().text.unwrap() => body,
            ))
            .unwrap();
        writer.commit().unwrap();
        (index, tantivy_schema.handle("body").unwrap().text.unwrap())
    }

    #[test]
    fn no_match_returns_empty() {
        let (index, field) = index_with("the quick brown fox");
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let query = QueryParser::for_index(&index, vec![field]).parse_query("zebra").unwrap();

        let fragments = highlight_fragments(&searcher, &*query, field, "the quick brown fox", "<em>", "</em>").unwrap();
        assert!(fragments.is_empty());
    }

    #[test]
    fn wraps_match_with_configured_tags() {
        let (index, field) = index_with("the quick brown fox");
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let query = QueryParser::for_index(&index, vec![field]).parse_query("quick").unwrap();

        let fragments = highlight_fragments(&searcher, &*query, field, "the quick brown fox", "<em>", "</em>").unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("<em>quick</em>"));
    }

    #[test]
    fn caps_fragments_at_three() {
        let text = "alpha ".repeat(50) + &"beta ".repeat(50) + &"gamma ".repeat(50) + &"delta ".repeat(50);
        let (index, field) = index_with(&text);
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let query = QueryParser::for_index(&index, vec![field]).parse_query("alpha beta gamma delta").unwrap();

        let fragments = highlight_fragments(&searcher, &*query, field, &text, "<em>", "</em>").unwrap();
        assert!(fragments.len() <= MAX_FRAGMENTS);
    }

    #[test]
    fn case_insensitive_matching() {
        let (index, field) = index_with("Rust is great");
        let reader = index.reader().unwrap();
        let searcher = reader.searcher();
        let query = QueryParser::for_index(&index, vec![field]).parse_query("rust").unwrap();

        let fragments = highlight_fragments(&searcher, &*query, field, "Rust is great", "<em>", "</em>").unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].contains("<em>Rust</em>"));
    }
}
