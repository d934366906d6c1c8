//! End-to-end search scenarios against small fixed collections.
//!
//! Each test builds a fresh index with the `{title: string, points:
//! int32}` schema (default sort `points`, descending) unless noted,
//! indexes a handful of documents, and checks the exact hit ordering.

use serde_json::json;
use tern::index::{Index, IndexConfig};
use tern::query::{Comparator, Filter, SearchRequest, SortBy};
use tern::schema::{Field, FieldType, Schema};
use tern::QueryError;

fn books_schema() -> Schema {
    Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    )
}

fn books_index(docs: &[(&str, i32)]) -> Index {
    let mut index = Index::new("books", &books_schema(), IndexConfig::default());
    for (seq, (title, points)) in docs.iter().enumerate() {
        index
            .index_document(seq as u32, &json!({"title": title, "points": points}), false)
            .unwrap();
    }
    index
}

fn hit_ids(result: &tern::SearchResult) -> Vec<u32> {
    result.hits.iter().map(|h| h.seq_id).collect()
}

#[test]
fn exact_search_without_typos_matches_full_phrase_only() {
    let index = books_index(&[("The Train", 10), ("The Rain", 20), ("Plain", 5)]);

    let mut request = SearchRequest::query("the train", &["title"]);
    request.num_typos = 0;

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![0]);
    assert_eq!(result.found, 1);
}

#[test]
fn partial_phrase_search_drops_tokens() {
    let index = books_index(&[("rocket launch", 10), ("rocket fuel", 5), ("launchpad", 8)]);

    let result = index
        .search(&SearchRequest::query("rocket launch", &["title"]))
        .unwrap();

    // the full-phrase match ranks first; the partial matches follow by
    // match score (exact "rocket" beats the corrected "launchpad")
    assert_eq!(hit_ids(&result), vec![0, 1, 2]);
    assert_eq!(result.found, 3);
}

#[test]
fn typo_query_ranks_by_edit_cost() {
    let index = books_index(&[("biological", 1), ("biology", 1), ("geology", 1)]);

    let mut request = SearchRequest::query("biologcal", &["title"]);
    request.num_typos = 2;

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![0, 1]);
}

#[test]
fn wildcard_query_paginates_over_all_documents() {
    let mut docs: Vec<(String, i32)> = vec![("Foo".to_string(), 10)];
    for i in 0..20 {
        docs.push((format!("Bar {i}"), 11 + i));
    }
    let mut index = Index::new("books", &books_schema(), IndexConfig::default());
    for (seq, (title, points)) in docs.iter().enumerate() {
        index
            .index_document(seq as u32, &json!({"title": title, "points": points}), false)
            .unwrap();
    }

    let mut request = SearchRequest::query("*", &["title"]);
    request.per_page = 10;
    request.page = 3;

    let result = index.search(&request).unwrap();
    assert_eq!(result.found, 21);
    // the 21st document by points descending is "Foo"
    assert_eq!(hit_ids(&result), vec![0]);
}

#[test]
fn correction_of_a_token_that_is_itself_indexed() {
    // "ISX" exists in the corpus, but "ISX what" only matches via the
    // correction to "ISS what"
    let index = books_index(&[("ISS what", 10), ("ISX", 5)]);

    let mut request = SearchRequest::query("ISX what", &["title"]);
    request.num_typos = 1;

    let result = index.search(&request).unwrap();
    assert_eq!(result.found, 2);
    // two-token proximity wins over the single exact token
    assert_eq!(hit_ids(&result), vec![0, 1]);
}

#[test]
fn array_facet_values_count_per_element() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("tags", FieldType::StrArray).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    );
    let mut index = Index::new("books", &schema, IndexConfig::default());
    index
        .index_document(0, &json!({"title": "one", "tags": ["a", "b"], "points": 1}), false)
        .unwrap();
    index
        .index_document(1, &json!({"title": "two", "tags": ["a"], "points": 2}), false)
        .unwrap();

    let mut request = SearchRequest::query("*", &["title"]);
    request.facets = vec!["tags".to_string()];

    let result = index.search(&request).unwrap();
    assert_eq!(result.facets.len(), 1);

    let counts: Vec<u64> = result.facets[0].counts.iter().map(|(_, c)| c.count).collect();
    assert_eq!(counts, vec![2, 1]); // "a" in both docs, "b" in one
}

#[test]
fn multi_token_facet_values_hash_distinctly() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("tags", FieldType::StrArray).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    );
    let mut index = Index::new("books", &schema, IndexConfig::default());
    index
        .index_document(0, &json!({"title": "one", "tags": ["a b"], "points": 1}), false)
        .unwrap();
    index
        .index_document(1, &json!({"title": "two", "tags": ["a"], "points": 2}), false)
        .unwrap();

    let mut request = SearchRequest::query("*", &["title"]);
    request.facets = vec!["tags".to_string()];

    let result = index.search(&request).unwrap();
    // "a b" and "a" produce distinct combined hashes, one document each
    assert_eq!(result.facets[0].counts.len(), 2);
    assert!(result.facets[0].counts.iter().all(|(_, c)| c.count == 1));
}

#[test]
fn ties_break_by_higher_seq_id() {
    let index = books_index(&[("same words", 7), ("same words", 7), ("same words", 7)]);

    let result = index
        .search(&SearchRequest::query("same words", &["title"]))
        .unwrap();
    assert_eq!(hit_ids(&result), vec![2, 1, 0]);
}

#[test]
fn per_page_boundary() {
    let index = books_index(&[("x", 1)]);

    let mut request = SearchRequest::query("x", &["title"]);
    request.per_page = 250;
    assert!(index.search(&request).is_ok());

    request.per_page = 251;
    assert!(matches!(
        index.search(&request),
        Err(QueryError::PerPageOutOfRange { max: 250 })
    ));
}

#[test]
fn page_must_be_positive() {
    let index = books_index(&[("x", 1)]);
    let mut request = SearchRequest::query("x", &["title"]);
    request.page = 0;
    assert!(matches!(index.search(&request), Err(QueryError::PageOutOfRange)));
}

#[test]
fn num_typos_is_clamped() {
    let index = books_index(&[("biological", 1), ("biology", 1), ("geology", 1)]);

    let mut request = SearchRequest::query("biologcal", &["title"]);
    request.num_typos = 9;

    // behaves exactly like num_typos = 2
    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![0, 1]);
}

#[test]
fn short_tokens_get_no_typo_budget() {
    // "ab" is one edit from "ax", but 2-char tokens allow zero typos
    let index = books_index(&[("ax here", 1)]);

    let mut request = SearchRequest::query("ab", &["title"]);
    request.num_typos = 2;

    let result = index.search(&request).unwrap();
    assert_eq!(result.found, 0);
}

#[test]
fn wildcard_with_excluded_tokens() {
    let index = books_index(&[("foo alpha", 1), ("foo beta", 2), ("bar gamma", 3)]);

    let mut request = SearchRequest::query("*", &["title"]);
    request.exclude_tokens = vec!["foo".to_string()];

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![2]);
    assert_eq!(result.found, 1);
}

#[test]
fn excluded_tokens_remove_matches() {
    let index = books_index(&[("how are propellants made", 1), ("how trains work", 2)]);

    let mut request = SearchRequest::query("how", &["title"]);
    request.exclude_tokens = vec!["propellants".to_string()];

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![1]);
}

#[test]
fn prefix_search_expands_last_token() {
    let index = books_index(&[("implement this", 10), ("implication", 5), ("other", 1)]);

    let mut request = SearchRequest::query("impl", &["title"]);
    request.prefix = true;
    request.num_typos = 0;

    let result = index.search(&request).unwrap();
    let mut ids = hit_ids(&result);
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn filters_restrict_search_results() {
    let index = books_index(&[("red apple", 10), ("red brick", 20), ("red wine", 30)]);

    let mut request = SearchRequest::query("red", &["title"]);
    request.filters = vec![Filter::new("points", Comparator::GreaterThan, &["15"])];

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![2, 1]);
    assert_eq!(result.found, 2);
}

#[test]
fn explicit_ascending_sort() {
    let index = books_index(&[("red apple", 10), ("red brick", 20), ("red wine", 30)]);

    let mut request = SearchRequest::query("red", &["title"]);
    request.sort_by = vec![SortBy::asc("points")];

    let result = index.search(&request).unwrap();
    assert_eq!(hit_ids(&result), vec![0, 1, 2]);
}

#[test]
fn sort_on_unknown_field_is_rejected() {
    let index = books_index(&[("x", 1)]);
    let mut request = SearchRequest::query("x", &["title"]);
    request.sort_by = vec![SortBy::desc("missing")];
    assert!(matches!(
        index.search(&request),
        Err(QueryError::UnknownSortField(_))
    ));
}

#[test]
fn sort_on_optional_field_is_rejected() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("points", FieldType::Int32),
            Field::new("rank", FieldType::Int32).optional(),
        ],
        "points",
    );
    let mut index = Index::new("books", &schema, IndexConfig::default());
    index
        .index_document(0, &json!({"title": "x", "points": 1}), false)
        .unwrap();

    let mut request = SearchRequest::query("x", &["title"]);
    request.sort_by = vec![SortBy::desc("rank")];
    assert!(matches!(
        index.search(&request),
        Err(QueryError::OptionalSortField(_))
    ));
}

#[test]
fn unknown_query_field_is_rejected() {
    let index = books_index(&[("x", 1)]);
    let request = SearchRequest::query("x", &["missing"]);
    assert!(matches!(index.search(&request), Err(QueryError::UnknownField(_))));

    let request = SearchRequest::query("x", &["points"]);
    assert!(matches!(
        index.search(&request),
        Err(QueryError::NotAStringField(_))
    ));
}

#[test]
fn curated_ids_bypass_organic_ranking() {
    let index = books_index(&[("song one", 10), ("song two", 20), ("song three", 30)]);

    let mut request = SearchRequest::query("song", &["title"]);
    request.included_ids.insert(0, vec![2]);
    request.excluded_ids = vec![0];

    let result = index.search(&request).unwrap();
    // organic hits lose both the pinned and the excluded document
    assert_eq!(hit_ids(&result), vec![1]);
    assert_eq!(result.curated_hits.len(), 1);
    assert_eq!(result.curated_hits[0].seq_id, 2);
    assert_eq!(result.found, 2);
}

#[test]
fn curated_ids_rank_by_pinned_position() {
    let index = books_index(&[("pin a", 1), ("pin b", 2), ("pin c", 3)]);

    let mut request = SearchRequest::query("pin", &["title"]);
    request.included_ids.insert(0, vec![1]);
    request.included_ids.insert(1, vec![2, 0]);

    let result = index.search(&request).unwrap();
    let curated: Vec<u32> = result.curated_hits.iter().map(|h| h.seq_id).collect();
    assert_eq!(curated, vec![1, 2, 0]);
}

#[test]
fn synonyms_rank_below_original_terms() {
    let index = books_index(&[("automobile repair", 10), ("car repair", 5)]);

    let mut request = SearchRequest::query("car repair", &["title"]);
    request.synonyms = vec![vec!["automobile".to_string(), "repair".to_string()]];

    let result = index.search(&request).unwrap();
    assert_eq!(result.found, 2);
    // the original-term match outranks the synonym match despite points
    assert_eq!(hit_ids(&result), vec![1, 0]);
}

#[test]
fn multi_field_search_prefers_earlier_fields() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("artist", FieldType::Str),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    );
    let mut index = Index::new("songs", &schema, IndexConfig::default());
    index
        .index_document(0, &json!({"title": "love song", "artist": "someone", "points": 1}), false)
        .unwrap();
    index
        .index_document(1, &json!({"title": "other", "artist": "love", "points": 99}), false)
        .unwrap();

    let result = index
        .search(&SearchRequest::query("love", &["title", "artist"]))
        .unwrap();
    assert_eq!(result.found, 2);
    // title match carries a higher field id than artist match
    assert_eq!(hit_ids(&result), vec![0, 1]);
}

#[test]
fn group_limit_caps_hits_per_group() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("brand", FieldType::Str).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    );
    let mut index = Index::new("products", &schema, IndexConfig::default());
    let docs = [
        json!({"title": "shoe one", "brand": "adidas", "points": 10}),
        json!({"title": "shoe two", "brand": "adidas", "points": 20}),
        json!({"title": "shoe three", "brand": "nike", "points": 5}),
    ];
    for (seq, doc) in docs.iter().enumerate() {
        index.index_document(seq as u32, doc, false).unwrap();
    }

    let mut request = SearchRequest::query("shoe", &["title"]);
    request.group_by = vec!["brand".to_string()];
    request.group_limit = 1;

    let result = index.search(&request).unwrap();
    // one representative per brand
    assert_eq!(hit_ids(&result), vec![1, 2]);
}

#[test]
fn facet_stats_for_numeric_facets() {
    let schema = Schema::new(
        vec![
            Field::new("title", FieldType::Str),
            Field::new("year", FieldType::Int32).faceted(),
            Field::new("points", FieldType::Int32),
        ],
        "points",
    );
    let mut index = Index::new("books", &schema, IndexConfig::default());
    for (seq, year) in [(0u32, 1990), (1, 2000), (2, 2010)] {
        index
            .index_document(seq, &json!({"title": "book", "year": year, "points": 1}), false)
            .unwrap();
    }

    let mut request = SearchRequest::query("book", &["title"]);
    request.facets = vec!["year".to_string()];

    let result = index.search(&request).unwrap();
    let stats = result.facets[0].stats.as_ref().unwrap();
    assert_eq!(stats.min, 1990.0);
    assert_eq!(stats.max, 2010.0);
    assert_eq!(stats.sum, 6000.0);
    assert_eq!(stats.count, 3);
}

#[test]
fn reindex_then_remove_leaves_no_trace() {
    let mut index = books_index(&[("fleeting words", 5)]);
    let doc = json!({"title": "fleeting words", "points": 5});

    // idempotent re-index as an update, then delete
    index.index_document(0, &doc, true).unwrap();
    index.remove(0, &doc).unwrap();

    let result = index
        .search(&SearchRequest::query("fleeting", &["title"]))
        .unwrap();
    assert_eq!(result.found, 0);

    let wildcard = index.search(&SearchRequest::query("*", &["title"])).unwrap();
    assert_eq!(wildcard.found, 0);
}

#[test]
fn searched_queries_reported_for_highlighting() {
    let index = books_index(&[("biological", 1)]);

    let mut request = SearchRequest::query("biologcal", &["title"]);
    request.num_typos = 2;

    let result = index.search(&request).unwrap();
    let hit = &result.hits[0];
    // the corrected token, not the raw query token, is what highlighting needs
    let tried = &result.searched_queries[hit.query_index as usize];
    assert_eq!(tried, &vec!["biological".to_string()]);
}
