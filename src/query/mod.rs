//! Query types and execution.
//!
//! - [`filter`] - predicate evaluation into sorted id sets
//! - [`ranker`] - positional match scoring
//! - [`topk`] - bounded ranked result collection with grouping
//! - [`executor`] - the search orchestrator

pub mod executor;
pub mod filter;
pub mod ranker;
pub mod topk;

pub use executor::SearchExecutor;
pub use filter::{Comparator, Filter};
pub use ranker::Match;
pub use topk::{Hit, TopK};

use crate::index::art::TokenOrdering;
use crate::index::facets::{FacetCount, FacetQuery, FacetStats};
use std::collections::BTreeMap;

/// Pseudo sort field resolved to the computed match score.
pub const TEXT_MATCH_FIELD: &str = "_text_match";

/// Hard cap on results per page.
pub const MAX_PER_PAGE: usize = 250;

/// Sort direction; descending is the default everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// One sort-by entry: a sort-index field or [`TEXT_MATCH_FIELD`].
#[derive(Debug, Clone)]
pub struct SortBy {
    pub field: String,
    pub order: SortOrder,
}

impl SortBy {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }

    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }
}

/// A fully tokenized search request.
///
/// Tokens arrive pre-split (the HTTP layer owns query-string parsing);
/// `["*"]` as the include tokens selects the wildcard path.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub include_tokens: Vec<String>,
    pub exclude_tokens: Vec<String>,
    /// Each group is an alternative token sequence searched with a
    /// slightly lower field id than the original terms
    pub synonyms: Vec<Vec<String>>,
    pub search_fields: Vec<String>,
    pub filters: Vec<Filter>,
    /// Facet field names to count over the result set
    pub facets: Vec<String>,
    pub facet_query: Option<FacetQuery>,
    /// Curated documents: outer position -> seq_ids pinned there
    pub included_ids: BTreeMap<u32, Vec<u32>>,
    pub excluded_ids: Vec<u32>,
    /// Up to three sort keys; empty means match score, then the default
    /// sorting field
    pub sort_by: Vec<SortBy>,
    /// 0..=2; larger values are clamped
    pub num_typos: u32,
    pub page: usize,
    pub per_page: usize,
    pub token_ordering: TokenOrdering,
    /// Treat the last token of the query as a prefix
    pub prefix: bool,
    pub drop_tokens_threshold: usize,
    pub typo_tokens_threshold: usize,
    pub group_by: Vec<String>,
    /// Max hits kept per distinct group key; 0 disables grouping
    pub group_limit: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            include_tokens: Vec::new(),
            exclude_tokens: Vec::new(),
            synonyms: Vec::new(),
            search_fields: Vec::new(),
            filters: Vec::new(),
            facets: Vec::new(),
            facet_query: None,
            included_ids: BTreeMap::new(),
            excluded_ids: Vec::new(),
            sort_by: Vec::new(),
            num_typos: 2,
            page: 1,
            per_page: 10,
            token_ordering: TokenOrdering::Frequency,
            prefix: false,
            drop_tokens_threshold: 10,
            typo_tokens_threshold: 100,
            group_by: Vec::new(),
            group_limit: 0,
        }
    }
}

impl SearchRequest {
    /// Convenience constructor for a plain text query over some fields.
    /// `"*"` selects the wildcard (match-all) path.
    pub fn query(text: &str, fields: &[&str]) -> Self {
        let include_tokens = if text.trim() == "*" {
            vec!["*".to_string()]
        } else {
            crate::utils::Tokenizer::new(text).tokens()
        };
        Self {
            include_tokens,
            search_fields: fields.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub seq_id: u32,
    /// Sign-adjusted sort keys, compared lexicographically descending
    pub scores: [i64; 3],
    /// Which score slot carries the computed match score
    pub match_score_index: usize,
    pub field_id: u8,
    /// Index into [`SearchResult::searched_queries`]
    pub query_index: u16,
}

/// Counts of one facet field, plus stats for numeric facets.
#[derive(Debug, Clone)]
pub struct FacetResult {
    pub field_name: String,
    /// combined value hash -> tally
    pub counts: Vec<(u64, FacetCount)>,
    pub stats: Option<FacetStats>,
}

/// Everything a search produces.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Ranked hits of the requested page
    pub hits: Vec<SearchHit>,
    /// Curated documents ranked by their pinned positions
    pub curated_hits: Vec<SearchHit>,
    pub facets: Vec<FacetResult>,
    /// Token sequences actually tried, for highlighting; hits reference
    /// these by `query_index`
    pub searched_queries: Vec<Vec<String>>,
    /// Total matched documents across all pages
    pub found: usize,
}
