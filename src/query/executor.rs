//! Search orchestration.
//!
//! Drives a request end to end: filter evaluation, exclusion, per-field
//! typo/prefix expansion over the tries, candidate intersection and
//! scoring, cross-field aggregation, curated-id collation, and faceting.
//!
//! Expansion works off a bounded cartesian product of per-token typo
//! costs: for a 3-token query the cost vectors iterate [0,0,0], [0,0,1],
//! [0,1,1] and so on. A token with no candidates at a cost loses that
//! cost; a token with no costs left is dropped and the loop restarts over
//! the reduced token vector.

use crate::error::QueryError;
use crate::index::art::{Art, NodeId, TokenOrdering};
use crate::index::facets::FacetState;
use crate::index::{Index, FIELD_LIMIT_NUM};
use crate::query::filter::{do_filtering, intersect_sorted};
use crate::query::ranker::Match;
use crate::query::topk::{Hit, TopK};
use crate::query::{
    FacetResult, SearchHit, SearchRequest, SearchResult, SortBy, SortOrder, MAX_PER_PAGE,
    TEXT_MATCH_FIELD,
};
use ahash::{AHashMap, AHashSet};
use roaring::RoaringBitmap;
use tracing::{debug, trace};

/// Curated hits rank by their pinned position: outer position first, then
/// slot order inside it, all squeezed under this ceiling.
const CURATED_SCORE_BASE: i64 = 64_000;

struct TokenCandidates {
    cost: u32,
    leaves: Vec<NodeId>,
}

/// Mutable accumulation shared across the whole search.
struct SearchState {
    topster: TopK,
    curated_topster: TopK,
    all_result_ids: RoaringBitmap,
    searched_queries: Vec<Vec<String>>,
    groups_processed: AHashSet<u64>,
}

/// Executes search requests against one index.
pub struct SearchExecutor<'a> {
    index: &'a Index,
}

impl<'a> SearchExecutor<'a> {
    pub fn new(index: &'a Index) -> Self {
        Self { index }
    }

    pub fn execute(&self, request: &SearchRequest) -> Result<SearchResult, QueryError> {
        self.validate(request)?;

        let sort_by = self.effective_sort(request);
        let num_typos = request.num_typos.min(2);
        let capacity = request.per_page * request.page;

        let mut state = SearchState {
            topster: TopK::new(capacity, request.group_limit),
            curated_topster: TopK::new(capacity, request.group_limit),
            all_result_ids: RoaringBitmap::new(),
            searched_queries: Vec::new(),
            groups_processed: AHashSet::new(),
        };

        let filter_ids: Option<Vec<u32>> = if request.filters.is_empty() {
            None
        } else {
            Some(do_filtering(self.index, &request.filters)?)
        };

        let num_search_fields = request.search_fields.len().min(FIELD_LIMIT_NUM);

        // documents holding any excluded token, across all search fields
        let mut exclude_ids = RoaringBitmap::new();
        for field in &request.search_fields[..num_search_fields] {
            let tree = &self.index.search_index[field];
            for token in &request.exclude_tokens {
                if let Some(postings) = tree.get(token.as_bytes()) {
                    exclude_ids.extend(postings.ids.decode());
                }
            }
        }

        // curated documents never rank organically
        let mut included_ids_flat: Vec<u32> = Vec::new();
        let mut curated_ids: Vec<u32> = request.excluded_ids.clone();
        for ids in request.included_ids.values() {
            included_ids_flat.extend(ids);
            curated_ids.extend(ids);
        }
        curated_ids.sort_unstable();
        curated_ids.dedup();

        let wildcard = request.include_tokens.len() == 1 && request.include_tokens[0] == "*";
        if wildcard {
            self.search_wildcard(request, &sort_by, filter_ids, &curated_ids, &exclude_ids, &mut state);
        } else {
            self.search_fields(
                request,
                &sort_by,
                num_typos,
                filter_ids.as_deref(),
                &curated_ids,
                &exclude_ids,
                capacity,
                &mut state,
            );
        }

        // facet over organic matches, then again over curated documents
        let mut facet_states: Vec<FacetState> =
            request.facets.iter().map(|f| FacetState::new(f)).collect();
        if !facet_states.is_empty() {
            let matched: Vec<u32> = state.all_result_ids.iter().collect();
            self.index.do_facets(
                &mut facet_states,
                &request.facet_query,
                &matched,
                &request.group_by,
                request.group_limit,
            );
            self.index.do_facets(
                &mut facet_states,
                &request.facet_query,
                &included_ids_flat,
                &request.group_by,
                request.group_limit,
            );
        }

        let found = state.all_result_ids.len() as usize + state.curated_topster.len();

        let skip = (request.page - 1) * request.per_page;
        let hits: Vec<SearchHit> = state
            .topster
            .into_sorted()
            .into_iter()
            .skip(skip)
            .take(request.per_page)
            .map(hit_out)
            .collect();
        let curated_hits: Vec<SearchHit> =
            state.curated_topster.into_sorted().into_iter().map(hit_out).collect();

        debug!(
            index = %self.index.name(),
            found,
            hits = hits.len(),
            queries_tried = state.searched_queries.len(),
            "search complete"
        );

        Ok(SearchResult {
            hits,
            curated_hits,
            facets: facet_states.into_iter().map(facet_out).collect(),
            searched_queries: state.searched_queries,
            found,
        })
    }

    fn validate(&self, request: &SearchRequest) -> Result<(), QueryError> {
        if request.page < 1 {
            return Err(QueryError::PageOutOfRange);
        }
        if request.per_page > MAX_PER_PAGE {
            return Err(QueryError::PerPageOutOfRange { max: MAX_PER_PAGE });
        }

        for field in &request.search_fields {
            let def = self
                .index
                .search_schema
                .get(field)
                .ok_or_else(|| QueryError::UnknownField(field.clone()))?;
            if !def.ftype.is_string() {
                return Err(QueryError::NotAStringField(field.clone()));
            }
        }

        for field in request.facets.iter().chain(request.group_by.iter()) {
            if !self.index.search_schema.contains_key(field) {
                return Err(QueryError::UnknownField(field.clone()));
            }
            if !self.index.facet_schema.contains_key(field) {
                return Err(QueryError::NotAFacetField(field.clone()));
            }
        }

        for sort in &request.sort_by {
            if sort.field == TEXT_MATCH_FIELD {
                continue;
            }
            match self.index.sort_schema.get(&sort.field) {
                None => return Err(QueryError::UnknownSortField(sort.field.clone())),
                Some(field) if field.optional => {
                    return Err(QueryError::OptionalSortField(sort.field.clone()));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Up to three sort keys; an empty request sorts by match score, then
    /// the default sorting field.
    fn effective_sort(&self, request: &SearchRequest) -> Vec<SortBy> {
        let mut sort_by = request.sort_by.clone();
        if sort_by.is_empty() {
            sort_by.push(SortBy::desc(TEXT_MATCH_FIELD));
            if !self.index.default_sorting_field.is_empty() {
                sort_by.push(SortBy::desc(&self.index.default_sorting_field));
            }
        }
        sort_by.truncate(3);
        sort_by
    }

    fn search_wildcard(
        &self,
        request: &SearchRequest,
        sort_by: &[SortBy],
        filter_ids: Option<Vec<u32>>,
        curated_ids: &[u32],
        exclude_ids: &RoaringBitmap,
        state: &mut SearchState,
    ) {
        let field_id = FIELD_LIMIT_NUM as u8;

        // without filters, enumerate every document through a sort field
        // that every document carries
        let mut ids = match filter_ids {
            Some(ids) => ids,
            None => {
                let all_records_field = self
                    .index
                    .sort_schema
                    .values()
                    .find(|f| !f.optional)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| self.index.default_sorting_field.clone());
                let mut ids: Vec<u32> = self
                    .index
                    .sort_index
                    .get(&all_records_field)
                    .map(|m| m.keys().copied().collect())
                    .unwrap_or_default();
                ids.sort_unstable();
                ids
            }
        };

        ids.retain(|id| {
            !exclude_ids.contains(*id) && curated_ids.binary_search(id).is_err()
        });

        let query_index = state.searched_queries.len() as u16;
        state.searched_queries.push(vec!["*".to_string()]);
        self.score_results(
            sort_by, query_index, field_id, 0, &mut state.topster, None, &[], &ids,
            &mut state.groups_processed, request,
        );

        if let Some(first_field) = request.search_fields.first() {
            self.collate_included_ids(request, first_field, field_id, state);
        }

        state.all_result_ids = ids.iter().copied().collect();
    }

    #[allow(clippy::too_many_arguments)]
    fn search_fields(
        &self,
        request: &SearchRequest,
        sort_by: &[SortBy],
        num_typos: u32,
        filter_ids: Option<&[u32]>,
        curated_ids: &[u32],
        exclude_ids: &RoaringBitmap,
        capacity: usize,
        state: &mut SearchState,
    ) {
        let num_search_fields = request.search_fields.len().min(FIELD_LIMIT_NUM);
        let single_field = num_search_fields == 1;

        // per-document hits across fields, in field processing order
        let mut topster_ids: AHashMap<u32, Vec<Hit>> = AHashMap::new();

        for (i, field) in request.search_fields[..num_search_fields].iter().enumerate() {
            if filter_ids.map(|ids| ids.is_empty()).unwrap_or(false) {
                break;
            }

            let field_id = (FIELD_LIMIT_NUM - 2 * i) as u8;
            let mut ftopster = TopK::new(capacity, request.group_limit);

            {
                // single-field searches score straight into the global ranking
                let target: &mut TopK = if single_field {
                    &mut state.topster
                } else {
                    &mut ftopster
                };

                let mut field_state = FieldSearchState {
                    target,
                    searched_queries: &mut state.searched_queries,
                    all_result_ids: &mut state.all_result_ids,
                    groups_processed: &mut state.groups_processed,
                };

                self.search_field(
                    field_id,
                    request.include_tokens.clone(),
                    request.include_tokens.clone(),
                    0,
                    field,
                    sort_by,
                    num_typos,
                    filter_ids,
                    curated_ids,
                    exclude_ids,
                    request,
                    &mut field_state,
                );

                // synonym alternatives rank just under the original terms
                for synonym in &request.synonyms {
                    self.search_field(
                        field_id - 1,
                        synonym.clone(),
                        synonym.clone(),
                        0,
                        field,
                        sort_by,
                        num_typos,
                        filter_ids,
                        curated_ids,
                        exclude_ids,
                        request,
                        &mut field_state,
                    );
                }
            }

            for hit in ftopster.iter_all() {
                topster_ids.entry(hit.seq_id).or_default().push(hit.clone());
            }

            self.collate_included_ids(request, field, field_id, state);
        }

        // cross-field aggregation: sum a document's match scores across
        // the fields that saw it, estimating for fields that matched but
        // did not retain it
        let has_match_slot = sort_by.iter().any(|s| s.field == TEXT_MATCH_FIELD);
        for (seq_id, kvs) in topster_ids {
            let mut agg = kvs[0].clone();
            let existing: AHashMap<u8, &Hit> = kvs.iter().map(|kv| (kv.field_id, kv)).collect();

            if has_match_slot {
                for i in 0..num_search_fields {
                    let field_id = (FIELD_LIMIT_NUM - 2 * i) as u8;
                    if field_id == agg.field_id {
                        continue;
                    }

                    if let Some(kv) = existing.get(&field_id) {
                        agg.scores[agg.match_score_index] += kv.scores[kv.match_score_index];
                        continue;
                    }

                    let field = &request.search_fields[i];
                    let words_present =
                        self.count_query_occurrences(field, seq_id, request);
                    if words_present > 0 {
                        agg.scores[agg.match_score_index] +=
                            Match::approximate_score(words_present, field_id) as i64;
                    }
                }
            }

            state.topster.add(agg);
        }
    }

    /// Occurrences of the query tokens in one field of one document, via
    /// exact-cost lookups; used for the cross-field estimate.
    fn count_query_occurrences(&self, field: &str, seq_id: u32, request: &SearchRequest) -> u32 {
        let tree = &self.index.search_index[field];
        let mut words_present = 0u32;

        for (token_index, token) in request.include_tokens.iter().enumerate() {
            let prefix_search =
                request.prefix && token_index == request.include_tokens.len() - 1;
            let leaves = tree.fuzzy_search(
                token.as_bytes(),
                0,
                0,
                1,
                request.token_ordering,
                prefix_search,
            );
            let Some(&leaf_id) = leaves.first() else {
                continue;
            };
            let postings = &tree.leaf(leaf_id).postings;
            if let Some(doc_index) = postings.ids.index_of(seq_id) {
                words_present += postings.offsets_at(doc_index).len() as u32;
            }
        }

        words_present
    }

    #[allow(clippy::too_many_arguments)]
    fn search_field(
        &self,
        field_id: u8,
        query_tokens: Vec<String>,
        search_tokens: Vec<String>,
        num_tokens_dropped: usize,
        field: &str,
        sort_by: &[SortBy],
        num_typos: u32,
        filter_ids: Option<&[u32]>,
        curated_ids: &[u32],
        exclude_ids: &RoaringBitmap,
        request: &SearchRequest,
        state: &mut FieldSearchState<'_>,
    ) {
        let tree = &self.index.search_index[field];
        let mut query_tokens = query_tokens;
        let mut search_tokens = search_tokens;

        // allowed typo costs per token, length-bounded
        let mut token_to_costs: Vec<Vec<u32>> = search_tokens
            .iter()
            .map(|t| (0..=bounded_typo_cost(num_typos, t.len())).collect())
            .collect();

        // fuzzy lookups memoized per (token, cost, prefix)
        let mut candidate_cache: AHashMap<(String, u32, bool), Vec<NodeId>> = AHashMap::new();
        let mut field_num_results = 0usize;

        let combination_limit = self.index.config.combination_limit as i64;
        let mut n: i64 = 0;
        let mut total = cost_combinations(&token_to_costs);

        while n < total && n < combination_limit {
            // decode the n-th cost vector (mixed radix, last token fastest)
            let mut costs = vec![0u32; token_to_costs.len()];
            let mut q = n;
            for i in (0..token_to_costs.len()).rev() {
                let radix = token_to_costs[i].len() as i64;
                costs[i] = token_to_costs[i][(q % radix) as usize];
                q /= radix;
            }

            let mut token_candidates: Vec<TokenCandidates> = Vec::new();
            let mut token_index = 0;
            let mut reduced = false;

            while token_index < search_tokens.len() {
                let token = search_tokens[token_index].clone();
                let cost = costs[token_index];
                let prefix_search = request.prefix && token_index == search_tokens.len() - 1;

                let cache_key = (token.clone(), cost, prefix_search);
                let leaves = match candidate_cache.get(&cache_key) {
                    Some(leaves) => leaves.clone(),
                    None => {
                        let max_candidates = if prefix_search {
                            self.index.config.prefix_max_candidates
                        } else {
                            self.index.config.max_candidates
                        };
                        let leaves = tree.fuzzy_search(
                            token.as_bytes(),
                            cost,
                            cost,
                            max_candidates,
                            request.token_ordering,
                            prefix_search,
                        );
                        if !leaves.is_empty() {
                            candidate_cache.insert(cache_key, leaves.clone());
                        }
                        leaves
                    }
                };

                if !leaves.is_empty() {
                    trace!(%token, cost, candidates = leaves.len(), "token expanded");
                    token_candidates.push(TokenCandidates { cost, leaves });
                    token_index += 1;
                    continue;
                }

                // no candidates at this cost: retire the cost, and the
                // token itself once no costs remain, then restart
                if let Some(pos) = token_to_costs[token_index].iter().position(|&c| c == cost) {
                    token_to_costs[token_index].remove(pos);
                    if token_to_costs[token_index].is_empty() {
                        token_to_costs.remove(token_index);
                        search_tokens.remove(token_index);
                        query_tokens.remove(token_index);
                    }
                }
                n = -1;
                total = cost_combinations(&token_to_costs);
                reduced = true;
                break;
            }

            if !reduced && !token_candidates.is_empty() {
                self.search_candidates(
                    field_id,
                    tree,
                    &token_candidates,
                    filter_ids,
                    curated_ids,
                    exclude_ids,
                    sort_by,
                    request,
                    state,
                    &mut field_num_results,
                );
            }

            if field_num_results >= request.drop_tokens_threshold
                || field_num_results >= request.typo_tokens_threshold
            {
                return;
            }

            n += 1;
        }

        // typo-tolerant queries may retry with fewer tokens: first
        // truncating from the right, then from the left
        if num_typos > 0
            && !query_tokens.is_empty()
            && num_tokens_dropped < query_tokens.len()
        {
            let num_tokens_dropped = num_tokens_dropped + 1;
            let mid_index = query_tokens.len() / 2;

            let truncated: Vec<String> = if num_tokens_dropped <= mid_index {
                let end_index = (query_tokens.len() - 1) - num_tokens_dropped;
                query_tokens[..=end_index].to_vec()
            } else {
                let start_index = num_tokens_dropped - mid_index;
                query_tokens[start_index..].to_vec()
            };

            self.search_field(
                field_id,
                query_tokens,
                truncated,
                num_tokens_dropped,
                field,
                sort_by,
                num_typos,
                filter_ids,
                curated_ids,
                exclude_ids,
                request,
                state,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn search_candidates(
        &self,
        field_id: u8,
        tree: &Art,
        token_candidates: &[TokenCandidates],
        filter_ids: Option<&[u32]>,
        curated_ids: &[u32],
        exclude_ids: &RoaringBitmap,
        sort_by: &[SortBy],
        request: &SearchRequest,
        state: &mut FieldSearchState<'_>,
        field_num_results: &mut usize,
    ) {
        let combination_limit = self.index.config.combination_limit as i64;
        let total: i64 = token_candidates
            .iter()
            .fold(1i64, |acc, tc| acc.saturating_mul(tc.leaves.len() as i64));
        let total_cost: u32 = token_candidates.iter().map(|tc| tc.cost).sum();

        for n in 0..total.min(combination_limit) {
            // the suggestion keeps query order; a copy sorted by postings
            // length drives the intersection
            let mut suggestion: Vec<NodeId> = Vec::with_capacity(token_candidates.len());
            let mut q = n;
            for tc in token_candidates {
                let radix = tc.leaves.len() as i64;
                suggestion.push(tc.leaves[(q % radix) as usize]);
                q /= radix;
            }

            let mut by_length = suggestion.clone();
            by_length.sort_by_key(|&id| tree.leaf(id).postings.num_docs());

            let mut result_ids: Vec<u32> = tree.leaf(by_length[0]).postings.ids.decode();
            for &leaf_id in &by_length[1..] {
                if result_ids.is_empty() {
                    break;
                }
                let ids = tree.leaf(leaf_id).postings.ids.decode();
                result_ids = intersect_sorted(&result_ids, &ids);
            }

            result_ids.retain(|id| {
                !exclude_ids.contains(*id) && curated_ids.binary_search(id).is_err()
            });

            if let Some(filter) = filter_ids {
                result_ids = intersect_sorted(&result_ids, filter);
            }

            state.all_result_ids.extend(result_ids.iter().copied());

            // record the corrected tokens actually tried, in query order
            let tried: Vec<String> = suggestion
                .iter()
                .map(|&id| String::from_utf8_lossy(tree.leaf(id).token()).into_owned())
                .collect();
            let query_index = state.searched_queries.len() as u16;
            state.searched_queries.push(tried);

            self.score_results(
                sort_by,
                query_index,
                field_id,
                total_cost,
                state.target,
                Some(tree),
                &suggestion,
                &result_ids,
                state.groups_processed,
                request,
            );

            *field_num_results += result_ids.len();
            if *field_num_results >= request.typo_tokens_threshold {
                break;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn score_results(
        &self,
        sort_by: &[SortBy],
        query_index: u16,
        field_id: u8,
        total_cost: u32,
        topster: &mut TopK,
        tree: Option<&Art>,
        suggestion: &[NodeId],
        result_ids: &[u32],
        groups_processed: &mut AHashSet<u64>,
        request: &SearchRequest,
    ) {
        // per-leaf position of each result doc inside the leaf's id list
        let leaf_to_indices: Vec<Vec<Option<usize>>> = match tree {
            Some(tree) if suggestion.len() > 1 => suggestion
                .iter()
                .map(|&leaf_id| {
                    let postings = &tree.leaf(leaf_id).postings;
                    result_ids.iter().map(|&id| postings.ids.index_of(id)).collect()
                })
                .collect(),
            _ => Vec::new(),
        };

        let single_score = Match::single().score(total_cost, field_id);

        for (result_index, &seq_id) in result_ids.iter().enumerate() {
            let match_score = if suggestion.len() <= 1 {
                single_score
            } else {
                let tree = tree.expect("suggestion implies a trie");
                let array_positions =
                    populate_token_positions(tree, suggestion, &leaf_to_indices, result_index);
                array_positions
                    .values()
                    .filter(|positions| !positions.is_empty())
                    .map(|positions| {
                        Match::from_token_positions(positions).score(total_cost, field_id)
                    })
                    .sum()
            };

            let mut scores = [0i64; 3];
            let mut match_score_index = 0usize;
            for (slot, sort) in sort_by.iter().enumerate() {
                let value = if sort.field == TEXT_MATCH_FIELD {
                    match_score_index = slot;
                    match_score as i64
                } else {
                    self.index
                        .sort_index
                        .get(&sort.field)
                        .and_then(|m| m.get(&seq_id))
                        .copied()
                        .unwrap_or(0)
                };
                scores[slot] = match sort.order {
                    SortOrder::Desc => value,
                    SortOrder::Asc => -value,
                };
            }

            let distinct_key = if request.group_limit > 0 {
                let key = self.index.distinct_id(&request.group_by, seq_id);
                groups_processed.insert(key);
                key
            } else {
                seq_id as u64
            };

            topster.add(Hit {
                seq_id,
                distinct_key,
                scores,
                match_score_index,
                field_id,
                query_index,
            });
        }
    }

    /// Push curated documents into their own ranking, scored purely by
    /// their pinned positions.
    fn collate_included_ids(
        &self,
        request: &SearchRequest,
        field: &str,
        field_id: u8,
        state: &mut SearchState,
    ) {
        if request.included_ids.is_empty() {
            return;
        }

        let tree = &self.index.search_index[field];
        let mut override_query: Vec<String> = Vec::new();
        for token in &request.include_tokens {
            let leaves = tree.fuzzy_search(
                token.as_bytes(),
                0,
                0,
                1,
                TokenOrdering::MaxScore,
                false,
            );
            if let Some(&leaf_id) = leaves.first() {
                override_query
                    .push(String::from_utf8_lossy(tree.leaf(leaf_id).token()).into_owned());
            }
        }

        let query_index = state.searched_queries.len() as u16;

        for (&outer_pos, ids) in &request.included_ids {
            for (inner_pos, &seq_id) in ids.iter().enumerate() {
                let match_score =
                    CURATED_SCORE_BASE - i64::from(outer_pos) - inner_pos as i64;
                state.curated_topster.add(Hit {
                    seq_id,
                    // the pinned position is the group key
                    distinct_key: u64::from(outer_pos),
                    scores: [match_score, 1, 1],
                    match_score_index: 0,
                    field_id,
                    query_index,
                });
            }
        }

        state.searched_queries.push(override_query);
    }
}

/// Per-field mutable view into the search state; the scoring target
/// swaps between the global and the field-local ranking.
struct FieldSearchState<'a> {
    target: &'a mut TopK,
    searched_queries: &'a mut Vec<Vec<String>>,
    all_result_ids: &'a mut RoaringBitmap,
    groups_processed: &'a mut AHashSet<u64>,
}

/// Typo cost cap from token length: 1-2 chars allow none, 3 chars one.
fn bounded_typo_cost(max_cost: u32, token_len: usize) -> u32 {
    match token_len {
        0..=2 => 0,
        3 => max_cost.min(1),
        _ => max_cost,
    }
}

fn cost_combinations(token_to_costs: &[Vec<u32>]) -> i64 {
    token_to_costs
        .iter()
        .fold(1i64, |acc, costs| acc.saturating_mul(costs.len() as i64))
}

/// Recover per-array-element token positions of one document from the
/// sentinel-encoded offset runs of a suggestion's leaves.
fn populate_token_positions(
    tree: &Art,
    suggestion: &[NodeId],
    leaf_to_indices: &[Vec<Option<usize>>],
    result_index: usize,
) -> AHashMap<u32, Vec<Vec<u16>>> {
    let mut array_token_positions: AHashMap<u32, Vec<Vec<u16>>> = AHashMap::new();

    for (i, &leaf_id) in suggestion.iter().enumerate() {
        let Some(doc_index) = leaf_to_indices[i][result_index] else {
            continue;
        };
        let offsets = tree.leaf(leaf_id).postings.offsets_at(doc_index);

        let mut positions: Vec<u16> = Vec::new();
        let mut prev_pos: Option<u32> = None;
        let mut cursor = 0usize;

        while cursor < offsets.len() {
            let pos = offsets[cursor];
            cursor += 1;

            if Some(pos) == prev_pos {
                // sentinel: next value is the array index
                if !positions.is_empty() && cursor < offsets.len() {
                    let array_index = offsets[cursor];
                    ensure_slot(&mut array_token_positions, array_index, suggestion.len())
                        [i] = std::mem::take(&mut positions);
                }
                cursor += 1;
                prev_pos = None;
                continue;
            }

            prev_pos = Some(pos);
            positions.push(pos as u16);
        }

        if !positions.is_empty() {
            // plain (non-array) string field
            ensure_slot(&mut array_token_positions, 0, suggestion.len())[i] = positions;
        }
    }

    array_token_positions
}

fn ensure_slot(
    map: &mut AHashMap<u32, Vec<Vec<u16>>>,
    array_index: u32,
    num_tokens: usize,
) -> &mut Vec<Vec<u16>> {
    map.entry(array_index)
        .or_insert_with(|| vec![Vec::new(); num_tokens])
}

fn hit_out(hit: Hit) -> SearchHit {
    SearchHit {
        seq_id: hit.seq_id,
        scores: hit.scores,
        match_score_index: hit.match_score_index,
        field_id: hit.field_id,
        query_index: hit.query_index,
    }
}

fn facet_out(state: FacetState) -> FacetResult {
    let stats = if state.stats.count > 0 {
        Some(state.stats.clone())
    } else {
        None
    };
    let mut counts: Vec<_> = state.counts.into_iter().collect();
    counts.sort_by(|a, b| {
        let ca = if a.1.groups.is_empty() { a.1.count } else { a.1.groups.len() as u64 };
        let cb = if b.1.groups.is_empty() { b.1.count } else { b.1.groups.len() as u64 };
        cb.cmp(&ca).then_with(|| a.0.cmp(&b.0))
    });
    FacetResult {
        field_name: state.field_name,
        counts,
        stats,
    }
}

impl Index {
    /// Run one search request to completion.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult, QueryError> {
        SearchExecutor::new(self).execute(request)
    }
}
