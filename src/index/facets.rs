//! Facet rows and the faceting pass.
//!
//! Every document carries one hash row per facet position. Counting walks
//! the rows of the candidate set, folding each facet value's token hashes
//! into an order-sensitive combined hash, so `["a","b"]` and `["b","a"]`
//! count as distinct values.

use crate::index::art::TokenOrdering;
use crate::index::Index;
use crate::schema::FieldType;
use crate::utils::Tokenizer;
use ahash::{AHashMap, AHashSet};

/// Separates array elements inside a facet hash row.
pub const FACET_ARRAY_DELIMITER: u64 = u64::MAX;

/// Multiplier scheme from the original hash-combination trick: the value
/// hash is a product over `P + 2 * token_hash * (token_index + 1)`.
const COMBINE_PRIME: u64 = 1_779_033_703;

const FACET_QUERY_MAX_CANDIDATES: usize = 10_000;

/// A facet refinement query: fuzzy-matches values of one facet field.
#[derive(Debug, Clone)]
pub struct FacetQuery {
    pub field: String,
    pub query: String,
}

/// Position and typo cost of a matched token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPosCost {
    pub pos: u32,
    pub cost: u32,
}

/// Tally of one distinct facet value.
#[derive(Debug, Clone, Default)]
pub struct FacetCount {
    pub count: u64,
    /// Distinct group keys seen (group mode counts these instead)
    pub groups: AHashSet<u64>,
    /// A document holding this value, with the array slot it sat in, so
    /// the caller can render the value back from stored documents
    pub doc_id: u32,
    pub array_pos: u32,
    /// query token position -> best matching field token position
    pub query_token_pos: AHashMap<u32, TokenPosCost>,
}

/// Running numeric stats of one facet field.
#[derive(Debug, Clone)]
pub struct FacetStats {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl Default for FacetStats {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }
}

/// Per-field facet accumulation for one search.
#[derive(Debug, Clone, Default)]
pub struct FacetState {
    pub field_name: String,
    /// combined value hash -> tally
    pub counts: AHashMap<u64, FacetCount>,
    pub stats: FacetStats,
}

impl FacetState {
    pub fn new(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            ..Default::default()
        }
    }
}

/// Fold one token hash into a combined facet-value hash.
#[inline]
pub fn combine_facet_hash(combined: u64, token_hash: u64, token_index: u64) -> u64 {
    combined.wrapping_mul(
        COMBINE_PRIME.wrapping_add(2u64.wrapping_mul(token_hash).wrapping_mul(token_index + 1)),
    )
}

struct FacetInfo {
    /// field token hash -> query token (position, cost)
    query_token_hashes: AHashMap<u64, TokenPosCost>,
    use_facet_query: bool,
    compute_stats: bool,
    ftype: FieldType,
}

impl Index {
    /// Count facet values over `result_ids`, honoring an optional facet
    /// query and group mode.
    pub(crate) fn do_facets(
        &self,
        facets: &mut [FacetState],
        facet_query: &Option<FacetQuery>,
        result_ids: &[u32],
        group_by: &[String],
        group_limit: usize,
    ) {
        let facet_positions = self.facet_positions();
        let infos: Vec<FacetInfo> = facets
            .iter()
            .map(|f| self.facet_info(f, facet_query))
            .collect();

        for &seq_id in result_ids {
            let Some(rows) = self.facet_index.get(&seq_id) else {
                continue;
            };

            let distinct_id = if group_limit > 0 {
                self.distinct_id(group_by, seq_id)
            } else {
                0
            };

            for (facet, info) in facets.iter_mut().zip(infos.iter()) {
                let Some(&facet_pos) = facet_positions.get(&facet.field_name) else {
                    continue;
                };
                debug_assert!(facet_pos < rows.len(), "facet row shape out of sync");
                let hashes = &rows[facet_pos];

                let mut array_pos: u32 = 0;
                let mut value_found = false;
                let mut combined: u64 = 1;
                let mut token_index: u64 = 0;
                let mut query_positions: AHashMap<u32, TokenPosCost> = AHashMap::new();

                for (i, &hash) in hashes.iter().enumerate() {
                    if hash != FACET_ARRAY_DELIMITER {
                        combined = combine_facet_hash(combined, hash, token_index);

                        if info.compute_stats {
                            facet.stats.observe(hash, info.ftype);
                        }

                        if !info.use_facet_query {
                            value_found = true;
                        } else if let Some(&qtoken) = info.query_token_hashes.get(&hash) {
                            value_found = true;
                            // keep the lowest-cost field position per query token
                            let better = query_positions
                                .get(&qtoken.pos)
                                .map(|prev| prev.cost >= qtoken.cost)
                                .unwrap_or(true);
                            if better {
                                query_positions.insert(
                                    qtoken.pos,
                                    TokenPosCost {
                                        pos: token_index as u32,
                                        cost: qtoken.cost,
                                    },
                                );
                            }
                        }
                        token_index += 1;
                    }

                    let value_ends = hash == FACET_ARRAY_DELIMITER
                        || (i == hashes.len() - 1 && *hashes.last().unwrap() != FACET_ARRAY_DELIMITER);

                    if value_ends {
                        if value_found {
                            let entry = facet.counts.entry(combined).or_default();
                            entry.doc_id = seq_id;
                            entry.array_pos = array_pos;
                            if group_limit > 0 {
                                entry.groups.insert(distinct_id);
                            } else {
                                entry.count += 1;
                            }
                            if info.use_facet_query {
                                entry.query_token_pos = query_positions.clone();
                            }
                        }

                        array_pos += 1;
                        value_found = false;
                        combined = 1;
                        token_index = 0;
                        query_positions.clear();
                    }
                }
            }
        }
    }

    fn facet_info(&self, facet: &FacetState, facet_query: &Option<FacetQuery>) -> FacetInfo {
        let field = self
            .facet_schema
            .get(&facet.field_name)
            .expect("facet field validated upstream");

        let compute_stats = !field.ftype.is_string() && !field.ftype.is_bool();

        let mut info = FacetInfo {
            query_token_hashes: AHashMap::new(),
            use_facet_query: false,
            compute_stats,
            ftype: field.ftype,
        };

        let Some(fq) = facet_query else {
            return info;
        };
        if fq.field != facet.field_name || fq.query.is_empty() {
            return info;
        }
        info.use_facet_query = true;

        let mut query = fq.query.clone();
        if field.ftype.is_bool() {
            query = match query.as_str() {
                "true" => "1".to_string(),
                "false" => "0".to_string(),
                other => other.to_string(),
            };
        }

        // fuzzy-match the query tokens over the (possibly aliased) trie
        let tree_name = if field.ftype.is_string() {
            field.name.clone()
        } else {
            field.faceted_name()
        };
        let tree = self
            .search_index
            .get(&tree_name)
            .expect("facet trie exists for every facet field");

        let query_tokens: Vec<String> = if field.ftype.is_string() {
            Tokenizer::new(&query).tokens()
        } else {
            Tokenizer::verbatim(&query).tokens()
        };

        for (qtoken_index, qtoken) in query_tokens.iter().enumerate() {
            let bounded_cost = if qtoken.len() < 3 { 0 } else { 1 };
            let prefix_search = qtoken_index == query_tokens.len() - 1;

            for cost in 0..=bounded_cost {
                let leaves = tree.fuzzy_search(
                    qtoken.as_bytes(),
                    cost,
                    cost,
                    FACET_QUERY_MAX_CANDIDATES,
                    TokenOrdering::MaxScore,
                    prefix_search,
                );
                for leaf_id in leaves {
                    let key = tree.leaf(leaf_id).token();
                    let key_str = String::from_utf8_lossy(key);
                    let hash = Index::facet_token_hash(field, &key_str);
                    info.query_token_hashes.entry(hash).or_insert(TokenPosCost {
                        pos: qtoken_index as u32,
                        cost,
                    });
                }
            }
        }

        info
    }
}

impl FacetStats {
    fn observe(&mut self, raw: u64, ftype: FieldType) {
        let value = match ftype {
            FieldType::Float | FieldType::FloatArray => f32::from_bits(raw as u32) as f64,
            _ => raw as i64 as f64,
        };
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.sum += value;
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Index, IndexConfig};
    use crate::schema::{Field, FieldType, Schema};
    use serde_json::json;

    fn facet_index() -> Index {
        let schema = Schema::new(
            vec![
                Field::new("title", FieldType::Str),
                Field::new("tags", FieldType::StrArray).faceted(),
                Field::new("year", FieldType::Int32).faceted(),
                Field::new("points", FieldType::Int32),
            ],
            "points",
        );
        Index::new("books", &schema, IndexConfig::default())
    }

    #[test]
    fn test_combined_hash_is_order_sensitive() {
        let h1 = combine_facet_hash(combine_facet_hash(1, 11, 0), 22, 1);
        let h2 = combine_facet_hash(combine_facet_hash(1, 22, 0), 11, 1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_distinct_array_values_count_separately() {
        let mut index = facet_index();
        index
            .index_document(0, &json!({"title": "x", "tags": ["a", "b"], "year": 2001, "points": 1}), false)
            .unwrap();
        index
            .index_document(1, &json!({"title": "y", "tags": ["a"], "year": 2002, "points": 1}), false)
            .unwrap();

        let mut facets = vec![FacetState::new("tags")];
        index.do_facets(&mut facets, &None, &[0, 1], &[], 0);

        // values: "a" (both docs), "b" (doc 0) => two distinct hashes
        assert_eq!(facets[0].counts.len(), 2);
        let mut counts: Vec<u64> = facets[0].counts.values().map(|c| c.count).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn test_multi_token_value_hashes_whole_value() {
        let mut index = facet_index();
        index
            .index_document(0, &json!({"title": "x", "tags": ["classic rock"], "year": 2001, "points": 1}), false)
            .unwrap();
        index
            .index_document(1, &json!({"title": "y", "tags": ["rock classic"], "year": 2001, "points": 1}), false)
            .unwrap();

        let mut facets = vec![FacetState::new("tags")];
        index.do_facets(&mut facets, &None, &[0, 1], &[], 0);

        // token order distinguishes the two values
        assert_eq!(facets[0].counts.len(), 2);
    }

    #[test]
    fn test_numeric_facet_stats() {
        let mut index = facet_index();
        for (seq, year) in [(0, 1995), (1, 2005), (2, 2020)] {
            index
                .index_document(
                    seq,
                    &json!({"title": "x", "tags": [], "year": year, "points": 1}),
                    false,
                )
                .unwrap();
        }

        let mut facets = vec![FacetState::new("year")];
        index.do_facets(&mut facets, &None, &[0, 1, 2], &[], 0);

        let stats = &facets[0].stats;
        assert_eq!(stats.min, 1995.0);
        assert_eq!(stats.max, 2020.0);
        assert_eq!(stats.sum, 6020.0);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn test_facet_query_narrows_values() {
        let mut index = facet_index();
        index
            .index_document(0, &json!({"title": "x", "tags": ["rock"], "year": 1, "points": 1}), false)
            .unwrap();
        index
            .index_document(1, &json!({"title": "y", "tags": ["jazz"], "year": 1, "points": 1}), false)
            .unwrap();

        let fq = Some(FacetQuery {
            field: "tags".to_string(),
            query: "roc".to_string(),
        });
        let mut facets = vec![FacetState::new("tags")];
        index.do_facets(&mut facets, &fq, &[0, 1], &[], 0);

        // prefix match finds "rock" only
        assert_eq!(facets[0].counts.len(), 1);
        let only = facets[0].counts.values().next().unwrap();
        assert_eq!(only.doc_id, 0);
        assert_eq!(only.query_token_pos.get(&0).unwrap().pos, 0);
    }

    #[test]
    fn test_group_mode_counts_groups_not_docs() {
        let mut index = facet_index();
        // two docs in the same year-group share the tag "a"
        index
            .index_document(0, &json!({"title": "x", "tags": ["a"], "year": 2000, "points": 1}), false)
            .unwrap();
        index
            .index_document(1, &json!({"title": "y", "tags": ["a"], "year": 2000, "points": 1}), false)
            .unwrap();

        let group_by = vec!["year".to_string()];
        let mut facets = vec![FacetState::new("tags")];
        index.do_facets(&mut facets, &None, &[0, 1], &group_by, 2);

        let only = facets[0].counts.values().next().unwrap();
        assert_eq!(only.count, 0);
        assert_eq!(only.groups.len(), 1);
    }
}
