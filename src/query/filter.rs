//! Filter evaluation.
//!
//! A request carries a conjunction of filters; each filter ORs its values
//! over one field. Numeric values hit the numeric tree, string values
//! tokenize and AND their token postings, and equality on a string facet
//! field additionally verifies the whole facet value through its combined
//! hash.

use crate::error::QueryError;
use crate::index::facets::{combine_facet_hash, FACET_ARRAY_DELIMITER};
use crate::index::num_tree::NumComparator;
use crate::index::Index;
use crate::schema::Field;
use crate::utils::Tokenizer;
use roaring::RoaringBitmap;

/// Filter comparator. Strings support `Equals` (whole facet value) and
/// `Contains` (all value tokens present); numerics support the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equals,
    Contains,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
}

impl Comparator {
    fn numeric(self) -> NumComparator {
        match self {
            Comparator::Equals | Comparator::Contains => NumComparator::Equals,
            Comparator::LessThan => NumComparator::LessThan,
            Comparator::LessThanEquals => NumComparator::LessThanEquals,
            Comparator::GreaterThan => NumComparator::GreaterThan,
            Comparator::GreaterThanEquals => NumComparator::GreaterThanEquals,
        }
    }
}

/// One field predicate: values OR together, one comparator per value.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub comparators: Vec<Comparator>,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(field: &str, comparator: Comparator, values: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            comparators: vec![comparator; values.len()],
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn comparator_at(&self, index: usize) -> Comparator {
        self.comparators
            .get(index)
            .or_else(|| self.comparators.first())
            .copied()
            .unwrap_or(Comparator::Equals)
    }
}

/// Evaluate the conjunction into a sorted id vector.
pub fn do_filtering(index: &Index, filters: &[Filter]) -> Result<Vec<u32>, QueryError> {
    let mut result: Option<RoaringBitmap> = None;

    for filter in filters {
        let field = index
            .search_schema
            .get(&filter.field)
            .ok_or_else(|| QueryError::UnknownFilterField(filter.field.clone()))?;

        let ids = if field.ftype.is_string() {
            filter_string_field(index, filter, field)?
        } else {
            filter_numeric_field(index, filter, field)?
        };

        result = Some(match result {
            Some(existing) => existing & ids,
            None => ids,
        });

        if result.as_ref().map(|r| r.is_empty()).unwrap_or(false) {
            break;
        }
    }

    Ok(result.map(|r| r.iter().collect()).unwrap_or_default())
}

fn bad_value(filter: &Filter, value: &str) -> QueryError {
    QueryError::BadFilterValue {
        field: filter.field.clone(),
        value: value.to_string(),
    }
}

fn filter_numeric_field(
    index: &Index,
    filter: &Filter,
    field: &Field,
) -> Result<RoaringBitmap, QueryError> {
    let tree = index
        .numeric_index
        .get(&field.name)
        .expect("numeric tree exists for every numeric field");

    let mut out = RoaringBitmap::new();
    for (i, value) in filter.values.iter().enumerate() {
        let comparator = filter.comparator_at(i).numeric();

        let key: i64 = if field.ftype.is_float() {
            let f: f32 = value.parse().map_err(|_| bad_value(filter, value))?;
            crate::index::num_tree::float_to_i64(f)
        } else if field.ftype.is_bool() {
            match value.as_str() {
                "true" | "1" => 1,
                "false" | "0" => 0,
                _ => return Err(bad_value(filter, value)),
            }
        } else {
            value.parse().map_err(|_| bad_value(filter, value))?
        };

        out.extend(tree.search(comparator, key));
    }
    Ok(out)
}

fn filter_string_field(
    index: &Index,
    filter: &Filter,
    field: &Field,
) -> Result<RoaringBitmap, QueryError> {
    let tree = index
        .search_index
        .get(&field.name)
        .expect("token trie exists for every string field");

    let mut out = RoaringBitmap::new();

    for (i, value) in filter.values.iter().enumerate() {
        let tokens = Tokenizer::new(value).tokens();
        if tokens.is_empty() {
            continue;
        }

        // multiple tokens in one value AND together ("South Africa")
        let mut value_ids: Option<Vec<u32>> = None;
        let mut num_matched_tokens = 0usize;
        for token in &tokens {
            let Some(postings) = tree.get(token.as_bytes()) else {
                continue;
            };
            num_matched_tokens += 1;
            let ids = postings.ids.decode();
            value_ids = Some(match value_ids {
                Some(existing) => intersect_sorted(&existing, &ids),
                None => ids,
            });
        }
        let mut value_ids = value_ids.unwrap_or_default();

        if filter.comparator_at(i) == Comparator::Equals && field.facet {
            value_ids = exact_facet_match(index, field, &tokens, num_matched_tokens, &value_ids);
        }

        out.extend(value_ids);
    }

    Ok(out)
}

/// Keep only candidates whose facet row holds the filter value exactly:
/// array fields compare combined hashes, scalar fields compare token
/// cardinality.
fn exact_facet_match(
    index: &Index,
    field: &Field,
    tokens: &[String],
    num_matched_tokens: usize,
    candidates: &[u32],
) -> Vec<u32> {
    let facet_positions = index.facet_positions();
    let Some(&facet_pos) = facet_positions.get(&field.name) else {
        return candidates.to_vec();
    };

    let filter_hash = tokens.iter().enumerate().fold(1u64, |acc, (i, token)| {
        combine_facet_hash(acc, Index::facet_token_hash(field, token), i as u64)
    });

    let mut out = Vec::new();
    for &seq_id in candidates {
        let Some(rows) = index.facet_index.get(&seq_id) else {
            continue;
        };
        let hashes = &rows[facet_pos];

        let found = if !field.ftype.is_array() {
            num_matched_tokens == hashes.len()
        } else {
            let mut value_hash = 1u64;
            let mut token_index = 0u64;
            let mut matched = false;
            for &hash in hashes {
                if hash == FACET_ARRAY_DELIMITER {
                    if value_hash == filter_hash {
                        matched = true;
                        break;
                    }
                    value_hash = 1;
                    token_index = 0;
                } else {
                    value_hash = combine_facet_hash(value_hash, hash, token_index);
                    token_index += 1;
                }
            }
            matched
        };

        if found {
            out.push(seq_id);
        }
    }
    out
}

pub(crate) fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Index, IndexConfig};
    use crate::schema::{Field as SchemaField, FieldType, Schema};
    use serde_json::json;

    fn filter_index() -> Index {
        let schema = Schema::new(
            vec![
                SchemaField::new("title", FieldType::Str),
                SchemaField::new("country", FieldType::Str).faceted(),
                SchemaField::new("tags", FieldType::StrArray).faceted(),
                SchemaField::new("points", FieldType::Int32),
                SchemaField::new("rating", FieldType::Float),
            ],
            "points",
        );
        let mut index = Index::new("t", &schema, IndexConfig::default());
        let docs = [
            json!({"title": "one", "country": "South Africa", "tags": ["red", "deep blue"], "points": 10, "rating": 4.5}),
            json!({"title": "two", "country": "South Korea", "tags": ["deep blue"], "points": 20, "rating": 2.0}),
            json!({"title": "three", "country": "Africa", "tags": ["blue"], "points": 30, "rating": 4.5}),
        ];
        for (seq, doc) in docs.iter().enumerate() {
            index.index_document(seq as u32, doc, false).unwrap();
        }
        index
    }

    #[test]
    fn test_numeric_comparators() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[Filter::new("points", Comparator::GreaterThan, &["10"])],
        )
        .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let ids = do_filtering(
            &index,
            &[Filter::new("points", Comparator::LessThanEquals, &["20"])],
        )
        .unwrap();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_float_filter() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[Filter::new("rating", Comparator::Equals, &["4.5"])],
        )
        .unwrap();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_values_or_within_filter() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[Filter::new("points", Comparator::Equals, &["10", "30"])],
        )
        .unwrap();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_filters_and_across() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[
                Filter::new("points", Comparator::GreaterThanEquals, &["10"]),
                Filter::new("rating", Comparator::Equals, &["4.5"]),
            ],
        )
        .unwrap();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_string_contains_ands_value_tokens() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[Filter::new("country", Comparator::Contains, &["south africa"])],
        )
        .unwrap();
        // only doc 0 has both tokens
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_facet_equals_is_exact_scalar() {
        let index = filter_index();
        // "africa" alone matches doc 2 exactly; doc 0's facet value has
        // two tokens, so cardinality rules it out
        let ids = do_filtering(
            &index,
            &[Filter::new("country", Comparator::Equals, &["Africa"])],
        )
        .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_facet_equals_is_exact_array_value() {
        let index = filter_index();
        let ids = do_filtering(
            &index,
            &[Filter::new("tags", Comparator::Equals, &["deep blue"])],
        )
        .unwrap();
        assert_eq!(ids, vec![0, 1]);

        // "blue" alone only matches doc 2's exact value
        let ids = do_filtering(
            &index,
            &[Filter::new("tags", Comparator::Equals, &["blue"])],
        )
        .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let index = filter_index();
        let err = do_filtering(
            &index,
            &[Filter::new("missing", Comparator::Equals, &["x"])],
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::UnknownFilterField(_)));
    }

    #[test]
    fn test_bad_numeric_value_rejected() {
        let index = filter_index();
        let err = do_filtering(
            &index,
            &[Filter::new("points", Comparator::Equals, &["abc"])],
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::BadFilterValue { .. }));
    }

    #[test]
    fn test_intersect_sorted() {
        assert_eq!(intersect_sorted(&[1, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
        assert!(intersect_sorted(&[1, 2], &[3, 4]).is_empty());
        assert!(intersect_sorted(&[], &[1]).is_empty());
    }
}
