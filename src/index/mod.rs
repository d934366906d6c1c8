//! In-memory index: ingest, removal, and the four sub-indices.
//!
//! This module owns the core data structures:
//!
//! - [`art`] - adaptive radix tries mapping tokens to postings, one per
//!   string field (plus an aliased trie per non-string facet field)
//! - [`num_tree`] - numeric key -> document id trees
//! - [`facets`] - per-document facet hash rows and the faceting pass
//! - [`postings`] - compressed per-token document/offset lists
//!
//! Ingest validates a JSON document against the schema, then updates every
//! sub-index under a single `&mut` borrow; searches only ever take `&`.
//! Serialization of the two paths is the worker's job (see
//! [`crate::worker`]).

pub mod art;
pub mod facets;
pub mod num_tree;
pub mod postings;

pub use art::{Art, NodeId, TokenOrdering};
pub use facets::{FacetCount, FacetQuery, FacetState, FacetStats};
pub use num_tree::{float_to_i64, NumComparator, NumTree};
pub use postings::{CompressedIds, Postings};

use crate::error::IndexError;
use crate::schema::{validate_document, Field, FieldType, Schema};
use crate::utils::{fnv1a, hash_combine, Tokenizer};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Hard cap on the number of searchable fields; also the basis for field
/// ids (`field_id = FIELD_LIMIT_NUM - 2 * field_position`).
pub const FIELD_LIMIT_NUM: usize = 100;

/// Tuning knobs for candidate expansion during search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Max typo-cost combinations tried per field
    pub combination_limit: usize,
    /// Fuzzy candidates fetched per token
    pub max_candidates: usize,
    /// Fuzzy candidates fetched for the prefix (last) token
    pub prefix_max_candidates: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            combination_limit: 100,
            max_candidates: 3,
            prefix_max_candidates: 10,
        }
    }
}

/// Mutation kind for one batch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOperation {
    Create,
    Update,
    Delete,
}

/// One document in an ingest batch, with its per-record outcome.
#[derive(Debug)]
pub struct IndexRecord {
    /// Position of the record in the original request
    pub position: usize,
    pub seq_id: u32,
    pub doc: Value,
    /// Previous version of the document (updates only)
    pub old_doc: Value,
    pub operation: IndexOperation,
    pub outcome: Option<Result<(), IndexError>>,
}

impl IndexRecord {
    pub fn create(position: usize, seq_id: u32, doc: Value) -> Self {
        Self {
            position,
            seq_id,
            doc,
            old_doc: Value::Null,
            operation: IndexOperation::Create,
            outcome: None,
        }
    }

    pub fn update(position: usize, seq_id: u32, doc: Value, old_doc: Value) -> Self {
        Self {
            position,
            seq_id,
            doc,
            old_doc,
            operation: IndexOperation::Update,
            outcome: None,
        }
    }
}

/// The in-memory search index of one collection.
pub struct Index {
    name: String,
    pub(crate) config: IndexConfig,
    schema: Schema,
    pub(crate) default_sorting_field: String,
    pub(crate) search_schema: AHashMap<String, Field>,
    /// Name-ordered: a field's facet position is its rank here
    pub(crate) facet_schema: BTreeMap<String, Field>,
    pub(crate) sort_schema: AHashMap<String, Field>,
    /// Field name (or aliased facet name) -> token trie
    pub(crate) search_index: AHashMap<String, Art>,
    pub(crate) numeric_index: AHashMap<String, NumTree>,
    /// seq_id -> one hash row per facet position
    pub(crate) facet_index: AHashMap<u32, Vec<Vec<u64>>>,
    /// sort field -> (seq_id -> sortable key)
    pub(crate) sort_index: AHashMap<String, AHashMap<u32, i64>>,
    num_documents: usize,
}

impl Index {
    pub fn new(name: &str, schema: &Schema, config: IndexConfig) -> Self {
        let mut search_index = AHashMap::new();
        let mut numeric_index = AHashMap::new();
        let mut sort_index = AHashMap::new();

        for field in &schema.fields {
            if field.ftype.is_string() {
                search_index.insert(field.name.clone(), Art::new());
            } else {
                numeric_index.insert(field.name.clone(), NumTree::new());
            }

            // non-string facet fields also get a stringified trie so
            // facet queries can fuzzy-match their values
            if field.facet && !field.ftype.is_string() {
                search_index.insert(field.faceted_name(), Art::new());
            }

            if field.ftype.is_sortable() {
                sort_index.insert(field.name.clone(), AHashMap::new());
            }
        }

        Self {
            name: name.to_string(),
            config,
            schema: schema.clone(),
            default_sorting_field: schema.default_sorting_field.clone(),
            search_schema: schema
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect(),
            facet_schema: schema.facet_schema(),
            sort_schema: schema
                .fields
                .iter()
                .filter(|f| f.ftype.is_sortable())
                .map(|f| (f.name.clone(), f.clone()))
                .collect(),
            search_index,
            numeric_index,
            facet_index: AHashMap::new(),
            sort_index,
            num_documents: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_documents(&self) -> usize {
        self.num_documents
    }

    /// Facet field name -> facet position.
    pub(crate) fn facet_positions(&self) -> AHashMap<String, usize> {
        self.facet_schema
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect()
    }

    /// Validate, then mutate every sub-index for this document.
    pub fn index_document(
        &mut self,
        seq_id: u32,
        document: &Value,
        is_update: bool,
    ) -> Result<(), IndexError> {
        validate_document(document, &self.schema, is_update)?;
        self.index_in_memory(document, seq_id, is_update)
    }

    fn points_of(&self, document: &Value, seq_id: u32, is_update: bool) -> i64 {
        if self.default_sorting_field.is_empty() {
            return 0;
        }
        match document.get(&self.default_sorting_field) {
            Some(v) => {
                if v.is_f64() || self
                    .search_schema
                    .get(&self.default_sorting_field)
                    .map(|f| f.ftype == FieldType::Float)
                    .unwrap_or(false)
                {
                    float_to_i64(v.as_f64().unwrap_or(0.0) as f32)
                } else {
                    v.as_i64().unwrap_or(0)
                }
            }
            None if is_update => self
                .sort_index
                .get(&self.default_sorting_field)
                .and_then(|m| m.get(&seq_id))
                .copied()
                .unwrap_or(0),
            None => 0,
        }
    }

    fn index_in_memory(
        &mut self,
        document: &Value,
        seq_id: u32,
        is_update: bool,
    ) -> Result<(), IndexError> {
        let points = self.points_of(document, seq_id, is_update);
        let facet_positions = self.facet_positions();

        // a facet row slot exists even for optional absent fields
        let facet_count = self.facet_schema.len();
        self.facet_index
            .entry(seq_id)
            .or_insert_with(|| vec![Vec::new(); facet_count]);

        let fields: Vec<Field> = self.search_schema.values().cloned().collect();

        for field in &fields {
            let value = match document.get(&field.name) {
                Some(v) => v,
                None => continue,
            };
            let facet_pos = facet_positions.get(&field.name).copied();

            // non-string facet values are indexed, stringified, into the
            // aliased trie (facet hashes are pushed by that pass)
            if field.facet && !field.ftype.is_string() {
                let strings = stringify_values(value, field);
                let tree_name = field.faceted_name();
                if field.ftype.is_array() {
                    self.index_string_array_field(
                        &strings, points, &tree_name, seq_id, facet_pos, field,
                    );
                } else if let Some(text) = strings.first() {
                    self.index_string_field(text, points, &tree_name, seq_id, facet_pos, field);
                }
            }

            match field.ftype {
                FieldType::Str => {
                    let text = value.as_str().unwrap_or_default().to_string();
                    self.index_string_field(&text, points, &field.name, seq_id, facet_pos, field);
                }
                FieldType::StrArray => {
                    let strings: Vec<String> = value
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .map(|v| v.as_str().unwrap_or_default().to_string())
                                .collect()
                        })
                        .unwrap_or_default();
                    self.index_string_array_field(
                        &strings, points, &field.name, seq_id, facet_pos, field,
                    );
                }
                FieldType::Int32 | FieldType::Int64 => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    tree.insert(value.as_i64().unwrap_or(0), seq_id);
                }
                FieldType::Float => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    tree.insert(float_to_i64(value.as_f64().unwrap_or(0.0) as f32), seq_id);
                }
                FieldType::Bool => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    tree.insert(value.as_bool().unwrap_or(false) as i64, seq_id);
                }
                FieldType::Int32Array | FieldType::Int64Array => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    for v in value.as_array().into_iter().flatten() {
                        tree.insert(v.as_i64().unwrap_or(0), seq_id);
                    }
                }
                FieldType::FloatArray => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    for v in value.as_array().into_iter().flatten() {
                        tree.insert(float_to_i64(v.as_f64().unwrap_or(0.0) as f32), seq_id);
                    }
                }
                FieldType::BoolArray => {
                    let tree = self.numeric_index.get_mut(&field.name).unwrap();
                    for v in value.as_array().into_iter().flatten() {
                        tree.insert(v.as_bool().unwrap_or(false) as i64, seq_id);
                    }
                }
            }

            // single-valued numerics feed the sort index automatically
            if field.ftype.is_sortable() {
                let key = match field.ftype {
                    FieldType::Float => float_to_i64(value.as_f64().unwrap_or(0.0) as f32),
                    FieldType::Bool => value.as_bool().unwrap_or(false) as i64,
                    _ => value.as_i64().unwrap_or(0),
                };
                self.sort_index
                    .get_mut(&field.name)
                    .unwrap()
                    .insert(seq_id, key);
            }
        }

        if !is_update {
            self.num_documents += 1;
        }
        debug!(index = %self.name, seq_id, is_update, "document indexed");
        Ok(())
    }

    /// 64-bit identity of one facet token: numerics keep their value
    /// (bit-preserved for floats), strings hash.
    pub(crate) fn facet_token_hash(field: &Field, token: &str) -> u64 {
        if field.ftype.is_float() {
            let f: f32 = token.parse().unwrap_or(0.0);
            f.to_bits() as u64
        } else if field.ftype.is_integer() || field.ftype.is_bool() {
            let n: i64 = token.parse().unwrap_or(0);
            n as u64
        } else {
            fnv1a(token.as_bytes())
        }
    }

    fn tokenize_value<'a>(text: &'a str, field: &Field) -> Tokenizer<'a> {
        if field.ftype.is_string() {
            Tokenizer::new(text)
        } else {
            Tokenizer::verbatim(text)
        }
    }

    fn index_string_field(
        &mut self,
        text: &str,
        points: i64,
        tree_name: &str,
        seq_id: u32,
        facet_pos: Option<usize>,
        field: &Field,
    ) {
        let mut token_to_offsets: AHashMap<String, Vec<u32>> = AHashMap::new();

        for (token, position) in Self::tokenize_value(text, field) {
            if let Some(pos) = facet_pos {
                let hash = Self::facet_token_hash(field, &token);
                self.facet_index.get_mut(&seq_id).unwrap()[pos].push(hash);
            }
            token_to_offsets.entry(token).or_default().push(position);
        }

        let tree = self.search_index.get_mut(tree_name).unwrap();
        for (token, offsets) in &token_to_offsets {
            tree.upsert(token.as_bytes(), seq_id, offsets, points);
        }
    }

    fn index_string_array_field(
        &mut self,
        strings: &[String],
        points: i64,
        tree_name: &str,
        seq_id: u32,
        facet_pos: Option<usize>,
        field: &Field,
    ) {
        let mut token_positions: AHashMap<String, Vec<u32>> = AHashMap::new();

        for (array_index, text) in strings.iter().enumerate() {
            let mut element_tokens: AHashSet<String> = AHashSet::new();

            for (token, position) in Self::tokenize_value(text, field) {
                if let Some(pos) = facet_pos {
                    let hash = Self::facet_token_hash(field, &token);
                    self.facet_index.get_mut(&seq_id).unwrap()[pos].push(hash);
                }
                token_positions.entry(token.clone()).or_default().push(position);
                element_tokens.insert(token);
            }

            if let Some(pos) = facet_pos {
                self.facet_index.get_mut(&seq_id).unwrap()[pos]
                    .push(facets::FACET_ARRAY_DELIMITER);
            }

            // repeat the last position (end-of-element sentinel), then the
            // array index, for every token this element contributed
            for token in &element_tokens {
                let offsets = token_positions.get_mut(token).unwrap();
                let last = *offsets.last().unwrap();
                offsets.push(last);
                offsets.push(array_index as u32);
            }
        }

        let tree = self.search_index.get_mut(tree_name).unwrap();
        for (token, offsets) in &token_positions {
            tree.upsert(token.as_bytes(), seq_id, offsets, points);
        }
    }

    /// Remove every reference to `seq_id` held by the fields of `document`.
    pub fn remove(&mut self, seq_id: u32, document: &Value) -> Result<u32, IndexError> {
        let facet_positions = self.facet_positions();
        let fields: Vec<Field> = self.search_schema.values().cloned().collect();

        for field in &fields {
            let value = match document.get(&field.name) {
                Some(v) => v,
                None => continue,
            };

            if field.ftype.is_string() {
                let mut tokens: AHashSet<String> = AHashSet::new();
                match field.ftype {
                    FieldType::Str => {
                        let text = value.as_str().unwrap_or_default();
                        tokens.extend(Tokenizer::new(text).tokens());
                    }
                    FieldType::StrArray => {
                        for v in value.as_array().into_iter().flatten() {
                            tokens.extend(Tokenizer::new(v.as_str().unwrap_or_default()).tokens());
                        }
                    }
                    _ => unreachable!(),
                }
                let tree = self.search_index.get_mut(&field.name).unwrap();
                for token in &tokens {
                    tree.remove_doc(token.as_bytes(), seq_id);
                }
            } else {
                let tree = self.numeric_index.get_mut(&field.name).unwrap();
                match field.ftype {
                    FieldType::Int32 | FieldType::Int64 => {
                        tree.remove(value.as_i64().unwrap_or(0), seq_id);
                    }
                    FieldType::Float => {
                        tree.remove(float_to_i64(value.as_f64().unwrap_or(0.0) as f32), seq_id);
                    }
                    FieldType::Bool => {
                        tree.remove(value.as_bool().unwrap_or(false) as i64, seq_id);
                    }
                    FieldType::Int32Array | FieldType::Int64Array => {
                        for v in value.as_array().into_iter().flatten() {
                            tree.remove(v.as_i64().unwrap_or(0), seq_id);
                        }
                    }
                    FieldType::FloatArray => {
                        for v in value.as_array().into_iter().flatten() {
                            tree.remove(float_to_i64(v.as_f64().unwrap_or(0.0) as f32), seq_id);
                        }
                    }
                    FieldType::BoolArray => {
                        for v in value.as_array().into_iter().flatten() {
                            tree.remove(v.as_bool().unwrap_or(false) as i64, seq_id);
                        }
                    }
                    _ => unreachable!(),
                }

                // the aliased stringified trie mirrors non-string facets
                if field.facet {
                    let strings = stringify_values(value, field);
                    let tree = self.search_index.get_mut(&field.faceted_name()).unwrap();
                    for s in &strings {
                        tree.remove_doc(s.as_bytes(), seq_id);
                    }
                }
            }

            if let Some(&pos) = facet_positions.get(&field.name) {
                if let Some(rows) = self.facet_index.get_mut(&seq_id) {
                    rows[pos].clear();
                }
            }

            if let Some(doc_to_key) = self.sort_index.get_mut(&field.name) {
                doc_to_key.remove(&seq_id);
            }
        }

        if let Some(rows) = self.facet_index.get(&seq_id) {
            if rows.iter().all(|row| row.is_empty()) {
                self.facet_index.remove(&seq_id);
            }
        }

        self.num_documents = self.num_documents.saturating_sub(1);
        debug!(index = %self.name, seq_id, "document removed");
        Ok(seq_id)
    }

    /// Index a batch of records, continuing past per-record failures.
    /// Returns the number of freshly created documents.
    pub fn batch_index(&mut self, batch: &mut [IndexRecord]) -> usize {
        let mut num_indexed = 0;

        for record in batch.iter_mut() {
            match record.operation {
                IndexOperation::Delete => continue,
                IndexOperation::Create | IndexOperation::Update => {}
            }
            let is_update = record.operation == IndexOperation::Update;

            if let Err(e) = validate_document(&record.doc, &self.schema, is_update) {
                record.outcome = Some(Err(e));
                continue;
            }

            let mut del_doc = Value::Null;
            if is_update {
                // only changed fields are unindexed and re-indexed
                let (index_doc, changed) = scrub_reindex_doc(&record.doc, &record.old_doc);
                del_doc = changed;
                record.doc = index_doc;
                if let Err(e) = self.remove(record.seq_id, &del_doc) {
                    record.outcome = Some(Err(e));
                    continue;
                }
            }

            match self.index_in_memory(&record.doc, record.seq_id, is_update) {
                Ok(()) => {
                    record.outcome = Some(Ok(()));
                    if !is_update {
                        num_indexed += 1;
                    }
                }
                Err(e) => {
                    // put the old values back so the index stays coherent
                    if is_update && del_doc.is_object() {
                        let _ = self.index_in_memory(&del_doc, record.seq_id, true);
                    }
                    record.outcome = Some(Err(e));
                }
            }
        }

        num_indexed
    }

    /// Group key of a document: its group-by facet hashes folded together.
    pub(crate) fn distinct_id(&self, group_by: &[String], seq_id: u32) -> u64 {
        let facet_positions = self.facet_positions();
        let mut distinct = 1u64;
        for field in group_by {
            let Some(&pos) = facet_positions.get(field) else {
                continue;
            };
            let Some(rows) = self.facet_index.get(&seq_id) else {
                continue;
            };
            for &hash in &rows[pos] {
                distinct = hash_combine(distinct, hash);
            }
        }
        distinct
    }
}

/// Render non-string values the way the aliased facet trie indexes them.
pub(crate) fn stringify_values(value: &Value, field: &Field) -> Vec<String> {
    let render = |v: &Value| -> String {
        match field.ftype {
            t if t.is_bool() => (v.as_bool().unwrap_or(false) as i32).to_string(),
            t if t.is_float() => format!("{}", v.as_f64().unwrap_or(0.0) as f32),
            _ => v.as_i64().unwrap_or(0).to_string(),
        }
    };
    if field.ftype.is_array() {
        value
            .as_array()
            .map(|arr| arr.iter().map(render).collect())
            .unwrap_or_default()
    } else {
        vec![render(value)]
    }
}

/// Split an update into the fields to re-index and the old values to
/// unindex; fields whose value did not change drop out of both.
fn scrub_reindex_doc(update_doc: &Value, old_doc: &Value) -> (Value, Value) {
    let mut index_doc = serde_json::Map::new();
    let mut del_doc = serde_json::Map::new();

    if let Some(update) = update_doc.as_object() {
        for (name, new_value) in update {
            match old_doc.get(name) {
                Some(old_value) if old_value == new_value => continue,
                Some(old_value) => {
                    index_doc.insert(name.clone(), new_value.clone());
                    del_doc.insert(name.clone(), old_value.clone());
                }
                None => {
                    index_doc.insert(name.clone(), new_value.clone());
                }
            }
        }
    }

    (Value::Object(index_doc), Value::Object(del_doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType, Schema};
    use serde_json::json;

    fn test_schema() -> Schema {
        Schema::new(
            vec![
                Field::new("title", FieldType::Str),
                Field::new("tags", FieldType::StrArray).faceted(),
                Field::new("points", FieldType::Int32),
            ],
            "points",
        )
    }

    fn test_index() -> Index {
        Index::new("books", &test_schema(), IndexConfig::default())
    }

    #[test]
    fn test_index_document_populates_all_indices() {
        let mut index = test_index();
        let doc = json!({"title": "The Rain Song", "tags": ["rock", "classic rock"], "points": 12});
        index.index_document(0, &doc, false).unwrap();

        let title_tree = index.search_index.get("title").unwrap();
        for token in ["the", "rain", "song"] {
            assert!(title_tree.get(token.as_bytes()).is_some(), "missing {token}");
        }
        assert_eq!(
            title_tree.get(b"rain").unwrap().offsets_of(0).unwrap(),
            &[1]
        );

        assert_eq!(
            index.numeric_index.get("points").unwrap().search(NumComparator::Equals, 12),
            vec![0]
        );
        assert_eq!(index.sort_index.get("points").unwrap()[&0], 12);

        // tags: "rock" | "classic rock" -> h(rock) DELIM h(classic) h(rock) DELIM
        let rows = &index.facet_index[&0];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 5);
        assert_eq!(rows[0][1], facets::FACET_ARRAY_DELIMITER);
        assert_eq!(rows[0][4], facets::FACET_ARRAY_DELIMITER);
    }

    #[test]
    fn test_array_offsets_sentinel_layout() {
        let mut index = test_index();
        let doc = json!({"title": "x", "tags": ["big rock", "rock"], "points": 1});
        index.index_document(7, &doc, false).unwrap();

        // element 0: positions [1], sentinel 1, array idx 0
        // element 1: positions [0], sentinel 0, array idx 1
        let postings = index.search_index.get("tags").unwrap().get(b"rock").unwrap();
        assert_eq!(postings.offsets_of(7).unwrap(), &[1, 1, 0, 0, 0, 1]);
    }

    #[test]
    fn test_remove_clears_every_sub_index() {
        let mut index = test_index();
        let doc = json!({"title": "The Rain", "tags": ["a"], "points": 3});
        index.index_document(5, &doc, false).unwrap();
        index.remove(5, &doc).unwrap();

        assert!(index.search_index.get("title").unwrap().is_empty());
        assert!(index.search_index.get("tags").unwrap().is_empty());
        assert!(index.numeric_index.get("points").unwrap().is_empty());
        assert!(index.facet_index.get(&5).is_none());
        assert!(index.sort_index.get("points").unwrap().get(&5).is_none());
        assert_eq!(index.num_documents(), 0);
    }

    #[test]
    fn test_remove_keeps_other_documents() {
        let mut index = test_index();
        let doc_a = json!({"title": "shared words here", "tags": [], "points": 1});
        let doc_b = json!({"title": "shared words there", "tags": [], "points": 2});
        index.index_document(1, &doc_a, false).unwrap();
        index.index_document(2, &doc_b, false).unwrap();

        index.remove(1, &doc_a).unwrap();

        let tree = index.search_index.get("title").unwrap();
        assert_eq!(tree.get(b"shared").unwrap().ids.decode(), vec![2]);
        assert!(tree.get(b"here").is_none());
        assert!(tree.get(b"there").is_some());
    }

    #[test]
    fn test_index_twice_is_update_not_duplicate() {
        let mut index = test_index();
        let doc = json!({"title": "same title", "tags": [], "points": 4});
        index.index_document(9, &doc, false).unwrap();
        index.index_document(9, &doc, true).unwrap();

        let tree = index.search_index.get("title").unwrap();
        assert_eq!(tree.get(b"same").unwrap().ids.decode(), vec![9]);
        assert_eq!(tree.get(b"same").unwrap().offsets_of(9).unwrap(), &[0]);
    }

    #[test]
    fn test_validation_rejects_before_mutation() {
        let mut index = test_index();
        let doc = json!({"title": 42, "tags": [], "points": 1});
        assert!(index.index_document(0, &doc, false).is_err());
        assert!(index.search_index.get("title").unwrap().is_empty());
        assert_eq!(index.num_documents(), 0);
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let mut index = test_index();
        let mut batch = vec![
            IndexRecord::create(0, 0, json!({"title": "ok one", "tags": [], "points": 1})),
            IndexRecord::create(1, 1, json!({"title": 42, "tags": [], "points": 1})),
            IndexRecord::create(2, 2, json!({"title": "ok two", "tags": [], "points": 2})),
        ];
        let indexed = index.batch_index(&mut batch);
        assert_eq!(indexed, 2);
        assert!(batch[0].outcome.as_ref().unwrap().is_ok());
        assert!(batch[1].outcome.as_ref().unwrap().is_err());
        assert!(batch[2].outcome.as_ref().unwrap().is_ok());
        assert_eq!(index.num_documents(), 2);
    }

    #[test]
    fn test_batch_update_scrubs_unchanged_fields() {
        let mut index = test_index();
        let old = json!({"title": "stay", "tags": ["keep"], "points": 1});
        index.index_document(3, &old, false).unwrap();

        let new = json!({"title": "stay", "tags": ["keep"], "points": 8});
        let mut batch = vec![IndexRecord::update(0, 3, new, old)];
        index.batch_index(&mut batch);

        assert!(batch[0].outcome.as_ref().unwrap().is_ok());
        let tree = index.search_index.get("title").unwrap();
        assert_eq!(tree.get(b"stay").unwrap().ids.decode(), vec![3]);
        assert_eq!(
            index.numeric_index.get("points").unwrap().search(NumComparator::Equals, 8),
            vec![3]
        );
        assert!(index
            .numeric_index
            .get("points")
            .unwrap()
            .search(NumComparator::Equals, 1)
            .is_empty());
    }

    #[test]
    fn test_distinct_id_differs_by_group_value() {
        let mut index = test_index();
        index
            .index_document(0, &json!({"title": "a", "tags": ["x"], "points": 1}), false)
            .unwrap();
        index
            .index_document(1, &json!({"title": "b", "tags": ["y"], "points": 1}), false)
            .unwrap();
        index
            .index_document(2, &json!({"title": "c", "tags": ["x"], "points": 1}), false)
            .unwrap();

        let group = vec!["tags".to_string()];
        assert_eq!(index.distinct_id(&group, 0), index.distinct_id(&group, 2));
        assert_ne!(index.distinct_id(&group, 0), index.distinct_id(&group, 1));
    }
}
