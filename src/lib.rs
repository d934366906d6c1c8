//! # Tern - In-Memory Typo-Tolerant Search Core
//!
//! Tern is the in-memory search core of a document search engine: it
//! builds inverted indices over structured JSON documents and answers
//! typo-tolerant, filtered, faceted, ranked queries deterministically.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - The index and its structures: adaptive radix tries over
//!   tokens, numeric trees, facet hash rows, sort maps, postings
//! - [`query`] - Filters, positional ranking, top-k collection, and the
//!   search orchestrator
//! - [`schema`] - Field definitions and document validation
//! - [`worker`] - One owning worker thread per index, fed by a channel
//! - [`utils`] - Tokenizer and hashing
//!
//! ## Quick Start
//!
//! ```
//! use tern::index::{Index, IndexConfig};
//! use tern::query::SearchRequest;
//! use tern::schema::{Field, FieldType, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new(
//!     vec![
//!         Field::new("title", FieldType::Str),
//!         Field::new("points", FieldType::Int32),
//!     ],
//!     "points",
//! );
//!
//! let mut index = Index::new("books", &schema, IndexConfig::default());
//! index.index_document(0, &json!({"title": "The Rain", "points": 10}), false).unwrap();
//!
//! let results = index.search(&SearchRequest::query("rain", &["title"])).unwrap();
//! assert_eq!(results.found, 1);
//! ```
//!
//! ## Ranking
//!
//! Hits order by up to three sort keys (descending by default). One key
//! may be the computed match score, which packs together how many query
//! tokens a document contains, the accumulated typo cost, token
//! proximity, and a boost for earlier-listed search fields. Queries with
//! typos expand through a bounded cartesian product of per-token edit
//! costs against the tries; queries that would otherwise come up short
//! drop tokens from the right, then the left, and retry.

pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod utils;
pub mod worker;

pub use error::{IndexError, QueryError};
pub use index::{Index, IndexConfig, IndexRecord};
pub use query::{SearchRequest, SearchResult};
pub use schema::{Field, FieldType, Schema};
pub use worker::IndexHandle;
