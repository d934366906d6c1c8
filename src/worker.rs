//! Per-index worker thread.
//!
//! The worker owns its [`Index`] outright: every mutation and every search
//! travels through one request channel and is processed in arrival order,
//! so writes issued before a search are always visible to it and no
//! structure needs interior locking. Dropping the [`IndexHandle`] closes
//! the channel, which the worker observes as clean shutdown.

use crate::error::{IndexError, QueryError};
use crate::index::{Index, IndexConfig, IndexRecord};
use crate::query::{SearchRequest, SearchResult};
use crate::schema::Schema;
use serde_json::Value;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::debug;

enum Job {
    Index {
        seq_id: u32,
        document: Value,
        is_update: bool,
        reply: mpsc::Sender<Result<(), IndexError>>,
    },
    Remove {
        seq_id: u32,
        document: Value,
        reply: mpsc::Sender<Result<u32, IndexError>>,
    },
    Batch {
        records: Vec<IndexRecord>,
        reply: mpsc::Sender<(usize, Vec<IndexRecord>)>,
    },
    Search {
        request: SearchRequest,
        reply: mpsc::Sender<Result<SearchResult, QueryError>>,
    },
}

/// Handle to an index running on its own worker thread.
///
/// Cloneless by design: the handle is the single submission point, which
/// is what serializes ingest against search.
pub struct IndexHandle {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl IndexHandle {
    /// Spawn a worker owning a fresh index.
    pub fn spawn(name: &str, schema: &Schema, config: IndexConfig) -> Self {
        let mut index = Index::new(name, schema, config);
        let (sender, receiver) = mpsc::channel::<Job>();
        let thread_name = format!("index-{name}");

        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(&mut index, receiver))
            .expect("failed to spawn index worker thread");

        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    fn submit<T>(&self, job: Job, reply: mpsc::Receiver<T>) -> T {
        self.sender
            .as_ref()
            .expect("worker already shut down")
            .send(job)
            .expect("index worker exited unexpectedly");
        reply.recv().expect("index worker exited unexpectedly")
    }

    pub fn index(&self, seq_id: u32, document: Value, is_update: bool) -> Result<(), IndexError> {
        let (tx, rx) = mpsc::channel();
        self.submit(
            Job::Index {
                seq_id,
                document,
                is_update,
                reply: tx,
            },
            rx,
        )
    }

    pub fn remove(&self, seq_id: u32, document: Value) -> Result<u32, IndexError> {
        let (tx, rx) = mpsc::channel();
        self.submit(
            Job::Remove {
                seq_id,
                document,
                reply: tx,
            },
            rx,
        )
    }

    /// Index a batch; outcomes come back attached to the records.
    pub fn batch_index(&self, records: Vec<IndexRecord>) -> (usize, Vec<IndexRecord>) {
        let (tx, rx) = mpsc::channel();
        self.submit(Job::Batch { records, reply: tx }, rx)
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResult, QueryError> {
        let (tx, rx) = mpsc::channel();
        self.submit(Job::Search { request, reply: tx }, rx)
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        // closing the channel is the terminate signal
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(index: &mut Index, receiver: mpsc::Receiver<Job>) {
    debug!(index = %index.name(), "index worker started");

    // recv fails only when every sender is gone: shutdown
    while let Ok(job) = receiver.recv() {
        match job {
            Job::Index {
                seq_id,
                document,
                is_update,
                reply,
            } => {
                let result = index.index_document(seq_id, &document, is_update);
                let _ = reply.send(result);
            }
            Job::Remove {
                seq_id,
                document,
                reply,
            } => {
                let result = index.remove(seq_id, &document);
                let _ = reply.send(result);
            }
            Job::Batch { mut records, reply } => {
                let num_indexed = index.batch_index(&mut records);
                let _ = reply.send((num_indexed, records));
            }
            Job::Search { request, reply } => {
                let result = index.search(&request);
                let _ = reply.send(result);
            }
        }
    }

    debug!(index = %index.name(), "index worker terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldType, Schema};
    use serde_json::json;

    fn spawn_handle() -> IndexHandle {
        let schema = Schema::new(
            vec![
                Field::new("title", FieldType::Str),
                Field::new("points", FieldType::Int32),
            ],
            "points",
        );
        IndexHandle::spawn("worker-test", &schema, IndexConfig::default())
    }

    #[test]
    fn test_index_then_search_sees_write() {
        let handle = spawn_handle();
        handle
            .index(0, json!({"title": "hello world", "points": 5}), false)
            .unwrap();

        let result = handle
            .search(SearchRequest::query("hello", &["title"]))
            .unwrap();
        assert_eq!(result.found, 1);
        assert_eq!(result.hits[0].seq_id, 0);
    }

    #[test]
    fn test_requests_are_serialized_in_order() {
        let handle = spawn_handle();
        for i in 0..50u32 {
            handle
                .index(i, json!({"title": format!("doc number {i}"), "points": i}), false)
                .unwrap();
            // a search submitted right after the write observes it
            let result = handle
                .search(SearchRequest::query("doc", &["title"]))
                .unwrap();
            assert_eq!(result.found, (i + 1) as usize);
        }
    }

    #[test]
    fn test_remove_then_search() {
        let handle = spawn_handle();
        let doc = json!({"title": "ephemeral", "points": 1});
        handle.index(3, doc.clone(), false).unwrap();
        assert_eq!(handle.remove(3, doc).unwrap(), 3);

        let result = handle
            .search(SearchRequest::query("ephemeral", &["title"]))
            .unwrap();
        assert_eq!(result.found, 0);
    }

    #[test]
    fn test_query_error_propagates() {
        let handle = spawn_handle();
        let mut request = SearchRequest::query("x", &["title"]);
        request.per_page = 251;
        assert!(handle.search(request).is_err());
    }

    #[test]
    fn test_batch_outcomes_come_back() {
        let handle = spawn_handle();
        let batch = vec![
            IndexRecord::create(0, 0, json!({"title": "good doc", "points": 1})),
            IndexRecord::create(1, 1, json!({"title": 7, "points": 1})),
        ];
        let (num_indexed, records) = handle.batch_index(batch);
        assert_eq!(num_indexed, 1);
        assert!(records[0].outcome.as_ref().unwrap().is_ok());
        assert!(records[1].outcome.as_ref().unwrap().is_err());
    }

    #[test]
    fn test_drop_terminates_worker() {
        let handle = spawn_handle();
        handle
            .index(0, json!({"title": "bye", "points": 1}), false)
            .unwrap();
        drop(handle);
    }
}
