#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use bulkpipe::classify::ErrorSummary;
use bulkpipe::config::IngestConfig;
use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::cancel::CancelToken;
use bulkpipe::pipeline::pipe::Pipe;
use bulkpipe::sink::{BulkApi, BulkItem, BulkResponse};
use bulkpipe::track::CompletionTracker;
use bulkpipe::Document;

/// Builds a `Document` from a `json!` object literal.
pub fn doc(value: serde_json::Value) -> Document {
    value.as_object().expect("test doc must be an object").clone()
}

#[derive(Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl<T> Pipe<(), T> for VecSource<T>
where
    T: Send + Sync + Clone + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        // wait for start or cancel
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        let items = self.items.clone();
        for item in items {
            if cancel.is_cancelled() {
                break;
            }
            if output.send(item).await.is_err() {
                // downstream closing due to cancellation is graceful
                if cancel.is_cancelled() {
                    break;
                }
                return Err(Error::pipeline("output channel closed"));
            }
        }
        Ok(())
    }
}

pub struct CollectSink<T> {
    out: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    pub fn new(out: Arc<Mutex<Vec<T>>>) -> Self {
        Self { out }
    }
}

#[async_trait]
impl<T> Pipe<T, ()> for CollectSink<T>
where
    T: Send + Sync + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<T>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(v) = msg else { break; };
                    self.out.lock().expect("mutex poisoned").push(v);
                }
            }
        }
        Ok(())
    }
}

type BulkScript = dyn Fn(usize, &str) -> Result<BulkResponse> + Send + Sync;

/// Scripted stand-in for the Elasticsearch client. The script receives the
/// zero-based call number and the NDJSON body and decides the response.
pub struct MockBulk {
    script: Box<BulkScript>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockBulk {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(usize, &str) -> Result<BulkResponse> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Acknowledges every operation with the given status and no error.
    pub fn all_ok() -> Self {
        Self::new(|_, body| Ok(ok_response(body)))
    }
}

#[async_trait]
impl BulkApi for MockBulk {
    async fn bulk(&self, _index: &str, body: String) -> Result<BulkResponse> {
        let call = {
            let mut calls = self.calls.lock().expect("mutex poisoned");
            calls.push(body.clone());
            calls.len() - 1
        };
        (self.script)(call, &body)
    }

    async fn create_index(&self, _name: &str, _mappings: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Number of documents in an NDJSON bulk body (two lines per document).
pub fn body_doc_count(body: &str) -> usize {
    body.lines().count() / 2
}

/// The `_id` of every action descriptor in a bulk body.
pub fn body_ids(body: &str) -> Vec<String> {
    body.lines()
        .step_by(2)
        .map(|line| {
            let action: serde_json::Value =
                serde_json::from_str(line).expect("action line must be json");
            action
                .as_object()
                .and_then(|a| a.values().next())
                .and_then(|d| d.get("_id"))
                .and_then(|id| id.as_str())
                .expect("action must carry _id")
                .to_owned()
        })
        .collect()
}

pub fn ok_response(body: &str) -> BulkResponse {
    BulkResponse {
        errors: false,
        items: (0..body_doc_count(body))
            .map(|_| BulkItem::ok("create", 201))
            .collect(),
    }
}

/// Shared state for one pipeline run.
pub struct RunState {
    pub config: Arc<IngestConfig>,
    pub tracker: Arc<CompletionTracker>,
    pub summary: Arc<ErrorSummary>,
}

impl RunState {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config: Arc::new(config),
            tracker: Arc::new(CompletionTracker::new()),
            summary: Arc::new(ErrorSummary::new()),
        }
    }
}

pub fn test_config() -> IngestConfig {
    IngestConfig::new("http://localhost:9200", "test-index")
}
