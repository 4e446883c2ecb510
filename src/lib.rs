//! # bulkpipe
//!
//! **Streaming bulk ingestion into Elasticsearch.**
//!
//! `bulkpipe` streams an unbounded sequence of JSON documents into a search
//! index through the `_bulk` API, deduplicating by content hash (create
//! mode) or upserting by a designated field, and reporting per-batch and
//! aggregate error statistics.
//!
//! It is built for production constraints:
//!
//! - large inputs (GBs, not MBs) with bounded memory
//! - backpressure end to end over bounded Tokio channels
//! - a bounded number of bulk requests in flight at once
//! - partial failure as the normal case: one bulk response is a mixed bag
//!   of successes, duplicate conflicts and genuine errors
//!
//! ---
//!
//! ## Core model
//!
//! A run is a chain of stages, each implementing the [`Pipe`] trait:
//!
//! ```text
//! FsSource -> JsonDecoder -> Batcher -> BulkSink
//! ```
//!
//! The identifier assigner ([`ident`]) is a pure module invoked by the sink
//! at dispatch time; the [`CompletionTracker`] and [`ErrorSummary`] are
//! explicitly shared objects observed by the batcher and the sink, never
//! ambient state.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bulkpipe::batch::{Batch, Batcher};
//! use bulkpipe::classify::ErrorSummary;
//! use bulkpipe::config::IngestConfig;
//! use bulkpipe::decode::JsonDecoder;
//! use bulkpipe::pipeline::chain::PipeExt;
//! use bulkpipe::pipeline::runtime::Runtime;
//! use bulkpipe::sink::{BulkSink, ElasticClient};
//! use bulkpipe::source::FsSource;
//! use bulkpipe::track::CompletionTracker;
//! use bulkpipe::Document;
//!
//! #[tokio::main]
//! async fn main() -> bulkpipe::error::Result<()> {
//!     let config = Arc::new(IngestConfig::new("http://localhost:9200", "events"));
//!     config.validate()?;
//!
//!     let tracker = Arc::new(CompletionTracker::new());
//!     let summary = Arc::new(ErrorSummary::new());
//!     let client = ElasticClient::new(&config.elastic_uri);
//!
//!     let pipe = FsSource::new("events.json")
//!         .pipe::<Document, _>(JsonDecoder::new())
//!         .pipe::<Batch, _>(Batcher::new(config.batch_size, tracker.clone()))
//!         .pipe::<(), _>(BulkSink::new(client, config, tracker, summary));
//!
//!     let rt = Runtime::new().buffer(16);
//!     let (tx, _rx, _cancel, handle) = rt.spawn(pipe);
//!
//!     // Start the source
//!     tx.send(()).await.unwrap();
//!     drop(tx);
//!
//!     handle.await??;
//!     Ok(())
//! }
//! ```
//!
//! ## API contracts
//!
//! - Document conservation: every decoded document lands in exactly one
//!   batch, in arrival order.
//! - Identifier determinism: equal documents (ignoring excluded keys) hash
//!   to equal identifiers regardless of field order.
//! - The final summary is emitted exactly once, only after every produced
//!   batch has been acknowledged and the input is exhausted.
//! - Per-operation write errors never abort the stream; only configuration
//!   errors and a missing upsert id field do.
//!
//! ## Feature flags
//!
//! - `tracing` *(default)*: structured spans and events such as
//!   `bulkpipe.stage` and `bulkpipe.downstream.closed`.
//!
//! [`Pipe`]: crate::pipeline::pipe::Pipe
//! [`CompletionTracker`]: crate::track::CompletionTracker
//! [`ErrorSummary`]: crate::classify::ErrorSummary

pub mod batch;
pub mod classify;
pub mod config;
pub mod decode;
pub mod error;
pub mod ident;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod source;
pub mod track;

/// A document is an arbitrary JSON object; the pipeline treats it as opaque
/// except for identifier derivation.
pub type Document = serde_json::Map<String, serde_json::Value>;
