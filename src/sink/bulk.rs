use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinSet;

use crate::batch::Batch;
use crate::classify::{classify_batch, ErrorSummary, SummaryKey};
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ident::{self, WriteOp};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::report;
use crate::sink::BulkApi;
use crate::track::CompletionTracker;
use crate::Document;

/// Dispatches batches as bulk requests with a bounded number of calls in
/// flight, classifies every response, and emits the final summary when the
/// completion tracker says the run is over.
///
/// Per-batch classifier state lives inside each dispatch task; the only
/// state shared across in-flight batches is the tracker and the aggregate
/// summary.
pub struct BulkSink<C> {
    client: Arc<C>,
    config: Arc<IngestConfig>,
    tracker: Arc<CompletionTracker>,
    summary: Arc<ErrorSummary>,
}

impl<C> BulkSink<C> {
    pub fn new(
        client: C,
        config: Arc<IngestConfig>,
        tracker: Arc<CompletionTracker>,
        summary: Arc<ErrorSummary>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            config,
            tracker,
            summary,
        }
    }
}

fn assign_ops(docs: Vec<Document>, config: &IngestConfig) -> Result<Vec<WriteOp>> {
    docs.into_iter()
        .map(|doc| ident::assign(doc, config))
        .collect()
}

fn render_body(ops: &[WriteOp]) -> Result<String> {
    // Two NDJSON lines per document: action descriptor, then payload.
    let mut body = String::new();
    for op in ops {
        op.append_to(&mut body)?;
    }
    Ok(body)
}

async fn dispatch_one<C: BulkApi>(
    client: Arc<C>,
    config: Arc<IngestConfig>,
    tracker: Arc<CompletionTracker>,
    summary: Arc<ErrorSummary>,
    seq: u64,
    ops: Vec<WriteOp>,
    body: String,
) {
    match client.bulk(&config.index, body).await {
        Ok(response) => {
            let batch_report = classify_batch(seq, &ops, &response, config.verbose, &summary);
            if batch_report.has_errors() {
                print!("{}", report::batch_block(&batch_report));
            }
        }
        Err(err) => {
            // The whole batch failed to send; no per-operation detail exists.
            // Acknowledge anyway so completion detection cannot hang.
            summary.record(SummaryKey::Transport);
            eprintln!(
                "batch {seq}: bulk request failed, {} documents not written: {err}",
                ops.len()
            );
        }
    }

    if tracker.acknowledge() {
        print!("{}", report::run_summary(&summary, tracker.produced_count()));
    }
}

#[async_trait]
impl<C> Pipe<Batch, ()> for BulkSink<C>
where
    C: BulkApi + 'static,
{
    fn stage_name(&self) -> &'static str {
        "bulk_sink"
    }

    async fn process(
        &self,
        mut input: Receiver<Batch>,
        _output: Sender<()>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut fatal: Option<Error> = None;

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = input.recv() => {
                    let Some(batch) = msg else { break; };
                    batch
                }
            };

            let seq = batch.seq;

            // Identifiers are assigned at dispatch time. A missing id field
            // is a configuration-vs-data mismatch: stop accepting batches,
            // never drop the document silently.
            let prepared = assign_ops(batch.docs, &self.config)
                .and_then(|ops| render_body(&ops).map(|body| (ops, body)));
            let (ops, body) = match prepared {
                Ok(prepared) => prepared,
                Err(err) => {
                    eprintln!("batch {seq}: {err}");
                    fatal = Some(err);
                    cancel.cancel();
                    break;
                }
            };

            // Bounded concurrency: joining here backpressures the batcher,
            // decoder and source through the bounded channels.
            if in_flight.len() >= self.config.max_in_flight {
                let _ = in_flight.join_next().await;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(batch = seq, docs = ops.len(), "dispatching bulk request");

            in_flight.spawn(dispatch_one(
                self.client.clone(),
                self.config.clone(),
                self.tracker.clone(),
                self.summary.clone(),
                seq,
                ops,
                body,
            ));
        }

        // Drain whatever is still in flight; abandoning tasks would lose
        // acknowledgments and batch reports.
        while in_flight.join_next().await.is_some() {}

        if let Some(err) = fatal {
            return Err(err);
        }

        // Covers runs whose last acknowledgment landed before the batcher
        // set the exhausted flag, and zero-batch inputs.
        if self.tracker.try_complete() {
            print!(
                "{}",
                report::run_summary(&self.summary, self.tracker.produced_count())
            );
        }

        Ok(())
    }
}
