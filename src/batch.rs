use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::track::CompletionTracker;
use crate::Document;

/// An ordered slice of the document stream.
///
/// `seq` is assigned monotonically starting at 1 and is used only for
/// reporting.
#[derive(Debug, Clone)]
pub struct Batch {
    pub seq: u64,
    pub docs: Vec<Document>,
}

/// Groups the ordered document stream into batches of `batch_size`, flushing
/// a possibly-smaller remainder when the input ends.
///
/// No reordering and no deduplication happen here; dedup is a property of
/// the identifier, not the batcher.
pub struct Batcher {
    batch_size: usize,
    tracker: Arc<CompletionTracker>,
}

impl Batcher {
    pub fn new(batch_size: usize, tracker: Arc<CompletionTracker>) -> Self {
        Self {
            batch_size: batch_size.max(1),
            tracker,
        }
    }

    async fn emit(
        &self,
        seq: u64,
        docs: Vec<Document>,
        output: &Sender<Batch>,
        cancel: &CancelToken,
    ) -> Result<bool> {
        // Produced must be visible before the sink can possibly acknowledge.
        self.tracker.produced();
        let batch = Batch { seq, docs };

        tokio::select! {
            _ = cancel.cancelled() => Ok(false),
            sent = output.send(batch) => {
                if sent.is_err() {
                    if cancel.is_cancelled() {
                        return Ok(false);
                    }
                    return Err(Error::pipeline("output channel closed"));
                }
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl Pipe<Document, Batch> for Batcher {
    fn stage_name(&self) -> &'static str {
        "batcher"
    }

    async fn process(
        &self,
        mut input: Receiver<Document>,
        output: Sender<Batch>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut buf: Vec<Document> = Vec::with_capacity(self.batch_size);
        let mut seq = 0_u64;

        loop {
            let doc = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = input.recv() => {
                    let Some(doc) = msg else { break; };
                    doc
                }
            };

            buf.push(doc);
            if buf.len() >= self.batch_size {
                seq += 1;
                let docs = std::mem::replace(&mut buf, Vec::with_capacity(self.batch_size));
                if !self.emit(seq, docs, &output, &cancel).await? {
                    return Ok(());
                }
            }
        }

        // Input exhausted: flush the remainder. An empty flush emits nothing
        // and counts no batch.
        if !buf.is_empty() {
            seq += 1;
            let docs = std::mem::take(&mut buf);
            if !self.emit(seq, docs, &output, &cancel).await? {
                return Ok(());
            }
        }

        self.tracker.exhaust();
        Ok(())
    }
}
