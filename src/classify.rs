//! Sorting bulk response items into successes, skipped duplicates and
//! genuine errors.
//!
//! Per-batch state ([`BatchReport`]) is owned by the dispatch that produced
//! it; only the [`ErrorSummary`] is shared across in-flight batches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use crate::ident::{WriteMode, WriteOp};
use crate::sink::BulkResponse;

pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const NO_REASON: &str = "no reason found";

/// Key of one row in the aggregate summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SummaryKey {
    /// An operation rejected with this HTTP status.
    Status(u16),
    /// A create-mode duplicate, skipped on purpose.
    Skipped,
    /// A bulk call that failed before yielding per-operation detail.
    Transport,
}

impl fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryKey::Status(code) => write!(f, "{code}"),
            SummaryKey::Skipped => write!(f, "Skipped"),
            SummaryKey::Transport => write!(f, "Transport"),
        }
    }
}

/// Run-lifetime status counters, shared by every in-flight dispatch.
#[derive(Debug, Default)]
pub struct ErrorSummary {
    counts: Mutex<BTreeMap<SummaryKey, u64>>,
}

impl ErrorSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: SummaryKey) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(key).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> BTreeMap<SummaryKey, u64> {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn total(&self) -> u64 {
        self.snapshot().values().sum()
    }

    pub fn count(&self, key: SummaryKey) -> u64 {
        self.snapshot().get(&key).copied().unwrap_or(0)
    }
}

/// One classified write error, positioned within its batch.
#[derive(Debug, Clone)]
pub struct WriteError {
    /// Index of the operation within the batch.
    pub op_index: usize,
    pub status: u16,
    pub kind: String,
    pub reason: String,
}

impl WriteError {
    /// 429 means the store rejected a valid document for capacity reasons;
    /// re-running the tool may succeed. Other 4xx statuses need the document
    /// or mapping fixed first.
    pub fn is_retryable(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }
}

/// The classified outcome of one batch. Scoped to a single dispatch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub seq: u64,
    pub doc_count: usize,
    pub skipped: usize,
    pub errors: Vec<WriteError>,
}

impl BatchReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Classifies every item of a bulk response against the operations sent.
///
/// A 409 on a create-only operation is the expected outcome for re-ingested
/// content and counts as a skip; in upsert mode an upsert should never
/// conflict, so a 409 is a genuine error like any other status.
pub fn classify_batch(
    seq: u64,
    ops: &[WriteOp],
    response: &BulkResponse,
    verbose: bool,
    summary: &ErrorSummary,
) -> BatchReport {
    let mut report = BatchReport {
        seq,
        doc_count: ops.len(),
        skipped: 0,
        errors: Vec::new(),
    };

    for (op_index, (op, item)) in ops.iter().zip(response.items.iter()).enumerate() {
        let Some(error) = item.error() else {
            continue;
        };

        if item.status() == STATUS_CONFLICT && op.mode == WriteMode::Create {
            report.skipped += 1;
            if verbose {
                summary.record(SummaryKey::Skipped);
            }
            continue;
        }

        report.errors.push(WriteError {
            op_index,
            status: item.status(),
            kind: error.kind.clone(),
            reason: error
                .reason
                .clone()
                .unwrap_or_else(|| NO_REASON.to_owned()),
        });
        summary.record(SummaryKey::Status(item.status()));
    }

    report
}
