//! Plain-text rendering of per-batch error blocks and the final summary.
//! Formatting only; no counters are mutated here.

use crate::classify::{BatchReport, ErrorSummary};

/// Renders the error block for one batch. Only called for batches with at
/// least one classified error.
pub fn batch_block(report: &BatchReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "batch {}: {} documents, {} skipped, {} errors\n",
        report.seq,
        report.doc_count,
        report.skipped,
        report.errors.len()
    ));
    for error in &report.errors {
        out.push_str(&format!(
            "  op {}: status {} {}: {}{}\n",
            error.op_index,
            error.status,
            error.kind,
            error.reason,
            if error.is_retryable() { " (retryable)" } else { "" }
        ));
    }
    out
}

/// Renders the aggregate summary: a status -> count table, the grand total,
/// and the number of batches processed.
pub fn run_summary(summary: &ErrorSummary, batches: u64) -> String {
    let mut out = String::new();
    out.push_str("---- ingest summary ----\n");
    let snapshot = summary.snapshot();
    for (key, count) in &snapshot {
        out.push_str(&format!("  {:<12} {}\n", key.to_string(), count));
    }
    out.push_str(&format!("  {:<12} {}\n", "total", summary.total()));
    out.push_str(&format!("batches processed: {batches}\n"));
    out
}
