use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Detects the single moment a run is complete.
///
/// Batch production and batch acknowledgment advance independently (several
/// bulk calls may be in flight at once), so completion is the first point at
/// which the input is exhausted and every produced batch has been
/// acknowledged. The `fired` flag guarantees exactly one caller observes it,
/// even when counters coincide mid-stream before exhaustion.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    produced: AtomicU64,
    acknowledged: AtomicU64,
    exhausted: AtomicBool,
    fired: AtomicBool,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the batcher on every emitted batch.
    pub fn produced(&self) {
        self.produced.fetch_add(1, Ordering::SeqCst);
    }

    /// Called by the batcher once its input ends, before its output channel
    /// closes. Only sets the flag; the sink owns completion observation, so
    /// a run whose last acknowledgment lands before exhaustion (or that has
    /// zero batches) still fires exactly once, on the sink's final check.
    pub fn exhaust(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }

    /// Called once per dispatched batch, whether the bulk call succeeded or
    /// definitively failed. Returns `true` when this acknowledgment completes
    /// the run.
    pub fn acknowledge(&self) -> bool {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        self.try_complete()
    }

    /// Returns `true` exactly once, for the first caller after the terminal
    /// condition holds.
    pub fn try_complete(&self) -> bool {
        if !self.exhausted.load(Ordering::SeqCst) {
            return false;
        }
        if self.produced.load(Ordering::SeqCst) != self.acknowledged.load(Ordering::SeqCst) {
            return false;
        }
        !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn produced_count(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn acknowledged_count(&self) -> u64 {
        self.acknowledged.load(Ordering::SeqCst)
    }
}
