// layermap_core/src/stream.rs

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// An ordered queue of mapping work, shared between an orchestrator and its mappers.
///
/// The CPU build executes each operation inline when it is issued, so issue order is
/// execution order and `synchronize` has nothing to wait for. The handle still counts
/// what was issued on it so callers can check that all work went through the stream
/// they injected.
#[derive(Debug)]
pub struct ExecutionStream {
    name: String,
    issued: AtomicU64,
    synchronizations: AtomicU64,
}

impl ExecutionStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            issued: AtomicU64::new(0),
            synchronizations: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records one unit of work. Called by the component right before running it.
    pub fn issue(&self, operation: &'static str) {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(stream = %self.name, operation, n, "issued");
    }

    /// Blocks until all issued work has completed.
    pub fn synchronize(&self) {
        self.synchronizations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn num_synchronizations(&self) -> u64 {
        self.synchronizations.load(Ordering::Relaxed)
    }
}
