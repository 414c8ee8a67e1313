//! Progress reporting for long-running operations.

/// Receives status and refresh callbacks from the driver and optimizer.
///
/// There is no timeout mechanism; an embedder that needs a wall-clock
/// budget must impose it around the call.
pub trait AlignObserver: Send + Sync {
    /// Human-readable progress line.
    fn status(&self, _message: &str) {}

    /// A section's tile transforms changed and any display should refresh.
    fn section_updated(&self, _section: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl AlignObserver for NoopObserver {}
