//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reply from a progress monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Keep processing.
    Continue,
    /// Stop before the next data set; the run ends as `Cancelled`.
    Cancel,
}

/// Callback invoked once per completed data set.
///
/// This is the only cancellation point: a `Cancel` reply takes effect at
/// the next data set boundary, there is no mid-dataset cancellation
/// guarantee.
pub trait ProgressMonitor: Send + Sync {
    /// Reports that `completed` of `total` data sets are done; `name` is the
    /// data set just finished.
    fn dataset_complete(&self, name: &str, completed: usize, total: usize) -> Signal;
}

/// A monitor driven by a shared flag, for callers that cancel from another
/// thread.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation at the next data set boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl ProgressMonitor for CancelFlag {
    fn dataset_complete(&self, _name: &str, _completed: usize, _total: usize) -> Signal {
        if self.is_cancelled() {
            Signal::Cancel
        } else {
            Signal::Continue
        }
    }
}
