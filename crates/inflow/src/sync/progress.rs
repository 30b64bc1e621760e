//! Progress reporting types for sync operations.
//!
//! Events are emitted through an optional callback so the library stays
//! silent by default and the CLI can render them however it likes.

use std::time::Duration;

use crate::classify::ErrorCategory;
use crate::sync::types::Termination;

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A sync run is starting.
    Started {
        /// Repository in `owner/name` form.
        repo: String,
        /// Cursor the run resumes from, if a checkpoint existed.
        resumed_from: Option<String>,
    },

    /// A page was fetched and its items stored.
    PageSynced {
        /// Page number within this run (1-indexed).
        page: u32,
        /// Number of items on this page.
        count: usize,
        /// Running total of items processed so far.
        total_so_far: usize,
    },

    /// A page fetch failed and will be retried after a pause.
    Retrying {
        /// Attempt number that just failed (1-indexed).
        attempt: u32,
        category: ErrorCategory,
        delay: Duration,
    },

    /// The run is pausing because the API budget is exhausted.
    RateLimitPause { wait: Duration },

    /// Local rows missing upstream were removed after a complete pass.
    Pruned { count: u64 },

    /// The run ended.
    Finished {
        repo: String,
        termination: Termination,
        pages: u32,
    },
}

/// Callback for receiving progress events.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_with_callback_invokes_it() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let callback: ProgressCallback = Box::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), SyncProgress::Pruned { count: 3 });
        emit(Some(&callback), SyncProgress::Pruned { count: 4 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emit_without_callback_is_a_noop() {
        emit(
            None,
            SyncProgress::Started {
                repo: "octo/hello".to_string(),
                resumed_from: None,
            },
        );
    }
}
