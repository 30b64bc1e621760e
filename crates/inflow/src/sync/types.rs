//! Shared sync types and constants.

use crate::classify::ClassificationResult;

/// Default page size requested from the upstream connection.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Default cap on pages per run, as a runaway guard.
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Maximum attempts for fetching a single page (first try plus retries).
pub const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Baseline pause between pages in milliseconds, applied even when the
/// budget is healthy.
pub const PAGE_DELAY_MS: u64 = 150;

/// Why a pagination run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The final page was processed; `hasNextPage` was false.
    Completed,
    /// The page cap was hit before the data ran out.
    MaxPagesReached,
    /// The page processor asked to stop early.
    ProcessorStop,
    /// Cancellation was requested.
    Interrupted,
    /// The budget went critical and the run yielded instead of waiting.
    RateLimitCritical,
    /// A transient failure survived all retry attempts.
    TransientError,
    /// The requested connection resolved to null.
    NullConnection,
    /// The response shape was unusable or a non-retryable error occurred.
    InvalidResponse,
}

impl Termination {
    /// Only a completed run counts as having seen every upstream item.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether cleanup that assumes a full pass (pruning, cursor removal)
    /// may run. Deliberately identical to [`Self::is_complete`]: a stopped
    /// or failed run must keep its checkpoint.
    #[must_use]
    pub fn allows_cleanup(&self) -> bool {
        self.is_complete()
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::MaxPagesReached => "max_pages_reached",
            Self::ProcessorStop => "processor_stop",
            Self::Interrupted => "interrupted",
            Self::RateLimitCritical => "rate_limit_critical",
            Self::TransientError => "transient_error",
            Self::NullConnection => "null_connection",
            Self::InvalidResponse => "invalid_response",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pagination run.
#[derive(Debug, Clone)]
pub struct PaginationResult {
    /// Pages fully processed during this run.
    pub pages_processed: u32,
    pub termination: Termination,
    /// Classification of the error that ended the run, when one did.
    pub last_failure: Option<ClassificationResult>,
}

/// Result of a repository sync job.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub termination: Termination,
    pub pages_processed: u32,
    /// Issues written during this run.
    pub upserted: u64,
    /// Issues removed because the remote no longer reports them.
    pub pruned: u64,
    pub last_failure: Option<ClassificationResult>,
}

/// Options for a repository sync job.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub page_size: u32,
    pub max_pages: u32,
    /// Remove local issues missing upstream after a complete pass.
    pub prune: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            prune: true,
        }
    }
}
