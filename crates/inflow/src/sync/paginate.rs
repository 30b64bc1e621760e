//! Resumable cursor-pagination engine.
//!
//! One engine instance drives any connection-shaped query: it owns the
//! fetch/classify/retry loop, budget-aware throttling, and the checkpoint
//! protocol, while the caller supplies the query, a page processor, and a
//! checkpoint sink. The engine never returns an error; every way a run can
//! end is a [`Termination`] so callers always learn how far it got.
//!
//! A page that arrives while the budget is already critical is still
//! processed and checkpointed before the run ends with
//! [`Termination::RateLimitCritical`], so that final page counts toward
//! `pages_processed` and is never refetched on resume.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, GraphClient, GraphEnvelope, PageInfo};
use crate::cancel::CancelFlag;
use crate::classify::{
    ClassificationResult, ErrorCategory, ExceptionClassifier, DEFAULT_RATE_LIMIT_WAIT,
};
use crate::limits::RateLimitTracker;
use crate::retry::BackoffPolicy;
use crate::sync::progress::{emit, ProgressCallback, SyncProgress};
use crate::sync::types::{
    PaginationResult, Termination, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, MAX_FETCH_ATTEMPTS,
    PAGE_DELAY_MS,
};

/// One paginated query to drive to completion.
///
/// The query document must accept `$pageSize: Int!` and `$after: String`
/// variables and request `pageInfo { hasNextPage endCursor }` on the
/// target connection.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub scope: Uuid,
    pub query: String,
    /// Fixed variables merged into every page's request.
    pub variables: Map<String, Value>,
    /// Field path from the data root to the connection, e.g.
    /// `["repository", "issues"]`.
    pub connection_path: Vec<String>,
    /// Label used in logs.
    pub context: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// Cursor to resume from, typically a stored checkpoint.
    pub start_cursor: Option<String>,
}

impl PageRequest {
    pub fn new(
        scope: Uuid,
        query: impl Into<String>,
        connection_path: Vec<String>,
    ) -> Result<Self, ApiError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ApiError::internal("pagination query must not be empty"));
        }
        if connection_path.is_empty() {
            return Err(ApiError::internal("connection path must not be empty"));
        }
        let context = connection_path.join(".");
        Ok(Self {
            scope,
            query,
            variables: Map::new(),
            connection_path,
            context,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            start_cursor: None,
        })
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    #[must_use]
    pub fn with_start_cursor(mut self, cursor: Option<String>) -> Self {
        self.start_cursor = cursor;
        self
    }
}

/// One fetched page, handed to the processor.
#[derive(Debug, Clone)]
pub struct Page {
    /// Page number within this run (1-indexed).
    pub index: u32,
    pub nodes: Vec<Value>,
    pub page_info: PageInfo,
}

/// Processor verdict after handling a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlow {
    Continue,
    /// Stop cleanly after this page. The checkpoint is kept so the next
    /// run resumes here.
    Stop,
}

enum FetchOutcome {
    Fetched(GraphEnvelope),
    Cancelled,
    Failed(ClassificationResult),
}

/// Drives paginated queries with retries, budget throttling, and durable
/// checkpoints.
pub struct PaginationEngine {
    client: Arc<dyn GraphClient>,
    tracker: Arc<RateLimitTracker>,
    classifier: Arc<ExceptionClassifier>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    page_delay: Duration,
}

impl PaginationEngine {
    #[must_use]
    pub fn new(
        client: Arc<dyn GraphClient>,
        tracker: Arc<RateLimitTracker>,
        classifier: Arc<ExceptionClassifier>,
    ) -> Self {
        Self {
            client,
            tracker,
            classifier,
            backoff: BackoffPolicy::default(),
            max_attempts: MAX_FETCH_ATTEMPTS,
            page_delay: Duration::from_millis(PAGE_DELAY_MS),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn classifier(&self) -> &Arc<ExceptionClassifier> {
        &self.classifier
    }

    /// Run `request` to one of the eight terminations.
    ///
    /// `processor` is called once per fetched page and may stop the run.
    /// `save_checkpoint` is called with the page's end cursor after the
    /// processor succeeds; a failed save is logged and the run continues,
    /// since the worst case is refetching one page on resume.
    pub async fn paginate<P, PFut, C, CFut>(
        &self,
        request: &PageRequest,
        mut processor: P,
        mut save_checkpoint: C,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressCallback>,
    ) -> PaginationResult
    where
        P: FnMut(Page) -> PFut,
        PFut: Future<Output = Result<PageFlow, ApiError>>,
        C: FnMut(String) -> CFut,
        CFut: Future<Output = Result<(), ApiError>>,
    {
        let mut cursor = request.start_cursor.clone();
        let mut pages_processed = 0u32;
        let mut total_items = 0usize;

        let finish = |termination: Termination, pages: u32, last: Option<ClassificationResult>| {
            info!(
                context = %request.context,
                scope = %request.scope,
                %termination,
                pages,
                "pagination run ended"
            );
            PaginationResult {
                pages_processed: pages,
                termination,
                last_failure: last,
            }
        };

        loop {
            if cancel.is_cancelled() {
                return finish(Termination::Interrupted, pages_processed, None);
            }
            if pages_processed >= request.max_pages {
                warn!(
                    context = %request.context,
                    max_pages = request.max_pages,
                    "page cap reached before pagination finished"
                );
                return finish(Termination::MaxPagesReached, pages_processed, None);
            }

            let page_size = self.tracker.adapt_page_size(request.scope, request.page_size);
            if page_size != request.page_size {
                debug!(
                    context = %request.context,
                    requested = request.page_size,
                    adapted = page_size,
                    "page size reduced under budget pressure"
                );
            }
            let variables = build_variables(&request.variables, page_size, cursor.as_deref());

            let envelope = match self
                .fetch_with_retry(request, variables, cancel, on_progress)
                .await
            {
                FetchOutcome::Fetched(envelope) => envelope,
                FetchOutcome::Cancelled => {
                    return finish(Termination::Interrupted, pages_processed, None);
                }
                FetchOutcome::Failed(details) => {
                    let termination = termination_for(details.category);
                    return finish(termination, pages_processed, Some(details));
                }
            };

            // Structured errors on a 200 end the run; the classification
            // decides whether the caller should treat it as transient.
            if envelope.has_errors() {
                let details = match self.classifier.classify_structured_errors(&envelope.errors) {
                    Some(details) => details,
                    None => self
                        .classifier
                        .classify_with_details(&ApiError::Graph {
                            errors: envelope.errors.clone(),
                        }),
                };
                warn!(
                    context = %request.context,
                    category = %details.category,
                    message = %details.message,
                    "upstream returned structured errors"
                );
                let termination = if details.is_retryable() {
                    Termination::TransientError
                } else {
                    Termination::InvalidResponse
                };
                return finish(termination, pages_processed, Some(details));
            }

            self.tracker
                .observe(request.scope, envelope.rate_limit().as_ref());

            if envelope.data.is_none() {
                error!(context = %request.context, "response carried neither data nor errors");
                return finish(Termination::InvalidResponse, pages_processed, None);
            }
            let Some(connection) = envelope.connection(&request.connection_path) else {
                warn!(
                    context = %request.context,
                    path = request.connection_path.join("."),
                    "connection resolved to null"
                );
                return finish(Termination::NullConnection, pages_processed, None);
            };

            pages_processed += 1;
            total_items += connection.nodes.len();
            let page = Page {
                index: pages_processed,
                nodes: connection.nodes,
                page_info: connection.page_info,
            };
            let page_info = page.page_info.clone();
            let count = page.nodes.len();

            let flow = match self
                .process_with_retry(request, &mut processor, page, cancel)
                .await
            {
                Ok(flow) => flow,
                Err(ProcessAbort::Cancelled) => {
                    // The page was not fully processed; do not count it.
                    return finish(Termination::Interrupted, pages_processed - 1, None);
                }
                Err(ProcessAbort::Failed(details)) => {
                    let termination = termination_for(details.category);
                    return finish(termination, pages_processed - 1, Some(details));
                }
            };

            emit(
                on_progress,
                SyncProgress::PageSynced {
                    page: pages_processed,
                    count,
                    total_so_far: total_items,
                },
            );

            if let Some(end_cursor) = page_info.end_cursor.clone() {
                if let Err(err) = save_checkpoint(end_cursor).await {
                    warn!(
                        context = %request.context,
                        error = %err,
                        "checkpoint save failed; resume will refetch this page"
                    );
                }
            }

            if flow == PageFlow::Stop {
                return finish(Termination::ProcessorStop, pages_processed, None);
            }
            if !page_info.has_next_page {
                return finish(Termination::Completed, pages_processed, None);
            }
            let Some(next) = page_info.end_cursor else {
                error!(
                    context = %request.context,
                    "hasNextPage without endCursor; refusing to loop on a stuck cursor"
                );
                return finish(Termination::InvalidResponse, pages_processed, None);
            };
            cursor = Some(next);

            // Yield rather than block when the budget bottoms out
            // mid-run; the checkpoint already covers everything done.
            if self.tracker.is_critical(request.scope) {
                warn!(
                    context = %request.context,
                    remaining = self.tracker.remaining(request.scope),
                    "budget critical, yielding with checkpoint intact"
                );
                return finish(Termination::RateLimitCritical, pages_processed, None);
            }

            let delay = self.page_delay.max(self.tracker.recommended_delay(request.scope));
            if !delay.is_zero() && !cancel.sleep(delay).await {
                return finish(Termination::Interrupted, pages_processed, None);
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        request: &PageRequest,
        variables: Value,
        cancel: &CancelFlag,
        on_progress: Option<&ProgressCallback>,
    ) -> FetchOutcome {
        let mut attempt = 0u32;
        loop {
            match self
                .client
                .execute(request.scope, &request.query, variables.clone())
                .await
            {
                Ok(envelope) => return FetchOutcome::Fetched(envelope),
                Err(err) => {
                    let details = self.classifier.classify_with_details(&err);
                    let retries_left = attempt + 1 < self.max_attempts;
                    match details.category {
                        ErrorCategory::Retryable if retries_left => {
                            let delay = self.backoff.delay(attempt);
                            warn!(
                                context = %request.context,
                                attempt = attempt + 1,
                                delay_ms = delay.as_millis() as u64,
                                error = %details.message,
                                "page fetch failed, retrying"
                            );
                            emit(
                                on_progress,
                                SyncProgress::Retrying {
                                    attempt: attempt + 1,
                                    category: details.category,
                                    delay,
                                },
                            );
                            if !cancel.sleep(delay).await {
                                return FetchOutcome::Cancelled;
                            }
                        }
                        ErrorCategory::RateLimited if retries_left => {
                            let wait = details
                                .suggested_wait
                                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
                                .min(self.tracker.config().max_wait);
                            warn!(
                                context = %request.context,
                                wait_secs = wait.as_secs(),
                                "rate limited mid-fetch, pausing"
                            );
                            emit(on_progress, SyncProgress::RateLimitPause { wait });
                            if !cancel.sleep(wait).await {
                                return FetchOutcome::Cancelled;
                            }
                        }
                        _ => {
                            error!(
                                context = %request.context,
                                category = %details.category,
                                error = %details.message,
                                "page fetch failed terminally"
                            );
                            return FetchOutcome::Failed(details);
                        }
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn process_with_retry<P, PFut>(
        &self,
        request: &PageRequest,
        processor: &mut P,
        page: Page,
        cancel: &CancelFlag,
    ) -> Result<PageFlow, ProcessAbort>
    where
        P: FnMut(Page) -> PFut,
        PFut: Future<Output = Result<PageFlow, ApiError>>,
    {
        let mut attempt = 0u32;
        loop {
            match processor(page.clone()).await {
                Ok(flow) => return Ok(flow),
                Err(err) => {
                    let details = self.classifier.classify_with_details(&err);
                    if details.category == ErrorCategory::Retryable
                        && attempt + 1 < self.max_attempts
                    {
                        let delay = self.backoff.delay(attempt);
                        warn!(
                            context = %request.context,
                            page = page.index,
                            attempt = attempt + 1,
                            error = %details.message,
                            "page processing failed, retrying"
                        );
                        if !cancel.sleep(delay).await {
                            return Err(ProcessAbort::Cancelled);
                        }
                        attempt += 1;
                    } else {
                        error!(
                            context = %request.context,
                            page = page.index,
                            category = %details.category,
                            error = %details.message,
                            "page processing failed terminally"
                        );
                        return Err(ProcessAbort::Failed(details));
                    }
                }
            }
        }
    }
}

enum ProcessAbort {
    Cancelled,
    Failed(ClassificationResult),
}

fn termination_for(category: ErrorCategory) -> Termination {
    match category {
        ErrorCategory::RateLimited => Termination::RateLimitCritical,
        ErrorCategory::Retryable => Termination::TransientError,
        _ => Termination::InvalidResponse,
    }
}

fn build_variables(fixed: &Map<String, Value>, page_size: u32, cursor: Option<&str>) -> Value {
    let mut variables = fixed.clone();
    variables.insert("pageSize".to_string(), Value::from(page_size));
    variables.insert(
        "after".to_string(),
        cursor.map_or(Value::Null, Value::from),
    );
    Value::Object(variables)
}
