//! Maps API failures onto a small set of handling categories.
//!
//! Every error the sync pipeline encounters funnels through here once, and
//! the resulting category decides the whole downstream reaction: retry with
//! backoff, pause for budget, skip the entity, or abort. Classification is
//! pure with respect to its input; the only state is per-category counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DbErr;
use serde::Serialize;
use tracing::debug;

use super::transport::is_transport_error;
use crate::api::{ApiError, GraphErrorItem};

/// Fallback pause when a rate-limit error carries no reset information.
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Handling category for a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Transient; retry with backoff.
    Retryable,
    /// Budget exhausted or secondary limit hit; pause, then retry.
    RateLimited,
    /// The remote entity no longer exists; skip it.
    NotFound,
    /// Credentials rejected or insufficient; abort, never retry.
    AuthError,
    /// The request itself is malformed or too expensive; abort, fix the query.
    ClientError,
    /// Unrecognized; abort conservatively rather than retry blindly.
    Unknown,
}

impl ErrorCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::AuthError => "auth_error",
            Self::ClientError => "client_error",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored category name. Unrecognized names fall back to
    /// `Unknown` so old records never fail to load.
    #[must_use]
    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "retryable" => Self::Retryable,
            "rate_limited" => Self::RateLimited,
            "not_found" => Self::NotFound,
            "auth_error" => Self::AuthError,
            "client_error" => Self::ClientError,
            other => {
                if other != "unknown" {
                    debug!(value = other, "unrecognized error category name");
                }
                Self::Unknown
            }
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category plus whatever timing hints the error carried.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub category: ErrorCategory,
    /// When the budget window resets, if the error said so.
    pub reset_at: Option<DateTime<Utc>>,
    /// How long the caller should pause before retrying, if the error said so.
    pub suggested_wait: Option<Duration>,
    /// Human-readable description for logs.
    pub message: String,
}

impl ClassificationResult {
    fn plain(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            reset_at: None,
            suggested_wait: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Retryable | ErrorCategory::RateLimited
        )
    }
}

/// Counts of classified errors per category, for the run summary.
#[derive(Debug, Default)]
pub struct CategoryCounters {
    retryable: AtomicU64,
    rate_limited: AtomicU64,
    not_found: AtomicU64,
    auth_error: AtomicU64,
    client_error: AtomicU64,
    unknown: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorySnapshot {
    pub retryable: u64,
    pub rate_limited: u64,
    pub not_found: u64,
    pub auth_error: u64,
    pub client_error: u64,
    pub unknown: u64,
}

impl CategoryCounters {
    fn slot(&self, category: ErrorCategory) -> &AtomicU64 {
        match category {
            ErrorCategory::Retryable => &self.retryable,
            ErrorCategory::RateLimited => &self.rate_limited,
            ErrorCategory::NotFound => &self.not_found,
            ErrorCategory::AuthError => &self.auth_error,
            ErrorCategory::ClientError => &self.client_error,
            ErrorCategory::Unknown => &self.unknown,
        }
    }

    pub fn record(&self, category: ErrorCategory) {
        self.slot(category).fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self, category: ErrorCategory) -> u64 {
        self.slot(category).load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> CategorySnapshot {
        CategorySnapshot {
            retryable: self.retryable.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            auth_error: self.auth_error.load(Ordering::Relaxed),
            client_error: self.client_error.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

/// Stateless decision procedure over [`ApiError`], plus counters.
#[derive(Debug, Default)]
pub struct ExceptionClassifier {
    counters: CategoryCounters,
}

impl ExceptionClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, error: &ApiError) -> ErrorCategory {
        self.classify_with_details(error).category
    }

    /// Classify with timing hints. Increments the matching counter.
    pub fn classify_with_details(&self, error: &ApiError) -> ClassificationResult {
        let result = self.classify_inner(error.inner());
        self.counters.record(result.category);
        result
    }

    /// Classify a structured `errors[]` array from a 200 response.
    ///
    /// Returns `None` when no entry maps to a known category; the caller
    /// decides how to handle an unrecognized error shape. A `Some` result
    /// increments the matching counter.
    pub fn classify_structured_errors(
        &self,
        errors: &[GraphErrorItem],
    ) -> Option<ClassificationResult> {
        let result = self.structured_inner(errors)?;
        self.counters.record(result.category);
        Some(result)
    }

    #[must_use]
    pub fn is_retryable(&self, error: &ApiError) -> bool {
        self.classify_with_details(error).is_retryable()
    }

    #[must_use]
    pub fn counters(&self) -> &CategoryCounters {
        &self.counters
    }

    fn classify_inner(&self, error: &ApiError) -> ClassificationResult {
        match error {
            ApiError::Suspended { scope } => ClassificationResult::plain(
                ErrorCategory::AuthError,
                format!("credentials unavailable for scope {scope}"),
            ),
            ApiError::Db(db_err) => {
                if is_transient_db_error(db_err) {
                    ClassificationResult::plain(ErrorCategory::Retryable, db_err.to_string())
                } else {
                    ClassificationResult::plain(ErrorCategory::Unknown, db_err.to_string())
                }
            }
            ApiError::Transport(req_err) => self.classify_transport(req_err),
            ApiError::Http {
                status,
                message,
                retry_after,
                rate_limit_remaining,
                rate_limit_reset,
            } => self.classify_status(
                *status,
                message,
                *retry_after,
                *rate_limit_remaining,
                *rate_limit_reset,
            ),
            ApiError::Graph { errors } => self
                .structured_inner(errors)
                .unwrap_or_else(|| self.classify_message(&error.to_string())),
            ApiError::Internal(message) => self.classify_message(message),
            ApiError::Context { .. } => self.classify_message(&error.to_string()),
        }
    }

    fn classify_transport(&self, error: &reqwest::Error) -> ClassificationResult {
        if error.is_timeout() {
            return ClassificationResult::plain(ErrorCategory::Retryable, "request timed out");
        }
        if is_transport_error(error) {
            return ClassificationResult::plain(
                ErrorCategory::Retryable,
                format!("transport failure: {error}"),
            );
        }
        if let Some(status) = error.status() {
            return self.classify_status(status.as_u16(), &error.to_string(), None, None, None);
        }
        self.classify_message(&error.to_string())
    }

    fn classify_status(
        &self,
        status: u16,
        message: &str,
        retry_after: Option<u64>,
        rate_limit_remaining: Option<i64>,
        rate_limit_reset: Option<i64>,
    ) -> ClassificationResult {
        match status {
            400 | 422 => ClassificationResult::plain(
                ErrorCategory::ClientError,
                format!("HTTP {status}: {message}"),
            ),
            401 => ClassificationResult::plain(
                ErrorCategory::AuthError,
                format!("HTTP 401: {message}"),
            ),
            403 => {
                // A 403 is a rate-limit response only when the budget headers
                // or the body say so; otherwise it is a permissions problem.
                if rate_limit_remaining == Some(0) || mentions_rate_limit(message) {
                    self.rate_limited(
                        format!("HTTP 403 rate limited: {message}"),
                        retry_after,
                        rate_limit_reset,
                    )
                } else {
                    ClassificationResult::plain(
                        ErrorCategory::AuthError,
                        format!("HTTP 403: {message}"),
                    )
                }
            }
            404 => ClassificationResult::plain(
                ErrorCategory::NotFound,
                format!("HTTP 404: {message}"),
            ),
            429 => self.rate_limited(
                format!("HTTP 429: {message}"),
                retry_after,
                rate_limit_reset,
            ),
            500..=599 => ClassificationResult::plain(
                ErrorCategory::Retryable,
                format!("HTTP {status}: {message}"),
            ),
            _ if (400..500).contains(&status) => ClassificationResult::plain(
                ErrorCategory::ClientError,
                format!("HTTP {status}: {message}"),
            ),
            _ => ClassificationResult::plain(
                ErrorCategory::Unknown,
                format!("HTTP {status}: {message}"),
            ),
        }
    }

    fn rate_limited(
        &self,
        message: String,
        retry_after: Option<u64>,
        rate_limit_reset: Option<i64>,
    ) -> ClassificationResult {
        let reset_at = rate_limit_reset.and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        let suggested_wait = retry_after
            .map(Duration::from_secs)
            .or_else(|| {
                reset_at.and_then(|at| (at - Utc::now()).to_std().ok())
            })
            .or(Some(DEFAULT_RATE_LIMIT_WAIT));
        ClassificationResult {
            category: ErrorCategory::RateLimited,
            reset_at,
            suggested_wait,
            message,
        }
    }

    fn structured_inner(&self, errors: &[GraphErrorItem]) -> Option<ClassificationResult> {
        if errors.is_empty() {
            return None;
        }
        for error in errors {
            if let Some(kind) = error.kind() {
                if let Some(result) = self.classify_structured_kind(kind, &error.message) {
                    return Some(result);
                }
            }
        }
        // No recognized code; fall back to message inspection.
        for error in errors {
            if mentions_rate_limit(&error.message) {
                return Some(self.rate_limited(error.message.clone(), None, None));
            }
            if mentions_timeout(&error.message) {
                return Some(ClassificationResult::plain(
                    ErrorCategory::Retryable,
                    error.message.clone(),
                ));
            }
        }
        None
    }

    fn classify_structured_kind(&self, kind: &str, message: &str) -> Option<ClassificationResult> {
        match kind {
            "NOT_FOUND" => Some(ClassificationResult::plain(
                ErrorCategory::NotFound,
                message.to_string(),
            )),
            "RATE_LIMITED" | "RATE_LIMIT" => Some(self.rate_limited(message.to_string(), None, None)),
            "FORBIDDEN" => {
                if mentions_rate_limit(message) {
                    Some(self.rate_limited(message.to_string(), None, None))
                } else {
                    Some(ClassificationResult::plain(
                        ErrorCategory::AuthError,
                        message.to_string(),
                    ))
                }
            }
            "UNAUTHORIZED" => Some(ClassificationResult::plain(
                ErrorCategory::AuthError,
                message.to_string(),
            )),
            "MAX_NODE_LIMIT_EXCEEDED" | "RESOURCE_LIMITS_EXCEEDED" => Some(
                ClassificationResult::plain(ErrorCategory::ClientError, message.to_string()),
            ),
            other => {
                debug!(kind = other, "unrecognized structured error code");
                None
            }
        }
    }

    fn classify_message(&self, message: &str) -> ClassificationResult {
        if mentions_rate_limit(message) {
            return self.rate_limited(message.to_string(), None, None);
        }
        if mentions_timeout(message) {
            return ClassificationResult::plain(ErrorCategory::Retryable, message.to_string());
        }
        ClassificationResult::plain(ErrorCategory::Unknown, message.to_string())
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("rate limit") || lowered.contains("abuse detection")
}

fn mentions_timeout(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("timeout") || lowered.contains("timed out")
}

/// Database failures worth retrying: lock contention, pool exhaustion, and
/// dropped connections. Matched on error text because the underlying driver
/// codes are not exposed uniformly across backends.
#[must_use]
pub fn is_transient_db_error(error: &DbErr) -> bool {
    match error {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        other => {
            let lowered = other.to_string().to_lowercase();
            lowered.contains("locked")
                || lowered.contains("busy")
                || lowered.contains("deadlock")
                || lowered.contains("timeout")
                || lowered.contains("connection")
                || lowered.contains("temporarily unavailable")
                || lowered.contains("could not serialize")
        }
    }
}
