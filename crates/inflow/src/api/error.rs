//! Error type for upstream API interaction.
//!
//! Variants are grouped by transport layer so the classifier can reason
//! about them without string matching where a structured signal exists.

use thiserror::Error;
use uuid::Uuid;

use super::envelope::{summarize_errors, GraphErrorItem};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Socket-level and client-side failures from the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status, with whatever budget headers were present.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Parsed `Retry-After` header, in seconds.
        retry_after: Option<u64>,
        /// Parsed `x-ratelimit-remaining` header.
        rate_limit_remaining: Option<i64>,
        /// Parsed `x-ratelimit-reset` header, as a Unix timestamp.
        rate_limit_reset: Option<i64>,
    },

    /// HTTP 200 with structured errors in the response body.
    #[error("upstream returned errors: {}", summarize_errors(errors))]
    Graph { errors: Vec<GraphErrorItem> },

    /// The credential for this scope is suspended or missing.
    #[error("credentials unavailable for scope {scope}")]
    Suspended { scope: Uuid },

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// A wrapped error annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ApiError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Wrap this error with a description of the failing operation.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Strip one `Context` layer, if present.
    #[must_use]
    pub fn inner(&self) -> &ApiError {
        match self {
            Self::Context { source, .. } => source,
            other => other,
        }
    }
}
