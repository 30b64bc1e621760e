//! Inflow - resumable multi-tenant GraphQL ingestion.
//!
//! This library syncs paginated GraphQL connections into a local database,
//! one scope (tenant/installation) at a time, and survives the realities of
//! long-running ingestion: hourly API budgets, flaky connections, and
//! process restarts mid-run.
//!
//! The pieces fit together like this: a [`sync::PaginationEngine`] drives
//! any connection-shaped query page by page, a [`limits::RateLimitTracker`]
//! throttles it from the budget numbers each response reports, a
//! [`classify::ExceptionClassifier`] decides how every failure is handled,
//! and [`sync::checkpoint`] persists cursors so an interrupted run resumes
//! where it stopped.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can
//!   use [`connect_and_migrate`] to automatically run migrations on
//!   connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inflow::{connect_and_migrate, CancelFlag};
//! use inflow::api::{HttpGraphClient, StaticCredentials};
//! use inflow::classify::ExceptionClassifier;
//! use inflow::limits::RateLimitTracker;
//! use inflow::sync::{sync_repo_issues, PaginationEngine, SyncOptions};
//!
//! let db = connect_and_migrate("sqlite://inflow.db?mode=rwc").await?;
//! let client = HttpGraphClient::new(endpoint, Arc::new(credentials))?;
//! let engine = PaginationEngine::new(
//!     Arc::new(client),
//!     Arc::new(RateLimitTracker::default()),
//!     Arc::new(ExceptionClassifier::new()),
//! );
//!
//! let cancel = CancelFlag::new();
//! let outcome = sync_repo_issues(
//!     &db, &engine, scope, "octo", "hello",
//!     &SyncOptions::default(), &cancel, None,
//! ).await?;
//! println!("synced {} pages ({})", outcome.pages_processed, outcome.termination);
//! ```

pub mod api;
pub mod cancel;
pub mod classify;
pub mod db;
pub mod entity;
pub mod limits;
pub mod repository;
pub mod retry;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use api::ApiError;
pub use cancel::CancelFlag;
pub use classify::{ClassificationResult, ErrorCategory};
pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use limits::{RateLimitConfig, RateLimitTracker};
pub use repository::StoreError;
pub use retry::BackoffPolicy;
pub use sync::{SyncOptions, SyncOutcome, Termination};
