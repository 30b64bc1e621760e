//! Sync infrastructure: the pagination engine, checkpointing, progress
//! events, and the per-repository sync jobs built on top of them.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `Termination`, `PaginationResult`, `SyncOptions`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`paginate`] - The engine: `PaginationEngine`, `PageRequest`, `Page`, `PageFlow`
//! - [`checkpoint`] - Durable cursors: `load_cursor()`, `save_cursor()`, `clear_cursor()`
//! - [`issues`] - The issue sync job: `sync_repo_issues()`

pub mod checkpoint;
pub mod issues;
pub mod paginate;
mod progress;
mod types;

pub use issues::{sync_repo_issues, ISSUES_QUERY};
pub use paginate::{Page, PageFlow, PageRequest, PaginationEngine};
pub use progress::{emit, ProgressCallback, SyncProgress};
pub use types::{
    PaginationResult, SyncOptions, SyncOutcome, Termination, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE,
    MAX_FETCH_ATTEMPTS, PAGE_DELAY_MS,
};
