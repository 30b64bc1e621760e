//! Issue store operations.
//!
//! Functions for writing synced issues, including the bulk upsert path the
//! sync engine uses for whole pages and the pruning pass that removes rows
//! the remote no longer reports.

mod bulk;
mod errors;
mod single;

pub use bulk::{
    DEFAULT_BULK_UPSERT_BACKOFF_MS, DEFAULT_BULK_UPSERT_RETRIES, bulk_upsert,
    bulk_upsert_with_retry, count_by_repo, delete_missing,
};
pub use errors::{Result, StoreError};
pub use single::{delete_by_natural_key, find_by_natural_key, upsert};
