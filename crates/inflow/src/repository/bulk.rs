use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    sea_query::OnConflict,
};
use uuid::Uuid;

use crate::entity::issue::{ActiveModel, Column, Entity as Issue};

use super::errors::{Result, StoreError};

// ─── Bulk Operations ─────────────────────────────────────────────────────────

/// Default number of retry attempts for bulk upsert operations.
pub const DEFAULT_BULK_UPSERT_RETRIES: u32 = 3;

/// Default initial backoff delay in milliseconds for bulk upsert retries.
pub const DEFAULT_BULK_UPSERT_BACKOFF_MS: u64 = 100;

/// Bulk upsert a page of issues using SQL ON CONFLICT.
///
/// Conflict detection uses the (scope_id, repo, number) natural key, so
/// replaying a page after a crash or resume updates rows in place instead
/// of duplicating them.
///
/// # Returns
/// Returns the number of rows handed to the statement.
pub async fn bulk_upsert(db: &DatabaseConnection, models: Vec<ActiveModel>) -> Result<u64> {
    if models.is_empty() {
        return Ok(0);
    }

    let count = models.len() as u64;
    Issue::insert_many(models)
        .on_conflict(build_upsert_on_conflict())
        .exec(db)
        .await?;
    Ok(count)
}

/// Bulk upsert with retry on transient database errors.
///
/// Lock contention and dropped pool connections are retried with doubling
/// backoff; any other failure is returned immediately.
pub async fn bulk_upsert_with_retry(
    db: &DatabaseConnection,
    models: Vec<ActiveModel>,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<u64> {
    if models.is_empty() {
        return Ok(0);
    }

    tracing::debug!(count = models.len(), "Starting bulk upsert");
    let mut backoff_ms = initial_backoff_ms;

    let mut attempt = 0;
    loop {
        match bulk_upsert(db, models.clone()).await {
            Ok(count) => return Ok(count),
            Err(e) => {
                if is_retryable_error(&e) && attempt < max_retries {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms,
                        error = %e,
                        "Bulk upsert failed, retrying..."
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    attempt += 1;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

/// Delete issues of a repository whose numbers were not seen upstream.
///
/// Used after a sync run completes a full pass: anything the remote no
/// longer reports has been deleted or transferred and is pruned locally.
///
/// Returns the number of rows deleted.
pub async fn delete_missing(
    db: &DatabaseConnection,
    scope_id: Uuid,
    repo: &str,
    seen_numbers: &[i64],
) -> Result<u64> {
    let mut query = Issue::delete_many()
        .filter(Column::ScopeId.eq(scope_id))
        .filter(Column::Repo.eq(repo));
    if !seen_numbers.is_empty() {
        query = query.filter(Column::Number.is_not_in(seen_numbers.iter().copied()));
    }
    let result = query.exec(db).await?;
    Ok(result.rows_affected)
}

/// Count issues stored for a repository.
pub async fn count_by_repo(db: &DatabaseConnection, scope_id: Uuid, repo: &str) -> Result<u64> {
    use sea_orm::PaginatorTrait;

    Issue::find()
        .filter(Column::ScopeId.eq(scope_id))
        .filter(Column::Repo.eq(repo))
        .count(db)
        .await
        .map_err(StoreError::from)
}

/// Check if a store error is retryable (transient).
fn is_retryable_error(err: &StoreError) -> bool {
    match err {
        StoreError::Database(db_err) => is_retryable_db_error(db_err),
        _ => false,
    }
}

fn is_retryable_db_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let err_str = err.to_string().to_lowercase();
            // SQLite: database is locked, busy
            // PostgreSQL: connection refused, too many connections
            // General: timeout, connection reset
            err_str.contains("locked")
                || err_str.contains("busy")
                || err_str.contains("timeout")
                || err_str.contains("connection")
                || err_str.contains("temporarily unavailable")
        }
        _ => false,
    }
}

/// Build the ON CONFLICT clause used by bulk upsert.
///
/// Conflict detection uses (scope_id, repo, number) as the natural key.
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::columns([Column::ScopeId, Column::Repo, Column::Number])
        .update_columns([
            Column::Title,
            Column::State,
            Column::Author,
            Column::RemoteUpdatedAt,
            Column::SyncedAt,
        ])
        .to_owned()
}
