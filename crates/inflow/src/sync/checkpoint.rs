//! Durable pagination cursors.
//!
//! The protocol: save the cursor after each fully processed page, resume
//! from the stored cursor on the next run, and remove the row only after a
//! run that saw the final page. Replayed pages are harmless because all
//! writes upsert by natural key.

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, sea_query::OnConflict};
use tracing::debug;
use uuid::Uuid;

use crate::entity::prelude::{SyncCheckpoint, SyncCheckpointActiveModel, SyncCheckpointColumn, SyncKind};
use crate::entity::sync_checkpoint;

pub use crate::repository::{Result, StoreError};

/// Build the checkpoint entity id for a repository within a scope.
#[must_use]
pub fn repo_key(scope: Uuid, repo: &str) -> String {
    sync_checkpoint::Model::repo_key(scope, repo)
}

/// Load the cursor to resume from, if an unfinished sync left one.
pub async fn load_cursor(
    db: &DatabaseConnection,
    entity_id: &str,
    kind: SyncKind,
) -> Result<Option<String>> {
    let row = SyncCheckpoint::find()
        .filter(SyncCheckpointColumn::EntityId.eq(entity_id))
        .filter(SyncCheckpointColumn::SyncKind.eq(kind))
        .one(db)
        .await?;
    Ok(row.and_then(|r| r.cursor))
}

/// Record the cursor of the last fully processed page.
///
/// Upserts on the (entity, kind) key so repeated saves during one run keep
/// a single row.
pub async fn save_cursor(
    db: &DatabaseConnection,
    entity_id: &str,
    kind: SyncKind,
    cursor: &str,
) -> Result<()> {
    let model = SyncCheckpointActiveModel {
        entity_id: Set(entity_id.to_string()),
        sync_kind: Set(kind),
        cursor: Set(Some(cursor.to_string())),
        updated_at: Set(Utc::now().into()),
    };
    SyncCheckpoint::insert(model)
        .on_conflict(
            OnConflict::columns([
                SyncCheckpointColumn::EntityId,
                SyncCheckpointColumn::SyncKind,
            ])
            .update_columns([SyncCheckpointColumn::Cursor, SyncCheckpointColumn::UpdatedAt])
            .to_owned(),
        )
        .exec(db)
        .await?;
    debug!(entity_id, %kind, cursor, "checkpoint saved");
    Ok(())
}

/// Remove the checkpoint after a completed run.
///
/// Returns `true` if a row existed. Idempotent: clearing an absent
/// checkpoint succeeds.
pub async fn clear_cursor(
    db: &DatabaseConnection,
    entity_id: &str,
    kind: SyncKind,
) -> Result<bool> {
    let result = SyncCheckpoint::delete_many()
        .filter(SyncCheckpointColumn::EntityId.eq(entity_id))
        .filter(SyncCheckpointColumn::SyncKind.eq(kind))
        .exec(db)
        .await?;
    debug!(entity_id, %kind, existed = result.rows_affected > 0, "checkpoint cleared");
    Ok(result.rows_affected > 0)
}
