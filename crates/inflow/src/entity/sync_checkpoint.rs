//! SyncCheckpoint entity - durable pagination cursors.
//!
//! One row per (entity, sync kind) pair. A present row means that sync is
//! unfinished and should resume from the stored cursor; absence means the
//! last run completed and the next one starts from the beginning.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of sync a checkpoint belongs to. The same entity can have
/// independent checkpoints for different kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum SyncKind {
    /// Issue sync for one repository.
    #[sea_orm(string_value = "issues")]
    Issues,
    /// Pull request sync for one repository. No job drives this kind
    /// yet; the variant reserves the string value so existing checkpoint
    /// rows survive when the job lands.
    #[sea_orm(string_value = "pull_requests")]
    PullRequests,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Issues => write!(f, "issues"),
            SyncKind::PullRequests => write!(f, "pull_requests"),
        }
    }
}

/// SyncCheckpoint model - the cursor of an in-flight paginated sync.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_checkpoints")]
pub struct Model {
    /// Identifier of the thing being synced, e.g. `<scope>:<owner>/<name>`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub sync_kind: SyncKind,

    /// Opaque upstream cursor of the last fully processed page.
    #[sea_orm(column_type = "Text", nullable)]
    pub cursor: Option<String>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Build the checkpoint entity id for a repository within a scope.
    pub fn repo_key(scope: Uuid, repo: &str) -> String {
        format!("{scope}:{repo}")
    }
}
