//! Issue entity - a synced remote issue.
//!
//! The natural key is (scope, repo, number): the same upstream issue seen
//! through two scopes is two rows, and re-syncing a page updates in place
//! instead of duplicating.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Issue model - local mirror of one remote issue.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "issues")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning scope.
    pub scope_id: Uuid,

    /// Repository in `owner/name` form.
    pub repo: String,

    /// Issue number within the repository.
    pub number: i64,

    pub title: String,

    /// Upstream state string (`OPEN`, `CLOSED`).
    pub state: String,

    /// Login of the author; deleted accounts come back as `None`.
    pub author: Option<String>,

    /// Upstream last-modified time.
    pub remote_updated_at: Option<DateTimeWithTimeZone>,

    /// When this row was last written by a sync run.
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
