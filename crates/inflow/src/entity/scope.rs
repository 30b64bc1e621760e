//! Scope entity - one tenant/installation with its own API budget.
//!
//! A scope owns a credential, a rate-limit window, and any number of
//! synced repositories. Scope state lives in the database so a restarted
//! process resumes with the same tenancy picture.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Scope model - one installation of the integration.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scopes")]
pub struct Model {
    /// Internal UUID primary key; also the key for budgets and credentials.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-readable name (organization or account).
    pub name: String,

    /// API host this scope talks to.
    pub host: String,

    /// Suspended scopes are skipped entirely; their credential is invalid.
    pub suspended: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
