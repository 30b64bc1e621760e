//! Common re-exports for convenient entity usage.

pub use super::issue::{
    ActiveModel as IssueActiveModel, Column as IssueColumn, Entity as Issue, Model as IssueModel,
};
pub use super::scope::{
    ActiveModel as ScopeActiveModel, Column as ScopeColumn, Entity as Scope, Model as ScopeModel,
};
pub use super::sync_checkpoint::{
    ActiveModel as SyncCheckpointActiveModel, Column as SyncCheckpointColumn,
    Entity as SyncCheckpoint, Model as SyncCheckpointModel, SyncKind,
};
