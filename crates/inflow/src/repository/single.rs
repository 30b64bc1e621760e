use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::entity::issue::{ActiveModel, Column, Entity as Issue, Model};

use super::errors::{Result, StoreError};

// ─── Single Record Operations ────────────────────────────────────────────────

/// Find an issue by its natural key (scope_id + repo + number).
pub async fn find_by_natural_key(
    db: &DatabaseConnection,
    scope_id: Uuid,
    repo: &str,
    number: i64,
) -> Result<Option<Model>> {
    Issue::find()
        .filter(Column::ScopeId.eq(scope_id))
        .filter(Column::Repo.eq(repo))
        .filter(Column::Number.eq(number))
        .one(db)
        .await
        .map_err(StoreError::from)
}

/// Insert or update an issue by its natural key.
///
/// If a row with the same scope, repo, and number exists it is updated in
/// place, keeping its UUID. Otherwise a new row is inserted.
pub async fn upsert(db: &DatabaseConnection, model: ActiveModel) -> Result<Model> {
    let scope_id = required_active_value("scope_id", &model.scope_id)?;
    let repo = required_active_value("repo", &model.repo)?;
    let number = required_active_value("number", &model.number)?;

    let existing = find_by_natural_key(db, scope_id, &repo, number).await?;

    match existing {
        Some(existing) => {
            let mut model = model;
            model.id = Set(existing.id);
            model.update(db).await.map_err(StoreError::from)
        }
        None => model.insert(db).await.map_err(StoreError::from),
    }
}

/// Delete an issue by its natural key. Returns `true` if a row was deleted.
pub async fn delete_by_natural_key(
    db: &DatabaseConnection,
    scope_id: Uuid,
    repo: &str,
    number: i64,
) -> Result<bool> {
    let result = Issue::delete_many()
        .filter(Column::ScopeId.eq(scope_id))
        .filter(Column::Repo.eq(repo))
        .filter(Column::Number.eq(number))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

fn required_active_value<T: Clone + Into<sea_orm::Value>>(
    field: &str,
    value: &ActiveValue<T>,
) -> Result<T> {
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Ok(v.clone()),
        ActiveValue::NotSet => Err(StoreError::invalid_input(format!(
            "{field} must be set for upsert"
        ))),
    }
}
