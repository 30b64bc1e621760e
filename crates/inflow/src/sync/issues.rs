//! Repository issue sync job.
//!
//! Wires the pagination engine to the issue store: fetch pages of issues
//! for one repository, upsert each page, checkpoint after each page, and
//! prune rows the remote no longer reports once a run completes a full
//! pass.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ApiError;
use crate::cancel::CancelFlag;
use crate::classify::ErrorCategory;
use crate::entity::issue::ActiveModel as IssueActiveModel;
use crate::entity::prelude::{Scope, SyncKind};
use crate::repository::{self, StoreError};
use crate::sync::checkpoint;
use crate::sync::paginate::{Page, PageFlow, PageRequest, PaginationEngine};
use crate::sync::progress::{emit, ProgressCallback, SyncProgress};
use crate::sync::types::{SyncOptions, SyncOutcome};

/// Issues of one repository, oldest-updated first so resumed runs replay a
/// stable order.
pub const ISSUES_QUERY: &str = "\
query RepoIssues($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issues(first: $pageSize, after: $after, orderBy: {field: UPDATED_AT, direction: ASC}) {
      nodes {
        number
        title
        state
        author { login }
        updatedAt
      }
      pageInfo { hasNextPage endCursor }
    }
  }
  rateLimit { limit cost remaining resetAt used }
}";

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            // Keep database errors typed so the classifier can judge them.
            StoreError::Database(db_err) => ApiError::Db(db_err),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Sync all issues of `owner/name` into the local store.
///
/// Resumes from a stored checkpoint when one exists. Returns an error only
/// for failures outside the pagination run itself (unknown or suspended
/// scope, checkpoint load, final prune); everything that happens inside
/// the run is reported through the outcome's termination.
pub async fn sync_repo_issues(
    db: &DatabaseConnection,
    engine: &PaginationEngine,
    scope: Uuid,
    owner: &str,
    name: &str,
    options: &SyncOptions,
    cancel: &CancelFlag,
    on_progress: Option<&ProgressCallback>,
) -> Result<SyncOutcome, ApiError> {
    let repo = format!("{owner}/{name}");

    let scope_row = Scope::find_by_id(scope)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::internal(format!("scope {scope} is not registered")))?;
    if scope_row.suspended {
        return Err(ApiError::Suspended { scope });
    }

    let entity_id = checkpoint::repo_key(scope, &repo);
    let resume = checkpoint::load_cursor(db, &entity_id, SyncKind::Issues).await?;
    let resumed = resume.is_some();
    if let Some(cursor) = &resume {
        info!(%scope, repo, cursor, "resuming issue sync from checkpoint");
    }
    emit(
        on_progress,
        SyncProgress::Started {
            repo: repo.clone(),
            resumed_from: resume.clone(),
        },
    );

    let mut variables = Map::new();
    variables.insert("owner".to_string(), Value::from(owner));
    variables.insert("name".to_string(), Value::from(name));

    let request = PageRequest::new(
        scope,
        ISSUES_QUERY,
        vec!["repository".to_string(), "issues".to_string()],
    )?
    .with_context(format!("issues:{repo}"))
    .with_variables(variables)
    .with_page_size(options.page_size)
    .with_max_pages(options.max_pages)
    .with_start_cursor(resume);

    let seen_numbers: Arc<Mutex<HashSet<i64>>> = Arc::new(Mutex::new(HashSet::new()));
    let upserted = Arc::new(AtomicU64::new(0));

    let processor = {
        let db = db.clone();
        let seen_numbers = seen_numbers.clone();
        let upserted = upserted.clone();
        let repo = repo.clone();
        move |page: Page| {
            let db = db.clone();
            let seen_numbers = seen_numbers.clone();
            let upserted = upserted.clone();
            let repo = repo.clone();
            async move {
                let mut models = Vec::with_capacity(page.nodes.len());
                for node in &page.nodes {
                    match issue_from_node(scope, &repo, node) {
                        Some((model, number)) => {
                            seen_numbers
                                .lock()
                                .map_err(|_| ApiError::internal("seen-number set poisoned"))?
                                .insert(number);
                            models.push(model);
                        }
                        None => {
                            warn!(repo, page = page.index, %node, "skipping malformed issue node");
                        }
                    }
                }
                let written = repository::bulk_upsert_with_retry(
                    &db,
                    models,
                    repository::DEFAULT_BULK_UPSERT_RETRIES,
                    repository::DEFAULT_BULK_UPSERT_BACKOFF_MS,
                )
                .await?;
                upserted.fetch_add(written, Ordering::Relaxed);
                Ok(PageFlow::Continue)
            }
        }
    };

    let save_checkpoint = {
        let db = db.clone();
        let entity_id = entity_id.clone();
        move |cursor: String| {
            let db = db.clone();
            let entity_id = entity_id.clone();
            async move {
                checkpoint::save_cursor(&db, &entity_id, SyncKind::Issues, &cursor)
                    .await
                    .map_err(ApiError::from)
            }
        }
    };

    let result = engine
        .paginate(&request, processor, save_checkpoint, cancel, on_progress)
        .await;

    if let Some(failure) = &result.last_failure {
        if failure.category == ErrorCategory::NotFound {
            warn!(%scope, repo, "remote repository is gone; leaving local data untouched");
        }
    }

    let mut pruned = 0;
    if result.termination.allows_cleanup() {
        // A resumed run only saw the pages after its checkpoint, so its
        // seen set is partial and must not drive pruning. The next run
        // starts from the beginning and can prune.
        if options.prune && !resumed {
            let keep: Vec<i64> = {
                let lock = seen_numbers
                    .lock()
                    .map_err(|_| ApiError::internal("seen-number set poisoned"))?;
                lock.iter().copied().collect()
            };
            pruned = repository::delete_missing(db, scope, &repo, &keep).await?;
            if pruned > 0 {
                emit(on_progress, SyncProgress::Pruned { count: pruned });
            }
        }
        checkpoint::clear_cursor(db, &entity_id, SyncKind::Issues).await?;
        info!(%scope, repo, pages = result.pages_processed, pruned, "issue sync completed");
    }

    emit(
        on_progress,
        SyncProgress::Finished {
            repo,
            termination: result.termination,
            pages: result.pages_processed,
        },
    );

    Ok(SyncOutcome {
        termination: result.termination,
        pages_processed: result.pages_processed,
        upserted: upserted.load(Ordering::Relaxed),
        pruned,
        last_failure: result.last_failure,
    })
}

/// Map one GraphQL issue node onto an active model. Returns the issue
/// number alongside so the caller can track which rows were seen.
fn issue_from_node(scope: Uuid, repo: &str, node: &Value) -> Option<(IssueActiveModel, i64)> {
    let number = node.get("number")?.as_i64()?;
    let title = node.get("title")?.as_str()?.to_string();
    let state = node.get("state")?.as_str()?.to_string();
    let author = node
        .pointer("/author/login")
        .and_then(Value::as_str)
        .map(str::to_string);
    let remote_updated_at = node
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());

    let model = IssueActiveModel {
        id: Set(Uuid::new_v4()),
        scope_id: Set(scope),
        repo: Set(repo.to_string()),
        number: Set(number),
        title: Set(title),
        state: Set(state),
        author: Set(author),
        remote_updated_at: Set(remote_updated_at),
        synced_at: Set(Utc::now().into()),
    };
    Some((model, number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_with_all_fields_maps_cleanly() {
        let scope = Uuid::new_v4();
        let node = json!({
            "number": 42,
            "title": "Fix the flux capacitor",
            "state": "OPEN",
            "author": {"login": "octocat"},
            "updatedAt": "2026-08-01T10:00:00Z"
        });

        let (model, number) = issue_from_node(scope, "octo/hello", &node).unwrap();
        assert_eq!(number, 42);
        assert_eq!(model.title.as_ref(), "Fix the flux capacitor");
        assert_eq!(model.author.as_ref(), &Some("octocat".to_string()));
        assert!(model.remote_updated_at.as_ref().is_some());
    }

    #[test]
    fn deleted_author_becomes_none() {
        let scope = Uuid::new_v4();
        let node = json!({
            "number": 7,
            "title": "Ghost issue",
            "state": "CLOSED",
            "author": null
        });

        let (model, _) = issue_from_node(scope, "octo/hello", &node).unwrap();
        assert_eq!(model.author.as_ref(), &None);
        assert_eq!(model.remote_updated_at.as_ref(), &None);
    }

    #[test]
    fn node_missing_required_fields_is_rejected() {
        let scope = Uuid::new_v4();
        assert!(issue_from_node(scope, "octo/hello", &json!({"title": "no number"})).is_none());
        assert!(issue_from_node(scope, "octo/hello", &json!({"number": 1})).is_none());
        assert!(issue_from_node(scope, "octo/hello", &json!("not an object")).is_none());
    }

    #[test]
    fn query_pages_with_the_engine_variables() {
        assert!(ISSUES_QUERY.contains("$pageSize: Int!"));
        assert!(ISSUES_QUERY.contains("$after: String"));
        assert!(ISSUES_QUERY.contains("pageInfo { hasNextPage endCursor }"));
        assert!(ISSUES_QUERY.contains("rateLimit"));
    }
}
