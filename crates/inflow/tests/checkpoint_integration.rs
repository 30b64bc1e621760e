//! Checkpoint and issue store tests against an in-memory SQLite database
//! with the real schema.

use chrono::Utc;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use inflow::connect_and_migrate;
use inflow::repository;
use inflow::sync::checkpoint;
use inflow::{IssueActiveModel, ScopeActiveModel, SyncKind};

async fn setup_db() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database with migrations")
}

async fn insert_scope(db: &DatabaseConnection) -> Uuid {
    let id = Uuid::new_v4();
    let scope = ScopeActiveModel {
        id: Set(id),
        name: Set("acme".to_string()),
        host: Set("api.example.com".to_string()),
        suspended: Set(false),
        created_at: Set(Utc::now().into()),
    };
    inflow::Scope::insert(scope).exec(db).await.unwrap();
    id
}

fn issue(scope: Uuid, repo: &str, number: i64, title: &str) -> IssueActiveModel {
    IssueActiveModel {
        id: Set(Uuid::new_v4()),
        scope_id: Set(scope),
        repo: Set(repo.to_string()),
        number: Set(number),
        title: Set(title.to_string()),
        state: Set("OPEN".to_string()),
        author: Set(Some("octocat".to_string())),
        remote_updated_at: Set(None),
        synced_at: Set(Utc::now().into()),
    }
}

#[tokio::test]
async fn cursor_round_trip() {
    let db = setup_db().await;
    let scope = insert_scope(&db).await;
    let key = checkpoint::repo_key(scope, "octo/hello");

    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::Issues).await.unwrap(),
        None
    );

    checkpoint::save_cursor(&db, &key, SyncKind::Issues, "cursor-1")
        .await
        .unwrap();
    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::Issues).await.unwrap(),
        Some("cursor-1".to_string())
    );

    // Saving again overwrites rather than duplicating.
    checkpoint::save_cursor(&db, &key, SyncKind::Issues, "cursor-2")
        .await
        .unwrap();
    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::Issues).await.unwrap(),
        Some("cursor-2".to_string())
    );

    assert!(checkpoint::clear_cursor(&db, &key, SyncKind::Issues).await.unwrap());
    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::Issues).await.unwrap(),
        None
    );
    // Clearing an absent checkpoint is fine.
    assert!(!checkpoint::clear_cursor(&db, &key, SyncKind::Issues).await.unwrap());
}

#[tokio::test]
async fn sync_kinds_have_independent_checkpoints() {
    let db = setup_db().await;
    let scope = insert_scope(&db).await;
    let key = checkpoint::repo_key(scope, "octo/hello");

    checkpoint::save_cursor(&db, &key, SyncKind::Issues, "issues-cursor")
        .await
        .unwrap();
    checkpoint::save_cursor(&db, &key, SyncKind::PullRequests, "pr-cursor")
        .await
        .unwrap();

    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::Issues).await.unwrap(),
        Some("issues-cursor".to_string())
    );
    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::PullRequests)
            .await
            .unwrap(),
        Some("pr-cursor".to_string())
    );

    checkpoint::clear_cursor(&db, &key, SyncKind::Issues).await.unwrap();
    assert_eq!(
        checkpoint::load_cursor(&db, &key, SyncKind::PullRequests)
            .await
            .unwrap(),
        Some("pr-cursor".to_string())
    );
}

#[tokio::test]
async fn entities_have_independent_checkpoints() {
    let db = setup_db().await;
    let scope = insert_scope(&db).await;
    let key_a = checkpoint::repo_key(scope, "octo/hello");
    let key_b = checkpoint::repo_key(scope, "octo/world");

    checkpoint::save_cursor(&db, &key_a, SyncKind::Issues, "a").await.unwrap();
    checkpoint::save_cursor(&db, &key_b, SyncKind::Issues, "b").await.unwrap();

    checkpoint::clear_cursor(&db, &key_a, SyncKind::Issues).await.unwrap();
    assert_eq!(
        checkpoint::load_cursor(&db, &key_b, SyncKind::Issues).await.unwrap(),
        Some("b".to_string())
    );
}

#[tokio::test]
async fn replaying_a_page_updates_in_place() {
    let db = setup_db().await;
    let scope = insert_scope(&db).await;

    let first = vec![
        issue(scope, "octo/hello", 1, "One"),
        issue(scope, "octo/hello", 2, "Two"),
    ];
    repository::bulk_upsert(&db, first).await.unwrap();

    // The same page replayed after a crash: new UUIDs, same natural keys.
    let replay = vec![
        issue(scope, "octo/hello", 1, "One, edited"),
        issue(scope, "octo/hello", 2, "Two"),
        issue(scope, "octo/hello", 3, "Three"),
    ];
    repository::bulk_upsert(&db, replay).await.unwrap();

    assert_eq!(
        repository::count_by_repo(&db, scope, "octo/hello").await.unwrap(),
        3
    );
    let row = repository::find_by_natural_key(&db, scope, "octo/hello", 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.title, "One, edited");
}

#[tokio::test]
async fn same_issue_number_in_two_scopes_is_two_rows() {
    let db = setup_db().await;
    let scope_a = insert_scope(&db).await;
    let scope_b = insert_scope(&db).await;

    repository::bulk_upsert(&db, vec![issue(scope_a, "octo/hello", 1, "A")])
        .await
        .unwrap();
    repository::bulk_upsert(&db, vec![issue(scope_b, "octo/hello", 1, "B")])
        .await
        .unwrap();

    assert_eq!(
        repository::count_by_repo(&db, scope_a, "octo/hello").await.unwrap(),
        1
    );
    assert_eq!(
        repository::count_by_repo(&db, scope_b, "octo/hello").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn delete_missing_prunes_only_unseen_rows() {
    let db = setup_db().await;
    let scope = insert_scope(&db).await;

    repository::bulk_upsert(
        &db,
        vec![
            issue(scope, "octo/hello", 1, "One"),
            issue(scope, "octo/hello", 2, "Two"),
            issue(scope, "octo/hello", 3, "Three"),
            issue(scope, "octo/other", 9, "Elsewhere"),
        ],
    )
    .await
    .unwrap();

    let pruned = repository::delete_missing(&db, scope, "octo/hello", &[1, 3])
        .await
        .unwrap();
    assert_eq!(pruned, 1);
    assert_eq!(
        repository::count_by_repo(&db, scope, "octo/hello").await.unwrap(),
        2
    );
    // Other repositories are untouched.
    assert_eq!(
        repository::count_by_repo(&db, scope, "octo/other").await.unwrap(),
        1
    );
}
