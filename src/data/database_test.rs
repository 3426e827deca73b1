//! Database tests

use super::*;
use chrono::{Duration, Utc};
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn test_user(email: Option<&str>) -> User {
    User {
        id: EntityId::new().0,
        email: email.map(ToString::to_string),
        display_name: Some("Test User".to_string()),
        github_name: None,
        photo: None,
        provider: Provider::Magic.as_str().to_string(),
        google_id: None,
        github_id: None,
        github_token_ciphertext: None,
        github_token_iv: None,
        github_token_tag: None,
        refresh_token_hash: None,
        refresh_expiry: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_user_insert_and_lookups() {
    let (db, _temp_dir) = create_test_db().await;

    let mut user = test_user(Some("alice@example.com"));
    user.google_id = Some("google-123".to_string());
    db.insert_user(&user).await.unwrap();

    let by_id = db.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(by_id.email.as_deref(), Some("alice@example.com"));

    let by_email = db
        .get_user_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);

    let by_google = db.get_user_by_google_id("google-123").await.unwrap().unwrap();
    assert_eq!(by_google.id, user.id);

    assert!(db.get_user_by_github_id("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_email_is_unique_violation() {
    let (db, _temp_dir) = create_test_db().await;

    db.insert_user(&test_user(Some("dup@example.com")))
        .await
        .unwrap();

    let error = db
        .insert_user(&test_user(Some("dup@example.com")))
        .await
        .expect_err("duplicate email must fail");
    match error {
        crate::error::AppError::Database(sqlx_error) => {
            assert!(is_unique_violation(&sqlx_error));
        }
        other => panic!("expected database error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_patch_user_updates_only_given_fields() {
    let (db, _temp_dir) = create_test_db().await;

    let user = test_user(Some("bob@example.com"));
    db.insert_user(&user).await.unwrap();

    let patch = UserPatch {
        github_id: Some("gh-77".to_string()),
        github_name: Some("bob-dev".to_string()),
        provider: Some(Provider::GitHub.as_str().to_string()),
        github_token: Some(("cafe".to_string(), "beef".to_string(), "f00d".to_string())),
        ..UserPatch::default()
    };
    assert!(db.patch_user(&user.id, &patch).await.unwrap());

    let updated = db.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(updated.github_id.as_deref(), Some("gh-77"));
    assert_eq!(updated.provider, "github");
    assert!(updated.has_github_token());
    // Untouched fields survive
    assert_eq!(updated.email.as_deref(), Some("bob@example.com"));
    assert_eq!(updated.display_name.as_deref(), Some("Test User"));
}

#[tokio::test]
async fn test_patch_user_missing_row() {
    let (db, _temp_dir) = create_test_db().await;

    let patch = UserPatch {
        display_name: Some("Ghost".to_string()),
        ..UserPatch::default()
    };
    assert!(!db.patch_user("no-such-id", &patch).await.unwrap());
}

#[tokio::test]
async fn test_refresh_token_set_and_clear() {
    let (db, _temp_dir) = create_test_db().await;

    let user = test_user(Some("carol@example.com"));
    db.insert_user(&user).await.unwrap();

    let expiry = Utc::now() + Duration::days(7);
    assert!(db.set_refresh_token(&user.id, "hash-1", expiry).await.unwrap());

    let stored = db.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token_hash.as_deref(), Some("hash-1"));
    assert!(stored.refresh_expiry.is_some());

    db.clear_refresh_token(&user.id).await.unwrap();
    let cleared = db.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert!(cleared.refresh_token_hash.is_none());
    assert!(cleared.refresh_expiry.is_none());
}

#[tokio::test]
async fn test_connect_repo_twice_conflicts() {
    let (db, _temp_dir) = create_test_db().await;

    let user = test_user(Some("dave@example.com"));
    db.insert_user(&user).await.unwrap();

    let repo = ConnectedRepo {
        id: EntityId::new().0,
        user_id: user.id.clone(),
        repo_id: "1234".to_string(),
        name: "dox".to_string(),
        owner: "dave".to_string(),
        branch: "main".to_string(),
        private: false,
        created_at: Utc::now(),
    };
    db.insert_connected_repo(&repo).await.unwrap();

    let duplicate = ConnectedRepo {
        id: EntityId::new().0,
        created_at: Utc::now(),
        ..repo.clone()
    };
    let error = db
        .insert_connected_repo(&duplicate)
        .await
        .expect_err("second connect must conflict");
    assert!(matches!(error, crate::error::AppError::Conflict(_)));

    // A different user may connect the same repo
    let other = test_user(Some("erin@example.com"));
    db.insert_user(&other).await.unwrap();
    let other_repo = ConnectedRepo {
        id: EntityId::new().0,
        user_id: other.id.clone(),
        created_at: Utc::now(),
        ..repo.clone()
    };
    db.insert_connected_repo(&other_repo).await.unwrap();
}

#[tokio::test]
async fn test_disconnect_unknown_repo_returns_false() {
    let (db, _temp_dir) = create_test_db().await;

    let user = test_user(Some("frank@example.com"));
    db.insert_user(&user).await.unwrap();

    assert!(!db.delete_connected_repo(&user.id, "4321").await.unwrap());
}

#[tokio::test]
async fn test_list_connected_repos_newest_first() {
    let (db, _temp_dir) = create_test_db().await;

    let user = test_user(Some("grace@example.com"));
    db.insert_user(&user).await.unwrap();

    for (repo_id, offset_secs) in [("1", 2), ("2", 1), ("3", 0)] {
        let repo = ConnectedRepo {
            id: EntityId::new().0,
            user_id: user.id.clone(),
            repo_id: repo_id.to_string(),
            name: format!("repo-{repo_id}"),
            owner: "grace".to_string(),
            branch: "main".to_string(),
            private: true,
            created_at: Utc::now() - Duration::seconds(offset_secs),
        };
        db.insert_connected_repo(&repo).await.unwrap();
    }

    let repos = db.list_connected_repos(&user.id).await.unwrap();
    assert_eq!(repos.len(), 3);
    assert_eq!(repos[0].repo_id, "3");
    assert_eq!(repos[2].repo_id, "1");
}
