//! SQLite database operations
//!
//! All database access goes through this module.
//! Uses SQLx for compile-time checked queries.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Partial update for a user row.
///
/// `None` fields are left untouched; `Some` fields are written.
/// Built by the identity resolver so a login only touches the columns
/// the inbound profile actually supplies.
#[derive(Debug, Default, Clone)]
pub struct UserPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub github_name: Option<String>,
    pub photo: Option<String>,
    pub provider: Option<String>,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    /// (ciphertext, iv, tag), all hex; written together
    pub github_token: Option<(String, String, String)>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.display_name.is_none()
            && self.github_name.is_none()
            && self.photo.is_none()
            && self.provider.is_none()
            && self.google_id.is_none()
            && self.github_id.is_none()
            && self.github_token.is_none()
    }
}

/// Whether a sqlx error is a UNIQUE constraint violation.
///
/// The identity resolver treats these as "distinct identity" and falls
/// back to creating a new user instead of surfacing a conflict.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE google_id = ?")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_github_id(&self, github_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE github_id = ?")
            .bind(github_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Insert a new user row.
    ///
    /// A UNIQUE violation on email or a provider id propagates as a
    /// database error; callers that can race use [`is_unique_violation`]
    /// to detect and recover.
    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, email, display_name, github_name, photo, provider,
                google_id, github_id,
                github_token_ciphertext, github_token_iv, github_token_tag,
                refresh_token_hash, refresh_expiry, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.github_name)
        .bind(&user.photo)
        .bind(&user.provider)
        .bind(&user.google_id)
        .bind(&user.github_id)
        .bind(&user.github_token_ciphertext)
        .bind(&user.github_token_iv)
        .bind(&user.github_token_tag)
        .bind(&user.refresh_token_hash)
        .bind(user.refresh_expiry)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply a partial update to a user row.
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching user row exists.
    pub async fn patch_user(&self, user_id: &str, patch: &UserPatch) -> Result<bool, AppError> {
        if patch.is_empty() {
            return Ok(self.get_user_by_id(user_id).await?.is_some());
        }

        let now = Utc::now();
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
        {
            let mut assignments = builder.separated(", ");
            if let Some(email) = &patch.email {
                assignments.push("email = ");
                assignments.push_bind_unseparated(email);
            }
            if let Some(display_name) = &patch.display_name {
                assignments.push("display_name = ");
                assignments.push_bind_unseparated(display_name);
            }
            if let Some(github_name) = &patch.github_name {
                assignments.push("github_name = ");
                assignments.push_bind_unseparated(github_name);
            }
            if let Some(photo) = &patch.photo {
                assignments.push("photo = ");
                assignments.push_bind_unseparated(photo);
            }
            if let Some(provider) = &patch.provider {
                assignments.push("provider = ");
                assignments.push_bind_unseparated(provider);
            }
            if let Some(google_id) = &patch.google_id {
                assignments.push("google_id = ");
                assignments.push_bind_unseparated(google_id);
            }
            if let Some(github_id) = &patch.github_id {
                assignments.push("github_id = ");
                assignments.push_bind_unseparated(github_id);
            }
            if let Some((ciphertext, iv, tag)) = &patch.github_token {
                assignments.push("github_token_ciphertext = ");
                assignments.push_bind_unseparated(ciphertext);
                assignments.push("github_token_iv = ");
                assignments.push_bind_unseparated(iv);
                assignments.push("github_token_tag = ");
                assignments.push_bind_unseparated(tag);
            }
            assignments.push("updated_at = ");
            assignments.push_bind_unseparated(now);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(user_id);

        let result = builder.build().execute(&self.pool).await?;

        Ok(result.rows_affected() == 1)
    }

    /// Update profile fields the user may edit themselves.
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching user row exists.
    pub async fn update_user_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        photo: Option<&str>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = ?, photo = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(photo)
        .bind(updated_at)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Replace the stored refresh token hash and expiry (rotation on use).
    ///
    /// # Returns
    /// `true` if updated, `false` if no matching user row exists.
    pub async fn set_refresh_token(
        &self,
        user_id: &str,
        refresh_token_hash: &str,
        refresh_expiry: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = ?, refresh_expiry = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(refresh_token_hash)
        .bind(refresh_expiry)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Atomically exchange the stored refresh token hash for a new one.
    ///
    /// The WHERE clause is the arbiter under concurrent rotations:
    /// both contenders present the same hash, but only the first
    /// UPDATE still matches it. The loser affects zero rows.
    ///
    /// # Returns
    /// `true` if the presented hash was still current and was
    /// replaced, `false` otherwise.
    pub async fn consume_refresh_token(
        &self,
        user_id: &str,
        presented_hash: &str,
        new_hash: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = ?, refresh_expiry = ?, updated_at = ?
            WHERE id = ? AND refresh_token_hash = ?
            "#,
        )
        .bind(new_hash)
        .bind(new_expiry)
        .bind(Utc::now())
        .bind(user_id)
        .bind(presented_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop the stored refresh token so the current one can never be
    /// used again (logout).
    pub async fn clear_refresh_token(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_hash = NULL, refresh_expiry = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Connected repositories
    // =========================================================================

    pub async fn get_connected_repo(
        &self,
        user_id: &str,
        repo_id: &str,
    ) -> Result<Option<ConnectedRepo>, AppError> {
        let repo = sqlx::query_as::<_, ConnectedRepo>(
            "SELECT * FROM user_repos WHERE user_id = ? AND repo_id = ?",
        )
        .bind(user_id)
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(repo)
    }

    pub async fn list_connected_repos(&self, user_id: &str) -> Result<Vec<ConnectedRepo>, AppError> {
        let repos = sqlx::query_as::<_, ConnectedRepo>(
            "SELECT * FROM user_repos WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(repos)
    }

    /// Insert a connected repository.
    ///
    /// The UNIQUE(user_id, repo_id) index is the arbiter under
    /// concurrent connect attempts; a violation maps to `Conflict`.
    pub async fn insert_connected_repo(&self, repo: &ConnectedRepo) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_repos (
                id, user_id, repo_id, name, owner, branch, private, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&repo.id)
        .bind(&repo.user_id)
        .bind(&repo.repo_id)
        .bind(&repo.name)
        .bind(&repo.owner)
        .bind(&repo.branch)
        .bind(repo.private)
        .bind(repo.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(AppError::Conflict(
                "Repository already connected!".to_string(),
            )),
            Err(error) => Err(error.into()),
        }
    }

    /// Delete a connected repository.
    ///
    /// # Returns
    /// `true` if a row was removed, `false` if the repo was never connected.
    pub async fn delete_connected_repo(
        &self,
        user_id: &str,
        repo_id: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM user_repos WHERE user_id = ? AND repo_id = ?")
            .bind(user_id)
            .bind(repo_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
