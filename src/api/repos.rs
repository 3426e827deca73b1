//! Repository connection endpoints
//!
//! - GET  /core/repos
//! - POST /core/connect-repo
//! - POST /core/disconnect-repo
//! - GET  /core/connected-repos
//!
//! All of these act on behalf of the user's own GitHub token, which is
//! decrypted per request and never leaves the server.

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{ConnectedRepo, EntityId};
use crate::error::AppError;

pub fn repos_router() -> Router<AppState> {
    Router::new()
        .route("/core/repos", get(list_repos))
        .route("/core/connect-repo", post(connect_repo))
        .route("/core/disconnect-repo", post(disconnect_repo))
        .route("/core/connected-repos", get(list_connected_repos))
}

/// Load and decrypt the user's GitHub token.
///
/// # Errors
/// `Validation` (400) when no GitHub account is connected;
/// `Encryption` when the stored triple does not decrypt.
async fn github_token_for(state: &AppState, user_id: &str) -> Result<String, AppError> {
    let user = state
        .db
        .get_user_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let (Some(ciphertext), Some(iv), Some(tag)) = (
        user.github_token_ciphertext.as_deref(),
        user.github_token_iv.as_deref(),
        user.github_token_tag.as_deref(),
    ) else {
        return Err(AppError::Validation(
            "GitHub account not connected!".to_string(),
        ));
    };

    state.cipher.decrypt(ciphertext, iv, tag)
}

/// GET /core/repos
///
/// Lists the repositories the user's GitHub token can see.
async fn list_repos(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let token = github_token_for(&state, &claims.id).await?;
    let repos = state.github.list_repos(&token).await?;

    Ok(Json(repos))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRepoPayload {
    repo_name: String,
    owner: String,
    /// Defaults to the repository's default branch
    branch: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedRepoResponse {
    repo_id: String,
    name: String,
    owner: String,
    branch: String,
    private: bool,
}

impl From<ConnectedRepo> for ConnectedRepoResponse {
    fn from(repo: ConnectedRepo) -> Self {
        Self {
            repo_id: repo.repo_id,
            name: repo.name,
            owner: repo.owner,
            branch: repo.branch,
            private: repo.private,
        }
    }
}

/// POST /core/connect-repo
///
/// Verifies the repository against GitHub before recording the
/// connection; connecting the same repo twice is a conflict (409).
async fn connect_repo(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(payload): Json<ConnectRepoPayload>,
) -> Result<impl IntoResponse, AppError> {
    if payload.repo_name.trim().is_empty() || payload.owner.trim().is_empty() {
        return Err(AppError::Validation(
            "Repository name and owner are required".to_string(),
        ));
    }

    let token = github_token_for(&state, &claims.id).await?;
    let info = state
        .github
        .get_repo(&token, &payload.owner, &payload.repo_name)
        .await?;

    let repo = ConnectedRepo {
        id: EntityId::new().0,
        user_id: claims.id.clone(),
        repo_id: info.id.to_string(),
        name: info.name,
        owner: info.owner.login,
        branch: payload.branch.unwrap_or(info.default_branch),
        private: info.private,
        created_at: chrono::Utc::now(),
    };
    state.db.insert_connected_repo(&repo).await?;

    tracing::info!(
        user_id = %claims.id,
        repo = %format!("{}/{}", repo.owner, repo.name),
        "Repository connected"
    );

    Ok(Json(ConnectedRepoResponse::from(repo)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectRepoPayload {
    repo_id: String,
}

/// POST /core/disconnect-repo
///
/// Removing an unknown connection is 404, so a double disconnect is
/// visible to the client.
async fn disconnect_repo(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(payload): Json<DisconnectRepoPayload>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .db
        .delete_connected_repo(&claims.id, &payload.repo_id)
        .await?;
    if !removed {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = %claims.id, repo_id = %payload.repo_id, "Repository disconnected");

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Repository disconnected!"
    })))
}

/// GET /core/connected-repos
async fn list_connected_repos(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let repos = state
        .db
        .list_connected_repos(&claims.id)
        .await?
        .into_iter()
        .map(ConnectedRepoResponse::from)
        .collect::<Vec<_>>();

    Ok(Json(repos))
}
