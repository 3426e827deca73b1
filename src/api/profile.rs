//! Profile endpoints
//!
//! - GET  /profile/get-profile
//! - POST /profile/update-profile

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::User;
use crate::error::AppError;

pub fn profile_router() -> Router<AppState> {
    Router::new()
        .route("/profile/get-profile", get(get_profile))
        .route("/profile/update-profile", post(update_profile))
}

/// Profile shape served to the frontend.
///
/// Secrets stay server-side: the encrypted GitHub token and refresh
/// hash are reduced to a boolean.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    id: String,
    email: Option<String>,
    display_name: Option<String>,
    github_name: Option<String>,
    photo: Option<String>,
    provider: String,
    github_connected: bool,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        let github_connected = user.has_github_token();
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            github_name: user.github_name,
            photo: user.photo,
            provider: user.provider,
            github_connected,
        }
    }
}

/// GET /profile/get-profile
async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .get_user_by_id(&claims.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ProfileResponse::from(user)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfilePayload {
    display_name: Option<String>,
    photo: Option<String>,
}

/// POST /profile/update-profile
///
/// Updates only the fields the payload provides; omitted fields keep
/// their current values.
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(display_name) = &payload.display_name {
        if display_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Display name must not be empty".to_string(),
            ));
        }
    }

    let user = state
        .db
        .get_user_by_id(&claims.id)
        .await?
        .ok_or(AppError::NotFound)?;

    let display_name = payload.display_name.or(user.display_name);
    let photo = payload.photo.or(user.photo);

    let updated = state
        .db
        .update_user_profile(
            &claims.id,
            display_name.as_deref(),
            photo.as_deref(),
            chrono::Utc::now(),
        )
        .await?;
    if !updated {
        return Err(AppError::NotFound);
    }

    let user = state
        .db
        .get_user_by_id(&claims.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(ProfileResponse::from(user)))
}
