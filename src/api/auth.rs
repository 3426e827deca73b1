//! Authentication endpoints
//!
//! The full login surface:
//! - GET  /auth/google, /auth/google/callback
//! - GET  /auth/github, /auth/github/callback
//! - POST /auth/magic/request
//! - GET  /auth/magic/verify
//! - POST /auth/refresh
//! - GET  /auth/logout
//!
//! Successful logins set the access/refresh cookie pair and redirect
//! to the frontend dashboard.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::auth::{
    ACCESS_TOKEN_COOKIE, MaybeUser, OAuthProfile, REFRESH_TOKEN_COOKIE, Resolution,
    identity, magic, oauth,
    oauth::OAUTH_STATE_COOKIE,
    token,
};
use crate::error::AppError;
use crate::metrics::LOGINS_TOTAL;

/// Create authentication router
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_redirect))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/github", get(github_redirect))
        .route("/auth/github/callback", get(github_callback))
        .route("/auth/magic/request", post(magic_request))
        .route("/auth/magic/verify", get(magic_verify))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", get(logout))
}

// =============================================================================
// Cookies
// =============================================================================

fn auth_cookie(
    name: &'static str,
    value: String,
    max_age_seconds: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_secure(secure);
    cookie.set_max_age(time::Duration::seconds(max_age_seconds));
    cookie
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = auth_cookie(name, String::new(), 0, secure);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// Add the access/refresh pair to the jar.
fn with_session_cookies(jar: CookieJar, state: &AppState, pair: &token::TokenPair) -> CookieJar {
    let secure = state.config.should_use_secure_cookies();
    jar.add(auth_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        state.config.auth.access_token_ttl,
        secure,
    ))
    .add(auth_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        state.config.auth.refresh_token_ttl,
        secure,
    ))
}

/// Expire the access/refresh pair.
fn without_session_cookies(jar: CookieJar, state: &AppState) -> CookieJar {
    let secure = state.config.should_use_secure_cookies();
    jar.add(expired_cookie(ACCESS_TOKEN_COOKIE, secure))
        .add(expired_cookie(REFRESH_TOKEN_COOKIE, secure))
}

fn dashboard_url(state: &AppState) -> String {
    format!(
        "{}/dashboard",
        state.config.server.frontend_url.trim_end_matches('/')
    )
}

fn login_error_url(state: &AppState) -> String {
    format!(
        "{}/login?error=auth_failed",
        state.config.server.frontend_url.trim_end_matches('/')
    )
}

// =============================================================================
// OAuth redirects
// =============================================================================

async fn google_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let csrf = oauth::generate_csrf_state();
    let redirect_uri = format!("{}/auth/google/callback", state.config.server.base_url());
    let url = oauth::google_authorize_url(&state.config.oauth.google, &redirect_uri, &csrf);

    let jar = jar.add(state_cookie(&state, csrf));
    (jar, Redirect::to(&url))
}

async fn github_redirect(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let csrf = oauth::generate_csrf_state();
    let redirect_uri = format!("{}/auth/github/callback", state.config.server.base_url());
    let url = oauth::github_authorize_url(&state.config.oauth.github, &redirect_uri, &csrf);

    let jar = jar.add(state_cookie(&state, csrf));
    (jar, Redirect::to(&url))
}

fn state_cookie(state: &AppState, csrf: String) -> Cookie<'static> {
    // Lives only for the handshake
    auth_cookie(
        OAUTH_STATE_COOKIE,
        csrf,
        600,
        state.config.should_use_secure_cookies(),
    )
}

// =============================================================================
// OAuth callbacks
// =============================================================================

/// Query parameters from a provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    /// Set when the user denied the consent screen
    error: Option<String>,
}

/// Verify the CSRF state cookie against the callback query.
fn verify_csrf_state(query: &CallbackQuery, jar: &CookieJar) -> Result<(), AppError> {
    let expected = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .ok_or(AppError::Unauthorized)?;

    match &query.state {
        Some(received) if *received == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    MaybeUser(claims): MaybeUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(code) = callback_code(&state, &query, &jar)? else {
        return Ok(Redirect::to(&login_error_url(&state)).into_response());
    };

    let profile = oauth::exchange_google_code(
        &state.http_client,
        &state.config.oauth.google,
        &code,
        &format!("{}/auth/google/callback", state.config.server.base_url()),
    )
    .await?;

    complete_oauth_login(state, jar, profile, claims.map(|c| c.id)).await
}

async fn github_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    MaybeUser(claims): MaybeUser,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let Some(code) = callback_code(&state, &query, &jar)? else {
        return Ok(Redirect::to(&login_error_url(&state)).into_response());
    };

    let profile = oauth::exchange_github_code(
        &state.http_client,
        &state.config.oauth.github,
        &code,
        &format!("{}/auth/github/callback", state.config.server.base_url()),
    )
    .await?;

    complete_oauth_login(state, jar, profile, claims.map(|c| c.id)).await
}

/// Extract the authorization code after CSRF and consent checks.
///
/// A consent denial is not an error; the user goes back to the login
/// page. A bad or missing CSRF state is.
fn callback_code(
    _state: &AppState,
    query: &CallbackQuery,
    jar: &CookieJar,
) -> Result<Option<String>, AppError> {
    if query.error.is_some() {
        return Ok(None);
    }
    verify_csrf_state(query, jar)?;
    match &query.code {
        Some(code) => Ok(Some(code.clone())),
        None => Ok(None),
    }
}

/// Shared tail of both OAuth callbacks: resolve the identity, then
/// either confirm a link or start a session.
async fn complete_oauth_login(
    state: AppState,
    jar: CookieJar,
    profile: OAuthProfile,
    logged_in_user_id: Option<String>,
) -> Result<Response, AppError> {
    let provider = profile.provider.as_str();
    let resolution = identity::resolve(
        &state.db,
        &state.cipher,
        &profile,
        logged_in_user_id.as_deref(),
    )
    .await?;

    let mut handshake = Cookie::from(OAUTH_STATE_COOKIE);
    handshake.set_path("/");
    let jar = jar.remove(handshake);

    match resolution {
        // Linking keeps the current session untouched.
        Resolution::Linked(_) => Ok((jar, Redirect::to(&dashboard_url(&state))).into_response()),
        Resolution::LoggedIn(user) => {
            let pair = token::issue_session(&state.db, &user, &state.config.auth).await?;
            let jar = with_session_cookies(jar, &state, &pair);

            LOGINS_TOTAL.with_label_values(&[provider]).inc();
            tracing::info!(user_id = %user.id, provider, "User logged in");

            Ok((jar, Redirect::to(&dashboard_url(&state))).into_response())
        }
    }
}

// =============================================================================
// Magic links
// =============================================================================

#[derive(Debug, Deserialize)]
struct MagicRequestPayload {
    email: String,
}

/// POST /auth/magic/request
///
/// The response is identical whether or not an account already
/// existed for the address.
async fn magic_request(
    State(state): State<AppState>,
    Json(payload): Json<MagicRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    magic::request_magic_link(
        &state.db,
        &state.magic,
        state.mailer.as_ref(),
        &state.config.auth.token_secret,
        &state.config.server.base_url(),
        &payload.email,
    )
    .await?;

    Ok(Json(json!({ "success": true, "message": "Magic link sent!" })))
}

#[derive(Debug, Deserialize)]
struct MagicVerifyQuery {
    token: String,
}

/// GET /auth/magic/verify?token=...
///
/// Redeems the one-time token and starts a normal session.
async fn magic_verify(
    State(state): State<AppState>,
    Query(query): Query<MagicVerifyQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let user = magic::verify_magic_link(
        &state.db,
        &state.magic,
        &state.config.auth.token_secret,
        &query.token,
    )
    .await?;

    let pair = token::issue_session(&state.db, &user, &state.config.auth).await?;
    let jar = with_session_cookies(jar, &state, &pair);

    LOGINS_TOTAL.with_label_values(&["magic"]).inc();
    tracing::info!(user_id = %user.id, "User logged in via magic link");

    Ok((jar, Redirect::to(&dashboard_url(&state))))
}

// =============================================================================
// Token lifecycle
// =============================================================================

/// POST /auth/refresh
///
/// Exchanges the refresh cookie for a fresh pair. Any failure clears
/// both cookies so the client falls back to a full login.
async fn refresh(State(state): State<AppState>, jar: CookieJar) -> Response {
    let access_token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned());
    let refresh_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned());

    let rotated = match (access_token, refresh_token) {
        (Some(access), Some(refresh)) => {
            token::rotate_session(&state.db, &access, &refresh, &state.config.auth).await
        }
        _ => Err(AppError::Unauthorized),
    };

    match rotated {
        Ok(pair) => {
            let jar = with_session_cookies(jar, &state, &pair);
            (jar, Json(json!({ "success": true, "message": "Token refreshed!" }))).into_response()
        }
        Err(error) => {
            tracing::debug!(%error, "Refresh rejected; clearing session cookies");
            let jar = without_session_cookies(jar, &state);
            (
                StatusCode::UNAUTHORIZED,
                (jar, Json(json!({ "error": "Unauthorized!" }))),
            )
                .into_response()
        }
    }
}

/// GET /auth/logout
///
/// Invalidates the stored refresh token and clears both cookies.
/// Always succeeds, even without a valid session.
async fn logout(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(claims) = &claims {
        state.db.clear_refresh_token(&claims.id).await?;
        tracing::info!(user_id = %claims.id, "User logged out");
    }

    let jar = without_session_cookies(jar, &state);
    Ok((jar, Json(json!({ "success": true, "message": "Logged out!" }))))
}
