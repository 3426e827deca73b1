//! Authentication middleware
//!
//! Protects routes that require authentication. Verification is
//! stateless: a request is authenticated by the access token's
//! signature and expiry alone, never by a database lookup.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::token::{Claims, verify_access_token};
use crate::AppState;
use crate::error::AppError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(ACCESS_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        })
}

/// Middleware to require authentication
///
/// Extracts and verifies the access token from cookie or
/// Authorization header. Adds the token claims to request extensions
/// if valid.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/core/...", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(request.headers()).ok_or(AppError::Unauthorized)?;

    let claims = verify_access_token(&token, &state.config.auth.token_secret, false)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor for the current authenticated user's token claims
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentUser(claims): CurrentUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}", claims.id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>().cloned() {
            return Ok(CurrentUser(claims));
        }

        let state = AppState::from_ref(state);
        let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = verify_access_token(&token, &state.config.auth.token_secret, false)?;
        parts.extensions.insert(claims.clone());

        Ok(CurrentUser(claims))
    }
}

/// Optional current user extractor
///
/// Returns None if not authenticated, instead of an error. OAuth
/// callbacks use this to detect a logged-in user linking a second
/// provider.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<Claims>().cloned() {
            return Ok(MaybeUser(Some(claims)));
        }

        let app_state = AppState::from_ref(state);
        let claims = extract_token_from_headers(&parts.headers).and_then(|token| {
            verify_access_token(&token, &app_state.config.auth.token_secret, false).ok()
        });

        if let Some(claims) = &claims {
            parts.extensions.insert(claims.clone());
        }

        Ok(MaybeUser(claims))
    }
}
