//! OAuth 2.0 provider clients
//!
//! Implements the authorization code flow against Google and GitHub:
//! authorize-URL construction with a CSRF state token, code exchange,
//! and profile fetching. Both providers normalize into
//! [`OAuthProfile`] for the identity resolver.
//!
//! Endpoints come from configuration so tests can point them at a
//! local stub server.

use serde::Deserialize;

use super::identity::OAuthProfile;
use crate::config::{GitHubOAuthConfig, GoogleOAuthConfig};
use crate::data::Provider;
use crate::error::AppError;

/// Cookie carrying the CSRF state during the OAuth handshake
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

/// Generate a random CSRF state token for the handshake
pub fn generate_csrf_state() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// =============================================================================
// Authorize URLs
// =============================================================================

pub fn google_authorize_url(config: &GoogleOAuthConfig, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        GOOGLE_AUTHORIZE_URL,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode("openid email profile"),
        urlencoding::encode(state),
    )
}

pub fn github_authorize_url(config: &GitHubOAuthConfig, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&scope={}&state={}",
        GITHUB_AUTHORIZE_URL,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode("read:user user:email repo"),
        urlencoding::encode(state),
    )
}

// =============================================================================
// Google
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    /// Stable subject identifier
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

/// Exchange a Google authorization code for a normalized profile.
pub async fn exchange_google_code(
    http: &reqwest::Client,
    config: &GoogleOAuthConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<OAuthProfile, AppError> {
    let token: TokenResponse = http
        .post(&config.token_url)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?
        .json()
        .await?;

    let access_token = token.access_token.ok_or_else(|| {
        tracing::warn!("Google code exchange returned no access token");
        AppError::Unauthorized
    })?;

    let info: GoogleUserInfo = http
        .get(&config.userinfo_url)
        .bearer_auth(&access_token)
        .send()
        .await?
        .json()
        .await?;

    Ok(OAuthProfile {
        provider: Provider::Google,
        provider_id: info.sub,
        email: info.email,
        display_name: info.name,
        username: None,
        photo: info.picture,
        // Google tokens are used only for login, never stored
        access_token: None,
    })
}

// =============================================================================
// GitHub
// =============================================================================

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Exchange a GitHub authorization code for a normalized profile.
///
/// The profile endpoint often omits the email; a second request to
/// /user/emails recovers the primary verified address when available.
/// The provider access token rides along for encrypted storage.
pub async fn exchange_github_code(
    http: &reqwest::Client,
    config: &GitHubOAuthConfig,
    code: &str,
    redirect_uri: &str,
) -> Result<OAuthProfile, AppError> {
    let token: TokenResponse = http
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await?
        .json()
        .await?;

    let access_token = token.access_token.ok_or_else(|| {
        tracing::warn!("GitHub code exchange returned no access token");
        AppError::Unauthorized
    })?;

    let user: GitHubUser = http
        .get(format!("{}/user", config.api_base))
        .bearer_auth(&access_token)
        .header("Accept", "application/vnd.github+json")
        .send()
        .await?
        .json()
        .await?;

    let email = match user.email {
        Some(email) => Some(email),
        None => fetch_primary_email(http, config, &access_token).await?,
    };

    Ok(OAuthProfile {
        provider: Provider::GitHub,
        provider_id: user.id.to_string(),
        email,
        display_name: user.name,
        username: Some(user.login),
        photo: user.avatar_url,
        access_token: Some(access_token),
    })
}

async fn fetch_primary_email(
    http: &reqwest::Client,
    config: &GitHubOAuthConfig,
    access_token: &str,
) -> Result<Option<String>, AppError> {
    let response = http
        .get(format!("{}/user/emails", config.api_base))
        .bearer_auth(access_token)
        .header("Accept", "application/vnd.github+json")
        .send()
        .await?;

    // The token may lack the user:email scope; a profile without an
    // email is still a valid login.
    if !response.status().is_success() {
        return Ok(None);
    }

    let emails: Vec<GitHubEmail> = response.json().await?;
    Ok(emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_config() -> GitHubOAuthConfig {
        GitHubOAuthConfig {
            client_id: "gh-client".to_string(),
            client_secret: "gh-secret".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            api_base: "https://api.github.com".to_string(),
        }
    }

    #[test]
    fn csrf_state_is_random_hex() {
        let a = generate_csrf_state();
        let b = generate_csrf_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn authorize_urls_carry_state_and_redirect() {
        let url = github_authorize_url(
            &github_config(),
            "http://localhost:8080/auth/github/callback",
            "abc123",
        );
        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("client_id=gh-client"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains(&urlencoding::encode("http://localhost:8080/auth/github/callback").into_owned()));
    }
}
