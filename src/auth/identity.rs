//! Identity resolution for OAuth logins
//!
//! Maps an inbound provider profile to exactly one persisted user,
//! creating or linking accounts as needed. Resolution order, first
//! match wins:
//!
//! 1. A valid session with a provider that is new for that user links
//!    the provider in place (no new session is issued).
//! 2. A user found by email (or provider id when the profile has no
//!    email) is updated, touching only missing or provider-specific
//!    fields.
//! 3. A new user is created from whatever the profile supplies.
//!
//! A uniqueness violation during an update is treated as a distinct
//! identity and falls through to create, never surfacing a conflict.

use chrono::Utc;

use super::cipher::TokenCipher;
use crate::data::{Database, EntityId, Provider, User, UserPatch, is_unique_violation};
use crate::error::AppError;

/// Normalized profile from an OAuth provider callback
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub provider: Provider,
    /// Provider-scoped stable user id
    pub provider_id: String,
    /// GitHub profiles may omit this
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// GitHub login handle
    pub username: Option<String>,
    pub photo: Option<String>,
    /// Provider access token; encrypted at rest for GitHub only
    pub access_token: Option<String>,
}

/// Outcome of identity resolution
#[derive(Debug)]
pub enum Resolution {
    /// The provider was attached to the already-authenticated user;
    /// no new session tokens are issued.
    Linked(User),
    /// A user logged in (found, updated, or created); the caller
    /// issues a fresh session.
    LoggedIn(User),
}

impl Resolution {
    pub fn user(&self) -> &User {
        match self {
            Self::Linked(user) | Self::LoggedIn(user) => user,
        }
    }
}

/// Resolve an OAuth profile to exactly one user.
///
/// `logged_in_user_id` comes from a still-valid access token on the
/// callback request, if any. Encryption of the GitHub token happens
/// before anything is persisted, so a cipher failure aborts the whole
/// login without leaving a partial record.
pub async fn resolve(
    db: &Database,
    cipher: &TokenCipher,
    profile: &OAuthProfile,
    logged_in_user_id: Option<&str>,
) -> Result<Resolution, AppError> {
    let encrypted_token = match (&profile.access_token, profile.provider) {
        (Some(token), Provider::GitHub) => Some(cipher.encrypt(token)?),
        _ => None,
    };
    let encrypted_triple =
        encrypted_token.map(|sealed| (sealed.ciphertext, sealed.iv, sealed.tag));

    // 1. Account linking: an authenticated request attaching a new provider.
    if let Some(user_id) = logged_in_user_id {
        if let Some(user) = db.get_user_by_id(user_id).await? {
            if provider_is_new_for(&user, profile.provider) {
                let patch = build_patch(&user, profile, encrypted_triple.clone());
                match db.patch_user(&user.id, &patch).await {
                    Ok(true) => {
                        let linked = db
                            .get_user_by_id(&user.id)
                            .await?
                            .ok_or(AppError::NotFound)?;
                        tracing::info!(
                            user_id = %linked.id,
                            provider = profile.provider.as_str(),
                            "Linked provider to existing account"
                        );
                        return Ok(Resolution::Linked(linked));
                    }
                    Ok(false) => {}
                    Err(AppError::Database(error)) if is_unique_violation(&error) => {
                        // The provider id or email already belongs to
                        // another account; treat as a distinct identity.
                        tracing::warn!(
                            user_id = %user.id,
                            provider = profile.provider.as_str(),
                            "Provider link conflicted with another account"
                        );
                    }
                    Err(error) => return Err(error),
                }
            }
        }
    }

    // 2. Find by email, falling back to provider id for profiles
    // without one (and for repeat logins recorded before an email
    // became known).
    let mut existing = match &profile.email {
        Some(email) => db.get_user_by_email(email).await?,
        None => None,
    };
    if existing.is_none() {
        existing = match profile.provider {
            Provider::Google => db.get_user_by_google_id(&profile.provider_id).await?,
            Provider::GitHub => db.get_user_by_github_id(&profile.provider_id).await?,
            Provider::Magic => None,
        };
    }

    if let Some(user) = existing {
        let patch = build_patch(&user, profile, encrypted_triple.clone());
        match db.patch_user(&user.id, &patch).await {
            Ok(_) => {
                let updated = db
                    .get_user_by_id(&user.id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                return Ok(Resolution::LoggedIn(updated));
            }
            Err(AppError::Database(error)) if is_unique_violation(&error) => {
                tracing::warn!(
                    user_id = %user.id,
                    provider = profile.provider.as_str(),
                    "Login update conflicted; creating a distinct account"
                );
            }
            Err(error) => return Err(error),
        }
    }

    // 3. Create a new user from the profile.
    let now = Utc::now();
    let (ciphertext, iv, tag) = match encrypted_triple {
        Some((ciphertext, iv, tag)) => (Some(ciphertext), Some(iv), Some(tag)),
        None => (None, None, None),
    };
    let user = User {
        id: EntityId::new().0,
        email: profile.email.clone(),
        display_name: profile.display_name.clone(),
        github_name: profile.username.clone(),
        photo: profile.photo.clone(),
        provider: profile.provider.as_str().to_string(),
        google_id: (profile.provider == Provider::Google).then(|| profile.provider_id.clone()),
        github_id: (profile.provider == Provider::GitHub).then(|| profile.provider_id.clone()),
        github_token_ciphertext: ciphertext,
        github_token_iv: iv,
        github_token_tag: tag,
        refresh_token_hash: None,
        refresh_expiry: None,
        created_at: now,
        updated_at: now,
    };
    db.insert_user(&user).await?;

    tracing::info!(
        user_id = %user.id,
        provider = profile.provider.as_str(),
        "Created new user"
    );

    Ok(Resolution::LoggedIn(user))
}

fn provider_is_new_for(user: &User, provider: Provider) -> bool {
    match provider {
        Provider::Google => user.google_id.is_none(),
        Provider::GitHub => user.github_id.is_none(),
        Provider::Magic => false,
    }
}

/// Assemble the fields a login may write onto an existing user.
///
/// Provider-specific fields (ids, GitHub handle/token) are always
/// refreshed; shared fields (email, photo, display name) are filled
/// only when missing. `provider` upgrades from magic to an OAuth
/// provider and never downgrades.
fn build_patch(
    user: &User,
    profile: &OAuthProfile,
    encrypted_token: Option<(String, String, String)>,
) -> UserPatch {
    let mut patch = UserPatch::default();

    match profile.provider {
        Provider::Google => {
            if user.google_id.is_none() {
                patch.google_id = Some(profile.provider_id.clone());
            }
        }
        Provider::GitHub => {
            if user.github_id.is_none() {
                patch.github_id = Some(profile.provider_id.clone());
            }
            if let Some(username) = &profile.username {
                if user.github_name.as_deref() != Some(username) {
                    patch.github_name = Some(username.clone());
                }
            }
            patch.github_token = encrypted_token;
        }
        Provider::Magic => {}
    }

    if user.email.is_none() {
        patch.email = profile.email.clone();
    }
    if user.display_name.is_none() {
        patch.display_name = profile.display_name.clone();
    }
    if user.photo.is_none() {
        patch.photo = profile.photo.clone();
    }
    if user.provider == Provider::Magic.as_str() && profile.provider != Provider::Magic {
        patch.provider = Some(profile.provider.as_str().to_string());
    }

    patch
}
