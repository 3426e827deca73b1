//! Passwordless email login (magic links)
//!
//! One-time tokens live only in an in-memory TTL cache, keyed by their
//! HMAC so a raw token is never held server-side. Removal from the
//! cache on verify is the single-use arbiter: two concurrent verifies
//! of the same token race on the removal and exactly one wins.
//!
//! The account is found or created (provider "magic") when the link
//! is requested; the uniform 200 response keeps registration state
//! invisible to the requester.

use std::time::Duration;

use moka::future::Cache;

use crate::config::MagicLinkConfig;
use crate::data::{Database, EntityId, Provider, User};
use crate::email::Mailer;
use crate::error::AppError;
use crate::metrics::MAGIC_LINK_REQUESTS_TOTAL;

use super::token::hash_token;

const TOKEN_BYTES: usize = 32;
const MAX_EMAIL_LENGTH: usize = 254;

/// In-memory state for pending magic links.
///
/// `pending` maps HMAC(token) to the requesting email and expires at
/// the link TTL. `recent` remembers emails that requested a link
/// within the rate-limit interval.
pub struct MagicLinkStore {
    pending: Cache<String, String>,
    recent: Cache<String, ()>,
}

impl MagicLinkStore {
    pub fn new(config: &MagicLinkConfig) -> Self {
        Self {
            pending: Cache::builder()
                .time_to_live(Duration::from_secs(config.token_ttl))
                .max_capacity(100_000)
                .build(),
            recent: Cache::builder()
                .time_to_live(Duration::from_secs(config.rate_limit_interval))
                .max_capacity(100_000)
                .build(),
        }
    }
}

/// Basic shape check on a submitted email address.
pub fn validate_email(email: &str) -> Result<(), AppError> {
    let invalid = || AppError::Validation("Invalid email address".to_string());

    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    // Domain needs at least one dot with labels on both sides
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }

    Ok(())
}

/// Generate, store, and email a one-time sign-in link.
///
/// The account is found or created up front, so it exists even if the
/// link is never used. The link targets the verify endpoint with the
/// raw token; only the token's HMAC is kept. Repeat requests for the
/// same email within the rate-limit interval are rejected with
/// `RateLimited`. The success response is the same whether the
/// account was found or created.
pub async fn request_magic_link(
    db: &Database,
    store: &MagicLinkStore,
    mailer: &dyn Mailer,
    token_secret: &str,
    verify_base_url: &str,
    email: &str,
) -> Result<(), AppError> {
    validate_email(email)?;

    let email = email.to_ascii_lowercase();
    if store.recent.contains_key(&email) {
        MAGIC_LINK_REQUESTS_TOTAL
            .with_label_values(&["rate_limited"])
            .inc();
        return Err(AppError::RateLimited);
    }

    find_or_create_user(db, &email).await?;

    let raw_token = generate_link_token();
    let token_hash = hash_token(&raw_token, token_secret)?;

    store.pending.insert(token_hash, email.clone()).await;
    store.recent.insert(email.clone(), ()).await;

    let link = format!(
        "{}/auth/magic/verify?token={}",
        verify_base_url.trim_end_matches('/'),
        raw_token
    );

    if let Err(error) = mailer.send_magic_link(&email, &link).await {
        MAGIC_LINK_REQUESTS_TOTAL
            .with_label_values(&["delivery_failed"])
            .inc();
        tracing::error!(%error, "Magic link delivery failed");
        return Err(error);
    }

    MAGIC_LINK_REQUESTS_TOTAL.with_label_values(&["sent"]).inc();
    tracing::info!("Magic link sent");

    Ok(())
}

/// Redeem a one-time token for the account created at request time.
///
/// The cache entry is removed before anything else, so the token is
/// spent even if a later step fails. Unknown, expired, already-used,
/// and orphaned tokens are indistinguishable to the caller.
pub async fn verify_magic_link(
    db: &Database,
    store: &MagicLinkStore,
    token_secret: &str,
    raw_token: &str,
) -> Result<User, AppError> {
    let token_hash = hash_token(raw_token, token_secret)?;

    let email = store
        .pending
        .remove(&token_hash)
        .await
        .ok_or(AppError::InvalidOrExpiredLink)?;

    db.get_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidOrExpiredLink)
}

/// Look up the account for an address, creating it on first contact.
async fn find_or_create_user(db: &Database, email: &str) -> Result<User, AppError> {
    if let Some(user) = db.get_user_by_email(email).await? {
        return Ok(user);
    }

    let now = chrono::Utc::now();
    let user = User {
        id: EntityId::new().0,
        email: Some(email.to_string()),
        display_name: None,
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
        created_at: now,
        updated_at: now,
    };
    match db.insert_user(&user).await {
        Ok(()) => {
            tracing::info!(user_id = %user.id, "Created user from magic link request");
            Ok(user)
        }
        // A concurrent request for the same new address can win the
        // insert; the row it created is the account.
        Err(AppError::Database(error)) if crate::data::is_unique_violation(&error) => db
            .get_user_by_email(email)
            .await?
            .ok_or(AppError::Database(error)),
        Err(error) => Err(error),
    }
}

fn generate_link_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
