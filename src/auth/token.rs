//! Access and refresh token issuance
//!
//! Access tokens are HMAC-signed claim payloads stored in cookies,
//! stateless by design: validity is signature plus expiry, nothing
//! server-side. Refresh tokens are opaque random values whose HMAC
//! hash is persisted on the user row and rotated on every use.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;
use crate::data::{Database, User};
use crate::error::AppError;

/// Refresh token length in bytes before hex encoding
const REFRESH_TOKEN_BYTES: usize = 40;

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Display name
    pub name: Option<String>,
    pub email: Option<String>,
    /// Provider that authenticated this session
    pub provider: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            id: user.id.clone(),
            name: user.display_name.clone(),
            email: user.email.clone(),
            provider: user.provider.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now().timestamp()
    }
}

/// Freshly issued access/refresh pair.
///
/// `refresh_token` is the raw value destined for an http-only cookie;
/// only its hash was persisted.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

type HmacSha256 = Hmac<Sha256>;

/// Create a signed access token
///
/// Token format: base64(payload).base64(hmac_sha256(payload))
pub fn create_access_token(claims: &Claims, secret: &str) -> Result<String, AppError> {
    // 1. Serialize claims to JSON
    let payload =
        serde_json::to_string(claims).map_err(|e| AppError::Internal(e.into()))?;

    // 2. Base64 encode the payload
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());

    // 3. Create HMAC-SHA256 signature
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    // 4. Return "{payload}.{signature}"
    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode an access token
///
/// `allow_expired` lets the refresh flow recover the user id from an
/// expired-but-authentic token; signature failures are always fatal.
///
/// # Errors
/// Returns `Unauthorized` if the token is malformed, the signature is
/// invalid, or (unless `allow_expired`) the token has expired.
pub fn verify_access_token(
    token: &str,
    secret: &str,
    allow_expired: bool,
) -> Result<Claims, AppError> {
    // 1. Split token into payload and signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(AppError::Unauthorized);
    }

    let payload_b64 = parts[0];
    let signature_b64 = parts[1];

    // 2. Verify HMAC signature
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::Unauthorized)?;

    // 3. Decode and deserialize payload
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;

    let payload_str =
        String::from_utf8(payload_bytes).map_err(|_| AppError::Unauthorized)?;

    let claims: Claims =
        serde_json::from_str(&payload_str).map_err(|_| AppError::Unauthorized)?;

    // 4. Check expiry
    if !allow_expired && claims.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(claims)
}

/// Generate a raw refresh token (40 random bytes, hex-encoded)
pub fn generate_refresh_token() -> String {
    let mut bytes = [0_u8; REFRESH_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// HMAC-SHA256 hash of a raw token, keyed by the signing secret (hex)
///
/// Also applied to magic-link tokens; only hashes touch storage.
pub fn hash_token(raw: &str, secret: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(raw.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Issue a fresh access/refresh pair for a user.
///
/// Persists only the refresh token's hash and its expiry; the raw
/// refresh token goes back to the caller for the cookie.
pub async fn issue_session(
    db: &Database,
    user: &User,
    auth: &AuthConfig,
) -> Result<TokenPair, AppError> {
    let claims = Claims::for_user(user, auth.access_token_ttl);
    let access_token = create_access_token(&claims, &auth.token_secret)?;

    let refresh_token = generate_refresh_token();
    let refresh_hash = hash_token(&refresh_token, &auth.token_secret)?;
    let refresh_expiry = refresh_expiry_from_now(auth);

    if !db
        .set_refresh_token(&user.id, &refresh_hash, refresh_expiry)
        .await?
    {
        return Err(AppError::NotFound);
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Rotate a session: exchange a valid refresh token for a new pair.
///
/// The presented access token may be expired but must carry a valid
/// signature. Refresh tokens are strictly single-use: the stored hash
/// is swapped for the new one in a single conditional UPDATE, so of
/// two concurrent rotations presenting the same token exactly one
/// matches the stored hash and wins. The loser, like an expired or
/// unknown token, fails with `Unauthorized` and forces a fresh login.
pub async fn rotate_session(
    db: &Database,
    old_access_token: &str,
    raw_refresh_token: &str,
    auth: &AuthConfig,
) -> Result<TokenPair, AppError> {
    use crate::metrics::TOKEN_ROTATIONS_TOTAL;

    // Recover the user id, ignoring expiry but not the signature.
    let claims = verify_access_token(old_access_token, &auth.token_secret, true)?;

    let presented_hash = hash_token(raw_refresh_token, &auth.token_secret)?;

    let user = db
        .get_user_by_id(&claims.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Expiry can be checked from the row: nothing moves it except a
    // rotation, and that also replaces the hash the UPDATE matches on.
    let expiry_valid = matches!(user.refresh_expiry, Some(expiry) if expiry > Utc::now());

    let refresh_token = generate_refresh_token();
    let refresh_hash = hash_token(&refresh_token, &auth.token_secret)?;

    let consumed = expiry_valid
        && db
            .consume_refresh_token(
                &user.id,
                &presented_hash,
                &refresh_hash,
                refresh_expiry_from_now(auth),
            )
            .await?;
    if !consumed {
        TOKEN_ROTATIONS_TOTAL.with_label_values(&["rejected"]).inc();
        return Err(AppError::Unauthorized);
    }

    let access_claims = Claims::for_user(&user, auth.access_token_ttl);
    let access_token = create_access_token(&access_claims, &auth.token_secret)?;

    TOKEN_ROTATIONS_TOTAL.with_label_values(&["rotated"]).inc();

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Expiry timestamp of a refresh token issued now
pub fn refresh_expiry_from_now(auth: &AuthConfig) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(auth.refresh_token_ttl)
}
