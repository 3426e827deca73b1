//! Data models
//!
//! Rust structs representing database entities.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Provider
// =============================================================================

/// Identity provider that created or most recently authenticated an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    GitHub,
    Magic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
            Self::Magic => "magic",
        }
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered user
///
/// Accounts are keyed by the first stable identifier known at creation
/// time (email if present, else provider id). Additional providers may
/// attach to the same row over time; rows are never hard-deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// Unique when present; GitHub profiles may omit it
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// GitHub login handle
    pub github_name: Option<String>,
    /// Avatar URL from the provider
    pub photo: Option<String>,
    /// Provider provenance: google, github, or magic
    pub provider: String,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    /// AES-256-GCM ciphertext of the GitHub access token (hex)
    pub github_token_ciphertext: Option<String>,
    /// GCM nonce for the stored GitHub token (hex)
    pub github_token_iv: Option<String>,
    /// GCM authentication tag (hex)
    pub github_token_tag: Option<String>,
    /// HMAC-SHA256 of the current refresh token (hex); raw value is never stored
    pub refresh_token_hash: Option<String>,
    pub refresh_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether all three columns of the encrypted GitHub token are present
    pub fn has_github_token(&self) -> bool {
        self.github_token_ciphertext.is_some()
            && self.github_token_iv.is_some()
            && self.github_token_tag.is_some()
    }
}

// =============================================================================
// Connected repository
// =============================================================================

/// A GitHub repository a user connected for documentation generation
///
/// Created by an explicit connect action and removed by disconnect;
/// (user_id, repo_id) is unique.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConnectedRepo {
    pub id: String,
    pub user_id: String,
    /// GitHub numeric repository id, stored as a string
    pub repo_id: String,
    pub name: String,
    /// Owner login
    pub owner: String,
    pub branch: String,
    pub private: bool,
    pub created_at: DateTime<Utc>,
}
