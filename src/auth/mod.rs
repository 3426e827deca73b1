//! Authentication and account identity
//!
//! Handles:
//! - Google and GitHub OAuth login
//! - Passwordless email login (magic links)
//! - Access/refresh token lifecycle
//! - Encrypted GitHub token storage
//! - Authentication middleware

pub mod cipher;
pub mod identity;
pub mod magic;
mod middleware;
pub mod oauth;
pub mod token;

pub use cipher::TokenCipher;
pub use identity::{OAuthProfile, Resolution};
pub use magic::MagicLinkStore;
pub use middleware::{ACCESS_TOKEN_COOKIE, CurrentUser, MaybeUser, REFRESH_TOKEN_COOKIE, require_auth};
pub use token::{Claims, TokenPair};
