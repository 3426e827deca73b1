//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub oauth: OAuthConfig,
    pub magic: MagicLinkConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "api.dox.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Frontend origin, used for CORS and post-login redirects
    /// e.g., "http://localhost:3000"
    pub frontend_url: String,
}

impl ServerConfig {
    /// Get the base URL for the API
    ///
    /// # Returns
    /// Full URL like "https://api.dox.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token signing secret (32+ bytes). Signs access tokens and keys
    /// the HMAC applied to refresh and magic-link tokens.
    pub token_secret: String,
    /// AES-256-GCM key for GitHub access tokens at rest,
    /// hex-encoded (64 hex chars = 32 bytes)
    pub encryption_key: String,
    /// Access token lifetime in seconds (default: 3600 = 1h)
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds (default: 604800 = 7 days)
    pub refresh_token_ttl: i64,
}

/// OAuth provider credentials and endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub google: GoogleOAuthConfig,
    pub github: GitHubOAuthConfig,
}

/// Google OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint, overridable for tests
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    /// Userinfo endpoint, overridable for tests
    #[serde(default = "default_google_userinfo_url")]
    pub userinfo_url: String,
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint, overridable for tests
    #[serde(default = "default_github_token_url")]
    pub token_url: String,
    /// GitHub REST API base, overridable for tests
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_google_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}

fn default_github_token_url() -> String {
    "https://github.com/login/oauth/access_token".to_string()
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Magic-link (passwordless email login) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkConfig {
    /// SMTP relay host
    pub smtp_host: String,
    /// SMTP relay port
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_user: String,
    /// SMTP password
    pub smtp_pass: String,
    /// From address, e.g. "Dox <no-reply@dox.example.com>"
    pub from_address: String,
    /// One-time token lifetime in seconds (default: 600 = 10 minutes)
    pub token_ttl: u64,
    /// Minimum interval between requests per email in seconds (default: 60)
    pub rate_limit_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (DOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("server.frontend_url", "http://localhost:3000")?
            .set_default("auth.access_token_ttl", 3600)?
            .set_default("auth.refresh_token_ttl", 604_800)?
            .set_default("magic.token_ttl", 600)?
            .set_default("magic.rate_limit_interval", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (DOX__*)
            .add_source(
                Environment::with_prefix("DOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_TOKEN_SECRET_BYTES: usize = 32;
        const ENCRYPTION_KEY_HEX_LEN: usize = 64;

        if self.auth.token_secret.as_bytes().len() < MIN_TOKEN_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.token_secret must be at least {} bytes",
                MIN_TOKEN_SECRET_BYTES
            )));
        }

        if self.auth.encryption_key.len() != ENCRYPTION_KEY_HEX_LEN
            || !self
                .auth
                .encryption_key
                .chars()
                .all(|ch| ch.is_ascii_hexdigit())
        {
            return Err(crate::error::AppError::Config(format!(
                "auth.encryption_key must be {} hex characters (32 bytes)",
                ENCRYPTION_KEY_HEX_LEN
            )));
        }

        if self.auth.access_token_ttl <= 0 || self.auth.refresh_token_ttl <= 0 {
            return Err(crate::error::AppError::Config(
                "auth token lifetimes must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure auth cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
