//! Dox server - authentication and repository backend
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                       │
//! │  - Auth endpoints (OAuth, magic links, token lifecycle)     │
//! │  - Profile and repository endpoints                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Auth Layer                              │
//! │  - Identity resolution across providers                     │
//! │  - Token issuing, rotation, verification                    │
//! │  - Encrypted GitHub token storage                           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                             │
//! │  - SQLite (sqlx)                                            │
//! │  - In-memory TTL caches for magic links (moka)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `auth`: Identity, tokens, magic links, middleware
//! - `github`: GitHub REST client
//! - `email`: Outbound mail
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod email;
pub mod error;
pub mod github;
pub mod metrics;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool, ciphers, and HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// AES-256-GCM cipher for GitHub tokens at rest
    pub cipher: Arc<auth::TokenCipher>,

    /// Pending magic links and their rate limits (volatile)
    pub magic: Arc<auth::MagicLinkStore>,

    /// Outbound mail transport
    pub mailer: Arc<dyn email::Mailer>,

    /// GitHub REST client
    pub github: github::GitHubClient,

    /// HTTP client for OAuth providers
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Validate configuration
    /// 2. Connect to SQLite database
    /// 3. Build the token cipher and magic-link caches
    /// 4. Build the SMTP transport and HTTP clients
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let mailer = Arc::new(email::SmtpMailer::new(&config.magic)?);
        Self::with_mailer(config, mailer).await
    }

    /// Initialize application state with a custom mailer.
    ///
    /// Tests inject a capturing mailer here instead of SMTP.
    pub async fn with_mailer(
        config: config::AppConfig,
        mailer: Arc<dyn email::Mailer>,
    ) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        config.validate()?;

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        let cipher = auth::TokenCipher::from_hex_key(&config.auth.encryption_key)?;
        let magic = auth::MagicLinkStore::new(&config.magic);

        let http_client = reqwest::Client::builder()
            .user_agent("DoxServer/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let github =
            github::GitHubClient::new(http_client.clone(), config.oauth.github.api_base.clone());

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            cipher: Arc::new(cipher),
            magic: Arc::new(magic),
            mailer,
            github,
            http_client: Arc::new(http_client),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{compression::CompressionLayer, trace::TraceLayer};

    let cors_layer = build_cors_layer(&state.config.server);

    let protected = Router::new()
        .merge(api::profile_router())
        .merge(api::repos_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::auth_router())
        .merge(protected)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

/// Browser clients sit on the frontend origin and send cookies, so
/// CORS allows exactly that origin with credentials.
fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::{HeaderValue, Method, header};
    use tower_http::cors::CorsLayer;

    match HeaderValue::from_str(&server.frontend_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %server.frontend_url,
                "Failed to parse CORS origin from frontend URL; denying cross-origin requests"
            );
            CorsLayer::new()
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
