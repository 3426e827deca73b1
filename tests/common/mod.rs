//! Common test utilities for E2E tests

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::Path, http::StatusCode, response::IntoResponse, routing::get, routing::post};
use dox_server::{AppState, config, email::Mailer, error::AppError};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Mailer that captures outbound magic links instead of sending them.
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl MemoryMailer {
    pub fn last_link(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|(_, link)| link.clone())
    }
}

#[axum::async_trait]
impl Mailer for MemoryMailer {
    async fn send_magic_link(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), link.to_string()));
        Ok(())
    }
}

/// Test server instance
///
/// Runs the full router on a random port with a temp database, a
/// capturing mailer, and OAuth/GitHub endpoints pointed at a local
/// stub provider.
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
    pub mailer: Arc<MemoryMailer>,
    pub _temp_dir: TempDir,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Stand in for Google and GitHub
        let stub_addr = spawn_stub_provider().await;

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                token_secret: "test-secret-key-at-least-32-bytes!!".to_string(),
                encryption_key: "ab".repeat(32),
                access_token_ttl: 3600,
                refresh_token_ttl: 604_800,
            },
            oauth: config::OAuthConfig {
                google: config::GoogleOAuthConfig {
                    client_id: "test-google-client".to_string(),
                    client_secret: "test-google-secret".to_string(),
                    token_url: format!("{stub_addr}/google/token"),
                    userinfo_url: format!("{stub_addr}/google/userinfo"),
                },
                github: config::GitHubOAuthConfig {
                    client_id: "test-github-client".to_string(),
                    client_secret: "test-github-secret".to_string(),
                    token_url: format!("{stub_addr}/github/token"),
                    api_base: format!("{stub_addr}/github"),
                },
            },
            magic: config::MagicLinkConfig {
                smtp_host: "localhost".to_string(),
                smtp_port: 2525,
                smtp_user: "unused".to_string(),
                smtp_pass: "unused".to_string(),
                from_address: "Dox <no-reply@dox.test>".to_string(),
                token_ttl: 600,
                rate_limit_interval: 60,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let mailer = Arc::new(MemoryMailer::default());

        // Initialize app state with the capturing mailer
        let state = AppState::with_mailer(config, mailer.clone())
            .await
            .unwrap();

        // Redirects stay visible to the tests; cookies are passed
        // explicitly.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = dox_server::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            client,
            mailer,
            _temp_dir: temp_dir,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Run the full GitHub OAuth dance against the stub provider and
    /// return the session cookies from the callback.
    pub async fn login_github(&self) -> SessionCookies {
        self.login_oauth("github").await
    }

    /// Same dance against the stubbed Google endpoints.
    pub async fn login_google(&self) -> SessionCookies {
        self.login_oauth("google").await
    }

    async fn login_oauth(&self, provider: &str) -> SessionCookies {
        let response = self
            .client
            .get(self.url(&format!("/auth/{provider}")))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_redirection());

        let csrf = cookie_value(&response, "oauth_state").expect("state cookie");

        let callback = self
            .client
            .get(self.url(&format!(
                "/auth/{provider}/callback?code=test-code&state={csrf}"
            )))
            .header("Cookie", format!("oauth_state={csrf}"))
            .send()
            .await
            .unwrap();
        assert!(
            callback.status().is_redirection(),
            "callback failed: {}",
            callback.status()
        );

        SessionCookies::from_response(&callback).expect("session cookies on callback")
    }
}

/// The access/refresh cookie pair from a login response.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    pub access_token: String,
    pub refresh_token: String,
}

impl SessionCookies {
    pub fn from_response(response: &reqwest::Response) -> Option<Self> {
        Some(Self {
            access_token: cookie_value(response, "access_token")?,
            refresh_token: cookie_value(response, "refresh_token")?,
        })
    }

    /// Cookie header value carrying both tokens.
    pub fn header(&self) -> String {
        format!(
            "access_token={}; refresh_token={}",
            self.access_token, self.refresh_token
        )
    }
}

/// Extract a cookie's value from a response's Set-Cookie headers.
pub fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .find_map(|cookie| {
            let value = cookie.strip_prefix(&prefix)?;
            let value = value.split(';').next().unwrap_or(value);
            (!value.is_empty()).then(|| value.to_string())
        })
}

// =============================================================================
// Stub OAuth/GitHub provider
// =============================================================================

/// Spawn a local server that answers like Google and GitHub.
///
/// Token endpoints accept anything; the fixed profiles and repos below
/// are all the tests need.
async fn spawn_stub_provider() -> String {
    let app = Router::new()
        .route("/google/token", post(stub_token))
        .route("/google/userinfo", get(stub_google_userinfo))
        .route("/github/token", post(stub_token))
        .route("/github/user", get(stub_github_user))
        .route("/github/user/emails", get(stub_github_emails))
        .route("/github/user/repos", get(stub_github_repos))
        .route("/github/repos/:owner/:repo", get(stub_github_repo));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn stub_token() -> Json<Value> {
    Json(json!({ "access_token": "stub-provider-token", "token_type": "bearer" }))
}

async fn stub_google_userinfo() -> Json<Value> {
    Json(json!({
        "sub": "google-user-1",
        "email": "ada@example.com",
        "name": "Ada Lovelace",
        "picture": "https://example.com/ada.png"
    }))
}

async fn stub_github_user() -> Json<Value> {
    Json(json!({
        "id": 101,
        "login": "ada-dev",
        "name": "Ada Lovelace",
        "avatar_url": "https://example.com/ada-gh.png",
        "email": null
    }))
}

async fn stub_github_emails() -> Json<Value> {
    Json(json!([
        { "email": "ada@example.com", "primary": true, "verified": true }
    ]))
}

async fn stub_github_repos() -> Json<Value> {
    Json(json!([
        {
            "id": 500,
            "name": "dox",
            "owner": { "login": "ada-dev" },
            "private": false,
            "default_branch": "main",
            "description": "Documentation generator",
            "html_url": "https://github.com/ada-dev/dox"
        },
        {
            "id": 501,
            "name": "notes",
            "owner": { "login": "ada-dev" },
            "private": true,
            "default_branch": "trunk",
            "description": null,
            "html_url": "https://github.com/ada-dev/notes"
        }
    ]))
}

async fn stub_github_repo(Path((owner, repo)): Path<(String, String)>) -> impl IntoResponse {
    match (owner.as_str(), repo.as_str()) {
        ("ada-dev", "dox") => Json(json!({
            "id": 500,
            "name": "dox",
            "owner": { "login": "ada-dev" },
            "private": false,
            "default_branch": "main"
        }))
        .into_response(),
        ("ada-dev", "notes") => Json(json!({
            "id": 501,
            "name": "notes",
            "owner": { "login": "ada-dev" },
            "private": true,
            "default_branch": "trunk"
        }))
        .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response(),
    }
}
