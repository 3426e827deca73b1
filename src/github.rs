//! GitHub REST API client
//!
//! Minimal client for the repository operations: listing the repos a
//! token can see and fetching a single repo's metadata. Calls are
//! made with the user's decrypted OAuth token, never an app token.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Repository metadata as served to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    pub id: u64,
    pub name: String,
    pub owner: RepoOwner,
    pub private: bool,
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

/// GitHub API client bound to one API base URL.
///
/// The base is configurable so tests can target a local stub.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_base: String) -> Self {
        Self { http, api_base }
    }

    /// List repositories visible to the token, newest first.
    pub async fn list_repos(&self, access_token: &str) -> Result<Vec<RepoInfo>, AppError> {
        let response = self
            .http
            .get(format!("{}/user/repos", self.api_base))
            .query(&[
                ("visibility", "all"),
                ("sort", "updated"),
                ("per_page", "100"),
            ])
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthorized);
        }
        let response = response.error_for_status()?;

        Ok(response.json().await?)
    }

    /// Fetch one repository's metadata.
    ///
    /// # Returns
    /// `NotFound` when the repo does not exist or the token cannot
    /// see it; GitHub does not distinguish the two.
    pub async fn get_repo(
        &self,
        access_token: &str,
        owner: &str,
        name: &str,
    ) -> Result<RepoInfo, AppError> {
        let response = self
            .http
            .get(format!("{}/repos/{}/{}", self.api_base, owner, name))
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(AppError::NotFound),
            reqwest::StatusCode::UNAUTHORIZED => Err(AppError::Unauthorized),
            _ => Ok(response.error_for_status()?.json().await?),
        }
    }
}
