//! GitHub REST API client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{check_response, http_client, log_listing, ForgeClient, PER_PAGE};
use crate::errors::ForgeError;
use crate::models::{RepoCategory, RepoDescriptor};

/// The subset of a GitHub repository object we need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepo {
    pub full_name: String,
    pub ssh_url: String,
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: &str) -> Result<Self, ForgeError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ForgeError::AuthenticationFailed("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = http_client(headers)?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self { http, api_url })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Repositories the authenticated user owns, collaborates on or can
    /// reach through an organization.
    #[instrument(skip(self))]
    pub async fn list_user_repos(&self) -> Result<Vec<GitHubRepo>, ForgeError> {
        self.paginate("user/repos").await
    }

    /// Repositories starred by the authenticated user.
    #[instrument(skip(self))]
    pub async fn list_starred(&self) -> Result<Vec<GitHubRepo>, ForgeError> {
        self.paginate("user/starred").await
    }

    async fn paginate(&self, endpoint: &str) -> Result<Vec<GitHubRepo>, ForgeError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let mut repos = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .http
                .get(&url)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            let resp = check_response(resp).await?;
            let batch: Vec<GitHubRepo> = resp
                .json()
                .await
                .map_err(|e| ForgeError::ParseError(e.to_string()))?;
            let len = batch.len();
            debug!(endpoint, page, count = len, "fetched page");
            repos.extend(batch);
            if len < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(repos)
    }
}

#[async_trait]
impl ForgeClient for GitHubClient {
    async fn list(&self, category: RepoCategory) -> Result<Vec<RepoDescriptor>, ForgeError> {
        let repos = match category {
            RepoCategory::Owned => self.list_user_repos().await?,
            RepoCategory::Starred => self.list_starred().await?,
            other => {
                return Err(ForgeError::UnsupportedCategory {
                    forge: "github".into(),
                    category: other.to_string(),
                })
            }
        };
        log_listing("github", category, repos.len());
        Ok(repos
            .into_iter()
            .map(|r| RepoDescriptor::new(r.full_name, r.ssh_url, category))
            .collect())
    }
}
