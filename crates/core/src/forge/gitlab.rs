//! GitLab REST API (v4) client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{check_response, http_client, log_listing, ForgeClient, PER_PAGE};
use crate::errors::ForgeError;
use crate::models::{RepoCategory, RepoDescriptor};

/// GitLab's `Reporter` role; the lowest level that may read code.
pub const REPORTER_ACCESS: u32 = 20;

/// The subset of a GitLab project object we need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabProject {
    pub path_with_namespace: String,
    pub ssh_url_to_repo: String,
}

/// Asynchronous GitLab REST API client.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitLabClient {
    /// `base_url` is the instance root, e.g. `https://gitlab.com`.
    pub fn new(base_url: impl Into<String>, token: &str) -> Result<Self, ForgeError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut private_token = HeaderValue::from_str(token)
            .map_err(|_| ForgeError::AuthenticationFailed("token is not a valid header value".into()))?;
        private_token.set_sensitive(true);
        headers.insert("private-token", private_token);

        let http = http_client(headers)?;
        info!(base_url = %base_url, "created GitLabClient");
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List projects matching the given `/projects` query.
    #[instrument(skip(self))]
    pub async fn list_projects(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<GitLabProject>, ForgeError> {
        let url = format!("{}/api/v4/projects", self.base_url);
        let mut projects = Vec::new();
        let mut page = 1usize;
        loop {
            let resp = self
                .http
                .get(&url)
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            let resp = check_response(resp).await?;
            let next_page = next_page_header(resp.headers());
            let batch: Vec<GitLabProject> = resp
                .json()
                .await
                .map_err(|e| ForgeError::ParseError(e.to_string()))?;
            let len = batch.len();
            debug!(page, count = len, "fetched page");
            projects.extend(batch);

            match next_page {
                Some(next) if next > page => page = next,
                Some(_) => break,
                // Without the header (keyset pagination, proxies) fall back to
                // "a short page is the last page".
                None if len < PER_PAGE => break,
                None => page += 1,
            }
        }
        Ok(projects)
    }
}

/// Query parameters for one listing category.
pub fn category_query(category: RepoCategory) -> Option<Vec<(&'static str, String)>> {
    let reporter = REPORTER_ACCESS.to_string();
    let query = match category {
        RepoCategory::Private => vec![("visibility", "private".to_string())],
        RepoCategory::Internal => vec![
            ("visibility", "internal".to_string()),
            ("min_access_level", reporter),
        ],
        RepoCategory::Public => vec![
            ("visibility", "public".to_string()),
            ("min_access_level", reporter),
        ],
        RepoCategory::Starred => vec![("starred", "true".to_string())],
        RepoCategory::Owned => return None,
    };
    Some(query)
}

/// `x-next-page` is empty on the last page.
fn next_page_header(headers: &HeaderMap) -> Option<usize> {
    let value = headers.get("x-next-page")?.to_str().ok()?.trim();
    if value.is_empty() {
        return Some(0);
    }
    value.parse().ok()
}

#[async_trait]
impl ForgeClient for GitLabClient {
    async fn list(&self, category: RepoCategory) -> Result<Vec<RepoDescriptor>, ForgeError> {
        let query = category_query(category).ok_or_else(|| ForgeError::UnsupportedCategory {
            forge: "gitlab".into(),
            category: category.to_string(),
        })?;
        let projects = self.list_projects(&query).await?;
        log_listing("gitlab", category, projects.len());
        Ok(projects
            .into_iter()
            .map(|p| RepoDescriptor::new(p.path_with_namespace, p.ssh_url_to_repo, category))
            .collect())
    }
}
