//! Forge API clients.
//!
//! Every forge is reduced to the same question: "which repositories can this
//! token see in category X?". [`ForgeClient`] answers it; [`ForgeConnector`]
//! builds the right client for a [`ForgeConfig`].

pub mod github;
pub mod gitlab;

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::ForgeConfig;
use crate::errors::ForgeError;
use crate::models::{ForgeKind, RepoCategory, RepoDescriptor};

pub use github::GitHubClient;
pub use gitlab::GitLabClient;

/// Page size requested from every listing endpoint.
pub(crate) const PER_PAGE: usize = 100;

const USER_AGENT: &str = concat!("forge-backup/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read-only repository listing for one forge account.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// List every repository in `category`, in the order the API returns
    /// them. A successful call never drops repositories.
    async fn list(&self, category: RepoCategory) -> Result<Vec<RepoDescriptor>, ForgeError>;
}

/// Builds a [`ForgeClient`] for a forge configuration.
pub trait ForgeConnector: Send + Sync {
    fn connect(&self, forge: &ForgeConfig) -> Result<Box<dyn ForgeClient>, ForgeError>;
}

/// Connector that talks to the real GitHub / GitLab HTTP APIs.
#[derive(Debug, Default, Clone)]
pub struct ApiConnector;

impl ForgeConnector for ApiConnector {
    fn connect(&self, forge: &ForgeConfig) -> Result<Box<dyn ForgeClient>, ForgeError> {
        match forge.kind {
            ForgeKind::GitHub => Ok(Box::new(GitHubClient::new(
                forge.github_api_url(),
                forge.token(),
            )?)),
            ForgeKind::GitLab => Ok(Box::new(GitLabClient::new(
                forge.url.as_deref().unwrap_or_default(),
                forge.token(),
            )?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP helpers
// ---------------------------------------------------------------------------

pub(crate) fn http_client(
    headers: reqwest::header::HeaderMap,
) -> Result<reqwest::Client, ForgeError> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(HTTP_TIMEOUT)
        .build()?;
    Ok(http)
}

/// Map a non-success response to a [`ForgeError`].
pub(crate) async fn check_response(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ForgeError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429
        || (status.as_u16() == 403
            && resp
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0"))
    {
        let reset = resp
            .headers()
            .get("x-ratelimit-reset")
            .or_else(|| resp.headers().get("ratelimit-reset"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(ForgeError::RateLimited { reset_at: reset });
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ForgeError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    let body = resp.text().await.unwrap_or_default();
    let body = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.chars().take(500).collect()
    };
    Err(ForgeError::ApiError {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn log_listing(forge: &str, category: RepoCategory, count: usize) {
    info!(forge, %category, count, "listed repositories");
}
