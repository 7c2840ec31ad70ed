//! Drives one forge end to end: list every category, filter, mirror each
//! repository.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::config::ForgeConfig;
use crate::errors::{ConfigError, ForgeError};
use crate::filter::apply_exclusions;
use crate::forge::{ForgeClient, ForgeConnector};
use crate::mirror::{local_path, GitTransport, MirrorEngine};
use crate::models::{ForgeFailure, RepoCategory, RepoDescriptor, RepoRecord, RunReport};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Fixed-delay retry for listing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always >= 1.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn gitlab_default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

/// List one category, retrying transient failures according to `policy`.
pub async fn list_with_retry(
    client: &dyn ForgeClient,
    category: RepoCategory,
    policy: RetryPolicy,
) -> Result<Vec<RepoDescriptor>, ForgeError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match client.list(category).await {
            Ok(repos) => return Ok(repos),
            // Neither gets better by waiting.
            Err(e @ (ForgeError::UnsupportedCategory { .. } | ForgeError::AuthenticationFailed(_))) => {
                return Err(e)
            }
            Err(e) if attempt >= attempts => {
                return Err(ForgeError::RetriesExhausted {
                    category: category.to_string(),
                    attempts,
                    last: Box::new(e),
                })
            }
            Err(e) => {
                warn!(
                    %category,
                    attempt,
                    max_attempts = attempts,
                    delay_secs = policy.delay.as_secs(),
                    error = %e,
                    "listing failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs a single forge against a shared mirror engine.
pub struct ForgeOrchestrator<'a, T> {
    connector: &'a dyn ForgeConnector,
    engine: &'a MirrorEngine<T>,
    save_root: &'a Path,
}

impl<'a, T: GitTransport> ForgeOrchestrator<'a, T> {
    pub fn new(
        connector: &'a dyn ForgeConnector,
        engine: &'a MirrorEngine<T>,
        save_root: &'a Path,
    ) -> Self {
        Self {
            connector,
            engine,
            save_root,
        }
    }

    /// Back up every selected repository of `forge`.
    ///
    /// Listing problems end up in [`RunReport::forge_failures`] and
    /// repository problems in [`RunReport::records`]; only a folder that
    /// cannot be created is returned as an error.
    #[instrument(skip_all, fields(forge = %forge.display_name()))]
    pub async fn run(&self, forge: &ForgeConfig) -> Result<RunReport, ConfigError> {
        let name = forge.display_name();
        let folder = local_path(self.save_root, name).ok_or_else(|| ConfigError::InvalidValue {
            field: "name".into(),
            detail: format!("forge folder '{}' must stay inside the save folder", name),
        })?;
        std::fs::create_dir_all(&folder).map_err(|e| ConfigError::InvalidValue {
            field: "save_folder".into(),
            detail: format!("cannot create '{}': {}", folder.display(), e),
        })?;

        info!(kind = %forge.kind, folder = %folder.display(), "** saving repositories from {}", name);
        let mut report = RunReport::default();

        let client = match self.connector.connect(forge) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "could not create forge client");
                report.forge_failures.push(ForgeFailure {
                    forge: name.to_string(),
                    message: e.to_string(),
                });
                return Ok(report);
            }
        };

        // Everything is listed up front so a listing that never succeeds
        // leaves the forge untouched.
        let policy = forge.retry_policy();
        let mut listings = Vec::new();
        for category in forge.categories() {
            match list_with_retry(client.as_ref(), category, policy).await {
                Ok(repos) => listings.push((category, repos)),
                Err(e) => {
                    error!(%category, error = %e, "giving up on forge");
                    report.forge_failures.push(ForgeFailure {
                        forge: name.to_string(),
                        message: e.to_string(),
                    });
                    return Ok(report);
                }
            }
        }

        let sleep = forge.sleep_duration();
        for (category, repos) in listings {
            info!("* {}...", category.title());
            let (repos, skipped) = apply_exclusions(repos, &forge.exclude);
            report.excluded += skipped;

            for repo in repos {
                if let Some(delay) = sleep {
                    tokio::time::sleep(delay).await;
                }
                let outcome = self.engine.mirror(&folder, &repo).await;
                let local = local_path(&folder, &repo.full_path).unwrap_or_else(|| folder.clone());
                report.records.push(RepoRecord {
                    forge: name.to_string(),
                    full_path: repo.full_path,
                    local_path: local,
                    outcome,
                });
            }
        }

        info!(
            repositories = report.records.len(),
            excluded = report.excluded,
            failed = report.count_failed(),
            "forge done"
        );
        Ok(report)
    }
}
