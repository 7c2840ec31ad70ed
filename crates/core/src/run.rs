//! Backup run coordinator: every configured forge, in order, then the
//! healthcheck.

use tracing::{error, info, instrument};

use crate::config::BackupConfig;
use crate::errors::CoreError;
use crate::forge::{ApiConnector, ForgeConnector};
use crate::healthcheck::ping_best_effort;
use crate::mirror::{GitTransport, MirrorEngine, SshGit};
use crate::models::RunReport;
use crate::orchestrator::ForgeOrchestrator;

/// One complete backup run over a loaded configuration.
pub struct BackupRun<T> {
    config: BackupConfig,
    connector: Box<dyn ForgeConnector>,
    engine: MirrorEngine<T>,
}

impl BackupRun<SshGit> {
    /// Real forge APIs and the `git` CLI with the configured SSH key.
    pub fn from_config(config: BackupConfig) -> Self {
        let git = SshGit::new(config.ssh_key.clone(), config.git_timeout());
        Self::new(config, Box::new(ApiConnector), MirrorEngine::new(git))
    }
}

impl<T: GitTransport> BackupRun<T> {
    pub fn new(
        config: BackupConfig,
        connector: Box<dyn ForgeConnector>,
        engine: MirrorEngine<T>,
    ) -> Self {
        Self {
            config,
            connector,
            engine,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Run every forge and return the merged report.
    ///
    /// The healthcheck is pinged only when the report has no failures; its
    /// own failure is logged and does not change the report. An error is
    /// returned only for fatal problems (a forge folder that cannot be
    /// created).
    #[instrument(skip(self), fields(save_folder = %self.config.save_folder.display()))]
    pub async fn execute(&self) -> Result<RunReport, CoreError> {
        let mut report = RunReport {
            started_at: Some(chrono::Utc::now()),
            ..Default::default()
        };

        let orchestrator =
            ForgeOrchestrator::new(self.connector.as_ref(), &self.engine, &self.config.save_folder);
        for forge in &self.config.forges {
            let forge_report = orchestrator.run(forge).await?;
            report.merge(forge_report);
        }
        report.completed_at = Some(chrono::Utc::now());

        if report.has_failures() {
            error!(
                failed_repositories = report.count_failed(),
                failed_forges = report.forge_failures.len(),
                "an error occurred during the backup of at least one repository"
            );
        } else {
            info!(
                cloned = report.count_cloned(),
                updated = report.count_updated(),
                no_content = report.count_no_content(),
                excluded = report.excluded,
                "backup run completed"
            );
            if let Some(url) = self.config.healthcheck_url() {
                ping_best_effort(url).await;
            }
        }

        Ok(report)
    }
}
