//! Full backup runs with a scripted forge and a recording git transport.
//!
//! The healthcheck endpoint is a mock HTTP server so the "ping only on a
//! clean run" rule can be asserted end to end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use forge_backup_core::config::{BackupConfig, ForgeConfig};
use forge_backup_core::errors::{ForgeError, MirrorError};
use forge_backup_core::forge::{ForgeClient, ForgeConnector};
use forge_backup_core::mirror::{CommandOutput, GitTransport, MirrorEngine};
use forge_backup_core::models::{
    BenignCondition, ForgeKind, MirrorOutcome, RepoCategory, RepoDescriptor,
};
use forge_backup_core::run::BackupRun;

// ===========================================================================
// Fakes
// ===========================================================================

#[derive(Clone, Default)]
struct ScriptedForge {
    listings: HashMap<RepoCategory, Vec<RepoDescriptor>>,
}

#[async_trait]
impl ForgeClient for ScriptedForge {
    async fn list(&self, category: RepoCategory) -> Result<Vec<RepoDescriptor>, ForgeError> {
        Ok(self.listings.get(&category).cloned().unwrap_or_default())
    }
}

/// Hands out the same scripted forge for every configured forge name.
struct ScriptedConnector {
    forges: HashMap<String, ScriptedForge>,
}

impl ForgeConnector for ScriptedConnector {
    fn connect(&self, forge: &ForgeConfig) -> Result<Box<dyn ForgeClient>, ForgeError> {
        self.forges
            .get(forge.display_name())
            .cloned()
            .map(|f| Box::new(f) as Box<dyn ForgeClient>)
            .ok_or_else(|| ForgeError::AuthenticationFailed("unknown forge".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GitOp {
    Clone { url: String, dest: PathBuf },
    Fetch { repo: PathBuf },
}

/// Records every invocation; clones create the destination directory.
/// URLs listed in `failing` exit with 128, URLs in `empty` answer like a
/// GitLab project without a repository.
#[derive(Clone, Default)]
struct RecordingGit {
    ops: Arc<Mutex<Vec<GitOp>>>,
    failing: Vec<String>,
    empty: Vec<String>,
}

impl RecordingGit {
    fn ops(&self) -> Vec<GitOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitTransport for RecordingGit {
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<CommandOutput, MirrorError> {
        self.ops.lock().unwrap().push(GitOp::Clone {
            url: url.to_string(),
            dest: dest.to_path_buf(),
        });
        if self.empty.iter().any(|e| e == url) {
            return Ok(CommandOutput::new(
                128,
                "Cloning into bare repository...\n\
                 remote: \n\
                 remote: ========================================================================\n\
                 remote: \n\
                 remote: ERROR: A repository for this project does not exist yet.\n\
                 remote: \n\
                 remote: ========================================================================\n\
                 remote: \n\
                 fatal: Could not read from remote repository.\n",
            ));
        }
        if self.failing.iter().any(|f| f == url) {
            return Ok(CommandOutput::new(128, "fatal: Could not read from remote repository.\n"));
        }
        std::fs::create_dir_all(dest)?;
        Ok(CommandOutput::new(0, ""))
    }

    async fn fetch_prune(&self, repo: &Path) -> Result<CommandOutput, MirrorError> {
        self.ops.lock().unwrap().push(GitOp::Fetch {
            repo: repo.to_path_buf(),
        });
        Ok(CommandOutput::new(0, ""))
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn repo(full_path: &str, category: RepoCategory) -> RepoDescriptor {
    RepoDescriptor::new(full_path, format!("git@forge:{}.git", full_path), category)
}

fn config(save_folder: &Path, healthcheck_url: Option<String>, forges: Vec<ForgeConfig>) -> BackupConfig {
    BackupConfig {
        save_folder: save_folder.to_path_buf(),
        ssh_key: save_folder.join("id_ed25519"),
        healthcheck_url,
        git_timeout: 60,
        forges,
    }
}

fn github_forge_with_exclusion() -> (ForgeConfig, ScriptedForge) {
    let mut forge = ForgeConfig::new(ForgeKind::GitHub, "ghp_test");
    forge.exclude.insert("org/secret-repo".to_string());

    let mut scripted = ScriptedForge::default();
    scripted.listings.insert(
        RepoCategory::Owned,
        vec![
            repo("org/a", RepoCategory::Owned),
            repo("org/secret-repo", RepoCategory::Owned),
            repo("org/b", RepoCategory::Owned),
        ],
    );
    (forge, scripted)
}

fn connector(entries: Vec<(&str, ScriptedForge)>) -> Box<dyn ForgeConnector> {
    Box::new(ScriptedConnector {
        forges: entries
            .into_iter()
            .map(|(name, forge)| (name.to_string(), forge))
            .collect(),
    })
}

async fn healthcheck_server(expected_pings: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping/abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(expected_pings)
        .mount(&server)
        .await;
    server
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_excluded_repository_is_never_mirrored() {
    let tmp = TempDir::new().unwrap();
    let server = healthcheck_server(1).await;
    let (forge, scripted) = github_forge_with_exclusion();
    let git = RecordingGit::default();

    let run = BackupRun::new(
        config(tmp.path(), Some(format!("{}/ping/abc", server.uri())), vec![forge]),
        connector(vec![("github", scripted)]),
        MirrorEngine::new(git.clone()),
    );
    let report = run.execute().await.unwrap();

    let github_dir = tmp.path().join("github");
    assert_eq!(
        git.ops(),
        vec![
            GitOp::Clone {
                url: "git@forge:org/a.git".into(),
                dest: github_dir.join("org/a"),
            },
            GitOp::Clone {
                url: "git@forge:org/b.git".into(),
                dest: github_dir.join("org/b"),
            },
        ]
    );
    assert_eq!(report.excluded, 1);
    assert_eq!(report.count_cloned(), 2);
    assert!(!report.has_failures());
    assert!(report.started_at.is_some());
    assert!(report.completed_at.is_some());
    assert!(!github_dir.join("org/secret-repo").exists());
}

#[tokio::test]
async fn test_second_run_fetches_existing_mirrors() {
    let tmp = TempDir::new().unwrap();
    let (forge, scripted) = github_forge_with_exclusion();
    let git = RecordingGit::default();

    let run = BackupRun::new(
        config(tmp.path(), None, vec![forge]),
        connector(vec![("github", scripted)]),
        MirrorEngine::new(git.clone()),
    );
    run.execute().await.unwrap();
    let report = run.execute().await.unwrap();

    let github_dir = tmp.path().join("github");
    let ops = git.ops();
    assert_eq!(ops.len(), 4);
    assert_eq!(
        &ops[2..],
        &[
            GitOp::Fetch {
                repo: github_dir.join("org/a"),
            },
            GitOp::Fetch {
                repo: github_dir.join("org/b"),
            },
        ]
    );
    assert_eq!(report.count_updated(), 2);
    assert_eq!(report.count_cloned(), 0);
}

#[tokio::test]
async fn test_failure_in_one_forge_does_not_stop_the_next_and_skips_healthcheck() {
    let tmp = TempDir::new().unwrap();
    let server = healthcheck_server(0).await;

    let (github, github_scripted) = github_forge_with_exclusion();

    let mut gitlab = ForgeConfig::new(ForgeKind::GitLab, "glpat_test");
    gitlab.name = Some("work".into());
    gitlab.url = Some("https://gitlab.example.com".into());
    let mut gitlab_scripted = ScriptedForge::default();
    gitlab_scripted.listings.insert(
        RepoCategory::Private,
        vec![repo("team/internal-tool", RepoCategory::Private)],
    );

    let git = RecordingGit {
        failing: vec!["git@forge:org/a.git".into()],
        ..Default::default()
    };

    let run = BackupRun::new(
        config(
            tmp.path(),
            Some(format!("{}/ping/abc", server.uri())),
            vec![github, gitlab],
        ),
        connector(vec![("github", github_scripted), ("work", gitlab_scripted)]),
        MirrorEngine::new(git.clone()),
    );
    let report = run.execute().await.unwrap();

    assert!(report.has_failures());
    assert_eq!(report.count_failed(), 1);
    assert_eq!(report.count_cloned(), 2);

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed[0].full_path, "org/a");
    assert!(matches!(
        failed[0].outcome,
        MirrorOutcome::Failed { exit_code: 128, .. }
    ));

    let records: Vec<(&str, &str)> = report
        .records
        .iter()
        .map(|r| (r.forge.as_str(), r.full_path.as_str()))
        .collect();
    assert_eq!(
        records,
        vec![
            ("github", "org/a"),
            ("github", "org/b"),
            ("work", "team/internal-tool"),
        ]
    );
    assert!(tmp.path().join("work/team/internal-tool").is_dir());
}

#[tokio::test]
async fn test_unreachable_forge_is_reported_and_run_continues() {
    let tmp = TempDir::new().unwrap();
    let (github, github_scripted) = github_forge_with_exclusion();

    let mut unknown = ForgeConfig::new(ForgeKind::GitLab, "glpat_test");
    unknown.name = Some("gone".into());

    let git = RecordingGit::default();
    let run = BackupRun::new(
        config(tmp.path(), None, vec![unknown, github]),
        connector(vec![("github", github_scripted)]),
        MirrorEngine::new(git.clone()),
    );
    let report = run.execute().await.unwrap();

    assert_eq!(report.forge_failures.len(), 1);
    assert_eq!(report.forge_failures[0].forge, "gone");
    assert_eq!(report.count_cloned(), 2);
    assert!(report.has_failures());
}

#[tokio::test]
async fn test_project_without_repository_keeps_run_successful() {
    let tmp = TempDir::new().unwrap();
    let server = healthcheck_server(1).await;

    let mut gitlab = ForgeConfig::new(ForgeKind::GitLab, "glpat_test");
    gitlab.url = Some("https://gitlab.example.com".into());
    let mut scripted = ScriptedForge::default();
    scripted.listings.insert(
        RepoCategory::Private,
        vec![
            repo("team/empty", RepoCategory::Private),
            repo("team/full", RepoCategory::Private),
        ],
    );

    let git = RecordingGit {
        empty: vec!["git@forge:team/empty.git".into()],
        ..Default::default()
    };
    let run = BackupRun::new(
        config(tmp.path(), Some(format!("{}/ping/abc", server.uri())), vec![gitlab]),
        connector(vec![("gitlab", scripted)]),
        MirrorEngine::new(git.clone()),
    );
    let report = run.execute().await.unwrap();

    assert!(!report.has_failures());
    assert_eq!(report.count_no_content(), 1);
    assert_eq!(report.count_cloned(), 1);
    assert_eq!(
        report.records[0].outcome,
        MirrorOutcome::NoContent {
            reason: BenignCondition::NoRepository
        }
    );
    assert!(!tmp.path().join("gitlab/team/empty").exists());
}

#[tokio::test]
async fn test_failing_healthcheck_does_not_fail_the_run() {
    let tmp = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping/abc"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (forge, scripted) = github_forge_with_exclusion();
    let run = BackupRun::new(
        config(tmp.path(), Some(format!("{}/ping/abc", server.uri())), vec![forge]),
        connector(vec![("github", scripted)]),
        MirrorEngine::new(RecordingGit::default()),
    );
    let report = run.execute().await.unwrap();
    assert!(!report.has_failures());
}
