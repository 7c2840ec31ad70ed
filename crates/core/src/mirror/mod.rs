//! Mirror engine: clone-or-fetch for one repository, with outcome
//! classification.
//!
//! The presence of `root/<full_path>` is the only state consulted: absent
//! means `git clone --mirror`, present means `git fetch --prune`. Mirrors are
//! never deleted.

pub mod agent;
pub mod git;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::errors::MirrorError;
use crate::models::{BenignCondition, MirrorOutcome, RepoDescriptor};

pub use agent::EphemeralAgent;
pub use git::SshGit;

/// Exit code recorded when git never produced one (spawn error, timeout,
/// agent failure, killed by signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Exit status and combined stdout/stderr of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Which git operation the engine chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    Clone,
    Fetch,
}

impl std::fmt::Display for MirrorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clone => write!(f, "clone"),
            Self::Fetch => write!(f, "fetch"),
        }
    }
}

/// The two git operations the engine needs.
#[async_trait]
pub trait GitTransport: Send + Sync {
    /// `git clone --mirror <url> <dest>`.
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<CommandOutput, MirrorError>;

    /// `git fetch --prune` inside an existing mirror.
    async fn fetch_prune(&self, repo: &Path) -> Result<CommandOutput, MirrorError>;
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Remote message fragments that turn a failed transfer into a benign no-op.
/// These follow GitLab's wording; update them here if it changes.
const BENIGN_MESSAGES: &[(&str, BenignCondition)] = &[
    (
        "A repository for this project does not exist yet",
        BenignCondition::NoRepository,
    ),
    (
        "You are not allowed to download code from this project",
        BenignCondition::DownloadForbidden,
    ),
];

/// Turn the result of a git invocation into a [`MirrorOutcome`].
///
/// Benign remote messages win over the exit status.
pub fn classify(action: MirrorAction, result: &CommandOutput) -> MirrorOutcome {
    for (needle, reason) in BENIGN_MESSAGES {
        if result.output.contains(needle) {
            return MirrorOutcome::NoContent { reason: *reason };
        }
    }
    if result.success() {
        return match action {
            MirrorAction::Clone => MirrorOutcome::Cloned,
            MirrorAction::Fetch => MirrorOutcome::Updated,
        };
    }
    MirrorOutcome::Failed {
        exit_code: result.exit_code,
        output: result.output.trim_end().to_string(),
    }
}

/// Local mirror location for a repository, or `None` when the path would
/// escape `root`.
pub fn local_path(root: &Path, full_path: &str) -> Option<PathBuf> {
    let relative = Path::new(full_path);
    let mut has_normal = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    has_normal.then(|| root.join(relative))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Keeps one local mirror per repository in sync with its remote.
pub struct MirrorEngine<T> {
    transport: T,
}

impl<T: GitTransport> MirrorEngine<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Clone or fetch `repo` below `root` and classify the result.
    ///
    /// Never returns an error: anything that goes wrong becomes a
    /// [`MirrorOutcome::Failed`] so the caller can move on to the next
    /// repository.
    #[instrument(skip(self, root, repo), fields(repo = %repo.full_path))]
    pub async fn mirror(&self, root: &Path, repo: &RepoDescriptor) -> MirrorOutcome {
        let Some(path) = local_path(root, &repo.full_path) else {
            warn!("refusing repository path outside the backup folder");
            return MirrorOutcome::Failed {
                exit_code: NO_EXIT_CODE,
                output: format!("unsafe repository path '{}'", repo.full_path),
            };
        };

        let action = if path.is_dir() {
            MirrorAction::Fetch
        } else {
            MirrorAction::Clone
        };
        info!(%action, path = %path.display(), "{}", repo.full_path);

        let result = match action {
            MirrorAction::Clone => self.transport.clone_mirror(&repo.clone_url, &path).await,
            MirrorAction::Fetch => self.transport.fetch_prune(&path).await,
        };
        let result = match result {
            Ok(output) => output,
            Err(e) => CommandOutput::new(NO_EXIT_CODE, e.to_string()),
        };

        if !result.output.trim().is_empty() {
            debug!(output = %result.output.trim_end(), "git output");
        }

        let outcome = classify(action, &result);
        match &outcome {
            MirrorOutcome::NoContent { reason } => {
                info!("no repository mirrored, because {}", reason);
            }
            MirrorOutcome::Failed { exit_code, output } => {
                warn!(
                    path = %path.display(),
                    exit_code,
                    output = %output,
                    "getting repository failed"
                );
            }
            MirrorOutcome::Cloned | MirrorOutcome::Updated => {}
        }
        outcome
    }
}
