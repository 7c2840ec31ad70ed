//! Domain model types used throughout forge-backup.
//!
//! These types bridge the forge clients, the mirror engine and the run
//! report printed by the CLI.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Forge kinds and categories
// ---------------------------------------------------------------------------

/// Supported forge types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum ForgeKind {
    GitHub,
    GitLab,
}

impl ForgeKind {
    /// Every listing category this forge type can enumerate, in processing
    /// order.
    pub fn categories(&self) -> &'static [RepoCategory] {
        match self {
            Self::GitHub => &[RepoCategory::Owned, RepoCategory::Starred],
            Self::GitLab => &[
                RepoCategory::Private,
                RepoCategory::Internal,
                RepoCategory::Public,
                RepoCategory::Starred,
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ForgeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(ConfigError::UnsupportedForge(other.to_string())),
        }
    }
}

impl TryFrom<String> for ForgeKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ForgeKind> for String {
    fn from(kind: ForgeKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Which listing a repository came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RepoCategory {
    /// Repositories owned by (or shared with) the authenticated GitHub user.
    Owned,
    Private,
    Internal,
    Public,
    Starred,
}

impl RepoCategory {
    /// Human-readable heading used in progress output.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Owned => "Repositories",
            Self::Private => "Private repositories",
            Self::Internal => "Internal repositories",
            Self::Public => "Public repositories",
            Self::Starred => "Starred repositories",
        }
    }
}

impl std::fmt::Display for RepoCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned => write!(f, "owned"),
            Self::Private => write!(f, "private"),
            Self::Internal => write!(f, "internal"),
            Self::Public => write!(f, "public"),
            Self::Starred => write!(f, "starred"),
        }
    }
}

// ---------------------------------------------------------------------------
// Repository descriptor
// ---------------------------------------------------------------------------

/// The minimal record needed to back up one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    /// `namespace/name`, unique within a forge. Also the local folder key.
    pub full_path: String,
    /// SSH clone URL.
    pub clone_url: String,
    pub category: RepoCategory,
}

impl RepoDescriptor {
    pub fn new(
        full_path: impl Into<String>,
        clone_url: impl Into<String>,
        category: RepoCategory,
    ) -> Self {
        Self {
            full_path: full_path.into(),
            clone_url: clone_url.into(),
            category,
        }
    }
}

// ---------------------------------------------------------------------------
// Mirror outcomes
// ---------------------------------------------------------------------------

/// Remote-side answers that mean "nothing to transfer" rather than failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenignCondition {
    /// The project exists but has no repository yet.
    NoRepository,
    /// The token may see the project but not download its code.
    DownloadForbidden,
}

impl std::fmt::Display for BenignCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRepository => write!(f, "the project has no repository"),
            Self::DownloadForbidden => write!(f, "you are not allowed to download the code"),
        }
    }
}

/// Result of mirroring a single repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorOutcome {
    /// A fresh `git clone --mirror` succeeded.
    Cloned,
    /// `git fetch --prune` succeeded on an existing mirror.
    Updated,
    /// The remote reported a benign condition; nothing was written.
    NoContent { reason: BenignCondition },
    /// The operation failed.
    Failed { exit_code: i32, output: String },
}

impl MirrorOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// One repository's entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub forge: String,
    pub full_path: String,
    pub local_path: PathBuf,
    pub outcome: MirrorOutcome,
}

/// A forge that could not be processed at all (e.g. listing retries
/// exhausted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeFailure {
    pub forge: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Aggregated result of a backup run (or of one forge within it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-repository outcomes in processing order.
    pub records: Vec<RepoRecord>,
    pub forge_failures: Vec<ForgeFailure>,
    /// Repositories skipped by an exclusion list.
    pub excluded: u64,
}

impl RunReport {
    /// True when any repository or forge failed.
    pub fn has_failures(&self) -> bool {
        !self.forge_failures.is_empty() || self.records.iter().any(|r| r.outcome.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RepoRecord> {
        self.records.iter().filter(|r| r.outcome.is_failure())
    }

    pub fn count_cloned(&self) -> usize {
        self.count(|o| matches!(o, MirrorOutcome::Cloned))
    }

    pub fn count_updated(&self) -> usize {
        self.count(|o| matches!(o, MirrorOutcome::Updated))
    }

    pub fn count_no_content(&self) -> usize {
        self.count(|o| matches!(o, MirrorOutcome::NoContent { .. }))
    }

    pub fn count_failed(&self) -> usize {
        self.count(MirrorOutcome::is_failure)
    }

    /// Pretty-printed JSON, as written by `run --report`.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Fold another report (typically one forge's) into this one.
    pub fn merge(&mut self, other: RunReport) {
        self.records.extend(other.records);
        self.forge_failures.extend(other.forge_failures);
        self.excluded += other.excluded;
    }

    fn count(&self, pred: impl Fn(&MirrorOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}
