//! Configuration loading and validation.
//!
//! The configuration is a YAML document (TOML is accepted when the file name
//! ends in `.toml`) describing where mirrors live, which SSH key to use and
//! which forges to enumerate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::models::{ForgeKind, RepoCategory};
use crate::orchestrator::RetryPolicy;

/// Default GitHub API base.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root folder; each forge gets a sub-folder named after it.
    pub save_folder: PathBuf,

    /// Private key loaded into the ephemeral agent for every git operation.
    pub ssh_key: PathBuf,

    /// Pinged with a single GET after a run with zero failures.
    #[serde(default)]
    pub healthcheck_url: Option<String>,

    /// Upper bound for one git clone/fetch, in seconds.
    #[serde(default = "default_git_timeout")]
    pub git_timeout: u64,

    /// Forges in processing order.
    #[serde(default)]
    pub forges: Vec<ForgeConfig>,
}

fn default_git_timeout() -> u64 {
    1800
}

impl BackupConfig {
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout)
    }

    /// The healthcheck URL, treating an empty string as unset.
    pub fn healthcheck_url(&self) -> Option<&str> {
        self.healthcheck_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Forge config
// ---------------------------------------------------------------------------

/// One forge account to back up.
#[derive(Clone, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(rename = "type")]
    pub kind: ForgeKind,

    /// Folder / label for this forge. Defaults to the type.
    #[serde(default)]
    pub name: Option<String>,

    /// GitLab instance base URL, e.g. `https://gitlab.com`.
    #[serde(default)]
    pub url: Option<String>,

    /// GitHub API base, for GitHub Enterprise installs.
    #[serde(default)]
    pub api_url: Option<String>,

    /// API token. Takes precedence over `token_env`.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Environment variable holding the token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Full paths (`namespace/name`) never to back up.
    #[serde(default)]
    pub exclude: HashSet<String>,

    /// Seconds to wait before each repository (GitLab only).
    #[serde(default)]
    pub sleep: Option<u64>,

    /// Subset of categories to back up, in the given order.
    #[serde(default)]
    pub categories: Option<Vec<RepoCategory>>,

    /// Listing attempts per category.
    #[serde(default)]
    pub retry_attempts: Option<u32>,

    /// Seconds between listing attempts.
    #[serde(default)]
    pub retry_delay: Option<u64>,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_env", &self.token_env)
            .field("exclude", &self.exclude)
            .field("sleep", &self.sleep)
            .field("categories", &self.categories)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl ForgeConfig {
    /// A bare config of the given kind, mostly useful in tests.
    pub fn new(kind: ForgeKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            url: None,
            api_url: None,
            token: Some(token.into()),
            token_env: None,
            exclude: HashSet::new(),
            sleep: None,
            categories: None,
            retry_attempts: None,
            retry_delay: None,
        }
    }

    /// Folder and log label: explicit `name`, else the forge type.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(self.kind.as_str())
    }

    /// The resolved token; empty until `resolve_env_vars` ran when only
    /// `token_env` was given.
    pub fn token(&self) -> &str {
        self.token.as_deref().unwrap_or("")
    }

    pub fn github_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_GITHUB_API_URL)
    }

    /// Delay before each repository. Only honoured for GitLab.
    pub fn sleep_duration(&self) -> Option<Duration> {
        match self.kind {
            ForgeKind::GitLab => self.sleep.filter(|s| *s > 0).map(Duration::from_secs),
            ForgeKind::GitHub => None,
        }
    }

    /// Categories to enumerate, in processing order.
    pub fn categories(&self) -> Vec<RepoCategory> {
        match &self.categories {
            Some(selected) => selected.clone(),
            None => self.kind.categories().to_vec(),
        }
    }

    /// Listing retry policy: GitLab retries by default, GitHub does not.
    pub fn retry_policy(&self) -> RetryPolicy {
        let default = match self.kind {
            ForgeKind::GitLab => RetryPolicy::gitlab_default(),
            ForgeKind::GitHub => RetryPolicy::none(),
        };
        RetryPolicy {
            attempts: self.retry_attempts.unwrap_or(default.attempts),
            delay: self
                .retry_delay
                .map(Duration::from_secs)
                .unwrap_or(default.delay),
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let field = |name: &str| format!("forges[{}].{}", index, name);

        match self.kind {
            ForgeKind::GitLab => {
                let url = self.url.as_deref().unwrap_or("").trim();
                if url.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: field("url"),
                        detail: "GitLab forges require the instance URL".into(),
                    });
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::InvalidValue {
                        field: field("url"),
                        detail: format!("'{}' is not an http(s) URL", url),
                    });
                }
            }
            ForgeKind::GitHub => {
                if self.url.is_some() {
                    warn!(forge = %self.display_name(), "'url' is ignored for GitHub forges");
                }
                if self.sleep.is_some() {
                    warn!(forge = %self.display_name(), "'sleep' is ignored for GitHub forges");
                }
            }
        }

        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            if crate::mirror::local_path(Path::new(""), name).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: field("name"),
                    detail: format!("'{}' must be a relative folder name without '..'", name),
                });
            }
        }

        if self.token().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: field("token"),
                detail: "a non-empty token (or token_env) is required".into(),
            });
        }

        if let Some(selected) = &self.categories {
            if selected.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field("categories"),
                    detail: "category list must not be empty; omit it to back up everything"
                        .into(),
                });
            }
            let mut seen = HashSet::new();
            for category in selected {
                if !self.kind.categories().contains(category) {
                    return Err(ConfigError::InvalidValue {
                        field: field("categories"),
                        detail: format!("{} forges have no '{}' category", self.kind, category),
                    });
                }
                if !seen.insert(*category) {
                    return Err(ConfigError::InvalidValue {
                        field: field("categories"),
                        detail: format!("category '{}' listed twice", category),
                    });
                }
            }
        }

        if self.retry_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: field("retry_attempts"),
                detail: "at least one attempt is required".into(),
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl BackupConfig {
    /// Load a [`BackupConfig`] from a YAML (or `.toml`) file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        let config = if is_toml {
            Self::from_toml_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };

        debug!(forges = config.forges.len(), "configuration parsed successfully");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Resolve `token_env` references and expand `~/` in paths.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        self.save_folder = expand_tilde(&self.save_folder);
        self.ssh_key = expand_tilde(&self.ssh_key);

        for (index, forge) in self.forges.iter_mut().enumerate() {
            if forge.token.as_deref().is_some_and(|t| !t.is_empty()) {
                continue;
            }
            if let Some(var) = forge.token_env.as_deref() {
                let value = std::env::var(var).ok().filter(|v| !v.is_empty());
                match value {
                    Some(token) => {
                        debug!(forge = %forge.display_name(), env_name = var, "resolved token from env var");
                        forge.token = Some(token);
                    }
                    None => {
                        return Err(ConfigError::EnvVarMissing {
                            var: var.to_string(),
                            field: format!("forges[{}].token_env", index),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_folder.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "save_folder".into(),
                detail: "save folder must not be empty".into(),
            });
        }
        if self.ssh_key.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ssh_key".into(),
                detail: "SSH key path must not be empty".into(),
            });
        }
        if self.git_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "git_timeout".into(),
                detail: "git timeout must be > 0".into(),
            });
        }
        if let Some(url) = self.healthcheck_url() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "healthcheck_url".into(),
                    detail: format!("'{}' is not an http(s) URL", url),
                });
            }
        }
        if self.forges.is_empty() {
            warn!("no forges configured, nothing will be backed up");
        }

        let mut names: HashMap<&str, usize> = HashMap::new();
        for (index, forge) in self.forges.iter().enumerate() {
            forge.validate(index)?;
            if let Some(previous) = names.insert(forge.display_name(), index) {
                warn!(
                    name = %forge.display_name(),
                    first = previous,
                    second = index,
                    "two forges share a folder name; their mirrors will be stored together"
                );
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a default YAML config template string.
    pub fn default_template() -> &'static str {
        r#"# forge-backup configuration

# Every forge gets a sub-folder here; mirrors live at <save_folder>/<forge>/<namespace>/<repo>.
save_folder: "~/backups/forges"

# Private key used for git over SSH. It is loaded into a throwaway ssh-agent
# for each git operation and never added to your own agent.
ssh_key: "~/.ssh/id_ed25519_backup"

# Pinged with a single GET when a run finishes without failures.
healthcheck_url: ""

# Upper bound for a single clone/fetch, in seconds.
git_timeout: 1800

forges:
  - type: github
    token_env: "GITHUB_TOKEN"
    exclude:
      - "someone/huge-dataset"

  - type: gitlab
    name: "gitlab.com"
    url: "https://gitlab.com"
    token_env: "GITLAB_TOKEN"
    # categories: [private, internal, public, starred]
    # sleep: 1            # seconds before each repository
    # retry_attempts: 3   # listing attempts per category
    # retry_delay: 10     # seconds between attempts
"#
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
save_folder: "/srv/backup"
ssh_key: "/home/backup/.ssh/id_ed25519"
healthcheck_url: "https://hc-ping.com/abc"
forges:
  - type: github
    token: "ghp_secret"
    exclude:
      - "org/secret-repo"
  - type: gitlab
    name: "work"
    url: "https://gitlab.example.com"
    token: "glpat-secret"
    sleep: 2
    categories: [private, starred]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = BackupConfig::from_yaml_str(sample_yaml()).expect("failed to parse yaml");
        assert_eq!(config.save_folder, PathBuf::from("/srv/backup"));
        assert_eq!(config.forges.len(), 2);
        assert_eq!(config.healthcheck_url(), Some("https://hc-ping.com/abc"));
        assert_eq!(config.git_timeout, 1800);

        let github = &config.forges[0];
        assert_eq!(github.kind, ForgeKind::GitHub);
        assert_eq!(github.display_name(), "github");
        assert!(github.exclude.contains("org/secret-repo"));
        assert_eq!(github.categories(), vec![RepoCategory::Owned, RepoCategory::Starred]);

        let gitlab = &config.forges[1];
        assert_eq!(gitlab.display_name(), "work");
        assert_eq!(gitlab.sleep_duration(), Some(Duration::from_secs(2)));
        assert_eq!(gitlab.categories(), vec![RepoCategory::Private, RepoCategory::Starred]);
        config.validate().expect("sample should validate");
    }

    #[test]
    fn test_unsupported_forge_type_is_rejected() {
        let yaml = r#"
save_folder: "/srv/backup"
ssh_key: "/key"
forges:
  - type: bitbucket
    token: "x"
"#;
        let err = BackupConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("forge type not supported"));
    }

    #[test]
    fn test_gitlab_requires_url() {
        let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
        config.forges[1].url = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "forges[1].url"
        ));
    }

    #[test]
    fn test_rejects_forge_name_escaping_save_folder() {
        for bad in ["../x", "/srv/other", "work/../../x"] {
            let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
            config.forges[1].name = Some(bad.into());
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidValue { ref field, .. }) if field == "forges[1].name"
                ),
                "{bad} should be rejected"
            );
        }

        let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
        config.forges[1].name = Some("gitlab.example.com".into());
        config.validate().expect("plain folder name is fine");
    }

    #[test]
    fn test_github_sleep_is_ignored() {
        let mut forge = ForgeConfig::new(ForgeKind::GitHub, "t");
        forge.sleep = Some(5);
        assert_eq!(forge.sleep_duration(), None);
    }

    #[test]
    fn test_rejects_foreign_category() {
        let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
        config.forges[0].categories = Some(vec![RepoCategory::Internal]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "forges[0].categories"
        ));
    }

    #[test]
    fn test_rejects_missing_token() {
        let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
        config.forges[0].token = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_defaults() {
        let github = ForgeConfig::new(ForgeKind::GitHub, "t");
        assert_eq!(github.retry_policy().attempts, 1);

        let mut gitlab = ForgeConfig::new(ForgeKind::GitLab, "t");
        assert_eq!(gitlab.retry_policy(), RetryPolicy::gitlab_default());

        gitlab.retry_attempts = Some(5);
        gitlab.retry_delay = Some(0);
        let policy = gitlab.retry_policy();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.delay, Duration::ZERO);
    }

    #[test]
    fn test_empty_healthcheck_is_disabled() {
        let mut config = BackupConfig::from_yaml_str(sample_yaml()).unwrap();
        config.healthcheck_url = Some("  ".into());
        assert_eq!(config.healthcheck_url(), None);
        config.healthcheck_url = None;
        assert_eq!(config.healthcheck_url(), None);
    }

    #[test]
    fn test_resolve_token_env() {
        std::env::set_var("TEST_FORGE_BACKUP_GL_TOKEN", "glpat-from-env");
        let yaml = r#"
save_folder: "/srv/backup"
ssh_key: "/key"
forges:
  - type: gitlab
    url: "https://gitlab.com"
    token_env: "TEST_FORGE_BACKUP_GL_TOKEN"
"#;
        let mut config = BackupConfig::from_yaml_str(yaml).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.forges[0].token(), "glpat-from-env");
        std::env::remove_var("TEST_FORGE_BACKUP_GL_TOKEN");
    }

    #[test]
    fn test_resolve_missing_token_env() {
        let yaml = r#"
save_folder: "/srv/backup"
ssh_key: "/key"
forges:
  - type: github
    token_env: "TEST_FORGE_BACKUP_DEFINITELY_UNSET"
"#;
        let mut config = BackupConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            config.resolve_env_vars(),
            Err(ConfigError::EnvVarMissing { ref var, .. }) if var == "TEST_FORGE_BACKUP_DEFINITELY_UNSET"
        ));
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.toml");
        std::fs::write(
            &path,
            r#"
save_folder = "/srv/backup"
ssh_key = "/key"

[[forges]]
type = "github"
token = "ghp_x"
exclude = ["a/b"]
"#,
        )
        .unwrap();
        let config = BackupConfig::load_and_resolve(&path).expect("load failed");
        assert_eq!(config.forges[0].kind, ForgeKind::GitHub);
        assert!(config.forges[0].exclude.contains("a/b"));
    }

    #[test]
    fn test_file_not_found() {
        let result = BackupConfig::load_from_file("/nonexistent/backup.yml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let forge = ForgeConfig::new(ForgeKind::GitHub, "ghp_supersecret");
        let rendered = format!("{:?}", forge);
        assert!(!rendered.contains("ghp_supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_default_template_is_valid() {
        let config = BackupConfig::from_yaml_str(BackupConfig::default_template())
            .expect("default template should be valid YAML");
        assert_eq!(config.forges.len(), 2);
        assert_eq!(config.forges[1].display_name(), "gitlab.com");
    }
}
