//! `git` CLI transport over SSH with an ephemeral identity.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::agent::EphemeralAgent;
use super::{CommandOutput, GitTransport, NO_EXIT_CODE};
use crate::errors::MirrorError;

/// SSH invocation for git. Host keys are neither checked nor recorded so
/// unattended runs never stop at a prompt; `-q` silences the
/// "Permanently added" warnings.
pub const GIT_SSH_COMMAND: &str =
    "ssh -q -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no -o BatchMode=yes";

/// Runs `git` as a child process with argument vectors (no shell).
#[derive(Debug, Clone)]
pub struct SshGit {
    ssh_key: PathBuf,
    timeout: Duration,
    git_binary: String,
}

impl SshGit {
    pub fn new(ssh_key: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ssh_key: ssh_key.into(),
            timeout,
            git_binary: "git".into(),
        }
    }

    /// Use a different `git` executable.
    pub fn with_git_binary(mut self, git_binary: impl Into<String>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    pub fn ssh_key(&self) -> &Path {
        &self.ssh_key
    }

    async fn run(
        &self,
        operation: &str,
        dir: Option<&Path>,
        args: &[&OsStr],
    ) -> Result<CommandOutput, MirrorError> {
        let agent = EphemeralAgent::start(&self.ssh_key).await?;

        let mut cmd = Command::new(&self.git_binary);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .env("GIT_SSH_COMMAND", GIT_SSH_COMMAND)
            .env("SSH_AUTH_SOCK", agent.socket())
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(operation, args = ?args, "running git command");
        let result = tokio::time::timeout(self.timeout, cmd.output()).await;
        agent.shutdown().await;

        let output = match result {
            Err(_) => {
                return Err(MirrorError::Timeout {
                    operation: operation.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MirrorError::BinaryNotFound(self.git_binary.clone()))
            }
            Ok(Err(e)) => return Err(MirrorError::IoError(e)),
            Ok(Ok(output)) => output,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Ok(CommandOutput::new(
            output.status.code().unwrap_or(NO_EXIT_CODE),
            combined,
        ))
    }
}

#[async_trait]
impl GitTransport for SshGit {
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn clone_mirror(&self, url: &str, dest: &Path) -> Result<CommandOutput, MirrorError> {
        // `--` keeps a hostile URL from being read as an option.
        let args = [
            OsStr::new("clone"),
            OsStr::new("--mirror"),
            OsStr::new("--"),
            OsStr::new(url),
            dest.as_os_str(),
        ];
        self.run("clone", None, &args).await
    }

    #[instrument(skip(self, repo), fields(repo = %repo.display()))]
    async fn fetch_prune(&self, repo: &Path) -> Result<CommandOutput, MirrorError> {
        let args = [OsStr::new("fetch"), OsStr::new("--prune")];
        self.run("fetch", Some(repo), &args).await
    }
}
