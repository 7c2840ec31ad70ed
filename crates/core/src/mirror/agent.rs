//! Single-use `ssh-agent` holding exactly one key.
//!
//! Each git operation gets its own agent: started in a private temporary
//! directory, loaded with the configured key, and killed when the guard is
//! dropped. The key never reaches the user's own agent.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, instrument};

use crate::errors::MirrorError;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
const STARTUP_POLL: Duration = Duration::from_millis(25);

/// A running `ssh-agent -D` bound to a socket in a temporary directory.
///
/// Dropping the guard kills the agent and removes the directory.
pub struct EphemeralAgent {
    child: Child,
    socket: PathBuf,
    // Dropped after `child`, so the socket disappears with the agent.
    _dir: TempDir,
}

impl EphemeralAgent {
    /// Start an agent and load `key` into it.
    #[instrument(skip_all, fields(key = %key.display()))]
    pub async fn start(key: &Path) -> Result<Self, MirrorError> {
        let dir = tempfile::Builder::new()
            .prefix("forge-backup-agent-")
            .tempdir()?;
        let socket = dir.path().join("agent.sock");

        let mut child = Command::new("ssh-agent")
            .arg("-D")
            .arg("-a")
            .arg(&socket)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MirrorError::AgentError("ssh-agent not found on PATH".into())
                } else {
                    MirrorError::IoError(e)
                }
            })?;

        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while !socket.exists() {
            if let Some(status) = child.try_wait()? {
                return Err(MirrorError::AgentError(format!(
                    "ssh-agent exited during startup ({})",
                    status
                )));
            }
            if Instant::now() >= deadline {
                return Err(MirrorError::AgentError(
                    "ssh-agent did not create its socket in time".into(),
                ));
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }
        debug!(socket = %socket.display(), "ssh-agent started");

        let agent = Self {
            child,
            socket,
            _dir: dir,
        };
        agent.add_key(key).await?;
        Ok(agent)
    }

    /// Value for `SSH_AUTH_SOCK`.
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Stop the agent and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "ssh-agent already gone");
        }
    }

    async fn add_key(&self, key: &Path) -> Result<(), MirrorError> {
        // -q: no "Identity added" chatter.
        let output = Command::new("ssh-add")
            .arg("-q")
            .arg(key)
            .env("SSH_AUTH_SOCK", &self.socket)
            .env("SSH_ASKPASS_REQUIRE", "never")
            .env_remove("DISPLAY")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MirrorError::AgentError("ssh-add not found on PATH".into())
                } else {
                    MirrorError::IoError(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MirrorError::AgentError(format!(
                "ssh-add failed for '{}': {}",
                key.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}
