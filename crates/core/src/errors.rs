//! Error types for the forge-backup core library.
//!
//! Each subsystem has its own error type derived with `thiserror`;
//! [`CoreError`] is what a run as a whole can fail with.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Errors that abort a whole backup run.
///
/// Forge, mirror and healthcheck problems never abort a run: they are
/// recorded in the [`crate::models::RunReport`] or logged.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
///
/// All of these are fatal: a run never starts talking to a forge while its
/// configuration is in doubt.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// YAML / TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// The forge `type` is not one we know how to talk to.
    #[error("forge type not supported: '{0}'")]
    UnsupportedForge(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid or missing.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file or preparing folders.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Forge API errors
// ---------------------------------------------------------------------------

/// Errors from forge listing APIs (GitHub, GitLab).
#[derive(Debug, Error)]
pub enum ForgeError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("forge HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("forge API error (HTTP {status}): {body}")]
    ApiError {
        status: u16,
        body: String,
    },

    /// Token is missing, expired or lacks scope.
    #[error("forge authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("forge rate limit exceeded, resets at {reset_at}")]
    RateLimited {
        reset_at: String,
    },

    /// The response body could not be decoded.
    #[error("forge response parse error: {0}")]
    ParseError(String),

    /// The forge has no listing for this category.
    #[error("{forge} has no '{category}' listing")]
    UnsupportedCategory {
        forge: String,
        category: String,
    },

    /// Every listing attempt failed.
    #[error("listing {category} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        category: String,
        attempts: u32,
        last: Box<ForgeError>,
    },
}

// ---------------------------------------------------------------------------
// Mirror errors
// ---------------------------------------------------------------------------

/// Errors that prevent a git mirror operation from producing an exit status.
///
/// A git process that runs and exits non-zero is *not* a `MirrorError`; it
/// is classified into a [`crate::models::MirrorOutcome`] instead.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The ephemeral SSH agent could not be started or loaded.
    #[error("ssh agent error: {0}")]
    AgentError(String),

    /// The git operation did not finish in time and was killed.
    #[error("git {operation} timed out after {secs}s")]
    Timeout {
        operation: String,
        secs: u64,
    },

    /// Generic I/O wrapper.
    #[error("mirror I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Healthcheck errors
// ---------------------------------------------------------------------------

/// Errors from the success ping.
#[derive(Debug, Error)]
pub enum HealthcheckError {
    /// HTTP transport error.
    #[error("healthcheck HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("healthcheck endpoint returned HTTP {0}")]
    BadStatus(u16),
}
