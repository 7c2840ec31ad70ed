//! forge-backup core library.
//!
//! Enumerates the repositories a token can reach on GitHub and GitLab and
//! keeps a `git clone --mirror` of each one on local disk: configuration,
//! forge API clients, exclusion filtering, the mirror engine, per-forge
//! orchestration and the run coordinator.

pub mod config;
pub mod errors;
pub mod filter;
pub mod forge;
pub mod healthcheck;
pub mod mirror;
pub mod models;
pub mod orchestrator;
pub mod run;

// Re-exports for convenience.
pub use config::{BackupConfig, ForgeConfig};
pub use mirror::MirrorEngine;
pub use models::RunReport;
pub use run::BackupRun;
