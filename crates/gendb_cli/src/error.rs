//! CLI errors.

use gendb_core::StoreError;
use thiserror::Error;

/// Failures reported by the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// The `--backend` value names no engine.
    #[error("unknown backend '{0}' (expected sqlite, postgresql or mysql)")]
    UnknownBackend(String),

    /// The store asked a question the command line has to answer.
    #[error("{source}\nhint: re-run with {flag}")]
    Decision {
        /// The question.
        source: StoreError,
        /// Flag answering it.
        flag: &'static str,
    },
}

impl CliError {
    /// Attaches the matching command-line flag to lock, recovery and
    /// upgrade questions; other errors pass through.
    pub fn from_store(err: StoreError) -> Box<dyn std::error::Error> {
        let flag = match &err {
            StoreError::LockHeld { .. } => "--force-unlock",
            StoreError::RecoveryRequired { .. } => "--recover",
            StoreError::UpgradeRequired { .. } => "--upgrade",
            _ => return Box::new(err),
        };
        Box::new(CliError::Decision { source: err, flag })
    }
}
