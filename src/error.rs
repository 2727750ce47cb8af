//! Error types for the pre-fetch engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the git topology resolver
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("path is not a git repository: {0}")]
    NotGitRepo(PathBuf),

    #[error("path is not a git repository: {0}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the event detector
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to initialize filesystem watcher: {0}")]
    WatcherInit(#[source] notify::Error),

    #[error("failed to register watch on {path}: {source}")]
    WatchRegister {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Why a single rule execution failed
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule exceeded its deadline")]
    Timeout,

    #[error("git subprocess failed: {0}")]
    Subprocess(String),

    #[error("failed to parse rule output: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuleError::Timeout)
    }
}

/// Top level error type for anything that crosses the engine's public API
#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PrefetchError>;
