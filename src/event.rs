//! Git event types emitted by the detector.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Sentinel branch name used when HEAD points at a raw commit hash.
pub const DETACHED: &str = "detached";

/// The kind of git transition a rule is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    BranchSwitch,
    NewCommit,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BranchSwitch => "branch_switch",
            EventType::NewCommit => "new_commit",
        }
    }
}

/// A single detected git transition. Immutable once emitted.
#[derive(Debug, Clone)]
pub struct GitEvent {
    pub project_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub kind: GitEventKind,
}

#[derive(Debug, Clone)]
pub enum GitEventKind {
    BranchSwitch { old_branch: String, new_branch: String },
    NewCommit { commit_hash: String },
}

impl GitEvent {
    pub fn event_type(&self) -> EventType {
        match &self.kind {
            GitEventKind::BranchSwitch { .. } => EventType::BranchSwitch,
            GitEventKind::NewCommit { .. } => EventType::NewCommit,
        }
    }

    pub fn branch_switch(project_path: PathBuf, old_branch: String, new_branch: String) -> Self {
        Self {
            project_path,
            timestamp: Utc::now(),
            kind: GitEventKind::BranchSwitch { old_branch, new_branch },
        }
    }

    pub fn new_commit(project_path: PathBuf, commit_hash: String) -> Self {
        Self {
            project_path,
            timestamp: Utc::now(),
            kind: GitEventKind::NewCommit { commit_hash },
        }
    }
}
