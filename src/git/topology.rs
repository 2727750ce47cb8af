//! Git topology resolution: working directory -> git metadata directory.
//!
//! Handles both main checkouts (`.git` is a directory) and linked worktrees
//! (`.git` is a text file of the form `gitdir: <path>`).

use crate::error::TopologyError;
use std::path::{Path, PathBuf};

const GITDIR_PREFIX: &str = "gitdir:";

/// Resolve `<project_path>/.git` to the actual git metadata directory.
pub fn resolve_git_dir(project_path: &Path) -> Result<PathBuf, TopologyError> {
    let dot_git = project_path.join(".git");

    let meta = match std::fs::symlink_metadata(&dot_git) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TopologyError::NotGitRepo(project_path.to_path_buf()))
        }
        Err(e) => {
            return Err(TopologyError::Io {
                path: dot_git,
                source: e,
            })
        }
    };

    if meta.is_dir() {
        return Ok(dot_git);
    }

    if meta.is_file() {
        let content = std::fs::read_to_string(&dot_git).map_err(|e| TopologyError::Io {
            path: dot_git.clone(),
            source: e,
        })?;
        return parse_gitdir_file(project_path, &content);
    }

    Err(TopologyError::Malformed {
        path: dot_git,
        reason: "neither a directory nor a regular file".to_string(),
    })
}

fn parse_gitdir_file(project_path: &Path, content: &str) -> Result<PathBuf, TopologyError> {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix(GITDIR_PREFIX) else {
        return Err(TopologyError::Malformed {
            path: project_path.join(".git"),
            reason: format!("expected '{GITDIR_PREFIX}' prefix, found {trimmed:?}"),
        });
    };

    let gitdir = rest.trim();
    if gitdir.is_empty() {
        return Err(TopologyError::Malformed {
            path: project_path.join(".git"),
            reason: "gitdir path is empty".to_string(),
        });
    }

    let path = PathBuf::from(gitdir);
    let resolved = if path.is_absolute() {
        path
    } else {
        project_path.join(path)
    };

    Ok(resolved)
}
