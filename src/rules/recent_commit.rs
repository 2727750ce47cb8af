//! `recent_commit`: header fields and message of the commit just created.

use crate::error::RuleError;
use crate::event::{EventType, GitEvent, GitEventKind};
use crate::git::command::{run_git, truncate_kb};
use crate::rule::{PreFetchResult, Rule};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub struct RecentCommitRule {
    pub project_path: PathBuf,
    pub max_size_kb: usize,
    pub timeout: Duration,
}

#[async_trait]
impl Rule for RecentCommitRule {
    fn name(&self) -> &'static str {
        "recent_commit"
    }

    fn trigger(&self) -> EventType {
        EventType::NewCommit
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, event: &GitEvent) -> Result<PreFetchResult, RuleError> {
        let GitEventKind::NewCommit { commit_hash } = &event.kind else {
            return Err(RuleError::Parse(
                "recent_commit rule received a non-commit event".to_string(),
            ));
        };

        let raw = run_git(
            &self.project_path,
            &["show", "--stat", commit_hash],
            self.timeout,
        )
        .await?;
        let truncated = truncate_kb(raw, self.max_size_kb);
        let full_output = String::from_utf8_lossy(&truncated).to_string();
        let parsed = parse_show_stat(&full_output);

        let mut metadata = HashMap::new();
        metadata.insert("commit_hash".to_string(), commit_hash.clone());

        Ok(PreFetchResult {
            result_type: self.name().to_string(),
            data: serde_json::json!({
                "hash": parsed.hash.unwrap_or_else(|| commit_hash.clone()),
                "author": parsed.author.unwrap_or_default(),
                "date": parsed.date.unwrap_or_default(),
                "message": parsed.message,
                "full_output": full_output,
            }),
            metadata,
            confidence: 1.0,
        })
    }
}

struct ParsedShowStat {
    hash: Option<String>,
    author: Option<String>,
    date: Option<String>,
    message: String,
}

/// Parse `git show --stat` headers and message, stopping the message at the
/// first line containing `|` (the file-stat block).
fn parse_show_stat(output: &str) -> ParsedShowStat {
    let mut hash = None;
    let mut author = None;
    let mut date = None;
    let mut message_lines = Vec::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("commit ") {
            hash = Some(rest.trim().split_whitespace().next().unwrap_or("").to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("Author:") {
            author = Some(rest.trim().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("Date:") {
            date = Some(rest.trim().to_string());
            continue;
        }
        if line.contains('|') {
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            message_lines.push(trimmed.to_string());
        }
    }

    ParsedShowStat {
        hash,
        author,
        date,
        message: message_lines.join("\n"),
    }
}
