//! `branch_diff`: changed files and a diffstat summary between the branch
//! just left and the branch just entered.

use crate::error::RuleError;
use crate::event::{EventType, GitEvent, GitEventKind};
use crate::git::command::{run_git, truncate_kb};
use crate::rule::{PreFetchResult, Rule};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub struct BranchDiffRule {
    pub project_path: PathBuf,
    pub max_size_kb: usize,
    pub timeout: Duration,
}

#[async_trait]
impl Rule for BranchDiffRule {
    fn name(&self) -> &'static str {
        "branch_diff"
    }

    fn trigger(&self) -> EventType {
        EventType::BranchSwitch
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, event: &GitEvent) -> Result<PreFetchResult, RuleError> {
        let GitEventKind::BranchSwitch { old_branch, new_branch } = &event.kind else {
            return Err(RuleError::Parse(
                "branch_diff rule received a non-branch-switch event".to_string(),
            ));
        };

        let range = format!("{old_branch}..{new_branch}");
        let raw = run_git(
            &self.project_path,
            &["diff", "--stat", &range],
            self.timeout,
        )
        .await?;
        let truncated = truncate_kb(raw, self.max_size_kb);
        let summary = String::from_utf8_lossy(&truncated).to_string();
        let changed_files = parse_changed_files(&summary);

        let mut metadata = HashMap::new();
        metadata.insert("old_branch".to_string(), old_branch.clone());
        metadata.insert("new_branch".to_string(), new_branch.clone());

        Ok(PreFetchResult {
            result_type: self.name().to_string(),
            data: serde_json::json!({
                "summary": summary,
                "changed_files": changed_files,
            }),
            metadata,
            confidence: 1.0,
        })
    }
}

/// Parse `<path> | <stat>` lines, skipping the trailing
/// `N files changed, ...` summary line.
fn parse_changed_files(stat_output: &str) -> Vec<String> {
    stat_output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            if line.contains("file changed") || line.contains("files changed") {
                return None;
            }
            line.split_once('|').map(|(path, _)| path.trim().to_string())
        })
        .collect()
}
