//! `common_files`: the files most frequently touched in recent history.
//!
//! Ranking procedure (an Open Question in the distilled spec, fixed here):
//! count file-path occurrences across `git log --stat` over the last
//! `HISTORY_DEPTH` commits, rank by descending count then ascending path
//! for determinism, and truncate to `max_files`.

use crate::error::RuleError;
use crate::event::{EventType, GitEvent};
use crate::git::command::{run_git, truncate_kb};
use crate::rule::{PreFetchResult, Rule};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// How many recent commits feed the frequency count.
const HISTORY_DEPTH: usize = 20;

/// Truncate raw `git log --stat` output before parsing, same as the other
/// rules, even though history output is typically small.
const MAX_LOG_SIZE_KB: usize = 256;

pub struct CommonFilesRule {
    pub project_path: PathBuf,
    pub trigger: EventType,
    pub max_files: usize,
    pub timeout: Duration,
}

#[async_trait]
impl Rule for CommonFilesRule {
    fn name(&self) -> &'static str {
        "common_files"
    }

    fn trigger(&self) -> EventType {
        self.trigger
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, _event: &GitEvent) -> Result<PreFetchResult, RuleError> {
        let depth = HISTORY_DEPTH.to_string();
        let raw = run_git(
            &self.project_path,
            &["log", "-n", &depth, "--stat", "--format="],
            self.timeout,
        )
        .await?;
        let truncated = truncate_kb(raw, MAX_LOG_SIZE_KB);
        let output = String::from_utf8_lossy(&truncated).to_string();

        let ranked = rank_files(&output, self.max_files);
        let entries: Vec<serde_json::Value> = ranked
            .into_iter()
            .map(|path| {
                let size_bytes = std::fs::metadata(self.project_path.join(&path))
                    .map(|m| m.len())
                    .unwrap_or(0);
                serde_json::json!({ "path": path, "size_bytes": size_bytes })
            })
            .collect();

        Ok(PreFetchResult {
            result_type: self.name().to_string(),
            data: serde_json::json!(entries),
            metadata: HashMap::new(),
            confidence: 1.0,
        })
    }
}

fn rank_files(stat_output: &str, max_files: usize) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();

    for line in stat_output.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("file changed") || line.contains("files changed") {
            continue;
        }
        if let Some((path, _)) = line.split_once('|') {
            *counts.entry(path.trim().to_string()).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max_files).map(|(path, _)| path).collect()
}
