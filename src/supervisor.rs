//! Project supervisor: owns a detector and a project-scoped rule registry,
//! drives events through the shared executor into the shared cache.

use crate::cache::ResultCache;
use crate::config::Config;
use crate::detector::Detector;
use crate::error::DetectorError;
use crate::executor::Executor;
use crate::metrics::MetricsSink;
use crate::rule::RuleRegistry;
use crate::rules::{BranchDiffRule, CommonFilesRule, RecentCommitRule};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Created,
    Running,
    Stopped,
}

/// One per watched project. Re-entry is forbidden: a stopped supervisor
/// cannot be restarted.
pub struct Supervisor {
    project_path: PathBuf,
    detector: Detector,
    registry: RuleRegistry,
    executor: Arc<Executor>,
    cache: Arc<ResultCache>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    state: AtomicU8,
}

const STATE_CREATED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

impl Supervisor {
    pub fn new(
        project_path: PathBuf,
        config: &Config,
        cache: Arc<ResultCache>,
        executor: Arc<Executor>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, DetectorError> {
        let detector = Detector::new(project_path.clone())?;
        let registry = build_registry(&project_path, config);

        Ok(Self {
            project_path,
            detector,
            registry,
            executor,
            cache,
            metrics,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(STATE_CREATED),
        })
    }

    pub fn state(&self) -> SupervisorState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => SupervisorState::Running,
            STATE_STOPPED => SupervisorState::Stopped,
            _ => SupervisorState::Created,
        }
    }

    /// Shared cache instance, exposed so an external MCP handler can query
    /// by project path.
    pub fn cache(&self) -> Arc<ResultCache> {
        self.cache.clone()
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Blocks, consuming events until `stop()` is called. Starts the
    /// detector internally.
    pub async fn start(&mut self) -> Result<(), DetectorError> {
        if self
            .state
            .compare_exchange(STATE_CREATED, STATE_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Already running or stopped: re-entry is forbidden.
            return Ok(());
        }

        let mut events = self.detector.events().expect("events() already taken");
        self.detector.start()?;

        let project_path = self.project_path.to_string_lossy().to_string();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                maybe_event = events.recv() => {
                    match maybe_event {
                        None => break,
                        Some(event) => {
                            self.metrics.inc_git_event(event.event_type().as_str());
                            let rules = self.registry.rules_for_event(event.event_type());
                            if rules.is_empty() {
                                continue;
                            }
                            let results = self.executor.run(&event, &rules, &self.cancel).await;
                            if !results.is_empty() {
                                self.cache.set(&project_path, results);
                            }
                        }
                    }
                }
            }
        }

        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        info!(project = %self.project_path.display(), "supervisor stopped");
        Ok(())
    }

    /// Idempotent: signals shutdown and stops the detector.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.detector.stop();
    }
}

fn build_registry(project_path: &Path, config: &Config) -> RuleRegistry {
    let mut rules: Vec<Box<dyn crate::rule::Rule>> = Vec::new();

    if config.branch_diff.enabled {
        rules.push(Box::new(BranchDiffRule {
            project_path: project_path.to_path_buf(),
            max_size_kb: config.branch_diff.max_size_kb,
            timeout: Duration::from_millis(config.branch_diff.timeout_ms),
        }));
    }

    if config.recent_commit.enabled {
        rules.push(Box::new(RecentCommitRule {
            project_path: project_path.to_path_buf(),
            max_size_kb: config.recent_commit.max_size_kb,
            timeout: Duration::from_millis(config.recent_commit.timeout_ms),
        }));
    }

    if config.common_files.enabled {
        rules.push(Box::new(CommonFilesRule {
            project_path: project_path.to_path_buf(),
            trigger: crate::event::EventType::BranchSwitch,
            max_files: config.common_files.max_files,
            timeout: Duration::from_millis(config.common_files.timeout_ms),
        }));
        rules.push(Box::new(CommonFilesRule {
            project_path: project_path.to_path_buf(),
            trigger: crate::event::EventType::NewCommit,
            max_files: config.common_files.max_files,
            timeout: Duration::from_millis(config.common_files.timeout_ms),
        }));
    }

    RuleRegistry::new(rules)
}
