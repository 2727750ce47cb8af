//! Event detector: one per watched project. Watches the git metadata
//! directory and emits typed `GitEvent`s on a bounded, single-consumer
//! channel. Never blocks the caller.

use crate::error::DetectorError;
use crate::event::{GitEvent, DETACHED};
use crate::git::resolve_git_dir;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Public event buffer capacity. Overflow is dropped rather than blocking
/// the processing loop; the next real event reconverges state.
const EVENT_BUFFER_CAPACITY: usize = 10;

/// Branch/commit bookkeeping for a single project, tracked by the
/// processing task so each real transition yields exactly one event.
struct DetectorState {
    current_branch: String,
    last_commit: Option<String>,
}

pub struct Detector {
    project_path: PathBuf,
    git_dir: PathBuf,
    events_tx: mpsc::Sender<GitEvent>,
    events_rx: Option<mpsc::Receiver<GitEvent>>,
    watcher: Option<RecommendedWatcher>,
    stop: CancellationToken,
}

impl Detector {
    /// Resolve the project's git dir; create channels. No events emitted yet.
    pub fn new(project_path: PathBuf) -> Result<Self, DetectorError> {
        let git_dir = resolve_git_dir(&project_path)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_CAPACITY);

        Ok(Self {
            project_path,
            git_dir,
            events_tx,
            events_rx: Some(events_rx),
            watcher: None,
            stop: CancellationToken::new(),
        })
    }

    /// Read the current branch, register watches, and spawn the processing
    /// task. Fails if a required watch cannot be registered.
    pub fn start(&mut self) -> Result<(), DetectorError> {
        let head_path = self.git_dir.join("HEAD");
        let logs_head_path = self.git_dir.join("logs").join("HEAD");

        let current_branch = read_branch(&head_path).unwrap_or_else(|_| DETACHED.to_string());
        let last_commit = read_last_commit(&logs_head_path).ok().flatten();

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                // Runs on notify's internal thread; forwarding is infallible
                // unless the receiving task has already shut down.
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(DetectorError::WatcherInit)?;

        watcher
            .watch(&head_path, RecursiveMode::NonRecursive)
            .map_err(|e| DetectorError::WatchRegister {
                path: head_path.clone(),
                source: e,
            })?;

        if logs_head_path.exists() {
            if let Err(e) = watcher.watch(&logs_head_path, RecursiveMode::NonRecursive) {
                warn!(
                    project = %self.project_path.display(),
                    error = %e,
                    "failed to watch logs/HEAD, commit events disabled for this project"
                );
            }
        }

        self.watcher = Some(watcher);

        let mut state = DetectorState {
            current_branch,
            last_commit,
        };

        let events_tx = self.events_tx.clone();
        let stop = self.stop.clone();
        let project_path = self.project_path.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    maybe = raw_rx.recv() => {
                        match maybe {
                            None => break,
                            Some(Ok(ev)) => {
                                process_raw_event(
                                    &ev,
                                    &head_path,
                                    &logs_head_path,
                                    &project_path,
                                    &mut state,
                                    &events_tx,
                                );
                            }
                            Some(Err(e)) => {
                                warn!(project = %project_path.display(), error = %e, "transient filesystem watcher error");
                            }
                        }
                    }
                }
            }
            debug!(project = %project_path.display(), "detector processing task stopped");
        });

        Ok(())
    }

    /// Take the single-consumer event receiver. Callable once.
    pub fn events(&mut self) -> Option<mpsc::Receiver<GitEvent>> {
        self.events_rx.take()
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Idempotent: closes the stop signal and drops the underlying watcher.
    pub fn stop(&mut self) {
        self.stop.cancel();
        self.watcher = None;
    }
}

fn process_raw_event(
    ev: &notify::Event,
    head_path: &Path,
    logs_head_path: &Path,
    project_path: &Path,
    state: &mut DetectorState,
    events_tx: &mpsc::Sender<GitEvent>,
) {
    for path in &ev.paths {
        if path == head_path {
            handle_head_change(head_path, project_path, state, events_tx);
        } else if path == logs_head_path {
            handle_logs_head_change(logs_head_path, project_path, state, events_tx);
        }
    }
}

fn handle_head_change(
    head_path: &Path,
    project_path: &Path,
    state: &mut DetectorState,
    events_tx: &mpsc::Sender<GitEvent>,
) {
    let resolved = match read_branch(head_path) {
        Ok(b) => b,
        Err(_) => DETACHED.to_string(),
    };

    if resolved != state.current_branch {
        let old = std::mem::replace(&mut state.current_branch, resolved.clone());
        let event = GitEvent::branch_switch(project_path.to_path_buf(), old, resolved);
        emit(events_tx, event, project_path);
    }
}

fn handle_logs_head_change(
    logs_head_path: &Path,
    project_path: &Path,
    state: &mut DetectorState,
    events_tx: &mpsc::Sender<GitEvent>,
) {
    let Ok(Some(hash)) = read_last_commit(logs_head_path) else {
        return;
    };

    if Some(&hash) != state.last_commit.as_ref() {
        state.last_commit = Some(hash.clone());
        let event = GitEvent::new_commit(project_path.to_path_buf(), hash);
        emit(events_tx, event, project_path);
    }
}

fn emit(events_tx: &mpsc::Sender<GitEvent>, event: GitEvent, project_path: &Path) {
    if let Err(mpsc::error::TrySendError::Full(_)) = events_tx.try_send(event) {
        warn!(
            project = %project_path.display(),
            "event buffer full, dropping event (next real transition will reconverge state)"
        );
    }
}

/// Derive the current branch name from `HEAD`'s contents.
fn read_branch(head_path: &Path) -> std::io::Result<String> {
    let content = std::fs::read_to_string(head_path)?;
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Ok(DETACHED.to_string());
    }

    if let Some(name) = trimmed.strip_prefix("ref: refs/heads/") {
        return Ok(name.to_string());
    }

    // Raw commit hash or anything else unrecognized: detached.
    Ok(DETACHED.to_string())
}

/// Derive the latest commit hash from `logs/HEAD`'s last non-empty line.
/// Returns `Ok(None)` for a missing or empty file.
fn read_last_commit(logs_head_path: &Path) -> std::io::Result<Option<String>> {
    if !logs_head_path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(logs_head_path)?;
    let last_line = content.lines().rev().find(|l| !l.trim().is_empty());

    let Some(line) = last_line else {
        return Ok(None);
    };

    let mut fields = line.split_whitespace();
    let _old_hash = fields.next();
    let new_hash = fields.next();

    Ok(new_hash.map(|s| s.to_string()))
}
