//! End-to-end scenarios exercising the public API together: a real git
//! repository on disk, a running `Supervisor`, and assertions against the
//! shared `ResultCache` — the same way a host daemon would observe results.

use ctxd_prefetch::{Config, Executor, MetricsSink, NoopMetrics, ResultCache, Supervisor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .expect("git must be on PATH for these tests");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}

fn wire(config: &Config) -> (Arc<ResultCache>, Arc<Executor>, Arc<dyn MetricsSink>) {
    let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
    let cache = Arc::new(ResultCache::new(
        Duration::from_millis(config.cache_ttl_ms),
        config.cache_max_entries,
        metrics.clone(),
    ));
    let executor = Arc::new(Executor::new(config.max_parallel, metrics.clone()));
    (cache, executor, metrics)
}

#[tokio::test]
async fn branch_switch_is_detected_and_cached_with_both_rule_results() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());
    git(dir.path(), &["checkout", "-q", "-b", "side"]);
    git(dir.path(), &["checkout", "-q", "main"]);

    let config = Config::default();
    let (cache, executor, metrics) = wire(&config);

    let mut supervisor =
        Supervisor::new(dir.path().to_path_buf(), &config, cache.clone(), executor, metrics)
            .unwrap();

    let run_handle = tokio::spawn(async move {
        let _ = supervisor.start().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    git(dir.path(), &["checkout", "-q", "side"]);

    let key = dir.path().to_string_lossy().to_string();
    let entry = poll_cache(&cache, &key).await.expect("expected a cache entry");

    assert!(entry.results.iter().any(|r| r.result_type == "branch_diff"));
    assert!(entry.results.iter().any(|r| r.result_type == "common_files"));

    run_handle.abort();
}

#[tokio::test]
async fn new_commit_is_detected_and_populates_recent_commit_result() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());

    let config = Config::default();
    let (cache, executor, metrics) = wire(&config);

    let mut supervisor =
        Supervisor::new(dir.path().to_path_buf(), &config, cache.clone(), executor, metrics)
            .unwrap();

    let run_handle = tokio::spawn(async move {
        let _ = supervisor.start().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    std::fs::write(dir.path().join("README.md"), "hello again\n").unwrap();
    git(dir.path(), &["commit", "-q", "-am", "second"]);

    let key = dir.path().to_string_lossy().to_string();
    let entry = poll_cache(&cache, &key).await.expect("expected a cache entry");

    assert!(entry.results.iter().any(|r| r.result_type == "recent_commit"));

    run_handle.abort();
}

#[tokio::test]
async fn linked_worktree_is_watched_independently_of_its_main_checkout() {
    let main_dir = TempDir::new().unwrap();
    init_repo(main_dir.path());

    let worktree_parent = TempDir::new().unwrap();
    let worktree_path = worktree_parent.path().join("wt");
    git(
        main_dir.path(),
        &[
            "worktree",
            "add",
            "-q",
            "-b",
            "wt-branch",
            worktree_path.to_str().unwrap(),
        ],
    );

    // The worktree's `.git` is a pointer file, not a directory; Supervisor
    // construction must resolve it transparently.
    assert!(std::fs::metadata(worktree_path.join(".git")).unwrap().is_file());

    let config = Config::default();
    let (cache, executor, metrics) = wire(&config);

    let mut supervisor = Supervisor::new(
        worktree_path.clone(),
        &config,
        cache.clone(),
        executor,
        metrics,
    )
    .unwrap();

    let run_handle = tokio::spawn(async move {
        let _ = supervisor.start().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    std::fs::write(worktree_path.join("README.md"), "from worktree\n").unwrap();
    git(&worktree_path, &["commit", "-q", "-am", "worktree commit"]);

    let key = worktree_path.to_string_lossy().to_string();
    let entry = poll_cache(&cache, &key).await.expect("expected a cache entry");
    assert!(entry.results.iter().any(|r| r.result_type == "recent_commit"));

    run_handle.abort();
}

#[tokio::test]
async fn cache_entry_expires_after_ttl() {
    let dir = TempDir::new().unwrap();
    init_repo(dir.path());

    let mut config = Config::default();
    config.cache_ttl_ms = 1000;
    let (cache, executor, metrics) = wire(&config);

    let mut supervisor =
        Supervisor::new(dir.path().to_path_buf(), &config, cache.clone(), executor, metrics)
            .unwrap();

    let run_handle = tokio::spawn(async move {
        let _ = supervisor.start().await;
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    git(dir.path(), &["checkout", "-q", "-b", "feature"]);

    let key = dir.path().to_string_lossy().to_string();
    assert!(poll_cache(&cache, &key).await.is_some());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(cache.get(&key).is_none());

    run_handle.abort();
}

async fn poll_cache(
    cache: &ResultCache,
    key: &str,
) -> Option<ctxd_prefetch::CacheEntry> {
    for _ in 0..50 {
        if let Some(entry) = cache.get(key) {
            return Some(entry);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}
