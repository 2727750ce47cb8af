//! Stand-alone demonstration binary for the pre-fetch engine.
//!
//! Watches the project paths given on the command line (or the current
//! directory if none are given), logs every detected event and rule result,
//! and prints the accumulated cache for each project on Ctrl-C. This binary
//! does not open a socket or serve MCP/gRPC; it exists to exercise the
//! library end to end without a host daemon.

use ctxd_prefetch::{Executor, MetricsSink, NoopMetrics, ResultCache, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ctxd_prefetch=info".parse().unwrap()),
        )
        .init();

    let projects: Vec<PathBuf> = std::env::args()
        .skip(1)
        .map(PathBuf::from)
        .collect::<Vec<_>>();
    let projects = if projects.is_empty() {
        vec![std::env::current_dir()?]
    } else {
        projects
    };

    let config = ctxd_prefetch::config::load_or_default();
    let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
    let cache = Arc::new(ResultCache::new(
        Duration::from_millis(config.cache_ttl_ms),
        config.cache_max_entries,
        metrics.clone(),
    ));
    let executor = Arc::new(Executor::new(config.max_parallel, metrics.clone()));

    let mut handles = Vec::new();

    for project in &projects {
        let supervisor = Supervisor::new(
            project.clone(),
            &config,
            cache.clone(),
            executor.clone(),
            metrics.clone(),
        );

        let mut supervisor = match supervisor {
            Ok(s) => s,
            Err(e) => {
                error!(project = %project.display(), error = %e, "skipping project, failed to start supervisor");
                continue;
            }
        };

        info!(project = %project.display(), "watching project");
        handles.push(tokio::spawn(async move {
            if let Err(e) = supervisor.start().await {
                error!(error = %e, "supervisor exited with error");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // A real host would route its own API reads through `cache()`, keyed by
    // project path, the same way the handles below print the final state.
    for project in &projects {
        let key = project.to_string_lossy().to_string();
        if let Some(entry) = cache.get(&key) {
            info!(project = %key, results = entry.results.len(), "final cache state");
        }
    }

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
