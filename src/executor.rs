//! Bounded, partial-failure-tolerant parallel rule executor.

use crate::event::GitEvent;
use crate::metrics::MetricsSink;
use crate::rule::{PreFetchResult, Rule};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub struct Executor {
    max_parallel: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl Executor {
    pub fn new(max_parallel: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { max_parallel, metrics }
    }

    /// Run every rule matching the event's type in parallel, bounded by
    /// `max_parallel`. Returns only the successful results; a slow or
    /// broken rule never suppresses the others'. The call returns only
    /// after every worker has terminated.
    pub async fn run<'a>(
        &self,
        event: &GitEvent,
        rules: &[&'a dyn Rule],
        cancel: &CancellationToken,
    ) -> Vec<PreFetchResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));

        let workers = rules.iter().map(|rule| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let metrics = self.metrics.clone();
            let project = event.project_path.clone();
            let event = event.clone();

            async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire() => match permit {
                        Ok(p) => p,
                        Err(_) => return None,
                    },
                    _ = cancel.cancelled() => return None,
                };

                let rule_name = rule.name();
                let start = Instant::now();

                // The rule's own deadline is layered under the caller's
                // cancellation; the earlier of the two wins.
                let outcome = tokio::select! {
                    res = tokio::time::timeout(rule.timeout(), rule.execute(&event)) => {
                        res.unwrap_or(Err(crate::error::RuleError::Timeout))
                    }
                    _ = cancel.cancelled() => Err(crate::error::RuleError::Timeout),
                };

                let elapsed = start.elapsed();

                match outcome {
                    Ok(result) => {
                        metrics.inc_rule_executed(rule_name);
                        metrics.observe_rule_duration(rule_name, elapsed.as_secs_f64());
                        debug!(project = %project.display(), rule = rule_name, duration = ?elapsed, "rule executed");
                        Some(result)
                    }
                    Err(e) if e.is_timeout() => {
                        metrics.inc_rule_timeout(rule_name);
                        warn!(project = %project.display(), rule = rule_name, duration = ?elapsed, "rule timed out");
                        None
                    }
                    Err(e) => {
                        error!(project = %project.display(), rule = rule_name, error = %e, "rule execution failed");
                        None
                    }
                }
            }
        });

        futures::future::join_all(workers)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::event::EventType;
    use crate::metrics::RecordingMetrics;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FastRule(&'static str);

    #[async_trait]
    impl Rule for FastRule {
        fn name(&self) -> &'static str {
            self.0
        }
        fn trigger(&self) -> EventType {
            EventType::BranchSwitch
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn execute(&self, _event: &GitEvent) -> Result<PreFetchResult, RuleError> {
            Ok(PreFetchResult {
                result_type: self.0.to_string(),
                data: serde_json::json!({}),
                metadata: HashMap::new(),
                confidence: 1.0,
            })
        }
    }

    struct SlowRule {
        name: &'static str,
        delay: Duration,
        timeout: Duration,
    }

    #[async_trait]
    impl Rule for SlowRule {
        fn name(&self) -> &'static str {
            self.name
        }
        fn trigger(&self) -> EventType {
            EventType::BranchSwitch
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        async fn execute(&self, _event: &GitEvent) -> Result<PreFetchResult, RuleError> {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => Ok(PreFetchResult {
                    result_type: self.name.to_string(),
                    data: serde_json::json!({}),
                    metadata: HashMap::new(),
                    confidence: 1.0,
                }),
                _ = tokio::time::sleep(self.timeout) => Err(RuleError::Timeout),
            }
        }
    }

    struct FailingRule;

    #[async_trait]
    impl Rule for FailingRule {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn trigger(&self) -> EventType {
            EventType::BranchSwitch
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
        async fn execute(&self, _event: &GitEvent) -> Result<PreFetchResult, RuleError> {
            Err(RuleError::Subprocess("boom".to_string()))
        }
    }

    fn event() -> GitEvent {
        GitEvent::branch_switch(
            std::path::PathBuf::from("/proj"),
            "main".to_string(),
            "feature".to_string(),
        )
    }

    #[tokio::test]
    async fn partial_failure_does_not_suppress_other_results() {
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = Executor::new(3, metrics.clone());

        let a = FastRule("a");
        let failing = FailingRule;
        let rules: Vec<&dyn Rule> = vec![&a, &failing];

        let results = executor.run(&event(), &rules, &CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result_type, "a");
    }

    #[tokio::test]
    async fn timeout_increments_metric_and_drops_result() {
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = Executor::new(3, metrics.clone());

        let fast = FastRule("fast");
        let slow = SlowRule {
            name: "slow",
            delay: Duration::from_secs(5),
            timeout: Duration::from_millis(20),
        };
        let rules: Vec<&dyn Rule> = vec![&fast, &slow];

        let results = executor.run(&event(), &rules, &CancellationToken::new()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result_type, "fast");
        assert_eq!(metrics.rule_timeouts(), vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn bounds_concurrency_to_max_parallel() {
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = Executor::new(2, metrics);

        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        struct TrackingRule {
            in_flight: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Rule for TrackingRule {
            fn name(&self) -> &'static str {
                "tracking"
            }
            fn trigger(&self) -> EventType {
                EventType::BranchSwitch
            }
            fn timeout(&self) -> Duration {
                Duration::from_secs(1)
            }
            async fn execute(&self, _event: &GitEvent) -> Result<PreFetchResult, RuleError> {
                let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(n, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(PreFetchResult {
                    result_type: "tracking".to_string(),
                    data: serde_json::json!({}),
                    metadata: HashMap::new(),
                    confidence: 1.0,
                })
            }
        }

        let rules_owned: Vec<TrackingRule> = (0..5)
            .map(|_| TrackingRule {
                in_flight: in_flight.clone(),
                max_seen: max_seen.clone(),
            })
            .collect();
        let rules: Vec<&dyn Rule> = rules_owned.iter().map(|r| r as &dyn Rule).collect();

        let results = executor.run(&event(), &rules, &CancellationToken::new()).await;
        assert_eq!(results.len(), 5);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancellation_stops_in_flight_workers() {
        let metrics = Arc::new(RecordingMetrics::new());
        let executor = Executor::new(3, metrics);

        let slow = SlowRule {
            name: "slow",
            delay: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        };
        let rules: Vec<&dyn Rule> = vec![&slow];

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let start = Instant::now();
        let results = executor.run(&event(), &rules, &cancel).await;
        assert!(results.is_empty());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
