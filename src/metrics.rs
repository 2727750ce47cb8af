//! Metrics sink abstraction. Not global — supervisors, the executor, and the
//! cache receive a handle at construction so tests can substitute a
//! recording sink (see `RecordingMetrics` below).

use prometheus::{
    exponential_buckets, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
};
use std::sync::Mutex;

pub trait MetricsSink: Send + Sync {
    fn inc_git_event(&self, event_type: &str);
    fn inc_rule_executed(&self, rule: &str);
    fn inc_rule_timeout(&self, rule: &str);
    fn observe_rule_duration(&self, rule: &str, seconds: f64);
    fn inc_cache_hit(&self);
    fn inc_cache_miss(&self);
    fn set_cache_size(&self, size: usize);
    fn add_tokens_saved(&self, n: u64);
}

/// Default, zero-overhead sink for callers that don't care about metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn inc_git_event(&self, _event_type: &str) {}
    fn inc_rule_executed(&self, _rule: &str) {}
    fn inc_rule_timeout(&self, _rule: &str) {}
    fn observe_rule_duration(&self, _rule: &str, _seconds: f64) {}
    fn inc_cache_hit(&self) {}
    fn inc_cache_miss(&self) {}
    fn set_cache_size(&self, _size: usize) {}
    fn add_tokens_saved(&self, _n: u64) {}
}

/// Prometheus-backed sink exposing the exact metric names from the
/// configuration surface. `gather()` returns the text exposition format for
/// the host daemon's own scrape endpoint to embed; this crate does not run
/// an HTTP server itself.
pub struct PrometheusMetrics {
    registry: Registry,
    git_events: IntCounterVec,
    rules_executed: IntCounterVec,
    rule_timeouts: IntCounterVec,
    rule_duration: HistogramVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cache_size: IntGauge,
    tokens_saved: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let git_events = IntCounterVec::new(
            prometheus::Opts::new("prefetch_git_events_total", "git events observed by type"),
            &["type"],
        )?;
        let rules_executed = IntCounterVec::new(
            prometheus::Opts::new("prefetch_rules_executed_total", "rules executed successfully"),
            &["rule"],
        )?;
        let rule_timeouts = IntCounterVec::new(
            prometheus::Opts::new("prefetch_rule_timeouts_total", "rule executions that timed out"),
            &["rule"],
        )?;
        let rule_duration = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "prefetch_rule_duration_seconds",
                "rule execution duration in seconds",
            )
            .buckets(exponential_buckets(0.001, 2.0, 16)?),
            &["rule"],
        )?;
        let cache_hits = IntCounter::new("prefetch_cache_hits_total", "cache hits")?;
        let cache_misses = IntCounter::new("prefetch_cache_misses_total", "cache misses")?;
        let cache_size = IntGauge::new("prefetch_cache_size", "current cache entry count")?;
        let tokens_saved = IntCounter::new(
            "prefetch_tokens_saved_total",
            "estimated tokens saved by cache hits",
        )?;

        registry.register(Box::new(git_events.clone()))?;
        registry.register(Box::new(rules_executed.clone()))?;
        registry.register(Box::new(rule_timeouts.clone()))?;
        registry.register(Box::new(rule_duration.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;
        registry.register(Box::new(tokens_saved.clone()))?;

        Ok(Self {
            registry,
            git_events,
            rules_executed,
            rule_timeouts,
            rule_duration,
            cache_hits,
            cache_misses,
            cache_size,
            tokens_saved,
        })
    }

    /// Render the current state in Prometheus text exposition format.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf).ok();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn inc_git_event(&self, event_type: &str) {
        self.git_events.with_label_values(&[event_type]).inc();
    }

    fn inc_rule_executed(&self, rule: &str) {
        self.rules_executed.with_label_values(&[rule]).inc();
    }

    fn inc_rule_timeout(&self, rule: &str) {
        self.rule_timeouts.with_label_values(&[rule]).inc();
    }

    fn observe_rule_duration(&self, rule: &str, seconds: f64) {
        self.rule_duration.with_label_values(&[rule]).observe(seconds);
    }

    fn inc_cache_hit(&self) {
        self.cache_hits.inc();
    }

    fn inc_cache_miss(&self) {
        self.cache_misses.inc();
    }

    fn set_cache_size(&self, size: usize) {
        self.cache_size.set(size as i64);
    }

    fn add_tokens_saved(&self, n: u64) {
        self.tokens_saved.inc_by(n);
    }
}

/// In-memory sink for assertions in tests.
#[derive(Default)]
pub struct RecordingMetrics {
    inner: Mutex<RecordingMetricsInner>,
}

#[derive(Default)]
struct RecordingMetricsInner {
    pub git_events: Vec<String>,
    pub rules_executed: Vec<String>,
    pub rule_timeouts: Vec<String>,
    pub rule_durations: Vec<(String, f64)>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_size: usize,
    pub tokens_saved: u64,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.lock().unwrap().cache_hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.inner.lock().unwrap().cache_misses
    }

    pub fn cache_size(&self) -> usize {
        self.inner.lock().unwrap().cache_size
    }

    pub fn tokens_saved(&self) -> u64 {
        self.inner.lock().unwrap().tokens_saved
    }

    pub fn rule_timeouts(&self) -> Vec<String> {
        self.inner.lock().unwrap().rule_timeouts.clone()
    }

    pub fn rules_executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().rules_executed.clone()
    }

    pub fn git_events(&self) -> Vec<String> {
        self.inner.lock().unwrap().git_events.clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn inc_git_event(&self, event_type: &str) {
        self.inner.lock().unwrap().git_events.push(event_type.to_string());
    }

    fn inc_rule_executed(&self, rule: &str) {
        self.inner.lock().unwrap().rules_executed.push(rule.to_string());
    }

    fn inc_rule_timeout(&self, rule: &str) {
        self.inner.lock().unwrap().rule_timeouts.push(rule.to_string());
    }

    fn observe_rule_duration(&self, rule: &str, seconds: f64) {
        self.inner.lock().unwrap().rule_durations.push((rule.to_string(), seconds));
    }

    fn inc_cache_hit(&self) {
        self.inner.lock().unwrap().cache_hits += 1;
    }

    fn inc_cache_miss(&self) {
        self.inner.lock().unwrap().cache_misses += 1;
    }

    fn set_cache_size(&self, size: usize) {
        self.inner.lock().unwrap().cache_size = size;
    }

    fn add_tokens_saved(&self, n: u64) {
        self.inner.lock().unwrap().tokens_saved += n;
    }
}
