//! Rule trait and per-project registry.

use crate::error::RuleError;
use crate::event::{EventType, GitEvent};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// The output of one rule execution. Immutable.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PreFetchResult {
    #[serde(rename = "type")]
    pub result_type: String,
    pub data: Value,
    pub metadata: HashMap<String, String>,
    pub confidence: f64,
}

/// A single deterministic pre-fetch computation keyed by one event type.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Stable identifier, used in metrics and `PreFetchResult::result_type`.
    fn name(&self) -> &'static str;

    /// The exact event type that selects this rule.
    fn trigger(&self) -> EventType;

    /// This rule's own deadline, layered under the executor's cancellation.
    fn timeout(&self) -> Duration;

    /// Produce at most one result; must honor cancellation via the executor's
    /// deadline racing and fail cleanly with `RuleError::Timeout` or another
    /// `RuleError` variant.
    async fn execute(&self, event: &GitEvent) -> Result<PreFetchResult, RuleError>;
}

/// Per-project, immutable once constructed; holds the subset of rules
/// enabled by configuration, parameterized by that project's path.
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Rules whose trigger matches `event_type`.
    pub fn rules_for_event(&self, event_type: EventType) -> Vec<&dyn Rule> {
        self.rules
            .iter()
            .filter(|r| r.trigger() == event_type)
            .map(|r| r.as_ref())
            .collect()
    }
}
