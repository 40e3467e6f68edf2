//! Task types and the handler/aggregator seams
//!
//! A task is one unit of queued work: an execution context identifying the
//! run, plus an opaque JSON payload produced by the upstream stage. Handlers
//! and aggregators are the two extension points of the pipeline; both are
//! resolved by name through the [`Registry`](crate::registry::Registry).

use crate::crawler::CrawlerStage;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution context carried by every task of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Owning crawler name
    pub crawler: String,

    /// Identifier of the run this task belongs to
    pub run_id: String,

    /// Whether handlers may skip work already done in earlier runs
    pub incremental: bool,
}

impl TaskContext {
    pub fn new(crawler: &str, run_id: String, incremental: bool) -> Self {
        Self {
            crawler: crawler.to_string(),
            run_id,
            incremental,
        }
    }
}

/// Emissions produced by one handler invocation
///
/// Each emission names a routing rule; the worker maps the rule through the
/// stage's `handle` table to find the downstream stage. Emissions whose rule
/// has no route configured are dropped with a debug log.
#[derive(Debug, Default)]
pub struct TaskOutput {
    pub emissions: Vec<(String, Value)>,
}

impl TaskOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a payload for the stage routed under `rule`
    pub fn emit(&mut self, rule: &str, payload: Value) {
        self.emissions.push((rule.to_string(), payload));
    }

    /// Convenience for the common single-route case
    pub fn pass(payload: Value) -> Self {
        let mut output = Self::new();
        output.emit("pass", payload);
        output
    }
}

/// One named unit of pipeline work
///
/// Handlers transform the payload of a claimed task into zero or more
/// downstream emissions. Returning an error marks the task failed; the worker
/// records an event and keeps draining.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        context: &TaskContext,
        stage: &CrawlerStage,
        payload: Value,
    ) -> Result<TaskOutput>;
}

/// Optional post-pipeline callback, invoked once no work remains for a run
pub trait Aggregator: Send + Sync {
    fn aggregate(&self, context: &TaskContext, params: &Value) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_roundtrip() {
        let ctx = TaskContext::new("news", "run-1".to_string(), true);
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TaskContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, back);
    }

    #[test]
    fn test_output_pass() {
        let output = TaskOutput::pass(serde_json::json!({"url": "https://example.com"}));
        assert_eq!(output.emissions.len(), 1);
        assert_eq!(output.emissions[0].0, "pass");
    }
}
