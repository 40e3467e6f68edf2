use crate::crawler::CrawlerStage;
use crate::task::{StageHandler, TaskContext, TaskOutput};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Logs the payload and emits nothing; a terminal debugging sink
pub struct LogHandler;

#[async_trait]
impl StageHandler for LogHandler {
    async fn handle(
        &self,
        context: &TaskContext,
        stage: &CrawlerStage,
        payload: Value,
    ) -> Result<TaskOutput> {
        tracing::info!(
            stage = %stage.namespaced_name(),
            run_id = %context.run_id,
            payload = %payload,
            "log op"
        );
        Ok(TaskOutput::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::registry::Registry;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_log_emits_nothing() {
        let config: StageConfig = serde_yaml::from_str("handler: log").unwrap();
        let registry = Registry::builtin(Arc::new(MemoryStore::new()));
        let stage = CrawlerStage::new("news", "tail", &config, false, &registry).unwrap();
        let context = TaskContext::new("news", "r1".to_string(), false);

        let output = LogHandler
            .handle(&context, &stage, serde_json::json!({"k": "v"}))
            .await
            .unwrap();
        assert!(output.emissions.is_empty());
    }
}
