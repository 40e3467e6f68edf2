//! Name-based registry for stage handlers and aggregators
//!
//! Pipeline files reference handlers and aggregators symbolically. The
//! registry is the process-wide mapping behind those names, populated by
//! explicit registration at startup and passed to every consumer; lookup of
//! an unknown name is a typed configuration error, never a dynamic-resolution
//! crash.

use crate::task::{Aggregator, StageHandler};
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of named stage handlers and aggregator callbacks
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn StageHandler>>,
    aggregators: HashMap<String, Arc<dyn Aggregator>>,
}

impl Registry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in ops registered
    ///
    /// The fetch op keeps its incremental skip markers in the crawl-state
    /// store, hence the store handle.
    pub fn builtin(crawls: crate::storage::SharedCrawlStore) -> Self {
        let mut registry = Self::new();
        crate::ops::register_builtin(&mut registry, crawls);
        registry
    }

    /// Registers a stage handler under `name`, replacing any previous entry
    pub fn register_handler(&mut self, name: &str, handler: Arc<dyn StageHandler>) {
        tracing::debug!("Registering stage handler '{}'", name);
        self.handlers.insert(name.to_string(), handler);
    }

    /// Registers an aggregator under `name`, replacing any previous entry
    pub fn register_aggregator(&mut self, name: &str, aggregator: Arc<dyn Aggregator>) {
        tracing::debug!("Registering aggregator '{}'", name);
        self.aggregators.insert(name.to_string(), aggregator);
    }

    /// Whether a handler is registered under `name`
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Looks up a stage handler by name
    pub fn handler(&self, stage: &str, name: &str) -> Result<Arc<dyn StageHandler>, ConfigError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownHandler {
                stage: stage.to_string(),
                handler: name.to_string(),
            })
    }

    /// Looks up an aggregator by name
    pub fn aggregator(&self, name: &str) -> Result<Arc<dyn Aggregator>, ConfigError> {
        self.aggregators
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownAggregator(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlerStage;
    use crate::task::{TaskContext, TaskOutput};
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopHandler;

    #[async_trait]
    impl StageHandler for NoopHandler {
        async fn handle(
            &self,
            _context: &TaskContext,
            _stage: &CrawlerStage,
            _payload: Value,
        ) -> crate::Result<TaskOutput> {
            Ok(TaskOutput::new())
        }
    }

    struct NoopAggregator;

    impl Aggregator for NoopAggregator {
        fn aggregate(&self, _context: &TaskContext, _params: &Value) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_handler_lookup() {
        let mut registry = Registry::new();
        registry.register_handler("noop", Arc::new(NoopHandler));

        assert!(registry.has_handler("noop"));
        assert!(registry.handler("init", "noop").is_ok());

        match registry.handler("init", "missing") {
            Err(ConfigError::UnknownHandler { stage, handler }) => {
                assert_eq!(stage, "init");
                assert_eq!(handler, "missing");
            }
            other => panic!("expected UnknownHandler, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_aggregator_lookup() {
        let mut registry = Registry::new();
        registry.register_aggregator("summarize", Arc::new(NoopAggregator));

        assert!(registry.aggregator("summarize").is_ok());
        assert!(matches!(
            registry.aggregator("missing"),
            Err(ConfigError::UnknownAggregator(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_builtin_ops_present() {
        let registry = Registry::builtin(Arc::new(crate::storage::MemoryStore::new()));
        for op in ["seed", "fetch", "parse", "log"] {
            assert!(registry.has_handler(op), "builtin op {} missing", op);
        }
    }
}
