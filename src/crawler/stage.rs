//! Stage graph nodes
//!
//! Stages are instantiated eagerly when the crawler is constructed, so a
//! malformed stage definition surfaces to the operator immediately instead of
//! at first dispatch.

use crate::config::StageConfig;
use crate::registry::Registry;
use crate::ConfigError;
use serde_json::Value;
use std::collections::HashMap;

/// One named node of a crawler's stage graph
#[derive(Debug, Clone)]
pub struct CrawlerStage {
    /// Name of the owning crawler
    pub crawler: String,

    /// Stage name, unique within the pipeline
    pub name: String,

    /// Registered handler executing this stage
    pub handler: String,

    /// Handler-specific options
    pub params: Value,

    /// Routing rule -> downstream stage name
    pub handle: HashMap<String, String>,

    /// Network-behavior hint inherited from the crawler
    pub stealthy: bool,
}

impl CrawlerStage {
    /// Builds a stage from its raw configuration
    ///
    /// The handler name is resolved against the registry here; an unregistered
    /// handler is a construction-time error.
    pub fn new(
        crawler: &str,
        name: &str,
        config: &StageConfig,
        stealthy: bool,
        registry: &Registry,
    ) -> Result<Self, ConfigError> {
        if !registry.has_handler(&config.handler) {
            return Err(ConfigError::UnknownHandler {
                stage: name.to_string(),
                handler: config.handler.clone(),
            });
        }

        Ok(Self {
            crawler: crawler.to_string(),
            name: name.to_string(),
            handler: config.handler.clone(),
            params: config.params.clone(),
            handle: config.handle.clone(),
            stealthy,
        })
    }

    /// The globally unique queue identifier of this stage
    pub fn namespaced_name(&self) -> String {
        format!("{}:{}", self.crawler, self.name)
    }

    /// Downstream stage routed under `rule`, if configured
    pub fn route(&self, rule: &str) -> Option<&str> {
        self.handle.get(rule).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_config(handler: &str) -> StageConfig {
        serde_yaml::from_str(&format!(
            r#"
handler: {handler}
handle:
  pass: fetch
"#
        ))
        .unwrap()
    }

    fn builtin_registry() -> Registry {
        let store = std::sync::Arc::new(crate::storage::MemoryStore::new());
        Registry::builtin(store)
    }

    #[test]
    fn test_stage_construction() {
        let registry = builtin_registry();
        let stage =
            CrawlerStage::new("news", "init", &stage_config("seed"), false, &registry).unwrap();

        assert_eq!(stage.namespaced_name(), "news:init");
        assert_eq!(stage.route("pass"), Some("fetch"));
        assert_eq!(stage.route("error"), None);
        assert!(!stage.stealthy);
    }

    #[test]
    fn test_unregistered_handler_fails_eagerly() {
        let registry = Registry::new();
        let err = CrawlerStage::new("news", "init", &stage_config("seed"), false, &registry)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownHandler { .. }));
    }
}
