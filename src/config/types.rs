use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;

/// A declarative pipeline definition, as loaded from one YAML file
///
/// Every field except `pipeline` has a default, so a minimal file only needs
/// the stage mapping. The crawler name defaults to the file stem when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Unique crawler name; used as the namespace key into both stores
    pub name: Option<String>,

    /// Human-readable description
    pub description: Option<String>,

    /// Informational category (e.g. "scrape", "documents")
    #[serde(default = "default_category")]
    pub category: String,

    /// How often the crawler becomes due
    #[serde(default)]
    pub schedule: Schedule,

    /// Name of the stage that seeds a run
    #[serde(default = "default_init", rename = "init")]
    pub init_stage: String,

    /// Seconds a stage invocation may be deferred by the queue
    #[serde(default)]
    pub delay: u64,

    /// Days after which queue entries and side data expire; falls back to the
    /// operator-level default when absent
    pub expire: Option<u64>,

    /// Hint for downstream network behavior (user-agent rotation)
    #[serde(default)]
    pub stealthy: bool,

    /// Optional post-pipeline callback
    pub aggregator: Option<AggregatorConfig>,

    /// Stage name -> stage definition, in configuration order
    #[serde(default)]
    pub pipeline: IndexMap<String, StageConfig>,
}

/// Configuration for one pipeline stage
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Registered handler name that executes this stage
    pub handler: String,

    /// Handler-specific options, passed through opaquely
    #[serde(default)]
    pub params: serde_json::Value,

    /// Routing rule -> downstream stage name
    #[serde(default)]
    pub handle: HashMap<String, String>,
}

/// Aggregator callback reference plus its parameters
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Registered aggregator name
    pub method: String,

    /// Parameters handed to the aggregator on invocation
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Schedule interval for a crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Disabled,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Schedule {
    /// The interval after which a crawler becomes due again, or `None` for
    /// `disabled` (never due). Monthly is a four-week approximation, not a
    /// calendar month.
    pub fn interval(&self) -> Option<chrono::Duration> {
        match self {
            Schedule::Disabled => None,
            Schedule::Hourly => Some(chrono::Duration::hours(1)),
            Schedule::Daily => Some(chrono::Duration::hours(24)),
            Schedule::Weekly => Some(chrono::Duration::days(7)),
            Schedule::Monthly => Some(chrono::Duration::days(28)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::Disabled => "disabled",
            Schedule::Hourly => "hourly",
            Schedule::Daily => "daily",
            Schedule::Weekly => "weekly",
            Schedule::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_category() -> String {
    "scrape".to_string()
}

fn default_init() -> String {
    "init".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_intervals() {
        assert_eq!(Schedule::Disabled.interval(), None);
        assert_eq!(
            Schedule::Hourly.interval(),
            Some(chrono::Duration::hours(1))
        );
        assert_eq!(Schedule::Daily.interval(), Some(chrono::Duration::hours(24)));
        assert_eq!(Schedule::Weekly.interval(), Some(chrono::Duration::days(7)));
        assert_eq!(
            Schedule::Monthly.interval(),
            Some(chrono::Duration::days(28))
        );
    }

    #[test]
    fn test_minimal_pipeline_defaults() {
        let yaml = r#"
pipeline:
  init:
    handler: seed
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.name, None);
        assert_eq!(config.category, "scrape");
        assert_eq!(config.schedule, Schedule::Disabled);
        assert_eq!(config.init_stage, "init");
        assert_eq!(config.delay, 0);
        assert_eq!(config.expire, None);
        assert!(!config.stealthy);
        assert!(config.aggregator.is_none());
        assert_eq!(config.pipeline.len(), 1);
    }

    #[test]
    fn test_unknown_schedule_rejected() {
        let yaml = r#"
schedule: fortnightly
pipeline:
  init:
    handler: seed
"#;
        let result: std::result::Result<PipelineConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_pipeline_preserves_config_order() {
        let yaml = r#"
pipeline:
  init:
    handler: seed
  fetch:
    handler: fetch
  parse:
    handler: parse
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<&str> = config.pipeline.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["init", "fetch", "parse"]);
    }
}
