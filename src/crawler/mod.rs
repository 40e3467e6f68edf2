//! Crawler orchestration
//!
//! A [`Crawler`] is one parsed pipeline definition plus handles to the shared
//! job and crawl-state stores. It decides when a run is due and owns the run
//! lifecycle transitions (run, cancel, flush). It keeps no run state of its
//! own: `is_running`, `last_run`, `pending` and `op_count` are re-derived
//! from the stores on every call, so a process restart cannot corrupt
//! anything.

mod manager;
mod schedule;
mod stage;

pub use manager::Manager;
pub use schedule::is_due;
pub use stage::CrawlerStage;

use crate::config::{AggregatorConfig, PipelineConfig, Schedule};
use crate::registry::Registry;
use crate::settings::Settings;
use crate::storage::{CrawlRunRecord, SharedCrawlStore, SharedJobStore};
use crate::task::TaskContext;
use crate::{ConfigError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use uuid::Uuid;

/// Seconds per expiry day
const EXPIRE_DAY_SECS: u64 = 86_400;

/// A processing graph that constitutes one crawler
pub struct Crawler {
    /// Unique name; the sole namespace key into both stores
    pub name: String,
    pub description: String,
    pub category: String,
    pub schedule: Schedule,
    pub init_stage: String,

    /// Seconds a stage invocation may be deferred by the queue (advisory)
    pub delay: u64,

    /// Seconds after which queue entries and side data expire (advisory)
    pub expire: u64,

    /// Hint for downstream network behavior
    pub stealthy: bool,

    aggregator: Option<AggregatorConfig>,
    stages: IndexMap<String, CrawlerStage>,
    jobs: SharedJobStore,
    crawls: SharedCrawlStore,
    default_incremental: bool,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("category", &self.category)
            .field("schedule", &self.schedule)
            .field("init_stage", &self.init_stage)
            .field("delay", &self.delay)
            .field("expire", &self.expire)
            .field("stealthy", &self.stealthy)
            .field("aggregator", &self.aggregator)
            .field("stages", &self.stages)
            .field("default_incremental", &self.default_incremental)
            .finish_non_exhaustive()
    }
}

impl Crawler {
    /// Builds a crawler from a validated pipeline definition
    ///
    /// Stage instantiation is eager: broken downstream references or
    /// unregistered handlers fail here, never at dispatch time. The
    /// aggregator method, by contrast, is resolved lazily on the first
    /// [`aggregate`](Self::aggregate) call.
    pub fn new(
        config: PipelineConfig,
        registry: &Registry,
        jobs: SharedJobStore,
        crawls: SharedCrawlStore,
        settings: &Settings,
    ) -> std::result::Result<Self, ConfigError> {
        crate::config::validate(&config)?;

        // validate() guarantees the name is present
        let name = config.name.clone().unwrap_or_default();

        let mut stages = IndexMap::new();
        for (stage_name, stage_config) in &config.pipeline {
            let stage =
                CrawlerStage::new(&name, stage_name, stage_config, config.stealthy, registry)?;
            stages.insert(stage_name.clone(), stage);
        }

        Ok(Self {
            description: config.description.unwrap_or_else(|| name.clone()),
            category: config.category,
            schedule: config.schedule,
            init_stage: config.init_stage,
            delay: config.delay,
            expire: config.expire.unwrap_or(settings.default_expire_days) * EXPIRE_DAY_SECS,
            stealthy: config.stealthy,
            aggregator: config.aggregator,
            stages,
            jobs,
            crawls,
            default_incremental: settings.incremental,
            name,
        })
    }

    // ===== Stage graph =====

    /// Looks up a stage by name
    ///
    /// Absence is not an error at this level; callers decide how to treat an
    /// unknown stage name.
    pub fn get(&self, name: &str) -> Option<&CrawlerStage> {
        self.stages.get(name)
    }

    /// Iterates over all stages in configuration order
    pub fn stages(&self) -> impl Iterator<Item = &CrawlerStage> {
        self.stages.values()
    }

    /// Namespaced queue identifiers of all stages belonging to this crawler
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.values().map(|s| s.namespaced_name()).collect()
    }

    // ===== Scheduling =====

    /// Checks whether the last execution is older than the scheduled interval
    ///
    /// A running crawler is never due, a disabled one neither; a crawler that
    /// never ran is always due.
    pub fn check_due(&self) -> Result<bool> {
        if self.is_running()? {
            return Ok(false);
        }
        let last_run = self.last_run()?;
        Ok(is_due(self.schedule, last_run, Utc::now()))
    }

    // ===== Read-through runtime state =====

    /// Whether any job in this crawler's namespace is not yet done
    pub fn is_running(&self) -> Result<bool> {
        for job in self.jobs.list_jobs(&self.name)? {
            if !job.is_done() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Timestamp of the most recent run, if any
    pub fn last_run(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.crawls.last_run(&self.name)?)
    }

    /// Total operations performed for this crawler
    pub fn op_count(&self) -> Result<u64> {
        Ok(self.crawls.op_count(&self.name)?)
    }

    /// All recorded runs, most recent first
    pub fn runs(&self) -> Result<Vec<CrawlRunRecord>> {
        Ok(self.crawls.runs(&self.name)?)
    }

    /// Identifier of the most recent run, if any
    pub fn latest_run_id(&self) -> Result<Option<String>> {
        Ok(self.crawls.latest_run_id(&self.name)?)
    }

    /// Number of queued or executing tasks in this crawler's namespace
    pub fn pending(&self) -> Result<u64> {
        let status = self.jobs.status(&self.name)?;
        Ok(status.pending + status.running)
    }

    // ===== Run lifecycle =====

    /// Queues the execution of this crawler
    ///
    /// Supersedes any in-flight run: cancels it, flushes its events, then
    /// enqueues a single seed task for the init stage. That ordering is
    /// load-bearing — stale events must never surface next to the new run's.
    ///
    /// Mutual exclusion is best-effort only: two processes calling `run`
    /// concurrently can each cancel the other's seed and leave two run
    /// contexts competing for the same stage consumers. No distributed lock
    /// is taken here.
    pub fn run(&self, incremental: Option<bool>, run_id: Option<String>) -> Result<()> {
        let context = TaskContext::new(
            &self.name,
            run_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            incremental.unwrap_or(self.default_incremental),
        );

        tracing::info!(
            crawler = %self.name,
            run_id = %context.run_id,
            incremental = context.incremental,
            "Starting run"
        );

        // Cancel previous runs:
        self.cancel()?;
        // Flush out previous events:
        self.crawls.delete_events(&self.name)?;
        self.jobs.enqueue(
            &self.name,
            &self.init_stage,
            &context,
            &serde_json::json!({}),
            self.delay,
        )?;
        Ok(())
    }

    /// Aborts execution of this crawler
    ///
    /// Marks all run records as aborted, then removes every outstanding job
    /// in the queue namespace. Cancelling an idle crawler is a no-op.
    pub fn cancel(&self) -> Result<()> {
        self.crawls.abort_all(&self.name)?;
        self.jobs.cancel_all(&self.name)?;
        Ok(())
    }

    /// Deletes all run-time data generated by this crawler
    pub fn flush(&self) -> Result<()> {
        self.jobs.cancel_all(&self.name)?;
        self.crawls.delete_events(&self.name)?;
        self.crawls.flush(&self.name)?;
        Ok(())
    }

    /// Deletes only the tag side-data, leaving runs and events intact
    pub fn flush_tags(&self) -> Result<()> {
        self.crawls.delete_tags(&self.name)?;
        Ok(())
    }

    /// Deletes the event log only
    pub fn flush_events(&self) -> Result<()> {
        self.crawls.delete_events(&self.name)?;
        Ok(())
    }

    // ===== Aggregation =====

    /// Whether an aggregator is configured for this crawler
    pub fn has_aggregator(&self) -> bool {
        self.aggregator.is_some()
    }

    /// Invokes the configured aggregator, if any
    ///
    /// Called by the worker once no pipeline work remains for a run; this
    /// crawler does not detect completion itself. The method name is resolved
    /// against the registry on every call, so an unregistered name surfaces
    /// here as a configuration error, not at construction.
    pub fn aggregate(&self, context: &TaskContext, registry: &Registry) -> Result<()> {
        let config = match &self.aggregator {
            Some(config) => config,
            None => return Ok(()),
        };

        tracing::info!(crawler = %self.name, method = %config.method, "Running aggregator");
        let aggregator = registry.aggregator(&config.method)?;
        aggregator.aggregate(context, &config.params)
    }
}

impl std::fmt::Display for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn build(yaml: &str) -> std::result::Result<Crawler, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::builtin(store.clone());
        Crawler::new(config, &registry, store.clone(), store, &Settings::default())
    }

    #[test]
    fn test_construction_and_lookup() {
        let crawler = build(
            r#"
name: news
schedule: weekly
pipeline:
  init:
    handler: seed
    handle:
      pass: fetch
  fetch:
    handler: fetch
"#,
        )
        .unwrap();

        assert_eq!(crawler.to_string(), "news");
        assert!(crawler.get("fetch").is_some());
        assert!(crawler.get("store").is_none());
        assert_eq!(
            crawler.stage_names(),
            vec!["news:init".to_string(), "news:fetch".to_string()]
        );
    }

    #[test]
    fn test_expire_derived_from_default() {
        let crawler = build(
            r#"
name: news
pipeline:
  init:
    handler: seed
"#,
        )
        .unwrap();
        let settings = Settings::default();
        assert_eq!(crawler.expire, settings.default_expire_days * 86_400);
    }

    #[test]
    fn test_dangling_stage_reference_fails_construction() {
        let err = build(
            r#"
name: news
pipeline:
  init:
    handler: seed
    handle:
      pass: parse
  parse:
    handler: parse
    handle:
      pass: store
"#,
        )
        .unwrap_err();

        match err {
            ConfigError::UnknownStage { stage, .. } => assert_eq!(stage, "store"),
            other => panic!("expected UnknownStage, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_aggregator_surfaces_at_invocation() {
        let crawler = build(
            r#"
name: news
aggregator:
  method: summarize
pipeline:
  init:
    handler: seed
"#,
        )
        .unwrap();

        // Construction succeeded despite the unregistered aggregator
        assert!(crawler.has_aggregator());

        let registry = Registry::builtin(Arc::new(MemoryStore::new()));
        let context = TaskContext::new("news", "r1".to_string(), true);
        let err = crawler.aggregate(&context, &registry).unwrap_err();
        assert!(matches!(
            err,
            crate::TrellisError::Config(ConfigError::UnknownAggregator(_))
        ));
    }

    #[test]
    fn test_aggregate_without_config_is_noop() {
        let crawler = build(
            r#"
name: news
pipeline:
  init:
    handler: seed
"#,
        )
        .unwrap();

        let registry = Registry::builtin(Arc::new(MemoryStore::new()));
        let context = TaskContext::new("news", "r1".to_string(), true);
        assert!(crawler.aggregate(&context, &registry).is_ok());
    }
}
