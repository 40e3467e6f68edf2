//! Crawler collection
//!
//! The manager is an explicitly constructed registry of crawlers, passed to
//! every consumer (CLI handlers, the worker). There is no module-level
//! singleton; its lifetime is the process lifetime of whoever built it.

use crate::config::load_pipeline;
use crate::crawler::Crawler;
use crate::registry::Registry;
use crate::settings::Settings;
use crate::storage::{SharedCrawlStore, SharedJobStore};
use crate::{ConfigError, Result, TrellisError};
use indexmap::IndexMap;
use std::path::Path;

/// Collection of all loaded crawlers, keyed by unique name
#[derive(Default)]
pub struct Manager {
    crawlers: IndexMap<String, Crawler>,
}

impl Manager {
    /// Creates an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every pipeline definition (`.yml`/`.yaml`) in a directory
    ///
    /// Files are loaded in name order so the manager's listing is stable.
    /// Any malformed definition aborts the load.
    pub fn load_dir(
        path: &Path,
        registry: &Registry,
        jobs: SharedJobStore,
        crawls: SharedCrawlStore,
        settings: &Settings,
    ) -> Result<Self> {
        let mut manager = Self::new();

        let mut files: Vec<_> = std::fs::read_dir(path)
            .map_err(ConfigError::Io)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect();
        files.sort();

        for file in files {
            tracing::debug!("Loading pipeline definition {}", file.display());
            let config = load_pipeline(&file)?;
            let crawler =
                Crawler::new(config, registry, jobs.clone(), crawls.clone(), settings)?;
            manager.add(crawler)?;
        }

        tracing::info!("Loaded {} crawler(s)", manager.len());
        Ok(manager)
    }

    /// Adds one crawler, rejecting duplicate names
    ///
    /// A name collision would silently merge two pipelines' run and event
    /// history in the stores, so it is refused outright.
    pub fn add(&mut self, crawler: Crawler) -> std::result::Result<(), ConfigError> {
        if self.crawlers.contains_key(&crawler.name) {
            return Err(ConfigError::DuplicateCrawler(crawler.name.clone()));
        }
        self.crawlers.insert(crawler.name.clone(), crawler);
        Ok(())
    }

    /// Looks up a crawler by name
    pub fn get(&self, name: &str) -> Option<&Crawler> {
        self.crawlers.get(name)
    }

    /// Looks up a crawler by name, mapping absence to a user-facing error
    pub fn require(&self, name: &str) -> Result<&Crawler> {
        self.get(name)
            .ok_or_else(|| TrellisError::CrawlerNotFound(name.to_string()))
    }

    /// Iterates over all crawlers in load order
    pub fn iter(&self) -> impl Iterator<Item = &Crawler> {
        self.crawlers.values()
    }

    /// Namespaced stage identifiers across all crawlers, for the worker
    pub fn stage_names(&self) -> Vec<String> {
        self.crawlers
            .values()
            .flat_map(|c| c.stage_names())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.crawlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crawlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::storage::MemoryStore;
    use std::io::Write;
    use std::sync::Arc;

    fn crawler(name: &str) -> Crawler {
        let config: PipelineConfig = serde_yaml::from_str(&format!(
            r#"
name: {name}
pipeline:
  init:
    handler: seed
"#
        ))
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::builtin(store.clone());
        Crawler::new(config, &registry, store.clone(), store, &Settings::default()).unwrap()
    }

    #[test]
    fn test_add_and_require() {
        let mut manager = Manager::new();
        manager.add(crawler("news")).unwrap();

        assert!(manager.get("news").is_some());
        assert!(manager.require("news").is_ok());
        assert!(matches!(
            manager.require("docs"),
            Err(TrellisError::CrawlerNotFound(name)) if name == "docs"
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut manager = Manager::new();
        manager.add(crawler("news")).unwrap();

        let err = manager.add(crawler("news")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateCrawler(name) if name == "news"));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["alpha", "beta"] {
            let mut file = std::fs::File::create(dir.path().join(format!("{name}.yml"))).unwrap();
            writeln!(file, "name: {name}\npipeline:\n  init:\n    handler: seed").unwrap();
        }
        // Non-pipeline files are ignored
        std::fs::File::create(dir.path().join("README.md")).unwrap();

        let store = Arc::new(MemoryStore::new());
        let registry = Registry::builtin(store.clone());
        let manager = Manager::load_dir(
            dir.path(),
            &registry,
            store.clone(),
            store,
            &Settings::default(),
        )
        .unwrap();

        assert_eq!(manager.len(), 2);
        let names: Vec<&str> = manager.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(manager.stage_names().len(), 2);
    }
}
