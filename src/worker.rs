//! Worker dispatch loop
//!
//! Claims tasks addressed to the managed crawlers' stages, dispatches them to
//! their registered handlers, and routes emissions to downstream stages. A
//! failing handler marks the task failed in the event log and the loop keeps
//! draining; it never takes the worker down.
//!
//! Completion detection lives here, not in the crawler: once a run's queue
//! namespace drains, the worker fires the crawler's aggregator with the last
//! seen context of that run.

use crate::crawler::Manager;
use crate::registry::Registry;
use crate::settings::Settings;
use crate::storage::{ClaimedTask, EventLevel, SharedCrawlStore, SharedJobStore};
use crate::task::TaskContext;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Task consumer for all crawlers of one manager
pub struct Worker {
    manager: Arc<Manager>,
    registry: Arc<Registry>,
    jobs: SharedJobStore,
    crawls: SharedCrawlStore,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        manager: Arc<Manager>,
        registry: Arc<Registry>,
        jobs: SharedJobStore,
        crawls: SharedCrawlStore,
        settings: &Settings,
    ) -> Self {
        Self {
            manager,
            registry,
            jobs,
            crawls,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }

    /// Drains the queue until no stage has pending work, then returns
    ///
    /// Used by `file-run` and by synchronous tests. Delayed tasks are waited
    /// for, so a drain only finishes once every namespace is empty.
    pub async fn sync(&self) -> Result<()> {
        let stages = self.manager.stage_names();
        let mut active: HashMap<String, TaskContext> = HashMap::new();

        loop {
            match self.jobs.claim(&stages)? {
                Some(task) => {
                    active.insert(task.crawler.clone(), task.context.clone());
                    self.process(task).await?;
                }
                None => {
                    self.finish_drained(&mut active)?;
                    if !self.has_outstanding()? {
                        return Ok(());
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Processes tasks as they come; blocks indefinitely
    pub async fn run(&self) -> Result<()> {
        let stages = self.manager.stage_names();
        tracing::info!(stages = stages.len(), "Worker started");
        let mut active: HashMap<String, TaskContext> = HashMap::new();

        loop {
            match self.jobs.claim(&stages)? {
                Some(task) => {
                    active.insert(task.crawler.clone(), task.context.clone());
                    self.process(task).await?;
                }
                None => {
                    self.finish_drained(&mut active)?;
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Dispatches one claimed task to its handler and routes the emissions
    async fn process(&self, task: ClaimedTask) -> Result<()> {
        let crawler = match self.manager.get(&task.crawler) {
            Some(crawler) => crawler,
            None => {
                // A definition was removed while its tasks were queued
                tracing::warn!(crawler = %task.crawler, "Task for unknown crawler, dropping");
                self.jobs.complete(task.id)?;
                return Ok(());
            }
        };

        let stage = match crawler.get(&task.stage) {
            Some(stage) => stage,
            None => {
                self.crawls.append_event(
                    &task.crawler,
                    &task.context.run_id,
                    &task.stage,
                    EventLevel::Error,
                    &format!("unknown stage '{}'", task.stage),
                )?;
                self.jobs.complete(task.id)?;
                return Ok(());
            }
        };

        // Construction validated the handler name, so this cannot fail for a
        // loaded crawler
        let handler = self.registry.handler(&stage.name, &stage.handler)?;

        match handler.handle(&task.context, stage, task.payload.clone()).await {
            Ok(output) => {
                for (rule, payload) in output.emissions {
                    match stage.route(&rule) {
                        Some(next) => {
                            self.jobs.enqueue(
                                &task.crawler,
                                next,
                                &task.context,
                                &payload,
                                crawler.delay,
                            )?;
                        }
                        None => {
                            tracing::debug!(
                                stage = %stage.namespaced_name(),
                                %rule,
                                "No route for rule, dropping emission"
                            );
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    stage = %stage.namespaced_name(),
                    run_id = %task.context.run_id,
                    error = %e,
                    "Stage handler failed"
                );
                self.crawls.append_event(
                    &task.crawler,
                    &task.context.run_id,
                    &task.stage,
                    EventLevel::Error,
                    &e.to_string(),
                )?;
            }
        }

        self.crawls
            .record_operation(&task.crawler, &task.context.run_id)?;
        self.jobs.complete(task.id)?;
        Ok(())
    }

    /// Fires aggregators for crawlers whose queue namespace has drained
    fn finish_drained(&self, active: &mut HashMap<String, TaskContext>) -> Result<()> {
        let mut drained = Vec::new();
        for (name, context) in active.iter() {
            if let Some(crawler) = self.manager.get(name) {
                if crawler.pending()? == 0 {
                    crawler.aggregate(context, &self.registry)?;
                    drained.push(name.clone());
                }
            } else {
                drained.push(name.clone());
            }
        }
        for name in drained {
            active.remove(&name);
        }
        Ok(())
    }

    /// Whether any managed crawler still has queued or executing tasks
    fn has_outstanding(&self) -> Result<bool> {
        for crawler in self.manager.iter() {
            if crawler.pending()? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
