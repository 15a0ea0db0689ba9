//! Per-domain processing pipeline
//!
//! Each domain runs through `Pending → Fetching → Metrics → Done | Failed`.
//! The primary page must succeed; probe paths and metrics are best effort and
//! only add errors to the record when they fail.

mod handler;
mod state;
mod task;

pub use handler::{LogHandler, RecordHandler};
pub use state::DomainState;
pub use task::{DomainRecord, DomainTask, ErrorDescriptor, ErrorKind, Stage};

use crate::context::ProbeContext;
use crate::url::{join_probe_path, parse_target, Target};
use crate::ProbeResult;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

/// Drives one domain from input to record
pub struct DomainPipeline {
    ctx: Arc<ProbeContext>,
    task: DomainTask,
    handler: Arc<dyn RecordHandler>,
}

impl DomainPipeline {
    /// Creates a pipeline for a raw input line
    ///
    /// Malformed input is not an error here; the pipeline fails with a
    /// `Fatal` descriptor when run.
    pub fn new(ctx: Arc<ProbeContext>, input: &str, handler: Arc<dyn RecordHandler>) -> Self {
        let task = match parse_target(input) {
            Ok(target) => DomainTask::new(target.key, input, Some(target.root)),
            Err(_) => DomainTask::new(input.trim().to_lowercase(), input, None),
        };
        Self { ctx, task, handler }
    }

    /// Creates a pipeline for an already resolved target
    pub fn for_target(
        ctx: Arc<ProbeContext>,
        target: Target,
        input: &str,
        handler: Arc<dyn RecordHandler>,
    ) -> Self {
        Self {
            ctx,
            task: DomainTask::new(target.key, input, Some(target.root)),
            handler,
        }
    }

    pub fn task(&self) -> &DomainTask {
        &self.task
    }

    /// Runs the pipeline to a terminal state and returns the finished task
    pub async fn run(mut self) -> DomainTask {
        tracing::info!(domain = %self.task.domain, "Processing domain");

        if let Err(e) = self.drive().await {
            tracing::error!(domain = %self.task.domain, "Pipeline aborted: {}", e);
            let target = self.task.domain.clone();
            self.task.fail(ErrorDescriptor::new(
                Stage::Schedule,
                target,
                ErrorKind::Fatal,
                e.to_string(),
            ));
        }

        tracing::debug!(
            domain = %self.task.domain,
            state = %self.task.state,
            pages = self.task.pages.len(),
            errors = self.task.errors.len(),
            "Domain finished"
        );
        self.task
    }

    async fn drive(&mut self) -> ProbeResult<()> {
        let Some(root) = self.task.root_url.clone() else {
            let input = self.task.input.clone();
            let message = match parse_target(&input) {
                Err(e) => e.to_string(),
                Ok(_) => "unresolvable target".to_string(),
            };
            tracing::warn!(input = %input, "Malformed domain input: {}", message);
            self.task.errors.push(ErrorDescriptor::new(
                Stage::Fetch,
                input,
                ErrorKind::Fatal,
                message,
            ));
            return self.task.transition(DomainState::Failed);
        };

        self.task.transition(DomainState::Fetching)?;

        self.task.attempts += 1;
        match self.ctx.fetcher.fetch(&root).await {
            Ok(page) => self.task.pages.push(page),
            Err(e) => {
                tracing::warn!(domain = %self.task.domain, "Primary page failed: {}", e);
                self.task
                    .errors
                    .push(ErrorDescriptor::from_fetch(root.as_str(), &e));
                return self.task.transition(DomainState::Failed);
            }
        }

        self.fetch_probe_paths(&root).await;

        if self.ctx.config.metrics.enabled {
            self.task.transition(DomainState::Metrics)?;
            match self.ctx.metrics.get_metrics(root.as_str()).await {
                Ok(metrics) => self.task.metrics = Some(metrics),
                Err(e) => {
                    tracing::warn!(domain = %self.task.domain, "Metrics unavailable: {}", e);
                    self.task
                        .errors
                        .push(ErrorDescriptor::from_metrics(root.as_str(), &e));
                }
            }
        }

        self.task.transition(DomainState::Done)?;
        self.handler.handle(&self.task.record());
        Ok(())
    }

    /// Fetches the configured probe paths concurrently, within the domain ceiling
    async fn fetch_probe_paths(&mut self, root: &Url) {
        let ceiling = self.ctx.config.fetch.max_per_domain;
        let mut seen = vec![root.clone()];
        let mut urls = Vec::new();

        for path in &self.ctx.config.fetch.probe_paths {
            if self.task.attempts >= ceiling {
                tracing::debug!(
                    domain = %self.task.domain,
                    ceiling,
                    "Per-domain request ceiling reached"
                );
                break;
            }
            match join_probe_path(root, path) {
                Ok(url) if !seen.contains(&url) => {
                    seen.push(url.clone());
                    urls.push(url);
                    self.task.attempts += 1;
                }
                Ok(_) => {}
                Err(e) => self.task.errors.push(ErrorDescriptor::new(
                    Stage::Fetch,
                    path.clone(),
                    ErrorKind::Fatal,
                    e.to_string(),
                )),
            }
        }

        if urls.is_empty() {
            return;
        }

        let mut set = JoinSet::new();
        for (index, url) in urls.iter().cloned().enumerate() {
            let ctx = self.ctx.clone();
            set.spawn(async move {
                let result = ctx.fetcher.fetch(&url).await;
                (index, result)
            });
        }

        let mut results = Vec::with_capacity(urls.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(domain = %self.task.domain, "Probe task failed: {}", e);
                    self.task.errors.push(ErrorDescriptor::new(
                        Stage::Fetch,
                        self.task.domain.clone(),
                        ErrorKind::Fatal,
                        format!("probe task failed: {}", e),
                    ));
                }
            }
        }

        results.sort_by_key(|(index, _)| *index);
        for (index, result) in results {
            match result {
                Ok(page) => self.task.pages.push(page),
                Err(e) => {
                    tracing::debug!(url = %urls[index], "Probe path failed: {}", e);
                    self.task
                        .errors
                        .push(ErrorDescriptor::from_fetch(urls[index].as_str(), &e));
                }
            }
        }
    }
}
