//! Batch orchestration
//!
//! Normalizes and deduplicates the input domains, runs one pipeline per
//! domain under the chosen executor, and assembles a result covering every
//! input. A domain failing never fails the batch.

mod executor;
mod result;
mod stats;

pub use executor::{Executor, PooledExecutor, SequentialExecutor};
pub use result::{BatchResult, Outcome};
pub use stats::{collect_statistics, print_statistics, BatchStats};

use crate::context::ProbeContext;
use crate::pipeline::{DomainPipeline, DomainTask, ErrorDescriptor, ErrorKind, LogHandler, RecordHandler, Stage};
use crate::url::parse_target;
use crate::{ConfigError, ProbeResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

/// Runs a batch of domains against a shared [`ProbeContext`]
pub struct BatchOrchestrator {
    ctx: Arc<ProbeContext>,
    handler: Arc<dyn RecordHandler>,
}

impl BatchOrchestrator {
    /// Creates an orchestrator that logs each record
    pub fn new(ctx: Arc<ProbeContext>) -> Self {
        Self {
            ctx,
            handler: Arc::new(LogHandler),
        }
    }

    /// Replaces the record handler
    pub fn with_handler(mut self, handler: Arc<dyn RecordHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Processes every domain and returns the outcome of each
    ///
    /// # Arguments
    ///
    /// * `domains` - Bare domains or URLs; duplicates (by domain key) run once
    /// * `concurrency_limit` - Maximum domains in flight
    ///
    /// # Returns
    ///
    /// * `Ok(BatchResult)` - One entry per distinct input domain
    /// * `Err(ProbeError)` - Only for a zero concurrency limit
    pub async fn run<S: AsRef<str>>(
        &self,
        domains: &[S],
        concurrency_limit: usize,
    ) -> ProbeResult<BatchResult> {
        if concurrency_limit == 0 {
            return Err(ConfigError::Validation(
                "concurrency limit must be at least 1".to_string(),
            )
            .into());
        }

        let started = Instant::now();
        let (pipelines, order) = self.prepare(domains);
        let executor = self.select_executor(concurrency_limit);
        let deadline = self.ctx.config.batch.deadline().map(|d| started + d);

        tracing::info!(
            domains = order.len(),
            executor = executor.name(),
            concurrency = concurrency_limit,
            "Starting batch"
        );

        let finished = executor.execute(pipelines, deadline).await;

        let mut tasks: HashMap<String, DomainTask> = finished
            .into_iter()
            .map(|task| (task.domain.clone(), task))
            .collect();

        for key in &order {
            if !tasks.contains_key(key) {
                let mut task = DomainTask::new(key.clone(), key.clone(), None);
                task.fail(ErrorDescriptor::new(
                    Stage::Schedule,
                    key.clone(),
                    ErrorKind::Fatal,
                    "domain produced no result",
                ));
                tasks.insert(key.clone(), task);
            }
        }

        let saved = self.ctx.save_cache();

        let result = BatchResult {
            tasks,
            order,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            success = result.count(Outcome::Success),
            partial = result.count(Outcome::Partial),
            failure = result.count(Outcome::Failure),
            cache_saved = saved,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Batch complete"
        );

        Ok(result)
    }

    /// Resolves inputs into pipelines, dropping blanks and duplicate domains
    fn prepare<S: AsRef<str>>(&self, domains: &[S]) -> (Vec<DomainPipeline>, Vec<String>) {
        let mut seen = HashSet::new();
        let mut pipelines = Vec::new();
        let mut order = Vec::new();

        for input in domains {
            let input = input.as_ref().trim();
            if input.is_empty() {
                continue;
            }

            let pipeline = match parse_target(input) {
                Ok(target) => {
                    DomainPipeline::for_target(self.ctx.clone(), target, input, self.handler.clone())
                }
                Err(_) => DomainPipeline::new(self.ctx.clone(), input, self.handler.clone()),
            };

            let key = pipeline.task().domain.clone();
            if !seen.insert(key.clone()) {
                tracing::debug!(domain = %key, input, "Skipping duplicate domain");
                continue;
            }

            order.push(key);
            pipelines.push(pipeline);
        }

        (pipelines, order)
    }

    /// Pooled unless the limit is 1 or sequential mode is forced
    fn select_executor(&self, concurrency_limit: usize) -> Box<dyn Executor> {
        if concurrency_limit <= 1 || self.ctx.config.batch.force_sequential {
            Box::new(SequentialExecutor)
        } else {
            Box::new(PooledExecutor::new(concurrency_limit))
        }
    }
}
