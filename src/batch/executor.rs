//! Strategies for running many domain pipelines

use crate::pipeline::{DomainPipeline, DomainTask, ErrorDescriptor, ErrorKind, Stage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Runs a set of pipelines to completion
///
/// Implementations return one task per pipeline, in any order. A pipeline not
/// started before `deadline` is returned failed with a `Schedule` error.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        pipelines: Vec<DomainPipeline>,
        deadline: Option<Instant>,
    ) -> Vec<DomainTask>;

    fn name(&self) -> &'static str;
}

/// Fixed pool of workers draining a shared queue
#[derive(Debug, Clone, Copy)]
pub struct PooledExecutor {
    workers: usize,
}

impl PooledExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

#[async_trait]
impl Executor for PooledExecutor {
    async fn execute(
        &self,
        pipelines: Vec<DomainPipeline>,
        deadline: Option<Instant>,
    ) -> Vec<DomainTask> {
        let total = pipelines.len();
        let queue = Arc::new(Mutex::new(VecDeque::from(pipelines)));
        let mut workers = JoinSet::new();

        for worker in 0..self.workers.min(total) {
            let queue = queue.clone();
            workers.spawn(async move {
                let mut finished = Vec::new();
                loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(pipeline) = next else {
                        break;
                    };
                    finished.push(run_isolated(pipeline, deadline).await);
                }
                tracing::trace!(worker, processed = finished.len(), "Worker drained queue");
                finished
            });
        }

        let mut tasks = Vec::with_capacity(total);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(finished) => tasks.extend(finished),
                Err(e) => tracing::error!("Batch worker failed: {}", e),
            }
        }
        tasks
    }

    fn name(&self) -> &'static str {
        "pooled"
    }
}

/// One domain at a time, each still isolated on its own task
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

#[async_trait]
impl Executor for SequentialExecutor {
    async fn execute(
        &self,
        pipelines: Vec<DomainPipeline>,
        deadline: Option<Instant>,
    ) -> Vec<DomainTask> {
        let mut tasks = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            tasks.push(run_isolated(pipeline, deadline).await);
        }
        tasks
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Runs a pipeline on its own task so a panic only fails that domain
async fn run_isolated(pipeline: DomainPipeline, deadline: Option<Instant>) -> DomainTask {
    let mut snapshot = pipeline.task().clone();
    if deadline_passed(deadline) {
        return skipped(snapshot);
    }

    match tokio::spawn(pipeline.run()).await {
        Ok(task) => task,
        Err(e) => {
            tracing::error!(domain = %snapshot.domain, "Pipeline panicked: {}", e);
            let target = snapshot.domain.clone();
            snapshot.fail(ErrorDescriptor::new(
                Stage::Schedule,
                target,
                ErrorKind::Fatal,
                format!("pipeline task failed: {}", e),
            ));
            snapshot
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

/// Marks a never-started task as failed by the batch deadline
fn skipped(mut task: DomainTask) -> DomainTask {
    tracing::warn!(domain = %task.domain, "Batch deadline passed, domain not started");
    let target = task.domain.clone();
    task.fail(ErrorDescriptor::new(
        Stage::Schedule,
        target,
        ErrorKind::Resource,
        "batch deadline passed before the domain was started",
    ));
    task
}
