//! Per-domain work item and the error records attached to it

use crate::fetcher::{FetchError, FetchedPage};
use crate::metrics::{MetricsError, MetricsResult};
use crate::pipeline::DomainState;
use crate::retry::Classification;
use crate::{ProbeError, ProbeResult};
use std::fmt;
use url::Url;

/// Pipeline step an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Robots,
    Fetch,
    Metrics,
    Schedule,
}

/// Broad failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Retries ran out on a transient failure
    Transient,

    /// Permanent failure (4xx, malformed input, undecodable body)
    Fatal,

    /// Refused by policy (robots.txt)
    Policy,

    /// Credential quota exhausted
    Quota,

    /// A shared limit could not be obtained in time, or a local resource failed
    Resource,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Robots => "robots",
            Stage::Fetch => "fetch",
            Stage::Metrics => "metrics",
            Stage::Schedule => "schedule",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Policy => "policy",
            ErrorKind::Quota => "quota",
            ErrorKind::Resource => "resource",
        };
        write!(f, "{}", s)
    }
}

/// A recorded failure for one target of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub stage: Stage,

    /// URL (or raw input) the failure concerns
    pub target: String,

    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(stage: Stage, target: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            target: target.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn from_fetch(target: &str, err: &FetchError) -> Self {
        let (stage, kind) = match err {
            FetchError::Disallowed { .. } => (Stage::Robots, ErrorKind::Policy),
            FetchError::Exhausted { .. } => (Stage::Fetch, ErrorKind::Transient),
            FetchError::RateLimited(_) => (Stage::Fetch, ErrorKind::Resource),
            other => match other.classification() {
                Classification::Retryable => (Stage::Fetch, ErrorKind::Transient),
                _ => (Stage::Fetch, ErrorKind::Fatal),
            },
        };
        Self::new(stage, target, kind, err.to_string())
    }

    pub fn from_metrics(target: &str, err: &MetricsError) -> Self {
        let kind = if err.is_quota() {
            ErrorKind::Quota
        } else {
            match err {
                MetricsError::Exhausted { .. } => ErrorKind::Transient,
                MetricsError::RateLimited(_) => ErrorKind::Resource,
                other => match other.classification() {
                    Classification::Retryable => ErrorKind::Transient,
                    _ => ErrorKind::Fatal,
                },
            }
        };
        Self::new(Stage::Metrics, target, kind, err.to_string())
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}: {}", self.stage, self.kind, self.target, self.message)
    }
}

/// Everything known about one domain; owned by the pipeline processing it
#[derive(Debug, Clone)]
pub struct DomainTask {
    /// Batch key (see [`crate::url::parse_target`])
    pub domain: String,

    /// Raw input line
    pub input: String,

    pub root_url: Option<Url>,
    pub state: DomainState,

    /// Page requests issued, checked against `max-per-domain`
    pub attempts: u32,

    pub pages: Vec<FetchedPage>,
    pub metrics: Option<MetricsResult>,
    pub errors: Vec<ErrorDescriptor>,
}

impl DomainTask {
    pub fn new(domain: impl Into<String>, input: impl Into<String>, root_url: Option<Url>) -> Self {
        Self {
            domain: domain.into(),
            input: input.into(),
            root_url,
            state: DomainState::Pending,
            attempts: 0,
            pages: Vec::new(),
            metrics: None,
            errors: Vec::new(),
        }
    }

    /// Moves to `next`, rejecting anything but a forward step
    pub fn transition(&mut self, next: DomainState) -> ProbeResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProbeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(domain = %self.domain, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    /// Marks the task failed with a final error, from any non-terminal state
    pub fn fail(&mut self, error: ErrorDescriptor) {
        self.errors.push(error);
        if !self.state.is_terminal() {
            self.state = DomainState::Failed;
        }
    }

    /// Snapshot handed to the record handler
    pub fn record(&self) -> DomainRecord {
        DomainRecord {
            domain: self.domain.clone(),
            pages: self.pages.clone(),
            metrics: self.metrics.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Output handed to the downstream scorer
#[derive(Debug, Clone)]
pub struct DomainRecord {
    pub domain: String,
    pub pages: Vec<FetchedPage>,
    pub metrics: Option<MetricsResult>,
    pub errors: Vec<ErrorDescriptor>,
}
