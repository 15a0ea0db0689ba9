use crate::pipeline::{DomainState, DomainTask, Stage};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Final classification of a domain in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Pages fetched and metrics obtained (or metrics disabled)
    Success,

    /// Pages fetched, metrics missing
    Partial,

    /// Nothing usable
    Failure,
}

impl Outcome {
    /// Classifies a finished task
    pub fn of(task: &DomainTask) -> Self {
        match task.state {
            DomainState::Done if task.errors.iter().any(|e| e.stage == Stage::Metrics) => {
                Outcome::Partial
            }
            DomainState::Done => Outcome::Success,
            _ => Outcome::Failure,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// Every input domain with its finished task
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Finished tasks keyed by domain
    pub tasks: HashMap<String, DomainTask>,

    /// Domain keys in input order
    pub order: Vec<String>,

    pub elapsed: Duration,
}

impl BatchResult {
    pub fn get(&self, domain: &str) -> Option<&DomainTask> {
        self.tasks.get(domain)
    }

    pub fn outcome(&self, domain: &str) -> Option<Outcome> {
        self.tasks.get(domain).map(Outcome::of)
    }

    /// Number of domains with the given outcome
    pub fn count(&self, outcome: Outcome) -> usize {
        self.tasks
            .values()
            .filter(|t| Outcome::of(t) == outcome)
            .count()
    }

    /// Number of domains in the given state
    pub fn count_state(&self, state: DomainState) -> usize {
        self.tasks.values().filter(|t| t.state == state).count()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in input order
    pub fn iter(&self) -> impl Iterator<Item = &DomainTask> {
        self.order.iter().filter_map(|key| self.tasks.get(key))
    }
}
