//! Batch statistics
//!
//! This module summarizes a finished batch and prints the summary.

use crate::batch::{BatchResult, Outcome};
use crate::pipeline::ErrorKind;
use std::collections::HashMap;
use std::time::Duration;

/// Batch statistics summary
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Number of distinct domains processed
    pub total_domains: usize,

    /// Count of domains by outcome
    pub by_outcome: HashMap<Outcome, usize>,

    /// Total pages fetched across all domains
    pub pages_fetched: usize,

    /// Domains with PSI metrics
    pub metrics_obtained: usize,

    /// Recorded errors by kind
    pub errors_by_kind: HashMap<ErrorKind, usize>,

    /// Domains that failed outright
    pub failed_domains: Vec<String>,

    pub elapsed: Duration,
}

impl BatchStats {
    pub fn outcome_count(&self, outcome: Outcome) -> usize {
        self.by_outcome.get(&outcome).copied().unwrap_or(0)
    }
}

/// Collects statistics from a batch result
pub fn collect_statistics(result: &BatchResult) -> BatchStats {
    let mut stats = BatchStats {
        total_domains: result.len(),
        elapsed: result.elapsed,
        ..Default::default()
    };

    for task in result.iter() {
        let outcome = Outcome::of(task);
        *stats.by_outcome.entry(outcome).or_insert(0) += 1;
        if outcome == Outcome::Failure {
            stats.failed_domains.push(task.domain.clone());
        }

        stats.pages_fetched += task.pages.len();
        if task.metrics.is_some() {
            stats.metrics_obtained += 1;
        }
        for error in &task.errors {
            *stats.errors_by_kind.entry(error.kind).or_insert(0) += 1;
        }
    }

    stats
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &BatchStats) {
    println!("=== Batch Statistics ===\n");

    println!("Overview:");
    println!("  Domains processed: {}", stats.total_domains);
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!("  Metrics obtained: {}", stats.metrics_obtained);
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!();

    println!("Domains by Outcome:");
    for outcome in [Outcome::Success, Outcome::Partial, Outcome::Failure] {
        let count = stats.outcome_count(outcome);
        let percentage = if stats.total_domains > 0 {
            (count as f64 / stats.total_domains as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", outcome, count, percentage);
    }
    println!();

    if !stats.errors_by_kind.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.errors_by_kind.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !stats.failed_domains.is_empty() {
        println!("Failed Domains ({}):", stats.failed_domains.len());
        for domain in &stats.failed_domains {
            println!("  - {}", domain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsResult;
    use crate::pipeline::{DomainState, DomainTask, ErrorDescriptor, Stage};

    fn result() -> BatchResult {
        let mut done = DomainTask::new("a.com", "a.com", None);
        done.state = DomainState::Done;
        done.metrics = Some(MetricsResult::default());

        let mut partial = DomainTask::new("b.com", "b.com", None);
        partial.state = DomainState::Done;
        partial.errors.push(ErrorDescriptor::new(
            Stage::Metrics,
            "https://b.com/",
            ErrorKind::Transient,
            "HTTP 500",
        ));

        let mut failed = DomainTask::new("c.com", "c.com", None);
        failed.state = DomainState::Failed;
        failed.errors.push(ErrorDescriptor::new(
            Stage::Fetch,
            "https://c.com/",
            ErrorKind::Transient,
            "timeout",
        ));

        let mut result = BatchResult::default();
        for task in [done, partial, failed] {
            result.order.push(task.domain.clone());
            result.tasks.insert(task.domain.clone(), task);
        }
        result
    }

    #[test]
    fn test_collect_statistics() {
        let stats = collect_statistics(&result());

        assert_eq!(stats.total_domains, 3);
        assert_eq!(stats.outcome_count(Outcome::Success), 1);
        assert_eq!(stats.outcome_count(Outcome::Partial), 1);
        assert_eq!(stats.outcome_count(Outcome::Failure), 1);
        assert_eq!(stats.metrics_obtained, 1);
        assert_eq!(stats.errors_by_kind.get(&ErrorKind::Transient), Some(&2));
        assert_eq!(stats.failed_domains, vec!["c.com".to_string()]);
    }

    #[test]
    fn test_empty_batch() {
        let stats = collect_statistics(&BatchResult::default());
        assert_eq!(stats.total_domains, 0);
        assert_eq!(stats.outcome_count(Outcome::Success), 0);
    }
}
