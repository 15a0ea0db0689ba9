use crate::pipeline::DomainRecord;

/// Receives every completed domain record
///
/// Implementations must tolerate concurrent calls from several pipelines.
pub trait RecordHandler: Send + Sync {
    fn handle(&self, record: &DomainRecord);
}

/// Logs a one-line summary per record
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl RecordHandler for LogHandler {
    fn handle(&self, record: &DomainRecord) {
        let summary = record.metrics.as_ref().map(|m| m.summary());
        let grade = summary
            .as_ref()
            .map(|s| s.grade.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        tracing::info!(
            domain = %record.domain,
            pages = record.pages.len(),
            errors = record.errors.len(),
            performance = ?record.metrics.as_ref().and_then(|m| m.performance),
            grade = %grade,
            "Domain complete"
        );

        if let Some(summary) = summary {
            for issue in &summary.issues {
                tracing::info!(domain = %record.domain, "{}", issue);
            }
        }
        for error in &record.errors {
            tracing::debug!(domain = %record.domain, "{}", error);
        }
    }
}
