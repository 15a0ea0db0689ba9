/// Domain state definitions for tracking pipeline progress
///
/// A domain moves strictly forward through these states; see
/// [`DomainState::can_transition_to`].
use std::fmt;

/// Represents where a domain is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainState {
    // ===== Active States =====
    /// Accepted into the batch, not yet started
    Pending,

    /// Primary page and probe paths are being fetched
    Fetching,

    /// Waiting on PageSpeed Insights
    Metrics,

    // ===== Terminal States =====
    /// Record handed to the output handler (possibly with partial data)
    Done,

    /// Nothing usable was obtained
    Failed,
}

impl DomainState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this is an active state
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving to `next` is a legal step
    ///
    /// | From | Allowed next |
    /// |------|--------------|
    /// | Pending | Fetching, Failed |
    /// | Fetching | Metrics, Done, Failed |
    /// | Metrics | Done, Failed |
    /// | Done, Failed | none |
    pub fn can_transition_to(&self, next: DomainState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Pending, Self::Failed)
                | (Self::Fetching, Self::Metrics)
                | (Self::Fetching, Self::Done)
                | (Self::Fetching, Self::Failed)
                | (Self::Metrics, Self::Done)
                | (Self::Metrics, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Metrics => "metrics",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
