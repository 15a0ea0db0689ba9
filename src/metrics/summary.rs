//! Human-readable grading of PSI metrics

use super::MetricsResult;
use std::fmt;

/// Performance score below which a site is graded poor
pub const PERFORMANCE_POOR: u8 = 50;

/// Performance score below which a site needs improvement
pub const PERFORMANCE_GOOD: u8 = 80;

pub const LCP_BAD_MS: u64 = 10_000;
pub const CLS_BAD: f64 = 0.25;
pub const TTFB_BAD_MS: u64 = 800;

/// Overall performance grade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Good,
    NeedsImprovement,
    Poor,
    Unknown,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::Good => "good",
            Grade::NeedsImprovement => "needs_improvement",
            Grade::Poor => "poor",
            Grade::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Grade plus the specific problems found
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub grade: Grade,
    pub critical: bool,
    pub issues: Vec<String>,
}

impl MetricsResult {
    /// Grades the result against fixed Core Web Vitals thresholds
    pub fn summary(&self) -> PerformanceSummary {
        let mut issues = Vec::new();
        let mut critical = false;

        let grade = match self.performance {
            None => Grade::Unknown,
            Some(score) if score < PERFORMANCE_POOR => {
                critical = true;
                issues.push(format!("Performance score: {}/100 (critical)", score));
                Grade::Poor
            }
            Some(score) if score < PERFORMANCE_GOOD => {
                issues.push(format!("Performance score: {}/100 (needs improvement)", score));
                Grade::NeedsImprovement
            }
            Some(_) => Grade::Good,
        };

        if let Some(lcp) = self.lcp_ms.filter(|v| *v > LCP_BAD_MS) {
            critical = true;
            issues.push(format!("LCP: {}ms (should be < {}ms)", lcp, LCP_BAD_MS));
        }

        if let Some(cls) = self.cls.filter(|v| *v > CLS_BAD) {
            critical = true;
            issues.push(format!("CLS: {:.3} (should be < {})", cls, CLS_BAD));
        }

        if let Some(ttfb) = self.ttfb_ms.filter(|v| *v > TTFB_BAD_MS) {
            issues.push(format!("TTFB: {}ms (should be < {}ms)", ttfb, TTFB_BAD_MS));
        }

        PerformanceSummary {
            grade,
            critical,
            issues,
        }
    }
}
