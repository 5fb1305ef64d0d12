use std::fmt;

use serde::Serialize;

use crate::report::SourceSummary;

/// Worst vulnerability level seen during a conversion, ordered `None < Warning < Error`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum VulnerabilitySeverity {
    #[default]
    None,
    Warning,
    Error,
}

impl VulnerabilitySeverity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            VulnerabilitySeverity::None => "none",
            VulnerabilitySeverity::Warning => "warning",
            VulnerabilitySeverity::Error => "error",
        }
    }

    /// Level implied by one source's issue counts.
    pub(crate) fn from_summary(summary: &SourceSummary) -> Self {
        if summary.critical > 0 || summary.high > 0 {
            VulnerabilitySeverity::Error
        } else if summary.medium > 0 || summary.low > 0 {
            VulnerabilitySeverity::Warning
        } else {
            VulnerabilitySeverity::None
        }
    }
}

impl fmt::Display for VulnerabilitySeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotone running maximum; never downgrades once a level is reached.
#[derive(Debug, Default)]
pub(crate) struct SeverityAggregator {
    current: VulnerabilitySeverity,
}

impl SeverityAggregator {
    pub(crate) fn observe(&mut self, severity: VulnerabilitySeverity) {
        self.current = self.current.max(severity);
    }

    pub(crate) fn observe_summary(&mut self, summary: &SourceSummary) {
        self.observe(VulnerabilitySeverity::from_summary(summary));
    }

    pub(crate) fn current(&self) -> VulnerabilitySeverity {
        self.current
    }
}
