//! Aggregated result of linking one run.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::materialize::{FailedLink, Materialized};
use super::LinkPlan;

/// Run-level outcome derived from the per-plan outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Every plan linked.
    Complete,
    /// Some plans linked, some failed.
    Partial,
    /// Plans existed and none linked.
    Failed,
    /// The run produced no plans.
    Empty,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Empty => "empty",
        })
    }
}

/// Linked and failed plans of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkReport {
    /// Start document uid.
    pub run_uid: String,
    /// Plans now linked.
    pub linked: Vec<LinkPlan>,
    /// Plans that failed, with reasons.
    pub failed: Vec<FailedLink>,
}

/// Serializable one-line summary of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Start document uid.
    pub run_uid: String,
    /// Run-level outcome.
    pub status: LinkStatus,
    /// Number of linked frames.
    pub linked: usize,
    /// Number of failed frames.
    pub failed: usize,
}

impl LinkReport {
    /// Builds a report from materialized plans.
    #[must_use]
    pub fn new(run_uid: impl Into<String>, materialized: Materialized) -> Self {
        Self { run_uid: run_uid.into(), linked: materialized.linked, failed: materialized.failed }
    }

    /// Run-level outcome.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        match (self.linked.is_empty(), self.failed.is_empty()) {
            (true, true) => LinkStatus::Empty,
            (false, true) => LinkStatus::Complete,
            (false, false) => LinkStatus::Partial,
            (true, false) => LinkStatus::Failed,
        }
    }

    /// Counts and status.
    #[must_use]
    pub fn summary(&self) -> LinkSummary {
        LinkSummary {
            run_uid: self.run_uid.clone(),
            status: self.status(),
            linked: self.linked.len(),
            failed: self.failed.len(),
        }
    }

    /// Logs failures in full if there are any, otherwise the linked frames.
    pub fn log(&self) {
        if !self.failed.is_empty() {
            warn!(uid = %self.run_uid, count = self.failed.len(), "Failed generating links");
            for failure in &self.failed {
                let destination = failure
                    .plan
                    .destination_path()
                    .map_or_else(|| "<unresolved>".to_string(), |d| d.display().to_string());
                warn!(
                    source = %failure.plan.source.display(),
                    destination = %destination,
                    reason = %failure.reason,
                    "failed link"
                );
            }
        } else if !self.linked.is_empty() {
            info!(uid = %self.run_uid, count = self.linked.len(), "Links successfully generated");
            for plan in &self.linked {
                if let Some(destination) = plan.destination_path() {
                    info!(
                        source = %plan.source.display(),
                        destination = %destination.display(),
                        "linked"
                    );
                }
            }
        } else {
            info!(uid = %self.run_uid, "no frames to link");
        }
    }
}
