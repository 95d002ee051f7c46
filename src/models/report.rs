//! Per-item outcomes and the aggregate report of a reconciliation scan.

use super::match_result::MatchResult;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one enumerated key during a scan.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Relocated,
    SkippedAlreadyProcessed,
    SkippedNotImage,
    Failed { reason: String },
}

impl OutcomeStatus {
    /// Stable label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Relocated => "relocated",
            OutcomeStatus::SkippedAlreadyProcessed => "skipped_already_processed",
            OutcomeStatus::SkippedNotImage => "skipped_not_image",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ItemOutcome {
    pub key: String,
    pub matched: Option<MatchResult>,
    pub destination_key: Option<String>,
    pub status: OutcomeStatus,
}

impl ItemOutcome {
    pub fn new(key: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            key: key.into(),
            matched: None,
            destination_key: None,
            status,
        }
    }

    pub fn routed(mut self, matched: MatchResult, destination_key: String) -> Self {
        self.matched = Some(matched);
        self.destination_key = Some(destination_key);
        self
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub key: String,
    pub reason: String,
}

/// Aggregate result of one scan; the primary operational health signal.
///
/// `scanned` always equals the sum of the four outcome counters.
#[derive(Serialize, Debug, Clone)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: usize,
    pub skipped_already_processed: usize,
    pub skipped_not_image: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
    pub enumeration_error: Option<String>,
}

impl ScanReport {
    pub fn from_outcomes(
        started_at: DateTime<Utc>,
        outcomes: &[ItemOutcome],
        enumeration_error: Option<String>,
    ) -> Self {
        let mut report = Self {
            started_at,
            finished_at: Utc::now(),
            scanned: outcomes.len(),
            skipped_already_processed: 0,
            skipped_not_image: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
            enumeration_error,
        };

        for outcome in outcomes {
            match &outcome.status {
                OutcomeStatus::Relocated => report.succeeded += 1,
                OutcomeStatus::SkippedAlreadyProcessed => report.skipped_already_processed += 1,
                OutcomeStatus::SkippedNotImage => report.skipped_not_image += 1,
                OutcomeStatus::Failed { reason } => {
                    report.failed += 1;
                    report.failures.push(FailedItem {
                        key: outcome.key.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
        // Completion order varies with concurrency; keep the report stable.
        report.failures.sort_by(|a, b| a.key.cmp(&b.key));
        report
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.enumeration_error.is_none()
    }
}
