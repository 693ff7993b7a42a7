use crate::error::FailureKind;
use crate::manifest::SkipReason;
use crate::raw::RejectedFile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// What happened to one raw year during a normalization run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    Normalized {
        rows: usize,
        columns: usize,
        artifact: PathBuf,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct YearOutcome {
    pub year: i32,
    pub source: PathBuf,
    #[serde(flatten)]
    pub status: YearStatus,
}

/// Per-run summary of the normalizer. Failed years carry their reason and are
/// retried on the next run since they have no artifact.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<YearOutcome>,
    pub rejected: Vec<RejectedFile>,
}

impl NormalizeReport {
    pub fn normalized(&self) -> usize {
        self.count(|s| matches!(s, YearStatus::Normalized { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, YearStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, YearStatus::Failed { .. }))
    }

    pub fn outcome(&self, year: i32) -> Option<&YearOutcome> {
        self.outcomes.iter().find(|o| o.year == year)
    }

    fn count(&self, pred: impl Fn(&YearStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Result of one successful unifier run.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyReport {
    pub artifact: PathBuf,
    pub years: Vec<YearRows>,
    pub total_rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct YearRows {
    pub year: i32,
    pub rows: usize,
}
