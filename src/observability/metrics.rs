//! Run metrics recorded through the `metrics` facade.
//!
//! No recorder is installed by this crate; whichever exporter the host process
//! registers receives these.

/// Normalizer phase: one sample per raw year.
pub mod normalize {
    use crate::error::FailureKind;
    use crate::manifest::SkipReason;

    /// Record a year written to the canonical store
    pub fn year_normalized(year: i32, rows: usize, duration_secs: f64) {
        ::metrics::counter!("etl_normalize_years_total", "status" => "normalized").increment(1);
        ::metrics::counter!("etl_normalize_rows_total", "year" => year.to_string())
            .increment(rows as u64);
        ::metrics::histogram!("etl_normalize_year_duration_seconds").record(duration_secs);
    }

    pub fn year_skipped(reason: &SkipReason) {
        let reason = match reason {
            SkipReason::AlreadyNormalized => "already_normalized",
            SkipReason::DuplicateYear { .. } => "duplicate_year",
        };
        ::metrics::counter!("etl_normalize_years_total", "status" => "skipped", "reason" => reason)
            .increment(1);
    }

    pub fn year_failed(kind: FailureKind) {
        ::metrics::counter!("etl_normalize_years_total", "status" => "failed", "kind" => format!("{kind:?}"))
            .increment(1);
    }
}

/// Unifier phase: one sample per run.
pub mod unify {
    pub fn run_completed(years: usize, rows: usize, duration_secs: f64) {
        ::metrics::counter!("etl_unify_runs_total", "status" => "success").increment(1);
        ::metrics::gauge!("etl_unify_years").set(years as f64);
        ::metrics::gauge!("etl_unify_rows").set(rows as f64);
        ::metrics::histogram!("etl_unify_duration_seconds").record(duration_secs);
    }

    pub fn run_failed() {
        ::metrics::counter!("etl_unify_runs_total", "status" => "failure").increment(1);
    }
}
