use crate::artifact;
use crate::coerce::{coerce_count, infer_type, parse_date, parse_integer};
use crate::config::{EtlConfig, MissingColumnPolicy, NormalizeConfig};
use crate::error::{EtlError, FailureKind, Result};
use crate::manifest::{self, plan, PlannedAction, ProcessingManifest};
use crate::observability::metrics;
use crate::raw::{self, RawRecordSet, RawTable};
use crate::table::{ColumnData, ColumnRole, ColumnSpec, ColumnType, Schema, Table};
use chrono::Utc;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::report::{NormalizeReport, YearOutcome, YearStatus};

/// Declares the canonical type and role of every column in one year's raw table.
pub fn infer_schema(raw: &RawTable, config: &NormalizeConfig) -> Schema {
    let mut columns: Vec<ColumnSpec> = raw
        .headers
        .iter()
        .zip(&raw.columns)
        .map(|(name, values)| {
            let (ty, role) = if *name == config.year_column {
                (ColumnType::Integer, ColumnRole::Year)
            } else if config.count_columns.contains(name) {
                (ColumnType::Integer, ColumnRole::Count)
            } else if *name == config.date_column {
                (ColumnType::Date, ColumnRole::Date)
            } else {
                (infer_type(values.iter().map(|v| v.as_deref())), ColumnRole::Free)
            };
            ColumnSpec {
                name: name.clone(),
                ty,
                role,
            }
        })
        .collect();

    if !raw.headers.contains(&config.year_column) {
        columns.push(ColumnSpec {
            name: config.year_column.clone(),
            ty: ColumnType::Integer,
            role: ColumnRole::Year,
        });
    }
    Schema { columns }
}

fn build_column(
    spec: &ColumnSpec,
    values: Vec<Option<String>>,
    year: i32,
    config: &NormalizeConfig,
) -> Result<ColumnData> {
    let data = match (spec.role, spec.ty) {
        (ColumnRole::Year, _) => ColumnData::Integer(
            values
                .iter()
                .map(|v| Some(v.as_deref().and_then(parse_integer).unwrap_or(year as i64)))
                .collect(),
        ),
        (ColumnRole::Count, _) => ColumnData::Integer(
            values
                .iter()
                .enumerate()
                .map(|(row, v)| coerce_count(v.as_deref(), config.coercion, &spec.name, row).map(Some))
                .collect::<Result<Vec<_>>>()?,
        ),
        (ColumnRole::Date, _) | (_, ColumnType::Date) => ColumnData::Date(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| parse_date(s, &config.date_format)))
                .collect(),
        ),
        (_, ColumnType::Integer) => ColumnData::Integer(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok()))
                .collect(),
        ),
        (_, ColumnType::Float) => ColumnData::Float(
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .collect(),
        ),
        (_, ColumnType::Text) => ColumnData::Text(values),
    };
    Ok(data)
}

/// Turns one raw table into the canonical table for `year`.
pub fn canonicalize(raw: RawTable, year: i32, config: &NormalizeConfig) -> Result<Table> {
    if !raw.headers.contains(&config.date_column) {
        match config.missing_date_column {
            MissingColumnPolicy::Fail => {
                return Err(EtlError::MissingColumn(config.date_column.clone()))
            }
            MissingColumnPolicy::Skip => {
                warn!(year, column = %config.date_column, "Date column absent, emitting year without it");
            }
        }
    }

    let schema = infer_schema(&raw, config);
    let rows = raw.rows;
    let mut raw_columns = raw.columns.into_iter();
    let mut table = Table::with_rows(rows);
    for spec in &schema.columns {
        let values = raw_columns.next().unwrap_or_else(|| vec![None; rows]);
        let data = build_column(spec, values, year, config)?;
        table.push_column(spec.name.clone(), data)?;
    }
    Ok(table)
}

/// Reads one raw per-year file and produces its canonical table. Does not write.
#[instrument(skip(raw, config), fields(year = raw.year, file = %raw.file_name()))]
pub fn normalize_year(raw: &RawRecordSet, config: &NormalizeConfig) -> Result<Table> {
    let raw_table = raw::read_raw(&raw.path, config)?;
    debug!(
        delimiter = ?raw_table.delimiter,
        columns = raw_table.headers.len(),
        rows = raw_table.rows,
        "Parsed raw file"
    );
    canonicalize(raw_table, raw.year, config)
}

/// Per-year transformation run by the worker pool. `normalize_year` in production.
pub type YearTransform = dyn Fn(&RawRecordSet, &NormalizeConfig) -> Result<Table> + Send + Sync;

/// Normalizes one year and writes its artifact atomically to `output`.
fn process_year(
    source: RawRecordSet,
    output: PathBuf,
    config: &NormalizeConfig,
    transform: &YearTransform,
) -> YearOutcome {
    let started = Instant::now();
    let result = transform(&source, config).and_then(|table| {
        manifest::write_atomically(&output, |tmp| artifact::write_table(tmp, &table))?;
        Ok(table)
    });
    let status = match result {
        Ok(table) => {
            metrics::normalize::year_normalized(source.year, table.rows(), started.elapsed().as_secs_f64());
            YearStatus::Normalized {
                rows: table.rows(),
                columns: table.columns().len(),
                artifact: output,
            }
        }
        Err(e) => {
            let kind = e.kind();
            metrics::normalize::year_failed(kind);
            YearStatus::Failed {
                kind,
                message: e.to_string(),
            }
        }
    };
    YearOutcome {
        year: source.year,
        source: source.path,
        status,
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

fn print_outcome(outcome: &YearOutcome) {
    match &outcome.status {
        YearStatus::Normalized { rows, artifact, .. } => {
            info!(year = outcome.year, rows, artifact = %artifact.display(), "Year normalized");
            println!("✅ {}: {} rows -> {}", outcome.year, rows, artifact.display());
        }
        YearStatus::Skipped { reason } => {
            info!(year = outcome.year, ?reason, "Year skipped");
            println!("⏭️  {}: skipped ({})", outcome.year, reason.describe());
        }
        YearStatus::Failed { kind, message } => {
            error!(year = outcome.year, ?kind, %message, "Year failed");
            println!("❌ {}: {}", outcome.year, message);
        }
    }
}

/// Normalizes every raw year not yet in the canonical store.
///
/// Years run as independent tasks on a pool bounded by `workers`. A failure or
/// panic in one year is recorded in the report and never cancels the others;
/// the call returns only after every task has finished.
pub async fn normalize_all(
    config: &EtlConfig,
    manifest: Arc<dyn ProcessingManifest>,
) -> Result<NormalizeReport> {
    normalize_all_with(config, manifest, Arc::new(normalize_year), None).await
}

/// `normalize_all` with an explicit per-year transform. Each outcome is printed
/// and, when `progress` is given, sent on it as soon as its year finishes.
pub async fn normalize_all_with(
    config: &EtlConfig,
    manifest: Arc<dyn ProcessingManifest>,
    transform: Arc<YearTransform>,
    progress: Option<UnboundedSender<YearOutcome>>,
) -> Result<NormalizeReport> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    info!(%run_id, raw_dir = %config.paths.raw_dir.display(), "Starting normalization");

    let (sources, rejected) = raw::discover(&config.paths.raw_dir, &config.normalize)?;
    let planned = plan(&sources, manifest.as_ref());
    println!(
        "🔧 Normalizing {} raw files ({} pending)",
        planned.len(),
        planned
            .iter()
            .filter(|p| matches!(p.action, PlannedAction::Process { .. }))
            .count()
    );

    let shared = Arc::new(config.normalize.clone());
    let permits = Arc::new(Semaphore::new(config.normalize.workers));
    let mut slots: Vec<Slot> = Vec::with_capacity(planned.len());

    for item in planned {
        match item.action {
            PlannedAction::Skip(reason) => {
                metrics::normalize::year_skipped(&reason);
                let outcome = YearOutcome {
                    year: item.source.year,
                    source: item.source.path,
                    status: YearStatus::Skipped { reason },
                };
                report_progress(&outcome, progress.as_ref());
                slots.push(Slot::Done(outcome));
            }
            PlannedAction::Process { output } => {
                let permit = permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| EtlError::Config(format!("worker pool closed: {e}")))?;
                let cfg = shared.clone();
                let transform = transform.clone();
                let progress = progress.clone();
                let year = item.source.year;
                let source_path = item.source.path.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let source = item.source;
                    let fallback_path = source.path.clone();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        process_year(source, output, &cfg, transform.as_ref())
                    }))
                    .unwrap_or_else(|payload| {
                        metrics::normalize::year_failed(FailureKind::Panicked);
                        YearOutcome {
                            year,
                            source: fallback_path,
                            status: YearStatus::Failed {
                                kind: FailureKind::Panicked,
                                message: panic_message(payload),
                            },
                        }
                    });
                    report_progress(&outcome, progress.as_ref());
                    drop(permit);
                    outcome
                });
                slots.push(Slot::Running {
                    year,
                    source: source_path,
                    handle,
                });
            }
        }
    }

    // Barrier: every task joins before the report is returned.
    let mut outcomes = Vec::with_capacity(slots.len());
    for slot in slots {
        let outcome = match slot {
            Slot::Done(outcome) => outcome,
            Slot::Running {
                year,
                source,
                handle,
            } => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let outcome = YearOutcome {
                        year,
                        source,
                        status: YearStatus::Failed {
                            kind: FailureKind::Panicked,
                            message: e.to_string(),
                        },
                    };
                    report_progress(&outcome, progress.as_ref());
                    outcome
                }
            },
        };
        outcomes.push(outcome);
    }

    let report = NormalizeReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        outcomes,
        rejected,
    };
    info!(
        %run_id,
        normalized = report.normalized(),
        skipped = report.skipped(),
        failed = report.failed(),
        "Normalization finished"
    );
    Ok(report)
}

fn report_progress(outcome: &YearOutcome, progress: Option<&UnboundedSender<YearOutcome>>) {
    print_outcome(outcome);
    if let Some(tx) = progress {
        let _ = tx.send(outcome.clone());
    }
}

enum Slot {
    Done(YearOutcome),
    Running {
        year: i32,
        source: PathBuf,
        handle: tokio::task::JoinHandle<YearOutcome>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoercionPolicy;

    fn raw_table(headers: &[&str], rows: &[&[Option<&str>]]) -> RawTable {
        let columns = (0..headers.len())
            .map(|i| rows.iter().map(|r| r[i].map(str::to_string)).collect())
            .collect();
        RawTable {
            delimiter: ';',
            headers: headers.iter().map(|h| h.to_string()).collect(),
            columns,
            rows: rows.len(),
        }
    }

    #[test]
    fn schema_declares_roles_and_synthesizes_year() {
        let cfg = NormalizeConfig::default();
        let raw = raw_table(
            &["id", "mortos", "data_inversa", "uf"],
            &[&[Some("1"), Some("0"), Some("01/01/2021"), Some("SP")]],
        );
        let schema = infer_schema(&raw, &cfg);
        assert_eq!(schema.names(), vec!["id", "mortos", "data_inversa", "uf", "ano"]);
        assert_eq!(schema.get("id").unwrap().ty, ColumnType::Integer);
        assert_eq!(schema.get("mortos").unwrap().role, ColumnRole::Count);
        assert_eq!(schema.get("data_inversa").unwrap().ty, ColumnType::Date);
        assert_eq!(schema.get("uf").unwrap().ty, ColumnType::Text);
        assert_eq!(schema.get("ano").unwrap().role, ColumnRole::Year);
    }

    #[test]
    fn native_year_gaps_fall_back_to_file_year() {
        let cfg = NormalizeConfig::default();
        let raw = raw_table(
            &["ano", "data_inversa"],
            &[&[Some("2015"), None], &[None, None], &[Some("x"), None]],
        );
        let t = canonicalize(raw, 2015, &cfg).unwrap();
        assert_eq!(
            t.column("ano").unwrap().data,
            ColumnData::Integer(vec![Some(2015), Some(2015), Some(2015)])
        );
    }

    #[test]
    fn missing_date_column_policy() {
        let mut cfg = NormalizeConfig::default();
        let raw = raw_table(&["id"], &[&[Some("1")]]);
        let t = canonicalize(raw.clone(), 2010, &cfg).unwrap();
        assert!(!t.has_column("data_inversa"));

        cfg.missing_date_column = MissingColumnPolicy::Fail;
        assert!(matches!(
            canonicalize(raw, 2010, &cfg),
            Err(EtlError::MissingColumn(_))
        ));
    }

    #[test]
    fn reject_policy_fails_the_year() {
        let cfg = NormalizeConfig {
            coercion: CoercionPolicy::Reject,
            ..NormalizeConfig::default()
        };
        let raw = raw_table(&["veiculos", "data_inversa"], &[&[Some("dois"), None]]);
        assert!(matches!(
            canonicalize(raw, 2012, &cfg),
            Err(EtlError::Coercion { .. })
        ));
    }

    #[test]
    fn dates_outside_format_become_null() {
        let cfg = NormalizeConfig::default();
        let raw = raw_table(
            &["data_inversa"],
            &[&[Some("05/06/2018")], &[Some("2018-06-05")], &[None]],
        );
        let t = canonicalize(raw, 2018, &cfg).unwrap();
        match &t.column("data_inversa").unwrap().data {
            ColumnData::Date(v) => {
                assert!(v[0].is_some());
                assert!(v[1].is_none());
                assert!(v[2].is_none());
            }
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(3_u8)), "worker panicked");
    }
}
