use crate::artifact;
use crate::coerce::blank_null_markers;
use crate::config::EtlConfig;
use crate::constants::ARTIFACT_EXTENSION;
use crate::error::{EtlError, Result};
use crate::manifest::write_atomically;
use crate::observability::metrics;
use crate::table::{ColumnData, ColumnType, Table};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument};

use super::report::{UnifyReport, YearRows};

/// One canonical per-year artifact found in the canonical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalArtifact {
    pub year: i32,
    pub path: PathBuf,
}

/// Lists `<prefix><year>.parquet` files, ordered by year ascending.
pub fn discover_artifacts(canonical_dir: &Path, prefix: &str) -> Result<Vec<CanonicalArtifact>> {
    if !canonical_dir.is_dir() {
        return Err(EtlError::MissingArtifacts(canonical_dir.to_path_buf()));
    }
    let suffix = format!(".{ARTIFACT_EXTENSION}");
    let mut found: Vec<CanonicalArtifact> = fs::read_dir(canonical_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let digits = name.strip_prefix(prefix)?.strip_suffix(&suffix)?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let year = digits.parse().ok()?;
            Some(CanonicalArtifact { year, path })
        })
        .collect();
    found.sort_by_key(|a| a.year);
    if found.is_empty() {
        return Err(EtlError::MissingArtifacts(canonical_dir.to_path_buf()));
    }
    Ok(found)
}

/// Outer union by column name. Columns keep first-appearance order, rows keep
/// input order, and a column missing from a table is null for that table's rows.
pub fn concat_tables(tables: Vec<Table>) -> Result<Table> {
    let total: usize = tables.iter().map(Table::rows).sum();

    let mut order: Vec<(String, ColumnType)> = Vec::new();
    for table in &tables {
        for column in table.columns() {
            let ty = column.data.column_type();
            match order.iter_mut().find(|(name, _)| *name == column.name) {
                Some((_, existing)) => *existing = existing.widen(ty),
                None => order.push((column.name.clone(), ty)),
            }
        }
    }

    let mut merged: Vec<ColumnData> = order.iter().map(|(_, ty)| ColumnData::empty(*ty)).collect();
    for table in tables {
        let rows = table.rows();
        let mut columns: Vec<Option<ColumnData>> =
            order.iter().map(|_| None).collect();
        for column in table.into_columns() {
            let idx = order
                .iter()
                .position(|(name, _)| *name == column.name)
                .ok_or_else(|| EtlError::Concatenation(format!("unknown column {}", column.name)))?;
            columns[idx] = Some(column.data);
        }
        for ((target, (_, ty)), data) in merged.iter_mut().zip(&order).zip(columns) {
            match data {
                Some(data) => target.append(data.cast(*ty))?,
                None => target.push_nulls(rows),
            }
        }
    }

    let mut out = Table::with_rows(total);
    for ((name, _), data) in order.into_iter().zip(merged) {
        out.push_column(name, data)?;
    }
    Ok(out)
}

/// Forces geo/administrative columns to text with no null representation left.
pub fn reconcile_geo_columns(table: &mut Table, columns: &[String], null_markers: &[String]) {
    for name in columns {
        if let Some(column) = table.column_mut(name) {
            let data = std::mem::replace(&mut column.data, ColumnData::Text(Vec::new()));
            let text = match data.cast(ColumnType::Text) {
                ColumnData::Text(values) => values
                    .into_iter()
                    .map(|v| Some(blank_null_markers(v, null_markers)))
                    .collect(),
                _ => Vec::new(),
            };
            column.data = ColumnData::Text(text);
        }
    }
}

/// Rebuilds the unified artifact from every canonical artifact.
///
/// Not incremental: each run re-reads all years and replaces the unified file
/// in full. Nothing is written unless every step succeeds.
#[instrument(skip(config), fields(canonical_dir = %config.paths.canonical_dir.display()))]
pub fn unify(config: &EtlConfig) -> Result<UnifyReport> {
    let started = Instant::now();
    let result = build_unified(config);
    match &result {
        Ok(report) => metrics::unify::run_completed(
            report.years.len(),
            report.total_rows,
            started.elapsed().as_secs_f64(),
        ),
        Err(e) => {
            error!("Unify failed: {}", e);
            metrics::unify::run_failed();
        }
    }
    result
}

fn build_unified(config: &EtlConfig) -> Result<UnifyReport> {
    let artifacts = discover_artifacts(
        &config.paths.canonical_dir,
        &config.normalize.canonical_prefix,
    )?;
    println!("📦 Unifying {} canonical artifacts...", artifacts.len());

    let year_column = &config.normalize.year_column;
    let mut tables = Vec::with_capacity(artifacts.len());
    let mut years = Vec::with_capacity(artifacts.len());
    for a in &artifacts {
        let table = artifact::read_table(&a.path)?;
        if !table.has_column(year_column) {
            return Err(EtlError::Concatenation(format!(
                "{} has no '{}' column",
                a.path.display(),
                year_column
            )));
        }
        info!(year = a.year, rows = table.rows(), "Loaded canonical artifact");
        println!("   {} loaded ({} rows)", a.year, table.rows());
        years.push(YearRows {
            year: a.year,
            rows: table.rows(),
        });
        tables.push(table);
    }

    let expected: usize = years.iter().map(|y| y.rows).sum();
    let mut unified = concat_tables(tables)?;
    if unified.rows() != expected {
        return Err(EtlError::Concatenation(format!(
            "row count mismatch: unified {} vs sum of years {}",
            unified.rows(),
            expected
        )));
    }
    reconcile_geo_columns(
        &mut unified,
        &config.unify.geo_text_columns,
        &config.unify.null_markers,
    );

    let out = &config.paths.unified_path;
    write_atomically(out, |tmp| artifact::write_table(tmp, &unified))?;
    info!(rows = unified.rows(), artifact = %out.display(), "Unified artifact written");

    Ok(UnifyReport {
        artifact: out.clone(),
        years,
        total_rows: unified.rows(),
        columns: unified.columns().len(),
    })
}
