//! Read-only views over the raw store and over columnar artifacts, for operators
//! checking schema drift before or after a run.

use crate::artifact;
use crate::config::NormalizeConfig;
use crate::error::{EtlError, Result};
use crate::raw::{self, RawRecordSet, RejectedFile};
use crate::table::{ColumnType, Table};
use std::path::Path;
use tracing::warn;

/// Detected layout of one raw file, or why it could not be read.
#[derive(Debug, Clone)]
pub struct RawColumns {
    pub source: RawRecordSet,
    pub layout: std::result::Result<RawLayout, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLayout {
    pub delimiter: char,
    pub headers: Vec<String>,
    pub rows: usize,
}

/// Reads every raw file's header without normalizing anything.
pub fn raw_columns(raw_dir: &Path, config: &NormalizeConfig) -> Result<(Vec<RawColumns>, Vec<RejectedFile>)> {
    let (sources, rejected) = raw::discover(raw_dir, config)?;
    let listing = sources
        .into_iter()
        .map(|source| {
            let layout = raw::read_raw(&source.path, config)
                .map(|t| RawLayout {
                    delimiter: t.delimiter,
                    headers: t.headers,
                    rows: t.rows,
                })
                .map_err(|e| {
                    warn!(file = %source.file_name(), error = %e, "Could not read raw header");
                    e.to_string()
                });
            RawColumns { source, layout }
        })
        .collect();
    Ok((listing, rejected))
}

/// Summary of a Parquet artifact: schema, row count and a head of rows.
#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub rows: usize,
    pub schema: Vec<(String, ColumnType)>,
    /// Rows where the filter column is non-null and not an empty string.
    pub non_empty: Option<(String, usize)>,
    pub head_columns: Vec<String>,
    pub head: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    pub rows: usize,
    /// Columns to show in the head; all columns when empty.
    pub columns: Vec<String>,
    /// Restrict the head and the count to rows where this column is non-empty.
    pub non_empty: Option<String>,
}

pub fn inspect_artifact(path: &Path, options: &InspectOptions) -> Result<ArtifactSummary> {
    let table = artifact::read_table(path)?;
    summarize(&table, options)
}

pub fn summarize(table: &Table, options: &InspectOptions) -> Result<ArtifactSummary> {
    let schema = table
        .schema()
        .columns
        .into_iter()
        .map(|spec| (spec.name, spec.ty))
        .collect();

    let selected: Vec<usize> = match &options.non_empty {
        Some(name) => {
            let column = table
                .column(name)
                .ok_or_else(|| EtlError::MissingColumn(name.clone()))?;
            (0..table.rows())
                .filter(|&row| column.data.render(row).is_some_and(|v| !v.is_empty()))
                .collect()
        }
        None => (0..table.rows()).collect(),
    };

    let head_columns: Vec<String> = if options.columns.is_empty() {
        table.column_names().into_iter().map(str::to_string).collect()
    } else {
        options.columns.clone()
    };
    let shown = head_columns
        .iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| EtlError::MissingColumn(name.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let head = selected
        .iter()
        .take(options.rows)
        .map(|&row| {
            shown
                .iter()
                .map(|c| c.data.render(row).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(ArtifactSummary {
        rows: table.rows(),
        schema,
        non_empty: options.non_empty.clone().map(|name| (name, selected.len())),
        head_columns,
        head,
    })
}
