use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Could not detect format of {path}: {reason}")]
    FormatDetection { path: PathBuf, reason: String },

    #[error("No year found in file name: {0}")]
    YearNotInFileName(PathBuf),

    #[error("Malformed row at line {line}: expected {expected} fields, saw {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Duplicate column after normalization: {0}")]
    DuplicateColumn(String),

    #[error("Column length mismatch for '{column}': expected {expected} rows, got {found}")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Value '{value}' in count column '{column}' (row {row}) is not a non-negative number")]
    Coercion {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Required column missing: {0}")]
    MissingColumn(String),

    #[error("No canonical artifacts found in {0}")]
    MissingArtifacts(PathBuf),

    #[error("Cannot concatenate artifacts: {0}")]
    Concatenation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tag recorded in per-year reports for a failed year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    FormatDetection,
    MalformedInput,
    Coercion,
    MissingColumn,
    Io,
    Output,
    Panicked,
}

impl EtlError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EtlError::FormatDetection { .. } | EtlError::YearNotInFileName(_) => {
                FailureKind::FormatDetection
            }
            EtlError::MalformedRow { .. }
            | EtlError::DuplicateColumn(_)
            | EtlError::ColumnLength { .. }
            | EtlError::Csv(_) => FailureKind::MalformedInput,
            EtlError::Coercion { .. } => FailureKind::Coercion,
            EtlError::MissingColumn(_) => FailureKind::MissingColumn,
            EtlError::Io(_) => FailureKind::Io,
            EtlError::Parquet(_)
            | EtlError::Arrow(_)
            | EtlError::Json(_)
            | EtlError::MissingArtifacts(_)
            | EtlError::Concatenation(_)
            | EtlError::Config(_)
            | EtlError::Toml(_) => FailureKind::Output,
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
