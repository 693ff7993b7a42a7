use crate::constants::{self, to_owned_list};
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything the normalizer and unifier need, passed explicitly into each component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub paths: PathsConfig,
    pub normalize: NormalizeConfig,
    pub unify: UnifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub canonical_dir: PathBuf,
    pub unified_path: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub raw_extension: String,
    pub encoding: TextEncoding,
    pub delimiter_candidates: Vec<char>,
    pub sniff_lines: usize,
    pub year_column: String,
    pub count_columns: Vec<String>,
    pub date_column: String,
    pub date_format: String,
    pub missing_date_column: MissingColumnPolicy,
    pub coercion: CoercionPolicy,
    pub null_values: Vec<String>,
    pub canonical_prefix: String,
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnifyConfig {
    pub geo_text_columns: Vec<String>,
    pub null_markers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// ISO-8859-1: every byte maps to one code point, so decoding never fails.
    Latin1,
    /// UTF-8 with invalid sequences replaced.
    Utf8,
}

/// What to do when a year's export has no date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingColumnPolicy {
    /// Emit the year without a date column and log a warning.
    Skip,
    /// Fail the year.
    Fail,
}

/// What to do with count values that are not non-negative numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionPolicy {
    ClampToZero,
    Reject,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from(constants::DEFAULT_RAW_DIR),
            canonical_dir: PathBuf::from(constants::DEFAULT_CANONICAL_DIR),
            unified_path: PathBuf::from(constants::DEFAULT_UNIFIED_PATH),
            logs_dir: PathBuf::from(constants::DEFAULT_LOGS_DIR),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            raw_extension: constants::RAW_EXTENSION.to_string(),
            encoding: TextEncoding::Latin1,
            delimiter_candidates: constants::DELIMITER_CANDIDATES.to_vec(),
            sniff_lines: constants::DEFAULT_SNIFF_LINES,
            year_column: constants::YEAR_COLUMN.to_string(),
            count_columns: to_owned_list(constants::COUNT_COLUMNS),
            date_column: constants::DATE_COLUMN.to_string(),
            date_format: constants::DATE_FORMAT.to_string(),
            missing_date_column: MissingColumnPolicy::Skip,
            coercion: CoercionPolicy::ClampToZero,
            null_values: to_owned_list(constants::RAW_NULL_VALUES),
            canonical_prefix: constants::CANONICAL_PREFIX.to_string(),
            workers: constants::DEFAULT_WORKERS,
        }
    }
}

impl Default for UnifyConfig {
    fn default() -> Self {
        Self {
            geo_text_columns: to_owned_list(constants::GEO_TEXT_COLUMNS),
            null_markers: to_owned_list(constants::NULL_MARKERS),
        }
    }
}

impl EtlConfig {
    /// Load configuration. An explicit path must exist; otherwise `etl.toml` in the
    /// working directory is used when present, falling back to built-in defaults.
    /// Environment overrides are applied last, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(constants::DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", constants::DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Config rooted at `root`: `root/bronze`, `root/silver`, `root/gold/...`.
    pub fn rooted_at(root: &Path) -> Self {
        let mut config = Self::default();
        config.paths.raw_dir = root.join("bronze");
        config.paths.canonical_dir = root.join("silver");
        config.paths.unified_path = root.join("gold").join("acidentes_prf.parquet");
        config.paths.logs_dir = root.join("logs");
        config
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `ETL_*` overrides read through `get`.
    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = get("ETL_RAW_DIR") {
            self.paths.raw_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ETL_CANONICAL_DIR") {
            self.paths.canonical_dir = PathBuf::from(v);
        }
        if let Some(v) = get("ETL_UNIFIED_PATH") {
            self.paths.unified_path = PathBuf::from(v);
        }
        if let Some(v) = get("ETL_WORKERS") {
            self.normalize.workers = v
                .trim()
                .parse()
                .map_err(|_| EtlError::Config(format!("ETL_WORKERS is not a number: {v}")))?;
        }
        Ok(())
    }

    /// Normalizes configured column names the same way raw headers are normalized
    /// and rejects settings no run could succeed with.
    pub fn validate(&mut self) -> Result<()> {
        let n = &mut self.normalize;
        if n.workers == 0 {
            return Err(EtlError::Config("workers must be at least 1".into()));
        }
        if n.delimiter_candidates.is_empty() {
            return Err(EtlError::Config("delimiter_candidates must not be empty".into()));
        }
        if let Some(c) = n.delimiter_candidates.iter().find(|c| !c.is_ascii()) {
            return Err(EtlError::Config(format!("delimiter '{c}' is not ASCII")));
        }
        if n.date_format.trim().is_empty() {
            return Err(EtlError::Config("date_format must not be empty".into()));
        }
        if n.sniff_lines < 2 {
            n.sniff_lines = 2;
        }
        n.year_column = canonical_name(&n.year_column);
        n.date_column = canonical_name(&n.date_column);
        n.count_columns.iter_mut().for_each(|c| *c = canonical_name(c));
        n.raw_extension = n.raw_extension.trim_start_matches('.').to_ascii_lowercase();
        self.unify
            .geo_text_columns
            .iter_mut()
            .for_each(|c| *c = canonical_name(c));
        Ok(())
    }
}

/// Canonical column name: surrounding whitespace trimmed, lowercased.
pub fn canonical_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}
