//! Skip logic for normalization. A year is done when its canonical artifact exists.

use crate::constants::ARTIFACT_EXTENSION;
use crate::error::Result;
use crate::raw::RawRecordSet;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ProcessingManifest: Send + Sync {
    /// Where the canonical artifact for `year` lives.
    fn artifact_path(&self, year: i32) -> PathBuf;

    fn is_processed(&self, year: i32) -> bool;
}

/// Filesystem manifest: `<canonical_dir>/<prefix><year>.parquet` exists.
#[derive(Debug, Clone)]
pub struct FsManifest {
    canonical_dir: PathBuf,
    prefix: String,
}

impl FsManifest {
    pub fn new(canonical_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            canonical_dir: canonical_dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn canonical_dir(&self) -> &Path {
        &self.canonical_dir
    }
}

impl ProcessingManifest for FsManifest {
    fn artifact_path(&self, year: i32) -> PathBuf {
        self.canonical_dir
            .join(format!("{}{}.{}", self.prefix, year, ARTIFACT_EXTENSION))
    }

    fn is_processed(&self, year: i32) -> bool {
        self.artifact_path(year).is_file()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyNormalized,
    /// Another raw file earlier in name order resolved to the same year.
    DuplicateYear { kept: PathBuf },
}

impl SkipReason {
    pub fn describe(&self) -> String {
        match self {
            SkipReason::AlreadyNormalized => "already normalized".to_string(),
            SkipReason::DuplicateYear { kept } => {
                format!("same year as {}", kept.display())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    Process { output: PathBuf },
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedYear {
    pub source: RawRecordSet,
    pub action: PlannedAction,
}

/// Decides, for every raw file in order, whether it is normalized this run.
pub fn plan(sources: &[RawRecordSet], manifest: &dyn ProcessingManifest) -> Vec<PlannedYear> {
    let mut claimed: HashMap<i32, PathBuf> = HashMap::new();
    sources
        .iter()
        .map(|source| {
            let action = if let Some(kept) = claimed.get(&source.year) {
                PlannedAction::Skip(SkipReason::DuplicateYear { kept: kept.clone() })
            } else {
                claimed.insert(source.year, source.path.clone());
                if manifest.is_processed(source.year) {
                    PlannedAction::Skip(SkipReason::AlreadyNormalized)
                } else {
                    PlannedAction::Process {
                        output: manifest.artifact_path(source.year),
                    }
                }
            };
            PlannedYear {
                source: source.clone(),
                action,
            }
        })
        .collect()
}

/// Writes through a temporary sibling and renames into place, so readers and the
/// manifest never observe a partially written artifact.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    match write(&tmp) {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
