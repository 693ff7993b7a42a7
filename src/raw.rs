//! Reading the Raw Store: one delimited export per year, delimiter and
//! encoding unknown up front.

use crate::config::{canonical_name, NormalizeConfig, TextEncoding};
use crate::error::{EtlError, Result};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// One raw per-year file deposited by the fetcher. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRecordSet {
    pub year: i32,
    pub path: PathBuf,
}

impl RawRecordSet {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A raw file that could not be keyed by year.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Raw cells of one file, headers already canonicalized. Missing cells are `None`.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub delimiter: char,
    pub headers: Vec<String>,
    pub columns: Vec<Vec<Option<String>>>,
    pub rows: usize,
}

fn digit_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").expect("static regex"))
}

/// Year encoded in a file name: the longest run of digits in the stem, first on ties.
pub fn year_from_file_name(path: &Path) -> Result<i32> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut best: Option<&str> = None;
    for m in digit_runs().find_iter(&stem) {
        if best.map_or(true, |b| m.as_str().len() > b.len()) {
            best = Some(m.as_str());
        }
    }
    best.and_then(|d| d.parse::<i32>().ok())
        .ok_or_else(|| EtlError::YearNotInFileName(path.to_path_buf()))
}

/// Lists raw files with the configured extension, sorted by file name.
pub fn discover(raw_dir: &Path, config: &NormalizeConfig) -> Result<(Vec<RawRecordSet>, Vec<RejectedFile>)> {
    let mut paths: Vec<PathBuf> = fs::read_dir(raw_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase() == config.raw_extension)
                .unwrap_or(false)
        })
        .collect();
    paths.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    let mut sources = Vec::new();
    let mut rejected = Vec::new();
    for path in paths {
        match year_from_file_name(&path) {
            Ok(year) => sources.push(RawRecordSet { year, path }),
            Err(e) => {
                warn!("Rejecting raw file {}: {}", path.display(), e);
                rejected.push(RejectedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    debug!("Discovered {} raw files in {}", sources.len(), raw_dir.display());
    Ok((sources, rejected))
}

pub fn decode(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Occurrences of `delim` outside double quotes.
fn count_outside_quotes(line: &str, delim: char) -> usize {
    let mut in_quotes = false;
    let mut n = 0;
    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delim && !in_quotes {
            n += 1;
        }
    }
    n
}

/// Picks the delimiter from the header and the next `sample` lines.
///
/// A candidate must appear in the header. Among those, the one with the most data
/// lines agreeing with the header count wins, then the higher count, then
/// candidate order.
pub fn sniff_delimiter(text: &str, candidates: &[char], sample: usize) -> Option<char> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .take(sample)
        .collect();
    let (header, data) = lines.split_first()?;

    let mut best: Option<(char, usize, usize)> = None;
    for &cand in candidates {
        let header_count = count_outside_quotes(header, cand);
        if header_count == 0 {
            continue;
        }
        let agreeing = data
            .iter()
            .filter(|l| count_outside_quotes(l, cand) == header_count)
            .count();
        let better = match best {
            None => true,
            Some((_, a, h)) => (agreeing, header_count) > (a, h),
        };
        if better {
            best = Some((cand, agreeing, header_count));
        }
    }
    best.map(|(c, _, _)| c)
}

/// Reads and parses one raw file into canonicalized string columns.
pub fn read_raw(path: &Path, config: &NormalizeConfig) -> Result<RawTable> {
    let bytes = fs::read(path)?;
    let text = decode(&bytes, config.encoding);
    parse_text(&text, config).map_err(|e| match e {
        EtlError::FormatDetection { reason, .. } => EtlError::FormatDetection {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

pub fn parse_text(text: &str, config: &NormalizeConfig) -> Result<RawTable> {
    let delimiter = sniff_delimiter(text, &config.delimiter_candidates, config.sniff_lines)
        .ok_or_else(|| EtlError::FormatDetection {
            path: PathBuf::new(),
            reason: format!(
                "none of the delimiters {:?} appear in the header",
                config.delimiter_candidates
            ),
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = canonical_headers(reader.headers()?.iter())?;
    let width = headers.len();
    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    let mut rows = 0;

    for record in reader.records() {
        let record = record?;
        if record.len() > width {
            return Err(EtlError::MalformedRow {
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: width,
                found: record.len(),
            });
        }
        for (i, column) in columns.iter_mut().enumerate() {
            let cell = record
                .get(i)
                .filter(|v| !config.null_values.iter().any(|n| n == v))
                .map(str::to_string);
            column.push(cell);
        }
        rows += 1;
    }

    Ok(RawTable {
        delimiter,
        headers,
        columns,
        rows,
    })
}

/// Trims and lowercases header names. Blank names become `unnamed: <index>`.
pub fn canonical_headers<'a, I>(raw: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();
    for (i, h) in raw.into_iter().enumerate() {
        let mut name = canonical_name(h);
        if name.is_empty() {
            name = format!("unnamed: {i}");
        }
        if out.contains(&name) {
            return Err(EtlError::DuplicateColumn(name));
        }
        out.push(name);
    }
    Ok(out)
}
