//! Default locations and column lists for the PRF accident exports.
//! These only seed `EtlConfig`; components read everything from the config.

// Data lake layout
pub const DEFAULT_RAW_DIR: &str = "data/bronze";
pub const DEFAULT_CANONICAL_DIR: &str = "data/silver";
pub const DEFAULT_UNIFIED_PATH: &str = "data/gold/acidentes_prf.parquet";
pub const DEFAULT_LOGS_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

pub const RAW_EXTENSION: &str = "csv";
pub const CANONICAL_PREFIX: &str = "prf_acidentes_";
pub const ARTIFACT_EXTENSION: &str = "parquet";

pub const YEAR_COLUMN: &str = "ano";
pub const DATE_COLUMN: &str = "data_inversa";
pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_SNIFF_LINES: usize = 20;

/// Count-like columns coerced to non-negative integers.
pub const COUNT_COLUMNS: &[&str] = &[
    "km",
    "pessoas",
    "mortos",
    "feridos_leves",
    "feridos_graves",
    "ilesos",
    "ignorados",
    "feridos",
    "veiculos",
];

/// Geo/administrative columns forced to text in the unified artifact.
pub const GEO_TEXT_COLUMNS: &[&str] = &[
    "br",
    "km",
    "latitude",
    "longitude",
    "uop",
    "delegacia",
    "regional",
];

pub const DELIMITER_CANDIDATES: &[char] = &[';', ',', '\t', '|'];

/// Raw cell tokens read as missing.
pub const RAW_NULL_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Textual forms a null can take once rendered as text.
pub const NULL_MARKERS: &[&str] = &["nan", "NaN", "None", "NaT", "null"];

pub fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
