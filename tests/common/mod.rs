#![allow(dead_code)]

use accident_etl::config::EtlConfig;
use accident_etl::manifest::{FsManifest, ProcessingManifest};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const HEADER: &str =
    "id;data_inversa;uf;br;km;latitude;longitude;pessoas;mortos;feridos_leves;veiculos";

/// Config whose stores all live under `root`, with the raw store created.
pub fn config_in(root: &Path) -> EtlConfig {
    let config = EtlConfig::rooted_at(root);
    fs::create_dir_all(&config.paths.raw_dir).expect("create raw dir");
    config
}

pub fn manifest_for(config: &EtlConfig) -> Arc<dyn ProcessingManifest> {
    Arc::new(FsManifest::new(
        &config.paths.canonical_dir,
        &config.normalize.canonical_prefix,
    ))
}

/// `rows` well-formed semicolon-delimited accident rows for `year`.
pub fn accident_rows(year: i32, rows: usize) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for i in 0..rows {
        let day = i % 28 + 1;
        let (lat, lon) = if i % 3 == 0 {
            (String::new(), String::new())
        } else {
            (format!("-23,{i}"), format!("-46,{i}"))
        };
        out.push_str(&format!(
            "{id};{day:02}/03/{year};SP;116;{km};{lat};{lon};{p};0;1;2\n",
            id = year as usize * 1000 + i,
            km = i % 500,
            p = i % 4 + 1,
        ));
    }
    out
}

pub fn write_raw(config: &EtlConfig, name: &str, bytes: impl AsRef<[u8]>) {
    fs::write(config.paths.raw_dir.join(name), bytes).expect("write raw file");
}
