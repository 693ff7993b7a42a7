mod common;

use accident_etl::artifact::read_table;
use accident_etl::config::NormalizeConfig;
use accident_etl::error::FailureKind;
use accident_etl::manifest::SkipReason;
use accident_etl::pipeline::{
    normalize_all, normalize_all_with, normalize_year, YearStatus, YearTransform,
};
use accident_etl::raw::RawRecordSet;
use accident_etl::table::{ColumnData, Table};
use accident_etl::Result as EtlResult;
use anyhow::Result;
use chrono::NaiveDate;
use common::{accident_rows, config_in, manifest_for, write_raw};
use std::fs;
use std::io;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc::unbounded_channel;

#[tokio::test]
async fn latin1_semicolon_export_is_normalized() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());

    let mut bytes = b"ID ;Data_Inversa;UF;Condi\xe7\xe3o_Metereol\xf3gica;Mortos\n".to_vec();
    bytes.extend_from_slice(b"1;05/01/2008;MG;C\xe9u Claro;1\n");
    bytes.extend_from_slice(b"2;06/01/2008;SP;Chuva;0\n");
    write_raw(&config, "datatran2008.csv", bytes);

    let report = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(report.normalized(), 1);

    let table = read_table(&config.paths.canonical_dir.join("prf_acidentes_2008.parquet"))?;
    assert_eq!(
        table.column_names(),
        vec!["id", "data_inversa", "uf", "condição_metereológica", "mortos", "ano"]
    );
    assert_eq!(
        table.column("condição_metereológica").unwrap().data,
        ColumnData::Text(vec![Some("Céu Claro".into()), Some("Chuva".into())])
    );
    assert_eq!(
        table.column("ano").unwrap().data,
        ColumnData::Integer(vec![Some(2008), Some(2008)])
    );
    Ok(())
}

#[tokio::test]
async fn missing_year_column_is_synthesized_from_file_name() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());
    write_raw(&config, "datatran2021.csv", accident_rows(2021, 25));

    normalize_all(&config, manifest_for(&config)).await?;

    let table = read_table(&config.paths.canonical_dir.join("prf_acidentes_2021.parquet"))?;
    assert_eq!(table.rows(), 25);
    match &table.column("ano").unwrap().data {
        ColumnData::Integer(v) => assert!(v.iter().all(|y| *y == Some(2021))),
        other => panic!("year column has type {:?}", other.column_type()),
    }
    Ok(())
}

#[tokio::test]
async fn unparseable_counts_become_zero() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());
    write_raw(
        &config,
        "datatran2015.csv",
        "id,mortos,feridos_graves,veiculos,data_inversa\n\
         1,NA,2,-3,01/02/2015\n\
         2,abc,,1.0,31/02/2015\n\
         3,1,0,2,2015-02-03\n",
    );

    let report = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(report.failed(), 0);

    let table = read_table(&config.paths.canonical_dir.join("prf_acidentes_2015.parquet"))?;
    assert_eq!(
        table.column("mortos").unwrap().data,
        ColumnData::Integer(vec![Some(0), Some(0), Some(1)])
    );
    assert_eq!(
        table.column("feridos_graves").unwrap().data,
        ColumnData::Integer(vec![Some(2), Some(0), Some(0)])
    );
    assert_eq!(
        table.column("veiculos").unwrap().data,
        ColumnData::Integer(vec![Some(0), Some(1), Some(2)])
    );
    assert_eq!(
        table.column("data_inversa").unwrap().data,
        ColumnData::Date(vec![NaiveDate::from_ymd_opt(2015, 2, 1), None, None])
    );
    Ok(())
}

#[tokio::test]
async fn count_and_date_invariants_hold_for_every_artifact() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());
    for year in [2017, 2018, 2019] {
        write_raw(&config, &format!("datatran{year}.csv"), accident_rows(year, 40));
    }

    let report = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(report.normalized(), 3);

    for outcome in &report.outcomes {
        let YearStatus::Normalized { artifact, rows, .. } = &outcome.status else {
            panic!("year {} was not normalized", outcome.year);
        };
        let table = read_table(artifact)?;
        assert_eq!(table.rows(), *rows);
        for name in &config.normalize.count_columns {
            if let Some(column) = table.column(name) {
                match &column.data {
                    ColumnData::Integer(v) => {
                        assert!(v.iter().all(|c| c.is_some_and(|n| n >= 0)), "{name}")
                    }
                    other => panic!("{name} has type {:?}", other.column_type()),
                }
            }
        }
        assert!(matches!(
            table.column("data_inversa").unwrap().data,
            ColumnData::Date(_)
        ));
    }
    Ok(())
}

#[tokio::test]
async fn second_run_skips_and_leaves_artifacts_untouched() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());
    write_raw(&config, "datatran2019.csv", accident_rows(2019, 30));
    write_raw(&config, "datatran2020.csv", accident_rows(2020, 30));

    let first = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(first.normalized(), 2);
    let artifact = config.paths.canonical_dir.join("prf_acidentes_2019.parquet");
    let before = fs::read(&artifact)?;

    let second = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(second.normalized(), 0);
    assert_eq!(second.skipped(), 2);
    assert!(matches!(
        &second.outcome(2019).unwrap().status,
        YearStatus::Skipped {
            reason: SkipReason::AlreadyNormalized
        }
    ));
    assert_eq!(fs::read(&artifact)?, before);
    Ok(())
}

#[tokio::test]
async fn a_bad_year_does_not_stop_the_others() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = config_in(temp_dir.path());
    config.normalize.workers = 2;
    write_raw(&config, "datatran2010.csv", accident_rows(2010, 10));
    // One column and no delimiter anywhere
    write_raw(&config, "datatran2011.csv", "id\n1\n2\n");
    // Second data row has more fields than the header
    write_raw(&config, "datatran2012.csv", "id;uf\n1;SP\n2;RJ;extra\n");
    write_raw(&config, "datatran2013.csv", accident_rows(2013, 10));
    write_raw(&config, "leiame.csv", "a;b\n1;2\n");

    let report = normalize_all(&config, manifest_for(&config)).await?;
    assert_eq!(report.normalized(), 2);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.rejected.len(), 1);

    let kind = |year| match &report.outcome(year).unwrap().status {
        YearStatus::Failed { kind, .. } => Some(*kind),
        _ => None,
    };
    assert_eq!(kind(2011), Some(FailureKind::FormatDetection));
    assert_eq!(kind(2012), Some(FailureKind::MalformedInput));

    let canonical = &config.paths.canonical_dir;
    assert!(canonical.join("prf_acidentes_2010.parquet").is_file());
    assert!(canonical.join("prf_acidentes_2013.parquet").is_file());
    assert!(!canonical.join("prf_acidentes_2011.parquet").exists());
    assert!(!canonical.join("prf_acidentes_2012.parquet").exists());

    // Failed years have no artifact, so they are retried
    write_raw(&config, "datatran2011.csv", accident_rows(2011, 5));
    let retry = normalize_all(&config, manifest_for(&config)).await?;
    assert!(matches!(
        retry.outcome(2011).unwrap().status,
        YearStatus::Normalized { rows: 5, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn report_serializes_to_json() -> Result<()> {
    let temp_dir = tempdir()?;
    let config = config_in(temp_dir.path());
    write_raw(&config, "datatran2016.csv", accident_rows(2016, 3));
    write_raw(&config, "acidentes2016.csv", accident_rows(2016, 3));

    let report = normalize_all(&config, manifest_for(&config)).await?;
    let json = serde_json::to_value(&report)?;
    let outcomes = json["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    // Name order: acidentes2016.csv claims the year first
    assert_eq!(outcomes[0]["status"], "normalized");
    assert_eq!(outcomes[0]["rows"], 3);
    assert_eq!(outcomes[1]["status"], "skipped");
    assert_eq!(outcomes[1]["reason"]["kind"], "duplicate_year");
    Ok(())
}

#[tokio::test]
async fn each_year_is_reported_as_it_finishes() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = config_in(temp_dir.path());
    config.normalize.workers = 1;
    write_raw(&config, "datatran2019.csv", accident_rows(2019, 5));
    write_raw(&config, "datatran2020.csv", accident_rows(2020, 5));

    // 2020 only proceeds once 2019's outcome has been received
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let gate_rx = Mutex::new(gate_rx);
    let transform: Arc<YearTransform> =
        Arc::new(move |raw: &RawRecordSet, cfg: &NormalizeConfig| -> EtlResult<Table> {
            if raw.year == 2020 {
                gate_rx
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(10))
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "2019 not reported"))?;
            }
            normalize_year(raw, cfg)
        });

    let (progress_tx, mut progress_rx) = unbounded_channel();
    let manifest = manifest_for(&config);
    let run_config = config.clone();
    let run = tokio::spawn(async move {
        normalize_all_with(&run_config, manifest, transform, Some(progress_tx)).await
    });

    let first = progress_rx.recv().await.expect("outcome for 2019");
    assert_eq!(first.year, 2019);
    assert!(matches!(first.status, YearStatus::Normalized { rows: 5, .. }));
    assert!(!run.is_finished());
    gate_tx.send(())?;

    let report = run.await??;
    assert!(matches!(
        report.outcome(2020).unwrap().status,
        YearStatus::Normalized { rows: 5, .. }
    ));
    let second = progress_rx.recv().await.expect("outcome for 2020");
    assert_eq!(second.year, 2020);
    Ok(())
}

#[tokio::test]
async fn a_panicking_year_does_not_cancel_the_others() -> Result<()> {
    let temp_dir = tempdir()?;
    let mut config = config_in(temp_dir.path());
    config.normalize.workers = 2;
    for year in [2017, 2018, 2019] {
        write_raw(&config, &format!("datatran{year}.csv"), accident_rows(year, 8));
    }

    let transform: Arc<YearTransform> =
        Arc::new(|raw: &RawRecordSet, cfg: &NormalizeConfig| -> EtlResult<Table> {
            if raw.year == 2018 {
                panic!("corrupt export for {}", raw.year);
            }
            normalize_year(raw, cfg)
        });
    let report = normalize_all_with(&config, manifest_for(&config), transform, None).await?;

    assert_eq!(report.normalized(), 2);
    match &report.outcome(2018).unwrap().status {
        YearStatus::Failed { kind, message } => {
            assert_eq!(*kind, FailureKind::Panicked);
            assert!(message.contains("corrupt export for 2018"), "{message}");
        }
        other => panic!("2018 should have failed, got {other:?}"),
    }

    let canonical = &config.paths.canonical_dir;
    assert!(canonical.join("prf_acidentes_2017.parquet").is_file());
    assert!(canonical.join("prf_acidentes_2019.parquet").is_file());
    assert!(!canonical.join("prf_acidentes_2018.parquet").exists());
    assert!(!canonical.join("prf_acidentes_2018.parquet.tmp").exists());
    Ok(())
}
