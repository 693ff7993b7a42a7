//! Columnar artifacts: `Table` to and from Parquet.

use crate::error::{EtlError, Result};
use crate::table::{ColumnData, Table};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt8Type,
};
use arrow_array::{
    Array, ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray,
};
use arrow_schema::{DataType, Field, Schema as ArrowSchema};
use chrono::NaiveDate;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch")
}

fn date_to_days(d: NaiveDate) -> i32 {
    (d - epoch()).num_days() as i32
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

fn to_arrow(data: &ColumnData) -> (DataType, ArrayRef) {
    match data {
        ColumnData::Integer(v) => (
            DataType::Int64,
            Arc::new(v.iter().copied().collect::<Int64Array>()),
        ),
        ColumnData::Float(v) => (
            DataType::Float64,
            Arc::new(v.iter().copied().collect::<Float64Array>()),
        ),
        ColumnData::Date(v) => (
            DataType::Date32,
            Arc::new(v.iter().map(|d| d.map(date_to_days)).collect::<Date32Array>()),
        ),
        ColumnData::Text(v) => (
            DataType::Utf8,
            Arc::new(v.iter().map(|s| s.as_deref()).collect::<StringArray>()),
        ),
    }
}

pub fn to_record_batch(table: &Table) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        let (data_type, array) = to_arrow(&column.data);
        fields.push(Field::new(column.name.as_str(), data_type, true));
        arrays.push(array);
    }
    Ok(RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)?)
}

/// Writes `table` as a single Snappy-compressed Parquet file at `path`.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let batch = to_record_batch(table)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn from_arrow(name: &str, array: &dyn Array) -> Result<ColumnData> {
    let data = match array.data_type() {
        DataType::Int64 => ColumnData::Integer(array.as_primitive::<Int64Type>().iter().collect()),
        DataType::Int32 => ColumnData::Integer(
            array.as_primitive::<Int32Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::Int16 => ColumnData::Integer(
            array.as_primitive::<Int16Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::Int8 => ColumnData::Integer(
            array.as_primitive::<Int8Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::UInt32 => ColumnData::Integer(
            array.as_primitive::<UInt32Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::UInt16 => ColumnData::Integer(
            array.as_primitive::<UInt16Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::UInt8 => ColumnData::Integer(
            array.as_primitive::<UInt8Type>().iter().map(|v| v.map(i64::from)).collect(),
        ),
        DataType::Float64 => ColumnData::Float(array.as_primitive::<Float64Type>().iter().collect()),
        DataType::Float32 => ColumnData::Float(
            array.as_primitive::<Float32Type>().iter().map(|v| v.map(f64::from)).collect(),
        ),
        DataType::Date32 => ColumnData::Date(
            array
                .as_primitive::<Date32Type>()
                .iter()
                .map(|v| v.and_then(days_to_date))
                .collect(),
        ),
        DataType::Utf8 => ColumnData::Text(
            array.as_string::<i32>().iter().map(|v| v.map(str::to_string)).collect(),
        ),
        DataType::LargeUtf8 => ColumnData::Text(
            array.as_string::<i64>().iter().map(|v| v.map(str::to_string)).collect(),
        ),
        DataType::Boolean => ColumnData::Text(
            array.as_boolean().iter().map(|v| v.map(|b| b.to_string())).collect(),
        ),
        DataType::Null => ColumnData::Text(vec![None; array.len()]),
        other => {
            return Err(EtlError::Concatenation(format!(
                "column '{name}' has unsupported type {other:?}"
            )))
        }
    };
    Ok(data)
}

/// Reads a Parquet artifact back into a `Table`.
pub fn read_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let arrow_schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut columns: Vec<ColumnData> = Vec::new();
    let mut rows = 0;
    for batch in reader {
        let batch = batch?;
        rows += batch.num_rows();
        for (i, field) in arrow_schema.fields().iter().enumerate() {
            let data = from_arrow(field.name(), batch.column(i).as_ref())?;
            match columns.get_mut(i) {
                Some(existing) => existing.append(data)?,
                None => columns.push(data),
            }
        }
    }

    let mut table = Table::with_rows(rows);
    let mut columns = columns.into_iter();
    for field in arrow_schema.fields().iter() {
        let data = columns
            .next()
            .unwrap_or_else(|| empty_for(field.data_type()));
        table.push_column(field.name().as_str(), data)?;
    }
    Ok(table)
}

/// Typed empty column for an artifact with zero row groups.
fn empty_for(data_type: &DataType) -> ColumnData {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => ColumnData::Integer(Vec::new()),
        DataType::Float32 | DataType::Float64 => ColumnData::Float(Vec::new()),
        DataType::Date32 => ColumnData::Date(Vec::new()),
        _ => ColumnData::Text(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_survives_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.parquet");
        let d = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();

        let mut t = Table::with_rows(2);
        t.push_column("ano", ColumnData::Integer(vec![Some(2020), Some(2020)])).unwrap();
        t.push_column("data_inversa", ColumnData::Date(vec![Some(d), None])).unwrap();
        t.push_column("latitude", ColumnData::Float(vec![Some(-23.5), None])).unwrap();
        t.push_column("uf", ColumnData::Text(vec![Some("SP".into()), None])).unwrap();
        write_table(&path, &t).unwrap();

        let back = read_table(&path).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn empty_table_keeps_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");
        let mut t = Table::with_rows(0);
        t.push_column("ano", ColumnData::Integer(vec![])).unwrap();
        t.push_column("data_inversa", ColumnData::Date(vec![])).unwrap();
        write_table(&path, &t).unwrap();

        let back = read_table(&path).unwrap();
        assert_eq!(back.rows(), 0);
        assert_eq!(back.column("data_inversa").unwrap().data, ColumnData::Date(vec![]));
    }

    #[test]
    fn date_day_conversion() {
        let d = NaiveDate::from_ymd_opt(2007, 1, 1).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
        assert_eq!(date_to_days(epoch()), 0);
    }
}
