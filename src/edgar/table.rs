use crate::edgar::model::{AggregatedLogRow, MergedRow};
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to stage {}", path.display()))?;
    fill(&mut tmp)?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<W> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row)?;
    }
    csv_writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv: {}", err.error()))
}

fn read_csv<R: Read, T: DeserializeOwned>(reader: R, path: &Path) -> Result<Vec<T>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut out = Vec::new();
    for (line, row) in csv_reader.deserialize().enumerate() {
        let row = row.with_context(|| format!("bad row {} in {}", line + 2, path.display()))?;
        out.push(row);
    }
    Ok(out)
}

pub fn write_aggregates(path: &Path, rows: &[AggregatedLogRow]) -> Result<()> {
    write_atomic(path, |tmp| {
        write_csv(tmp.as_file_mut(), rows)?;
        Ok(())
    })
}

pub fn read_aggregates(path: &Path) -> Result<Vec<AggregatedLogRow>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_csv(BufReader::new(file), path)
}

/// Gzip-compressed CSV.
pub fn save_dataset(path: &Path, rows: &[MergedRow]) -> Result<()> {
    write_atomic(path, |tmp| {
        let encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
        let encoder = write_csv(encoder, rows)?;
        encoder
            .finish()
            .with_context(|| format!("failed to compress {}", path.display()))?;
        Ok(())
    })
}

pub fn load_dataset(path: &Path) -> Result<Vec<MergedRow>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_csv(GzDecoder::new(BufReader::new(file)), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edgar::model::FileTypeCounts;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 1, d).unwrap()
    }

    #[test]
    fn aggregates_use_edgar_column_names() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("2017/edgar_visits_20170101.csv");
        let counts = FileTypeCounts {
            markup: 2,
            plain_text: 1,
            structured: 0,
            other: 3,
        };
        let rows = vec![AggregatedLogRow::new(day(1), 1000045, "0001-17-1".to_string(), counts)];
        write_aggregates(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("date,cik,accession,nr_total,htm,txt,xbrl,other\n"));
        assert!(text.contains("2017-01-01,1000045,0001-17-1,6,2,1,0,3"));
        assert_eq!(read_aggregates(&path).unwrap(), rows);
    }

    #[test]
    fn aggregates_tolerate_float_coerced_counts() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("p_20170101.csv");
        fs::write(
            &path,
            "date,cik,accession,nr_total,htm,txt,xbrl,other\n2017-01-01,42.0,123.0,2.0,1.0,0,0,1\n",
        )
        .unwrap();
        let rows = read_aggregates(&path).unwrap();
        assert_eq!(rows[0].cik, 42);
        assert_eq!(rows[0].accession, "123.0");
        assert_eq!(rows[0].total, 2);
    }

    #[test]
    fn malformed_aggregate_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("p_bad.csv");
        fs::write(&path, "date,cik\nnot-a-date,x\n").unwrap();
        assert!(read_aggregates(&path).is_err());
    }

    #[test]
    fn dataset_is_gzip_compressed_and_loads_back() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("p_visiting_details_2017_2017.csv.gz");
        let rows = vec![MergedRow {
            date: day(2),
            cik: 7,
            accession: "0000007-17-000001".to_string(),
            nr_total: 1,
            htm: 1,
            txt: 0,
            xbrl: 0,
            other: 0,
            form: "10-K".to_string(),
            filing_date: day(1),
        }];
        save_dataset(&path, &rows).unwrap();
        let raw = fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(load_dataset(&path).unwrap(), rows);
    }
}
