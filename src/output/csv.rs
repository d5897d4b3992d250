//! CSV writers and readers for API time series
//!
//! Two layouts exist:
//!
//! - [`CsvLayout::Merged`] - the per-symbol result file. A leading unnamed
//!   index column, then the API field names; timestamps rendered as
//!   `YYYY-MM-DD HH:MM:SS` in UTC.
//! - [`CsvLayout::Intermediate`] - one file per kline window. API field
//!   names only, timestamps as raw milliseconds so they read back exactly.
//!
//! Writers stage rows in a `.part` sibling and rename it onto the target in
//! [`OutputWriter::close`], so a target that exists is always complete.

use chrono::{DateTime, Utc};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use super::{FundingWriter, KlineWriter, OutputError, OutputResult, OutputWriter};
use crate::{FundingRate, Kline};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Rendering of timestamps in merged files
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Funding rate columns, in API order
pub const FUNDING_COLUMNS: [&str; 3] = ["symbol", "fundingRate", "fundingRateTimestamp"];

/// Kline columns, in API order
pub const KLINE_COLUMNS: [&str; 7] = [
    "startTime",
    "openPrice",
    "highPrice",
    "lowPrice",
    "closePrice",
    "volume",
    "turnover",
];

/// Shape of a written CSV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// Raw per-window file
    Intermediate,
    /// Final per-symbol file
    Merged,
}

/// Staging path used while a file is being written
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

fn format_timestamp(ts: DateTime<Utc>, layout: CsvLayout) -> String {
    match layout {
        CsvLayout::Merged => ts.format(TIMESTAMP_FORMAT).to_string(),
        CsvLayout::Intermediate => ts.timestamp_millis().to_string(),
    }
}

/// Removes the staging file on drop unless the write was committed
struct StagingGuard {
    path: PathBuf,
    committed: bool,
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed unfinished {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// CSV file staged next to its target
struct StagedCsv {
    writer: Writer<BufWriter<File>>,
    guard: StagingGuard,
    target: PathBuf,
    layout: CsvLayout,
    rows_written: u64,
}

impl StagedCsv {
    fn create(target: &Path, layout: CsvLayout, columns: &[&str]) -> OutputResult<Self> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OutputError::IoError(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let staging = staging_path(target);
        let file = File::create(&staging).map_err(|e| {
            OutputError::IoError(format!("Failed to create {}: {}", staging.display(), e))
        })?;
        let guard = StagingGuard {
            path: staging,
            committed: false,
        };
        let mut writer = Writer::from_writer(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file));

        let header: Vec<&str> = match layout {
            CsvLayout::Merged => std::iter::once("").chain(columns.iter().copied()).collect(),
            CsvLayout::Intermediate => columns.to_vec(),
        };
        writer
            .write_record(&header)
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;

        Ok(Self {
            writer,
            guard,
            target: target.to_path_buf(),
            layout,
            rows_written: 0,
        })
    }

    fn write_fields(&mut self, fields: Vec<String>) -> OutputResult<()> {
        let record: Vec<String> = match self.layout {
            CsvLayout::Merged => std::iter::once(self.rows_written.to_string())
                .chain(fields)
                .collect(),
            CsvLayout::Intermediate => fields,
        };

        self.writer
            .write_record(&record)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;

        let buf_writer = self
            .writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;
        drop(file);

        std::fs::rename(&self.guard.path, &self.target).map_err(|e| {
            OutputError::IoError(format!(
                "Failed to move {} to {}: {}",
                self.guard.path.display(),
                self.target.display(),
                e
            ))
        })?;
        self.guard.committed = true;

        debug!(
            "Wrote {} rows to {}",
            self.rows_written,
            self.target.display()
        );
        Ok(())
    }
}

/// CSV writer for funding rates
pub struct CsvFundingWriter {
    inner: StagedCsv,
}

impl CsvFundingWriter {
    /// Start a merged funding file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Ok(Self {
            inner: StagedCsv::create(path.as_ref(), CsvLayout::Merged, &FUNDING_COLUMNS)?,
        })
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.inner.rows_written
    }
}

impl FundingWriter for CsvFundingWriter {
    fn write_funding(&mut self, rate: &FundingRate) -> OutputResult<()> {
        let timestamp = format_timestamp(rate.funding_rate_timestamp, self.inner.layout);
        self.inner.write_fields(vec![
            rate.symbol.clone(),
            rate.funding_rate.to_string(),
            timestamp,
        ])
    }
}

impl OutputWriter for CsvFundingWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.inner.flush()
    }

    fn close(self) -> OutputResult<()> {
        self.inner.close()
    }
}

/// CSV writer for klines
pub struct CsvKlineWriter {
    inner: StagedCsv,
}

impl CsvKlineWriter {
    /// Start a kline file at `path` in the given layout
    pub fn new<P: AsRef<Path>>(path: P, layout: CsvLayout) -> OutputResult<Self> {
        Ok(Self {
            inner: StagedCsv::create(path.as_ref(), layout, &KLINE_COLUMNS)?,
        })
    }

    /// Rows written so far
    pub fn rows_written(&self) -> u64 {
        self.inner.rows_written
    }
}

impl KlineWriter for CsvKlineWriter {
    fn write_kline(&mut self, kline: &Kline) -> OutputResult<()> {
        let start = format_timestamp(kline.start_time, self.inner.layout);
        self.inner.write_fields(vec![
            start,
            kline.open_price.to_string(),
            kline.high_price.to_string(),
            kline.low_price.to_string(),
            kline.close_price.to_string(),
            kline.volume.to_string(),
            kline.turnover.to_string(),
        ])
    }
}

impl OutputWriter for CsvKlineWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.inner.flush()
    }

    fn close(self) -> OutputResult<()> {
        self.inner.close()
    }
}

/// Row of an intermediate kline file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KlinePartRecord {
    start_time: i64,
    open_price: String,
    high_price: String,
    low_price: String,
    close_price: String,
    volume: String,
    turnover: String,
}

fn parse_decimal(value: &str, field: &str, path: &Path) -> OutputResult<Decimal> {
    Decimal::from_str(value).map_err(|e| {
        OutputError::ParseError(format!(
            "{}: invalid {} {:?}: {}",
            path.display(),
            field,
            value,
            e
        ))
    })
}

impl KlinePartRecord {
    fn into_kline(self, path: &Path) -> OutputResult<Kline> {
        let start_time = DateTime::from_timestamp_millis(self.start_time).ok_or_else(|| {
            OutputError::ParseError(format!(
                "{}: startTime out of range: {}",
                path.display(),
                self.start_time
            ))
        })?;

        Ok(Kline {
            start_time,
            open_price: parse_decimal(&self.open_price, "openPrice", path)?,
            high_price: parse_decimal(&self.high_price, "highPrice", path)?,
            low_price: parse_decimal(&self.low_price, "lowPrice", path)?,
            close_price: parse_decimal(&self.close_price, "closePrice", path)?,
            volume: parse_decimal(&self.volume, "volume", path)?,
            turnover: parse_decimal(&self.turnover, "turnover", path)?,
        })
    }
}

/// Read back an intermediate kline file
pub fn read_kline_part<P: AsRef<Path>>(path: P) -> OutputResult<Vec<Kline>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| OutputError::IoError(format!("Failed to open {}: {}", path.display(), e)))?;

    let mut klines = Vec::new();
    for record in reader.deserialize::<KlinePartRecord>() {
        let record = record
            .map_err(|e| OutputError::CsvError(format!("{}: {}", path.display(), e)))?;
        klines.push(record.into_kline(path)?);
    }
    Ok(klines)
}
