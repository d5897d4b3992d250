//! Local layout, CSV writers and row merging

use crate::{FundingRate, Kline};

pub mod csv;
pub mod merge;
pub mod path;

pub use merge::merge_rows;
pub use path::PathResolver;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// A persisted row could not be parsed back
    #[error("parse error: {0}")]
    ParseError(String),

    /// URL or name cannot be mapped to a local path
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Common lifecycle of file writers
pub trait OutputWriter {
    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;

    /// Flush, sync and move the file onto its final path
    fn close(self) -> OutputResult<()>;
}

/// Writer of funding rate rows
pub trait FundingWriter: OutputWriter {
    /// Write a single funding rate
    fn write_funding(&mut self, rate: &FundingRate) -> OutputResult<()>;

    /// Write multiple funding rates at once
    fn write_fundings(&mut self, rates: &[FundingRate]) -> OutputResult<()> {
        for rate in rates {
            self.write_funding(rate)?;
        }
        Ok(())
    }
}

/// Writer of kline rows
pub trait KlineWriter: OutputWriter {
    /// Write a single kline
    fn write_kline(&mut self, kline: &Kline) -> OutputResult<()>;

    /// Write multiple klines at once
    fn write_klines(&mut self, klines: &[Kline]) -> OutputResult<()> {
        for kline in klines {
            self.write_kline(kline)?;
        }
        Ok(())
    }
}
