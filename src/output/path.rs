//! Canonical local paths
//!
//! Every artifact has exactly one local location below
//! `{root}/bybit_data/`. Archive files mirror the remote path:
//!
//! ```text
//! https://public.bybit.com/trading/BTCUSDT/BTCUSDT2020-03-25.csv.gz
//!   -> {root}/bybit_data/trading/BTCUSDT/BTCUSDT2020-03-25.csv
//! ```
//!
//! API outputs live at `fundingRate/{symbol}.csv` and
//! `klines/{category}/{symbol}/{interval}.csv`.
//!
//! The canonical path is both the write target and the completion marker, so
//! resolution is a pure function of its inputs.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use url::Url;

use super::{OutputError, OutputResult};
use crate::downloader::config::LOCAL_NAMESPACE;
use crate::{Category, DataType, Interval};

/// Suffix stripped from archive names once decompressed
const COMPRESSED_SUFFIX: &str = ".gz";

/// Maps remote artifacts and API series to local paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root_dir: PathBuf,
}

impl PathResolver {
    /// Resolver writing below `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Destination root
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// `{root}/bybit_data`
    pub fn namespace_dir(&self) -> PathBuf {
        self.root_dir.join(LOCAL_NAMESPACE)
    }

    /// Decompressed output path of an archive URL
    pub fn resolve_archive(&self, url: &str) -> OutputResult<PathBuf> {
        let mut segments = archive_segments(url)?;
        if let Some(last) = segments.last_mut() {
            if let Some(stripped) = last.strip_suffix(COMPRESSED_SUFFIX) {
                if !stripped.is_empty() {
                    *last = stripped.to_string();
                }
            }
        }
        Ok(self.join_segments(&segments))
    }

    /// Compressed intermediate of an archive URL (same directory, remote name)
    pub fn compressed_path(&self, url: &str) -> OutputResult<PathBuf> {
        let segments = archive_segments(url)?;
        Ok(self.join_segments(&segments))
    }

    /// Merged funding rate history of a symbol
    pub fn resolve_funding(&self, symbol: &str) -> PathBuf {
        self.namespace_dir()
            .join(DataType::FundingRate.as_str())
            .join(format!("{}.csv", sanitize_segment(symbol)))
    }

    /// Merged klines of a symbol
    pub fn resolve_klines(&self, category: Category, symbol: &str, interval: Interval) -> PathBuf {
        self.kline_symbol_dir(category, symbol)
            .join(format!("{}.csv", interval.as_str()))
    }

    /// Directory holding the per-window kline files of a symbol
    pub fn kline_parts_dir(&self, category: Category, symbol: &str, interval: Interval) -> PathBuf {
        self.kline_symbol_dir(category, symbol)
            .join(format!("{}_parts", interval.as_str()))
    }

    /// Per-window kline file, named `{start_ms}_{end_ms}.csv` after the
    /// window bounds.
    ///
    /// A trailing window cut at "now" gets a different name once the clock
    /// moves on, so it is never mistaken for the longer window of a later run.
    pub fn resolve_kline_part(
        &self,
        category: Category,
        symbol: &str,
        interval: Interval,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> PathBuf {
        self.kline_parts_dir(category, symbol, interval).join(format!(
            "{}_{}.csv",
            window_start.timestamp_millis(),
            window_end.timestamp_millis()
        ))
    }

    fn kline_symbol_dir(&self, category: Category, symbol: &str) -> PathBuf {
        self.namespace_dir()
            .join(DataType::Klines.as_str())
            .join(category.as_str())
            .join(sanitize_segment(symbol))
    }

    fn join_segments(&self, segments: &[String]) -> PathBuf {
        let mut path = self.namespace_dir();
        for segment in segments {
            path.push(segment);
        }
        path
    }
}

/// Sanitized, non-empty path segments of a file URL
fn archive_segments(url: &str) -> OutputResult<Vec<String>> {
    let parsed =
        Url::parse(url).map_err(|e| OutputError::InvalidPath(format!("{url}: {e}")))?;

    let segments: Vec<String> = parsed
        .path_segments()
        .ok_or_else(|| OutputError::InvalidPath(format!("{url}: URL has no path")))?
        .filter(|s| !s.is_empty())
        .map(sanitize_segment)
        .collect();

    if segments.is_empty() || parsed.path().ends_with('/') {
        return Err(OutputError::InvalidPath(format!(
            "{url}: URL does not name a file"
        )));
    }

    Ok(segments)
}

/// Make one path segment safe to join.
///
/// Separators and drive colons become `_`, parent references become `__`.
/// Case is preserved.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned = name.replace("..", "__").replace(['/', '\\', ':'], "_");
    if cleaned == "." {
        "_".to_string()
    } else {
        cleaned
    }
}
