//! Download job descriptions

use std::fmt;
use std::str::FromStr;

use super::{DownloadError, DownloadResult};
use crate::{Category, DataType, Interval};

/// One run request, resolved from a data type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadJob {
    /// Mirror and decompress an archive tree
    ArchiveMirror {
        /// Archive family to mirror
        data_type: DataType,
    },
    /// Merge the funding history of every USDT perpetual
    FundingRateSync,
    /// Merge klines of every symbol of a category
    KlineSync {
        /// Product category
        category: Category,
        /// Bar interval
        interval: Interval,
    },
}

impl DownloadJob {
    /// Resolve a job from its textual parameters.
    ///
    /// `category` and `interval` are only validated for `klines`. Fails with
    /// [`DownloadError::ConfigurationError`] on any unknown value; nothing is
    /// fetched before that.
    pub fn parse(data_type: &str, category: &str, interval: &str) -> DownloadResult<Self> {
        let data_type = DataType::from_str(data_type).map_err(DownloadError::ConfigurationError)?;
        Self::for_data_type(data_type, category, interval)
    }

    /// Resolve a job for an already parsed data type
    pub fn for_data_type(
        data_type: DataType,
        category: &str,
        interval: &str,
    ) -> DownloadResult<Self> {
        match data_type {
            DataType::FundingRate => Ok(DownloadJob::FundingRateSync),
            DataType::Klines => Ok(DownloadJob::KlineSync {
                category: Category::from_str(category)
                    .map_err(DownloadError::ConfigurationError)?,
                interval: Interval::from_str(interval)
                    .map_err(DownloadError::ConfigurationError)?,
            }),
            data_type => Ok(DownloadJob::ArchiveMirror { data_type }),
        }
    }

    /// Data type the job produces
    pub fn data_type(&self) -> DataType {
        match self {
            DownloadJob::ArchiveMirror { data_type } => *data_type,
            DownloadJob::FundingRateSync => DataType::FundingRate,
            DownloadJob::KlineSync { .. } => DataType::Klines,
        }
    }

    /// Label used for metrics
    pub fn job_type(&self) -> &'static str {
        match self {
            DownloadJob::ArchiveMirror { .. } => "archive",
            DownloadJob::FundingRateSync => "funding_rate",
            DownloadJob::KlineSync { .. } => "klines",
        }
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadJob::ArchiveMirror { data_type } => write!(f, "{data_type} archives"),
            DownloadJob::FundingRateSync => f.write_str("funding rates"),
            DownloadJob::KlineSync { category, interval } => {
                write!(f, "{category} klines ({interval})")
            }
        }
    }
}
