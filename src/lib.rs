//! # Bybit Bulk Downloader Library
//!
//! Bulk-downloads historical market data published by Bybit. Two families of
//! data are supported:
//!
//! - **Archive data** (`trading`, `premium_index`, `spot_index`, `spot`,
//!   `kline_for_metatrader4`): gzip-compressed CSV files served from the
//!   public static file server as an HTML directory index. The tree is
//!   walked, every file is downloaded, decompressed and mirrored locally.
//! - **API data** (`fundingRate`, `klines`): time series paginated from the
//!   Bybit v5 REST API across bounded time windows, merged, deduplicated and
//!   written as one CSV per symbol.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bybit_bulk_downloader::downloader::{DownloadJob, DownloaderConfig, RunContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let job = DownloadJob::parse("trading", "linear", "1")?;
//! let ctx = RunContext::with_defaults(DownloaderConfig::new("./data"));
//! let report = job.run(&ctx).await?;
//! println!("{} files downloaded, {} skipped", report.completed, report.skipped);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - capabilities (HTTP GET, directory listing, REST market data),
//!   the directory walker, the archive fetcher and window pagination
//! - [`downloader`] - jobs, batch scheduling and time-series synchronization
//! - [`output`] - canonical local paths, CSV writers and row merging
//! - [`resume`] - completion predicate and the destination run lock
//! - [`shutdown`] - cooperative cancellation

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Download orchestration
pub mod downloader;

/// Capabilities and fetchers
pub mod fetcher;

/// Prometheus metrics
pub mod metrics;

/// Local layout and CSV output
pub mod output;

/// Resume predicate and run locking
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Data type offered by Bybit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Public trade archives
    #[serde(rename = "trading")]
    Trading,
    /// Premium index archives
    #[serde(rename = "premium_index")]
    PremiumIndex,
    /// Spot index archives
    #[serde(rename = "spot_index")]
    SpotIndex,
    /// MetaTrader 4 kline archives, grouped by symbol and year
    #[serde(rename = "kline_for_metatrader4")]
    KlineForMetatrader4,
    /// Spot trade archives
    #[serde(rename = "spot")]
    Spot,
    /// Funding rate history from the REST API
    #[serde(rename = "fundingRate")]
    FundingRate,
    /// Klines from the REST API
    #[serde(rename = "klines")]
    Klines,
}

impl DataType {
    /// Every supported data type, archive types first
    pub const ALL: [DataType; 7] = [
        DataType::Trading,
        DataType::PremiumIndex,
        DataType::SpotIndex,
        DataType::KlineForMetatrader4,
        DataType::Spot,
        DataType::FundingRate,
        DataType::Klines,
    ];

    /// Name used both remotely and in the local layout
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Trading => "trading",
            DataType::PremiumIndex => "premium_index",
            DataType::SpotIndex => "spot_index",
            DataType::KlineForMetatrader4 => "kline_for_metatrader4",
            DataType::Spot => "spot",
            DataType::FundingRate => "fundingRate",
            DataType::Klines => "klines",
        }
    }

    /// Whether the data type is mirrored from the static file server
    pub fn is_archive(&self) -> bool {
        !matches!(self, DataType::FundingRate | DataType::Klines)
    }

    /// Whether the remote tree has a year level below each symbol
    pub fn has_year_level(&self) -> bool {
        matches!(self, DataType::KlineForMetatrader4)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|dt| dt.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = DataType::ALL.iter().map(|dt| dt.as_str()).collect();
                format!(
                    "Invalid data_type: {s}. Available types are: {}",
                    names.join(", ")
                )
            })
    }
}

/// Product category of the REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Category {
    /// USDT / USDC perpetuals and futures
    #[default]
    #[serde(rename = "linear")]
    Linear,
    /// Coin-margined contracts
    #[serde(rename = "inverse")]
    Inverse,
    /// Spot market
    #[serde(rename = "spot")]
    Spot,
}

impl Category {
    /// Query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Linear => "linear",
            Category::Inverse => "inverse",
            Category::Spot => "spot",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Category::Linear),
            "inverse" => Ok(Category::Inverse),
            "spot" => Ok(Category::Spot),
            _ => Err(format!(
                "Invalid category: {s}. Available categories are: linear, inverse, spot"
            )),
        }
    }
}

/// Kline interval accepted by the REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Interval {
    /// 1 minute
    #[default]
    #[serde(rename = "1")]
    OneMinute,
    /// 3 minutes
    #[serde(rename = "3")]
    ThreeMinutes,
    /// 5 minutes
    #[serde(rename = "5")]
    FiveMinutes,
    /// 15 minutes
    #[serde(rename = "15")]
    FifteenMinutes,
    /// 30 minutes
    #[serde(rename = "30")]
    ThirtyMinutes,
    /// 1 hour
    #[serde(rename = "60")]
    OneHour,
    /// 2 hours
    #[serde(rename = "120")]
    TwoHours,
    /// 4 hours
    #[serde(rename = "240")]
    FourHours,
    /// 6 hours
    #[serde(rename = "360")]
    SixHours,
    /// 12 hours
    #[serde(rename = "720")]
    TwelveHours,
    /// 1 day
    #[serde(rename = "D")]
    OneDay,
    /// 1 week
    #[serde(rename = "W")]
    OneWeek,
    /// 1 month
    #[serde(rename = "M")]
    OneMonth,
}

impl Interval {
    /// Every supported interval, shortest first
    pub const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::TwelveHours,
        Interval::OneDay,
        Interval::OneWeek,
        Interval::OneMonth,
    ];

    /// Query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1",
            Interval::ThreeMinutes => "3",
            Interval::FiveMinutes => "5",
            Interval::FifteenMinutes => "15",
            Interval::ThirtyMinutes => "30",
            Interval::OneHour => "60",
            Interval::TwoHours => "120",
            Interval::FourHours => "240",
            Interval::SixHours => "360",
            Interval::TwelveHours => "720",
            Interval::OneDay => "D",
            Interval::OneWeek => "W",
            Interval::OneMonth => "M",
        }
    }

    /// Bar duration in minutes
    pub fn to_minutes(&self) -> i64 {
        match self {
            Interval::OneMinute => 1,
            Interval::ThreeMinutes => 3,
            Interval::FiveMinutes => 5,
            Interval::FifteenMinutes => 15,
            Interval::ThirtyMinutes => 30,
            Interval::OneHour => 60,
            Interval::TwoHours => 120,
            Interval::FourHours => 240,
            Interval::SixHours => 360,
            Interval::TwelveHours => 720,
            Interval::OneDay => 1_440,
            Interval::OneWeek => 10_080,
            Interval::OneMonth => 43_200, // Approximate: 30 days
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|iv| iv.as_str() == s)
            .ok_or_else(|| format!("Invalid interval: {s}"))
    }
}

/// A row that is keyed by a single timestamp
///
/// Rows are sorted and deduplicated on this key before they are persisted.
pub trait TimeKeyed {
    /// Timestamp identifying the row
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Ticker entry returned by the ticker list endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticker {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
}

impl Ticker {
    /// Whether the symbol is quoted in USDT
    pub fn is_usdt_quoted(&self) -> bool {
        self.symbol.ends_with("USDT")
    }
}

/// Funding rate history entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundingRate {
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Funding rate value
    pub funding_rate: Decimal,
    /// Settlement time of the funding rate
    pub funding_rate_timestamp: DateTime<Utc>,
}

impl FundingRate {
    /// Validate funding rate data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.is_empty() {
            return Err("Symbol name cannot be empty".to_string());
        }

        if self.funding_rate_timestamp.timestamp_millis() <= 0 {
            return Err(format!(
                "Funding timestamp must be positive, got {}",
                self.funding_rate_timestamp
            ));
        }

        Ok(())
    }
}

impl TimeKeyed for FundingRate {
    fn timestamp(&self) -> DateTime<Utc> {
        self.funding_rate_timestamp
    }
}

/// Kline bar returned by the kline endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kline {
    /// Bar open time
    pub start_time: DateTime<Utc>,
    /// Open price
    pub open_price: Decimal,
    /// High price
    pub high_price: Decimal,
    /// Low price
    pub low_price: Decimal,
    /// Close price
    pub close_price: Decimal,
    /// Traded volume (base asset, contracts for inverse)
    pub volume: Decimal,
    /// Turnover (quote asset)
    pub turnover: Decimal,
}

impl Kline {
    /// Validate bar data integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.high_price < self.open_price || self.high_price < self.close_price {
            return Err(format!(
                "High ({}) must be >= open ({}) and close ({})",
                self.high_price, self.open_price, self.close_price
            ));
        }

        if self.low_price > self.open_price || self.low_price > self.close_price {
            return Err(format!(
                "Low ({}) must be <= open ({}) and close ({})",
                self.low_price, self.open_price, self.close_price
            ));
        }

        if self.volume < Decimal::ZERO {
            return Err(format!("Volume must be non-negative, got {}", self.volume));
        }

        Ok(())
    }
}

impl TimeKeyed for Kline {
    fn timestamp(&self) -> DateTime<Utc> {
        self.start_time
    }
}
