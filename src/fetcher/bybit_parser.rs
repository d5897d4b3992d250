//! Bybit v5 response parsing
//!
//! Every v5 response is wrapped in an envelope:
//!
//! ```json
//! {"retCode": 0, "retMsg": "OK", "result": {"category": "linear", "list": [...]}, "time": 1672531200000}
//! ```
//!
//! Numbers inside `list` are strings; timestamps are string milliseconds.
//! They are converted to [`Decimal`] and [`DateTime<Utc>`] here so nothing
//! downstream compares them as text.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

use crate::fetcher::bybit_config::RET_CODE_OK;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::{FundingRate, Kline, Ticker};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Option<ResultList>,
}

#[derive(Debug, Deserialize)]
struct ResultList {
    #[serde(default)]
    list: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingRecord {
    symbol: String,
    funding_rate: String,
    funding_rate_timestamp: String,
}

fn str_field<'a>(arr: &'a [Value], idx: usize, name: &str) -> FetcherResult<&'a str> {
    arr[idx]
        .as_str()
        .ok_or_else(|| FetcherError::ParseError(format!("{name} is not a string")))
}

/// Stateless parser for v5 responses
pub struct BybitParser;

impl BybitParser {
    /// Check the envelope and return `result.list`
    pub fn parse_envelope(body: &[u8]) -> FetcherResult<Vec<Value>> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| FetcherError::ParseError(format!("Invalid response envelope: {e}")))?;

        if envelope.ret_code != RET_CODE_OK {
            return Err(FetcherError::ApiError {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        Ok(envelope.result.map(|r| r.list).unwrap_or_default())
    }

    /// Parse ticker list entries (only `symbol` is kept)
    pub fn parse_tickers(list: Vec<Value>) -> FetcherResult<Vec<Ticker>> {
        list.into_iter()
            .map(|item| {
                item.get("symbol")
                    .and_then(Value::as_str)
                    .map(|symbol| Ticker {
                        symbol: symbol.to_string(),
                    })
                    .ok_or_else(|| FetcherError::ParseError("Ticker without symbol".to_string()))
            })
            .collect()
    }

    /// Parse funding rate history entries
    pub fn parse_funding_rates(list: Vec<Value>) -> FetcherResult<Vec<FundingRate>> {
        let mut rates = Vec::with_capacity(list.len());

        for item in list {
            let record: FundingRecord = serde_json::from_value(item)
                .map_err(|e| FetcherError::ParseError(format!("Invalid funding entry: {e}")))?;

            let rate = FundingRate {
                funding_rate: Self::parse_decimal(&record.funding_rate, "fundingRate")?,
                funding_rate_timestamp: Self::parse_timestamp_ms(
                    &record.funding_rate_timestamp,
                    "fundingRateTimestamp",
                )?,
                symbol: record.symbol,
            };
            rate
                .validate()
                .map_err(|e| FetcherError::ParseError(format!("Invalid funding entry: {e}")))?;
            rates.push(rate);
        }

        Ok(rates)
    }

    /// Parse kline entries.
    ///
    /// Format: `[startTime, openPrice, highPrice, lowPrice, closePrice, volume, turnover]`,
    /// all strings.
    pub fn parse_klines(list: Vec<Value>) -> FetcherResult<Vec<Kline>> {
        let mut klines = Vec::with_capacity(list.len());

        for item in list {
            let arr = item
                .as_array()
                .ok_or_else(|| FetcherError::ParseError("Kline is not an array".to_string()))?;

            if arr.len() != 7 {
                return Err(FetcherError::ParseError(format!(
                    "Expected 7 elements in kline, got {}",
                    arr.len()
                )));
            }

            let field = |idx: usize, name: &'static str| str_field(arr, idx, name);

            let kline = Kline {
                start_time: Self::parse_timestamp_ms(field(0, "startTime")?, "startTime")?,
                open_price: Self::parse_decimal(field(1, "openPrice")?, "openPrice")?,
                high_price: Self::parse_decimal(field(2, "highPrice")?, "highPrice")?,
                low_price: Self::parse_decimal(field(3, "lowPrice")?, "lowPrice")?,
                close_price: Self::parse_decimal(field(4, "closePrice")?, "closePrice")?,
                volume: Self::parse_decimal(field(5, "volume")?, "volume")?,
                turnover: Self::parse_decimal(field(6, "turnover")?, "turnover")?,
            };
            kline.validate().map_err(|e| {
                FetcherError::ParseError(format!("Invalid kline at {}: {e}", kline.start_time))
            })?;
            klines.push(kline);
        }

        Ok(klines)
    }

    /// Parse a string decimal
    pub fn parse_decimal(value: &str, field: &str) -> FetcherResult<Decimal> {
        Decimal::from_str(value)
            .or_else(|_| Decimal::from_scientific(value))
            .map_err(|e| FetcherError::ParseError(format!("Invalid {field} {value:?}: {e}")))
    }

    /// Parse string milliseconds since the epoch
    pub fn parse_timestamp_ms(value: &str, field: &str) -> FetcherResult<DateTime<Utc>> {
        let ms: i64 = value
            .parse()
            .map_err(|e| FetcherError::ParseError(format!("Invalid {field} {value:?}: {e}")))?;

        DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| FetcherError::ParseError(format!("{field} out of range: {ms}")))
    }
}
