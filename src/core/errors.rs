// @file: kline_engine/src/core/errors.rs
// @description: Error taxonomy shared by the fetcher, downloader, cache and orchestrator.
// @author: LAS.

use chrono::NaiveDate;
use thiserror::Error;
use crate::core::models::MarketSegment;


//
// ERROR TYPE
//

#[derive(Debug, Error)]
pub enum KlineError {
    // Configuration / validation: raised immediately, never retried.
    #[error("unknown market segment: '{0}' (expected spot, coin_margin or usd_margin)")]
    UnknownMarketSegment(String),

    #[error("unsupported frequency: '{0}'")]
    UnsupportedFrequency(String),

    #[error("timestamp {value} is below 1e10 and is not a valid unix timestamp")]
    TimestampTooSmall { value: f64 },

    #[error("invalid date range: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid endpoint url '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Local data
    #[error("no local data for {market}:{symbol} on {date}")]
    MissingDay {
        market: MarketSegment,
        symbol: String,
        date: NaiveDate,
    },

    #[error("archive '{path}' contains no kline rows")]
    EmptyArchive { path: String },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // Network
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl KlineError {
    // #1. Retry classification
    // Transport failures and timeouts are worth another attempt; a definitive
    // answer from the server or a local validation failure is not.
    pub fn is_transient(&self) -> bool {
        match self {
            KlineError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            KlineError::Io(_) => true,
            _ => false,
        }
    }
}
