// @file: kline_engine/src/core/models.rs
// @description: Domain types for kline acquisition: market segments, frequencies, candles, windows and download items.
// @author: LAS.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::core::errors::KlineError;


//
// MARKET SEGMENTS
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketSegment {
    Spot,
    CoinMargin, // COIN-M futures
    UsdMargin,  // USD-M futures
}

/// Static per-segment capabilities. Everything that used to be a `match` on the
/// segment (REST host, endpoint, archive prefix, cache directory) lives here.
#[derive(Debug)]
pub struct SegmentProfile {
    pub name: &'static str,
    pub default_rest_host: &'static str,
    pub kline_path: &'static str,
    pub archive_prefix: &'static str,
    pub cache_dir: &'static str,
}

static PROFILES: [SegmentProfile; 3] = [
    SegmentProfile {
        name: "spot",
        default_rest_host: "https://api.binance.com",
        kline_path: "/api/v3/klines",
        archive_prefix: "spot",
        cache_dir: "binance",
    },
    SegmentProfile {
        name: "coin_margin",
        default_rest_host: "https://dapi.binance.com",
        kline_path: "/dapi/v1/klines",
        archive_prefix: "futures/cm",
        cache_dir: "binancecoinm",
    },
    SegmentProfile {
        name: "usd_margin",
        default_rest_host: "https://fapi.binance.com",
        kline_path: "/fapi/v1/klines",
        archive_prefix: "futures/um",
        cache_dir: "binanceusdm",
    },
];

impl MarketSegment {
    pub const ALL: [MarketSegment; 3] = [
        MarketSegment::Spot,
        MarketSegment::CoinMargin,
        MarketSegment::UsdMargin,
    ];

    pub fn profile(self) -> &'static SegmentProfile {
        &PROFILES[self as usize]
    }
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl FromStr for MarketSegment {
    type Err = KlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarketSegment::ALL
            .into_iter()
            .find(|segment| segment.profile().name == s)
            .ok_or_else(|| KlineError::UnknownMarketSegment(s.to_string()))
    }
}


//
// FREQUENCY
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month, // fixed at 30 days
}

impl FrequencyUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(FrequencyUnit::Second),
            'm' => Some(FrequencyUnit::Minute),
            'h' => Some(FrequencyUnit::Hour),
            'd' => Some(FrequencyUnit::Day),
            'w' => Some(FrequencyUnit::Week),
            'M' => Some(FrequencyUnit::Month),
            _ => None,
        }
    }

    fn millis(self) -> i64 {
        const SECOND: i64 = 1_000;
        match self {
            FrequencyUnit::Second => SECOND,
            FrequencyUnit::Minute => 60 * SECOND,
            FrequencyUnit::Hour => 60 * 60 * SECOND,
            FrequencyUnit::Day => 24 * 60 * 60 * SECOND,
            FrequencyUnit::Week => 7 * 24 * 60 * 60 * SECOND,
            FrequencyUnit::Month => 30 * 24 * 60 * 60 * SECOND,
        }
    }
}

/// Kline interval such as `1m`, `15m`, `4h` or `1d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frequency {
    amount: u32,
    unit: FrequencyUnit,
    label: String,
}

impl Frequency {
    pub fn duration_ms(&self) -> i64 {
        i64::from(self.amount) * self.unit.millis()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn unit(&self) -> FrequencyUnit {
        self.unit
    }
}

impl FromStr for Frequency {
    type Err = KlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unsupported = || KlineError::UnsupportedFrequency(s.to_string());

        let suffix: char = s.chars().last().ok_or_else(unsupported)?;
        let unit: FrequencyUnit = FrequencyUnit::from_suffix(suffix).ok_or_else(unsupported)?;
        let amount: u32 = s[..s.len() - suffix.len_utf8()]
            .parse()
            .map_err(|_| unsupported())?;

        if amount == 0 {
            return Err(unsupported());
        }

        Ok(Frequency { amount, unit, label: s.to_string() })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.label)
    }
}


//
// CANDLES
//

/// One kline row. Timestamps are epoch milliseconds; numeric fields that could
/// not be parsed from the source are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_asset_volume: f64,
    pub trade_count: f64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

/// Ordered by `open_time`, one row per `open_time`.
pub type CandleSeries = Vec<Candle>;

/// A candle loaded from a daily archive, with the sell-side volumes derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineRecord {
    #[serde(flatten)]
    pub candle: Candle,
    pub sell_base_volume: f64,
    pub sell_quote_volume: f64,
}

impl From<Candle> for KlineRecord {
    fn from(candle: Candle) -> Self {
        KlineRecord {
            sell_base_volume: candle.volume - candle.taker_buy_base_volume,
            sell_quote_volume: candle.quote_asset_volume - candle.taker_buy_quote_volume,
            candle,
        }
    }
}


//
// REQUEST UNITS
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    pub symbol: String,
    pub market: MarketSegment,
    pub frequency: Frequency,
    pub start_time: i64,
    pub end_time: i64,
}

/// Unit of bulk-archive acquisition and of local cache presence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadItem {
    pub market: MarketSegment,
    pub symbol: String,
    pub date: NaiveDate,
    pub frequency: Frequency,
}

impl DownloadItem {
    pub fn date_label(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DownloadItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.market, self.symbol, self.frequency, self.date_label())
    }
}


//
// OUTCOMES
//

/// Why a page walk stopped before covering its whole window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialReason {
    HttpStatus(u16),
    MalformedBody,
    SkippedWindows(u32),
    RateLimitExhausted,
    IterationLimit,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub candles: CandleSeries,
    pub partial: Option<PartialReason>,
    pub skipped_windows: u32, // counted even when a later abort sets `partial`
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.partial.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded { bytes: usize },
    Skipped,
    Failed(String),
    Cancelled,
}

impl DownloadStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, DownloadStatus::Downloaded { .. } | DownloadStatus::Skipped)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: Vec<NaiveDate>,
    pub cancelled: usize,
}

impl DownloadSummary {
    pub fn record(&mut self, date: NaiveDate, status: &DownloadStatus) {
        match status {
            DownloadStatus::Downloaded { .. } => self.downloaded += 1,
            DownloadStatus::Skipped => self.skipped += 1,
            DownloadStatus::Failed(_) => self.failed.push(date),
            DownloadStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn all_present(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}
