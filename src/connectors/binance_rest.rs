// @file: kline_engine/src/connectors/binance_rest.rs
// @description: Paginated, rate-limit aware kline walker over the Binance REST endpoints.
// @author: LAS.

use log::{debug, error, info, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::connectors::Endpoints;
use crate::core::errors::KlineError;
use crate::core::models::{Candle, CandleSeries, FetchReport, FetchWindow, PartialReason};
use crate::utils::retry::sleep_or_cancel;


//
// SETTINGS
//

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub page_limit: usize,
    pub page_delay: Duration,
    pub rate_limit_cooldown: Duration,
    pub rate_limit_max_retries: u32,
    pub max_iterations: u32,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        FetcherSettings {
            page_limit: 1000,
            page_delay: Duration::from_millis(100),
            rate_limit_cooldown: Duration::from_secs(60),
            rate_limit_max_retries: 10,
            max_iterations: 1000,
        }
    }
}


//
// PAGE TYPES
//

struct Page {
    row_count: usize, // rows in the response, parseable or not
    candles: Vec<Candle>,
}

enum PageOutcome {
    Rows(Page),
    RateLimited,
    Rejected(u16),
    Malformed,
}


//
// FETCHER
//

#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    endpoints: Endpoints,
    settings: FetcherSettings,
}

impl PageFetcher {
    pub fn new(client: Client, endpoints: Endpoints, settings: FetcherSettings) -> Self {
        PageFetcher { client, endpoints, settings }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    //
    // PUBLIC INTERFACE
    //

    /// Walks `[start_time, end_time)` page by page.
    ///
    /// Only configuration problems are errors. Every network outcome ends in a
    /// [`FetchReport`]; when the walk stopped early the report carries the reason.
    pub async fn fetch(&self, window: &FetchWindow, cancel: &CancellationToken) -> Result<FetchReport, KlineError> {
        let base_url: Url = self.endpoints.kline_url(window.market)?;

        if window.start_time >= window.end_time {
            return Ok(FetchReport { candles: Vec::new(), partial: None, skipped_windows: 0 });
        }

        info!(
            "Fetching {} {} ({}) from {} to {}",
            window.market, window.symbol, window.frequency, window.start_time, window.end_time
        );

        // #1. Window Geometry
        // Each request spans `limit` intervals. The walk starts one interval early so the
        // first candle at `start_time` is always included.
        let limit: usize = self.settings.page_limit.max(1);
        let interval: i64 = window.frequency.duration_ms();
        let span: i64 = interval.saturating_mul(limit as i64);

        let mut cursor: i64 = window.start_time - interval;
        let mut iteration: u32 = 0;
        let mut rate_limited: u32 = 0;
        let mut skipped: u32 = 0;
        let mut partial: Option<PartialReason> = None;
        let mut rows: Vec<Candle> = Vec::new();

        // #2. Sequential Page Walk
        while cursor < window.end_time {
            if iteration >= self.settings.max_iterations {
                warn!(
                    "Reached {} page iterations for {}, stopping at cursor {}",
                    self.settings.max_iterations, window.symbol, cursor
                );
                partial = Some(PartialReason::IterationLimit);
                break;
            }

            if cancel.is_cancelled() {
                partial = Some(PartialReason::Cancelled);
                break;
            }

            let page_end: i64 = cursor.saturating_add(span).min(window.end_time);
            let url: Url = page_url(&base_url, window, cursor, page_end, limit);

            match self.request_page(url).await {
                Ok(PageOutcome::RateLimited) => {
                    rate_limited += 1;
                    if rate_limited > self.settings.rate_limit_max_retries {
                        error!(
                            "Still rate limited after {} cooldowns for {}, giving up",
                            self.settings.rate_limit_max_retries, window.symbol
                        );
                        partial = Some(PartialReason::RateLimitExhausted);
                        break;
                    }

                    // Same cursor, same window: nothing advances while rate limited
                    warn!("Rate limit exceeded. Waiting {:?} before retrying {} => {}", self.settings.rate_limit_cooldown, cursor, page_end);
                    if !sleep_or_cancel(self.settings.rate_limit_cooldown, cancel).await {
                        partial = Some(PartialReason::Cancelled);
                        break;
                    }
                }

                Ok(PageOutcome::Rejected(status)) => {
                    partial = Some(PartialReason::HttpStatus(status));
                    break;
                }

                Ok(PageOutcome::Malformed) => {
                    error!("Malformed kline response for {} {} => {}", window.symbol, cursor, page_end);
                    partial = Some(PartialReason::MalformedBody);
                    break;
                }

                Ok(PageOutcome::Rows(page)) => {
                    rate_limited = 0;
                    iteration += 1;

                    if page.row_count == 0 {
                        info!("No data returned for range {} => {}", cursor, page_end);
                        break;
                    }

                    info!("Fetched {} klines from {} to {}", page.row_count, cursor, page_end);

                    let last_open: Option<i64> = page.candles.last().map(|c| c.open_time);
                    let full_page: bool = page.row_count >= limit;
                    rows.extend(page.candles);

                    // #3. Advance
                    // A short page is the last one. A full page restarts one interval
                    // before its last candle, which is re-fetched and collapsed later.
                    let last_open: i64 = match last_open {
                        Some(t) if full_page => t,
                        None if full_page => {
                            // Nothing to advance from, the rest of the window is unreachable
                            error!("Full page without timestamps for {} {} => {}", window.symbol, cursor, page_end);
                            partial = Some(PartialReason::MalformedBody);
                            break;
                        }
                        _ => break,
                    };

                    // never step in place on tiny page limits
                    cursor = (last_open - interval).max(cursor + interval);

                    if cursor < window.end_time && !sleep_or_cancel(self.settings.page_delay, cancel).await {
                        partial = Some(PartialReason::Cancelled);
                        break;
                    }
                }

                Err(e) => {
                    error!("Request error: {}. Skipping window {} => {}", e, cursor, page_end);
                    skipped += 1;
                    cursor = page_end;
                    iteration += 1;
                }
            }
        }

        if skipped > 0 {
            if partial.is_none() {
                partial = Some(PartialReason::SkippedWindows(skipped));
            } else {
                warn!("{} window(s) skipped before the walk stopped ({:?})", skipped, partial);
            }
        }

        // #4. Reconcile
        let candles: CandleSeries = reconcile(rows, window.start_time, window.end_time);

        match &partial {
            Some(reason) => warn!(
                "Partial series for {} {}: {} rows ({:?})",
                window.market, window.symbol, candles.len(), reason
            ),
            None if candles.is_empty() => info!("{} returned no data", window.symbol),
            None => debug!("{} rows for {}", candles.len(), window.symbol),
        }

        Ok(FetchReport { candles, partial, skipped_windows: skipped })
    }

    //
    // INTERNAL HELPERS
    //

    async fn request_page(&self, url: Url) -> Result<PageOutcome, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;
        let status: StatusCode = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PageOutcome::RateLimited);
        }

        if !status.is_success() {
            let body: String = response.text().await.unwrap_or_default();
            error!("HTTP error {} for {}: {}", status.as_u16(), url, body);
            return Ok(PageOutcome::Rejected(status.as_u16()));
        }

        let json: Value = match response.json().await {
            Ok(value) => value,
            Err(e) if e.is_decode() => return Ok(PageOutcome::Malformed),
            Err(e) => return Err(e),
        };

        Ok(parse_kline_array(&json).map_or(PageOutcome::Malformed, PageOutcome::Rows))
    }
}


//
// PARSING
//

fn page_url(base: &Url, window: &FetchWindow, start: i64, end: i64, limit: usize) -> Url {
    let mut url: Url = base.clone();
    url.query_pairs_mut()
        .append_pair("symbol", &window.symbol.to_uppercase())
        .append_pair("interval", window.frequency.label())
        .append_pair("startTime", &start.to_string())
        .append_pair("endTime", &end.to_string())
        .append_pair("limit", &limit.to_string());
    url
}

// Binance returns an array of fixed-width arrays:
// [ [Open Time, Open, High, Low, Close, Volume, Close Time, Quote Volume, Trades, Taker Base, Taker Quote, Ignore], ... ]
// Anything else is an error object.
fn parse_kline_array(json: &Value) -> Option<Page> {
    let raw_list = json.as_array()?;
    let mut candles: Vec<Candle> = Vec::with_capacity(raw_list.len());

    for item in raw_list {
        let arr = item.as_array()?;

        // #1. Numeric coercion: strings and numbers both accepted, anything else is NaN
        let get_f64 = |idx: usize| -> f64 {
            match arr.get(idx) {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
                Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
                _ => f64::NAN,
            }
        };

        let open_time: f64 = get_f64(0);
        let close_time: f64 = get_f64(6);

        // A row without timestamps cannot be placed in the series
        if !open_time.is_finite() || !close_time.is_finite() {
            debug!("Dropping kline row without timestamps: {}", item);
            continue;
        }

        candles.push(Candle {
            open_time: open_time as i64,
            open: get_f64(1),
            high: get_f64(2),
            low: get_f64(3),
            close: get_f64(4),
            volume: get_f64(5),
            close_time: close_time as i64,
            quote_asset_volume: get_f64(7),
            trade_count: get_f64(8),
            taker_buy_base_volume: get_f64(9),
            taker_buy_quote_volume: get_f64(10),
        });
    }

    Some(Page { row_count: raw_list.len(), candles })
}

/// Clips to `[start, end)`, sorts by `open_time` and keeps one row per
/// `open_time`. The sort is stable, so the most recently fetched copy wins.
pub fn reconcile(mut rows: Vec<Candle>, start: i64, end: i64) -> CandleSeries {
    rows.retain(|c| c.open_time >= start && c.open_time < end);
    rows.sort_by_key(|c| c.open_time);

    let mut series: CandleSeries = Vec::with_capacity(rows.len());
    for candle in rows {
        match series.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            _ => series.push(candle),
        }
    }
    series
}
